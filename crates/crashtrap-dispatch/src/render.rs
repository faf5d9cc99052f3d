// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Report rendering.

use crate::error::{DispatchError, DispatchResult};
use crashtrap_core::{Report, ReportFormat, StackFrame};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Write as _;

/// Renders `report` in `format`.
pub fn render(report: &Report, format: ReportFormat) -> DispatchResult<Vec<u8>> {
    match format {
        ReportFormat::Text => Ok(render_text(report).into_bytes()),
        ReportFormat::Xml => render_xml(report),
    }
}

const MIB: u64 = 1024 * 1024;

/// Plain text report, one section per aspect of the capture.
pub fn render_text(report: &Report) -> String {
    let mut out = String::with_capacity(4096);
    let app = &report.application;
    let title = match &app.version {
        Some(version) => format!("{} {}", app.name, version),
        None => app.name.clone(),
    };

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Crash report: {title}");
    let _ = writeln!(out, "{}", "=".repeat(14 + title.len()));
    field(&mut out, "Report id", &report.id.to_string());
    field(&mut out, "Captured at", &captured_at(report));
    optional(&mut out, "Computer", report.system.host_name.as_deref());
    optional(&mut out, "User", report.system.user_name.as_deref());
    optional(&mut out, "Contact", app.contact_email.as_deref());
    field(&mut out, "Support", &app.support_endpoint);
    out.push('\n');

    field(&mut out, "Error reason", &report.context.headline());
    optional(&mut out, "User message", app.user_message.as_deref());
    out.push('\n');

    section(&mut out, "System");
    optional(&mut out, "OS", report.system.os.as_deref());
    optional(&mut out, "Kernel", report.system.kernel.as_deref());
    if let Some(cpu) = &report.system.cpu_brand {
        field(&mut out, "CPU", &format!("{cpu} ({} logical)", report.system.cpu_count));
    }
    if report.system.total_memory > 0 {
        field(
            &mut out,
            "Memory",
            &format!(
                "{} MiB used of {} MiB",
                report.system.used_memory / MIB,
                report.system.total_memory / MIB
            ),
        );
    }
    out.push('\n');

    section(&mut out, "Process");
    field(&mut out, "PID", &report.process.pid.to_string());
    optional(&mut out, "Executable", report.process.executable.as_deref());
    if !report.process.command_line.is_empty() {
        field(&mut out, "Command line", &report.process.command_line.join(" "));
    }
    optional(&mut out, "Current dir", report.process.current_dir.as_deref());
    if let Some(memory) = report.process.memory {
        field(&mut out, "Memory", &format!("{} KiB", memory / 1024));
    }
    out.push('\n');

    section(&mut out, "Stack trace (innermost first)");
    if report.frames.is_empty() {
        out.push_str("  (no frames)\n");
    }
    for (index, frame) in report.frames.iter().enumerate() {
        let _ = writeln!(out, "  #{index:<3} {frame}");
    }
    out.push('\n');

    section(&mut out, "Modules");
    for module in &report.modules {
        let _ = writeln!(out, "  [{}] {}", module.kind, module);
    }

    if !report.process.environment.is_empty() {
        out.push('\n');
        section(&mut out, "Environment");
        for (key, value) in &report.process.environment {
            let _ = writeln!(out, "  {key}={value}");
        }
    }

    if report.is_partial() {
        out.push('\n');
        section(&mut out, "Incomplete capture");
        for note in &report.degradations {
            let _ = writeln!(out, "  {note}");
        }
    }
    out
}

fn captured_at(report: &Report) -> String {
    report
        .captured_at
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "-- {title} --");
}

fn field(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "{:<14}{}", format!("{label}:"), value);
}

fn optional(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        field(out, label, value);
    }
}

/// Thin wrapper over the XML writer with error mapping.
struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn event(&mut self, event: Event<'_>) -> DispatchResult<()> {
        self.writer
            .write_event(event)
            .map_err(|e| DispatchError::Encode(e.to_string()))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> DispatchResult<()> {
        let mut start = BytesStart::new(name);
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        self.event(Event::Start(start))
    }

    fn end(&mut self, name: &str) -> DispatchResult<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> DispatchResult<()> {
        let mut start = BytesStart::new(name);
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        self.event(Event::Empty(start))
    }

    fn text_element(&mut self, name: &str, text: &str) -> DispatchResult<()> {
        self.start(name, &[])?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }
}

/// XML report with the same content as the text form.
pub fn render_xml(report: &Report) -> DispatchResult<Vec<u8>> {
    let mut xml = XmlOut {
        writer: Writer::new_with_indent(Vec::with_capacity(8192), b' ', 2),
    };
    xml.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let id = report.id.to_string();
    xml.start("report", &[("id", id.as_str()), ("version", "1")])?;

    let app = &report.application;
    let mut app_attributes = vec![("name", app.name.as_str())];
    push_opt(&mut app_attributes, "version", app.version.as_deref());
    push_opt(&mut app_attributes, "contact", app.contact_email.as_deref());
    app_attributes.push(("support", app.support_endpoint.as_str()));
    xml.empty("application", &app_attributes)?;

    let captured = captured_at(report);
    xml.empty("capture", &[("time", captured.as_str())])?;

    let context = &report.context;
    let kind = context.kind.to_string();
    let signal = context.signal.map(|s| s.to_string());
    let code = context.code.map(|c| c.to_string());
    let address = context.fault_address.map(|a| format!("0x{a:x}"));
    let mut context_attributes = vec![
        ("kind", kind.as_str()),
        ("reason", context.reason.as_str()),
        ("thread", context.thread_id.as_str()),
    ];
    push_opt(&mut context_attributes, "threadName", context.thread_name.as_deref());
    push_opt(&mut context_attributes, "signal", signal.as_deref());
    push_opt(&mut context_attributes, "code", code.as_deref());
    push_opt(&mut context_attributes, "address", address.as_deref());
    push_opt(&mut context_attributes, "location", context.location.as_deref());
    xml.empty("context", &context_attributes)?;

    if let Some(message) = &app.user_message {
        xml.text_element("userMessage", message)?;
    }

    let system = &report.system;
    let cpus = system.cpu_count.to_string();
    let total = system.total_memory.to_string();
    let used = system.used_memory.to_string();
    let mut system_attributes = Vec::new();
    push_opt(&mut system_attributes, "os", system.os.as_deref());
    push_opt(&mut system_attributes, "kernel", system.kernel.as_deref());
    push_opt(&mut system_attributes, "host", system.host_name.as_deref());
    push_opt(&mut system_attributes, "user", system.user_name.as_deref());
    push_opt(&mut system_attributes, "cpu", system.cpu_brand.as_deref());
    system_attributes.push(("cpuCount", cpus.as_str()));
    system_attributes.push(("totalMemory", total.as_str()));
    system_attributes.push(("usedMemory", used.as_str()));
    xml.empty("system", &system_attributes)?;

    let process = &report.process;
    let pid = process.pid.to_string();
    let memory = process.memory.map(|m| m.to_string());
    let mut process_attributes = vec![("pid", pid.as_str())];
    push_opt(&mut process_attributes, "executable", process.executable.as_deref());
    push_opt(&mut process_attributes, "currentDir", process.current_dir.as_deref());
    push_opt(&mut process_attributes, "memory", memory.as_deref());
    xml.start("process", &process_attributes)?;
    xml.start("commandLine", &[])?;
    for argument in &process.command_line {
        xml.text_element("arg", argument)?;
    }
    xml.end("commandLine")?;
    if !process.environment.is_empty() {
        xml.start("environment", &[])?;
        for (key, value) in &process.environment {
            xml.start("var", &[("name", key.as_str())])?;
            xml.event(Event::Text(BytesText::new(value)))?;
            xml.end("var")?;
        }
        xml.end("environment")?;
    }
    xml.end("process")?;

    xml.start("stack", &[("order", "innermost-first")])?;
    for frame in &report.frames {
        write_frame(&mut xml, frame)?;
    }
    xml.end("stack")?;

    xml.start("modules", &[])?;
    for module in &report.modules {
        let kind = module.kind.to_string();
        let base = module.base.map(|b| format!("0x{b:x}"));
        let size = module.size.to_string();
        let mut attributes = vec![("kind", kind.as_str()), ("name", module.name.as_str())];
        push_opt(&mut attributes, "version", module.version.as_deref());
        push_opt(&mut attributes, "base", base.as_deref());
        attributes.push(("size", size.as_str()));
        push_opt(&mut attributes, "path", module.path.as_deref());
        xml.empty("module", &attributes)?;
    }
    xml.end("modules")?;

    if report.is_partial() {
        xml.start("degradations", &[])?;
        for note in &report.degradations {
            xml.text_element("note", note)?;
        }
        xml.end("degradations")?;
    }

    xml.end("report")?;
    let mut bytes = xml.writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn push_opt<'a>(attributes: &mut Vec<(&'a str, &'a str)>, name: &'a str, value: Option<&'a str>) {
    if let Some(value) = value {
        attributes.push((name, value));
    }
}

fn write_frame(xml: &mut XmlOut, frame: &StackFrame) -> DispatchResult<()> {
    let address = format!("0x{:x}", frame.address);
    let module_offset = frame.module.as_ref().map(|m| format!("0x{:x}", m.offset));
    let symbol = frame.symbol.as_ref();
    let symbol_offset = symbol.and_then(|s| s.offset).map(|o| o.to_string());
    let line = symbol.and_then(|s| s.line).map(|l| l.to_string());
    let column = symbol.and_then(|s| s.column).map(|c| c.to_string());

    let mut attributes = vec![("address", address.as_str())];
    push_opt(&mut attributes, "module", frame.module.as_ref().map(|m| m.name.as_str()));
    push_opt(&mut attributes, "moduleOffset", module_offset.as_deref());
    push_opt(&mut attributes, "function", symbol.map(|s| s.name.as_str()));
    push_opt(&mut attributes, "functionOffset", symbol_offset.as_deref());
    push_opt(&mut attributes, "file", symbol.and_then(|s| s.file.as_deref()));
    push_opt(&mut attributes, "line", line.as_deref());
    push_opt(&mut attributes, "column", column.as_deref());
    xml.empty("frame", &attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashtrap_core::{
        ContextSummary, FaultKind, ModuleKind, ModuleRecord, ModuleRef, ReportConfig, Symbol,
    };

    fn sample() -> Report {
        let config = ReportConfig::new("demo").with_version("2.0").with_contact("ops@example.com");
        let mut context = ContextSummary::for_current_thread(FaultKind::NativeSignal, "SIGSEGV (invalid memory reference)");
        context.signal = Some(11);
        context.fault_address = Some(0);
        Report::builder(&config, context)
            .frames(vec![
                StackFrame {
                    address: 0x5555_0000_1234,
                    module: Some(ModuleRef {
                        name: "demo".into(),
                        base: 0x5555_0000_0000,
                        offset: 0x1234,
                    }),
                    symbol: Some(Symbol {
                        name: "demo::crash<'a>".into(),
                        offset: Some(4),
                        file: Some("src/main.rs".into()),
                        line: Some(12),
                        column: Some(5),
                    }),
                },
                StackFrame::raw(0xdead),
            ])
            .modules([ModuleRecord {
                kind: ModuleKind::Native,
                base: Some(0x5555_0000_0000),
                size: 0x10000,
                name: "demo".into(),
                path: Some("/opt/demo/demo".into()),
                version: None,
            }])
            .degraded("system probe busy")
            .build()
    }

    #[test]
    fn test_text_report_sections() {
        let text = render_text(&sample());
        assert!(text.starts_with("Crash report: demo 2.0\n"));
        assert!(text.contains("Error reason: native fault on thread"));
        assert!(text.contains("#0   0x0000555500001234 demo+0x1234 demo::crash<'a>()+4 bytes at src/main.rs:12"));
        assert!(text.contains("#1   0x000000000000dead"));
        assert!(text.contains("[native] demo @ 0x0000555500000000"));
        assert!(text.contains("-- Incomplete capture --\n  system probe busy"));
    }

    #[test]
    fn test_xml_report_escapes_and_lists_frames() {
        let xml = String::from_utf8(render_xml(&sample()).unwrap()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("function=\"demo::crash&lt;&apos;a&gt;\""));
        assert_eq!(xml.matches("<frame ").count(), 2);
        assert!(xml.contains("<module kind=\"native\" name=\"demo\""));
        assert!(xml.contains("signal=\"11\""));
        assert!(xml.trim_end().ends_with("</report>"));
    }
}
