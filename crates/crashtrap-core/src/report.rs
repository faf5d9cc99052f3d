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

//! The immutable crash report and its builder.

use crate::config::ReportConfig;
use crate::context::ContextSummary;
use crate::frame::StackFrame;
use crate::module::ModuleRecord;
use crate::walker::{ModuleEnumerator, StackWalker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of the reporting application.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicationInfo {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: Option<String>,
    /// Support contact.
    pub contact_email: Option<String>,
    /// Configured endpoint, rendered for display.
    pub support_endpoint: String,
    /// Free text from the configuration.
    pub user_message: Option<String>,
}

impl ApplicationInfo {
    /// Extracts the application fields of a configuration.
    pub fn from_config(config: &ReportConfig) -> Self {
        Self {
            name: config.app_name.clone(),
            version: config.app_version.clone(),
            contact_email: config.contact_email.clone(),
            support_endpoint: config.endpoint.to_string(),
            user_message: config.user_message.clone(),
        }
    }
}

/// Process-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Process identifier.
    pub pid: u32,
    /// Path of the executable.
    pub executable: Option<String>,
    /// Command line arguments, program name included.
    pub command_line: Vec<String>,
    /// Working directory.
    pub current_dir: Option<String>,
    /// Environment variables. Only filled in detailed mode.
    pub environment: Vec<(String, String)>,
    /// Resident memory of the process in bytes.
    pub memory: Option<u64>,
}

/// Host and operating system metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    /// OS name and version.
    pub os: Option<String>,
    /// Kernel version.
    pub kernel: Option<String>,
    /// Host name.
    pub host_name: Option<String>,
    /// Login name of the user running the process.
    pub user_name: Option<String>,
    /// CPU model.
    pub cpu_brand: Option<String>,
    /// Logical CPU count.
    pub cpu_count: usize,
    /// Total physical memory in bytes.
    pub total_memory: u64,
    /// Used physical memory in bytes.
    pub used_memory: u64,
}

/// Snapshot of program state captured for one fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Unique report identifier.
    pub id: Uuid,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
    /// Reporting application.
    pub application: ApplicationInfo,
    /// Faulting context.
    pub context: ContextSummary,
    /// Call stack, innermost frame first.
    pub frames: Vec<StackFrame>,
    /// Loaded modules in enumeration order.
    pub modules: Vec<ModuleRecord>,
    /// Process metadata.
    pub process: ProcessInfo,
    /// System metadata.
    pub system: SystemInfo,
    /// `true` when extended diagnostics were collected.
    pub detailed: bool,
    /// Steps that failed while building the report.
    pub degradations: Vec<String>,
}

impl Report {
    /// Starts a report for `context` using the application fields of `config`.
    pub fn builder(config: &ReportConfig, context: ContextSummary) -> ReportBuilder {
        ReportBuilder::new(config, context)
    }

    /// Returns `true` if some part of the report could not be collected.
    pub fn is_partial(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Returns `true` if any frame lies in a module whose name contains `module`.
    pub fn passes_through(&self, module: &str) -> bool {
        self.frames.iter().any(|frame| {
            frame
                .module
                .as_ref()
                .is_some_and(|m| m.name.contains(module))
        })
    }

    /// Suggested file stem for a saved report, e.g. `demo_20250101_120000_ab12cd34`.
    pub fn file_stem(&self) -> String {
        let app: String = self
            .application
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let id = self.id.simple().to_string();
        format!(
            "{}_{}_{}",
            app,
            self.captured_at.format("%Y%m%d_%H%M%S"),
            &id[..8]
        )
    }
}

/// Assembles a [`Report`] step by step.
///
/// Each step is independent so a failing collector only leaves a note in
/// `degradations` instead of losing the whole report.
#[derive(Debug)]
pub struct ReportBuilder {
    report: Report,
}

impl ReportBuilder {
    /// Starts an empty report.
    pub fn new(config: &ReportConfig, context: ContextSummary) -> Self {
        Self {
            report: Report {
                id: Uuid::new_v4(),
                captured_at: Utc::now(),
                application: ApplicationInfo::from_config(config),
                context,
                frames: Vec::new(),
                modules: Vec::new(),
                process: ProcessInfo::default(),
                system: SystemInfo::default(),
                detailed: false,
                degradations: Vec::new(),
            },
        }
    }

    /// Walks `walker` from the top and stores every frame.
    pub fn frames_from(mut self, walker: &mut dyn StackWalker) -> Self {
        self.report.frames = walker.collect_frames();
        if self.report.frames.is_empty() {
            self.report.degradations.push("stack walk produced no frame".into());
        }
        self
    }

    /// Appends the modules of `enumerator`.
    pub fn modules_from(mut self, enumerator: &mut dyn ModuleEnumerator) -> Self {
        self.report.modules.extend(enumerator.collect_modules());
        self
    }

    /// Replaces the frames.
    pub fn frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.report.frames = frames;
        self
    }

    /// Appends modules.
    pub fn modules(mut self, modules: impl IntoIterator<Item = ModuleRecord>) -> Self {
        self.report.modules.extend(modules);
        self
    }

    /// Sets the process metadata.
    pub fn process(mut self, process: ProcessInfo) -> Self {
        self.report.process = process;
        self
    }

    /// Sets the system metadata.
    pub fn system(mut self, system: SystemInfo) -> Self {
        self.report.system = system;
        self
    }

    /// Marks the report as carrying extended diagnostics.
    pub fn detailed(mut self, detailed: bool) -> Self {
        self.report.detailed = detailed;
        self
    }

    /// Records a failed collection step.
    pub fn degraded(mut self, note: impl Into<String>) -> Self {
        self.report.degradations.push(note.into());
        self
    }

    /// Mutable access for collectors that fill several fields at once.
    pub fn report_mut(&mut self) -> &mut Report {
        &mut self.report
    }

    /// Finishes the report.
    pub fn build(self) -> Report {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FaultKind;
    use crate::frame::ModuleRef;
    use crate::module::ModuleKind;

    struct NoFrames;

    impl Iterator for NoFrames {
        type Item = StackFrame;
        fn next(&mut self) -> Option<StackFrame> {
            None
        }
    }

    impl StackWalker for NoFrames {
        fn init_trace(&mut self) {}
        fn remaining(&self) -> usize {
            0
        }
        fn depth(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_empty_walk_marks_report_partial() {
        let config = ReportConfig::new("demo");
        let context = ContextSummary::for_current_thread(FaultKind::Snapshot, "manual");
        let report = Report::builder(&config, context)
            .frames_from(&mut NoFrames)
            .build();
        assert!(report.is_partial());
        assert_eq!(report.application.name, "demo");
    }

    #[test]
    fn test_passes_through_module() {
        let config = ReportConfig::new("demo app");
        let context = ContextSummary::for_current_thread(FaultKind::Panic, "boom");
        let frame = StackFrame {
            address: 0x1010,
            module: Some(ModuleRef {
                name: "libplugin.so".into(),
                base: 0x1000,
                offset: 0x10,
            }),
            symbol: None,
        };
        let report = Report::builder(&config, context)
            .frames(vec![frame])
            .modules([ModuleRecord {
                kind: ModuleKind::Native,
                base: Some(0x1000),
                size: 0x100,
                name: "libplugin.so".into(),
                path: None,
                version: None,
            }])
            .build();
        assert!(report.passes_through("libplugin"));
        assert!(!report.passes_through("libother"));
        assert!(report.file_stem().starts_with("demo_app_"));
    }
}
