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

use crashtrap_core::{
    ContextSummary, FaultKind, LogFormat, LogLevel, Report, ReportActivity, ReportConfig,
    ReportFlags, ReportFormat, StackFrame, SupportEndpoint,
};
use crashtrap_dispatch::protocol::CollectorMessage;
use crashtrap_dispatch::ReportDispatcher;
use crashtrap_log::LogRegistry;
use std::io::{Cursor, Read};
use std::net::TcpListener;
use std::time::Duration;

fn report(config: &ReportConfig) -> Report {
    let mut context =
        ContextSummary::for_current_thread(FaultKind::NativeSignal, "SIGSEGV (invalid memory reference)");
    context.signal = Some(11);
    Report::builder(config, context)
        .frames(vec![StackFrame::raw(0x1000), StackFrame::raw(0x2000)])
        .build()
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_report_is_saved_then_sent_to_collector() {
    // --- 1. ARRANGE ---
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received
    });
    let config = ReportConfig::new("demo")
        .with_version("0.9")
        .with_contact("ops@example.com")
        .with_report_dir(dir.path())
        .with_endpoint(SupportEndpoint::Collector {
            host: "127.0.0.1".into(),
            port,
        });
    let report = report(&config);

    // --- 2. ACT ---
    let summary = ReportDispatcher::new(&config).dispatch_report(&report, &config, &[]);

    // --- 3. ASSERT ---
    assert!(summary.is_clean(), "failures: {:?}", summary.failures);
    let saved = summary.saved.expect("local copy");
    let local = std::fs::read(&saved).unwrap();
    assert_eq!(saved.extension().unwrap(), "log");

    let message = server.join().unwrap();
    let message = CollectorMessage::decode(&message).unwrap();
    assert_eq!(message.app_name, "demo");
    assert_eq!(message.app_version, "0.9");
    assert_eq!(message.extension, "log");
    assert_eq!(message.notification_email, "ops@example.com");
    assert_eq!(message.payload, local.as_slice());
    assert!(summary.sent.unwrap().bytes > local.len());
}

#[test]
fn test_unreachable_collector_is_journaled_not_raised() {
    // --- 1. ARRANGE ---
    let dir = tempfile::tempdir().unwrap();
    let journal = LogRegistry::new();
    let store = journal.open(dir.path().join("app"), LogFormat::Text).unwrap();
    let config = ReportConfig::new("demo")
        .with_report_dir(dir.path().join("reports"))
        .with_dispatch_timeout(Duration::from_secs(2))
        .with_endpoint(SupportEndpoint::Collector {
            host: "127.0.0.1".into(),
            port: closed_port(),
        });

    // --- 2. ACT ---
    let summary = ReportDispatcher::new(&config)
        .with_journal(journal.clone())
        .dispatch_report(&report(&config), &config, &[]);

    // --- 3. ASSERT ---
    assert!(summary.saved.is_some(), "local persistence must not depend on the network");
    assert!(summary.sent.is_none());
    assert_eq!(summary.failures.len(), 1);
    let warnings: Vec<_> = store
        .entries()
        .into_iter()
        .filter(|e| e.level == LogLevel::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.starts_with("cannot send report"));
}

#[test]
fn test_unreachable_web_collector_is_journaled_not_raised() {
    // --- 1. ARRANGE ---
    let dir = tempfile::tempdir().unwrap();
    let journal = LogRegistry::new();
    let store = journal.open(dir.path().join("app"), LogFormat::Text).unwrap();
    let url = format!("http://127.0.0.1:{}/crash", closed_port());
    let config = ReportConfig::new("demo")
        .with_activity(ReportActivity::Send)
        .with_dispatch_timeout(Duration::from_secs(2))
        .with_endpoint(SupportEndpoint::http(&url).unwrap());

    // --- 2. ACT ---
    let summary = ReportDispatcher::new(&config)
        .with_journal(journal)
        .dispatch_report(&report(&config), &config, &[]);

    // --- 3. ASSERT ---
    assert!(summary.saved.is_none());
    assert!(summary.sent.is_none());
    assert_eq!(summary.failures.len(), 1);
    assert!(store.entries().iter().any(|e| e.level == LogLevel::Warning));
}

#[test]
fn test_attached_report_bundles_open_logs() {
    // --- 1. ARRANGE ---
    let dir = tempfile::tempdir().unwrap();
    let journal = LogRegistry::new();
    let store = journal.open(dir.path().join("app"), LogFormat::Text).unwrap();
    store.append(LogLevel::Info, "before the crash").unwrap();
    store.flush().unwrap();
    let config = ReportConfig::new("demo")
        .with_format(ReportFormat::Xml)
        .with_flags(ReportFlags::ATTACH_REPORT)
        .with_activity(ReportActivity::Save)
        .with_report_dir(dir.path().join("reports"));

    // --- 2. ACT ---
    let summary =
        ReportDispatcher::new(&config).dispatch_report(&report(&config), &config, &journal.open_paths());

    // --- 3. ASSERT ---
    let saved = summary.saved.expect("bundle saved");
    assert_eq!(saved.extension().unwrap(), "zip");
    let mut archive = zip::ZipArchive::new(Cursor::new(std::fs::read(saved).unwrap())).unwrap();
    let mut log = String::new();
    archive
        .by_name("logs/app.log")
        .unwrap()
        .read_to_string(&mut log)
        .unwrap();
    assert!(log.contains("INFO: before the crash"));
    let xml_name = archive
        .file_names()
        .find(|n| n.ends_with(".xml"))
        .map(str::to_owned)
        .unwrap();
    let mut xml = String::new();
    archive.by_name(&xml_name).unwrap().read_to_string(&mut xml).unwrap();
    assert!(xml.contains("<stack order=\"innermost-first\">"));
    assert_eq!(xml.matches("<frame ").count(), 2);
}
