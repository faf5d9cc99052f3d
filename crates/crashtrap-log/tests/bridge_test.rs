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

//! Stores wired to the global `log` facade.

use crashtrap_core::{EchoFlags, LogFormat, LogLevel};
use crashtrap_log::logger::ECHO_TARGET;
use crashtrap_log::{LogStore, LogStoreLogger};
use log::Log;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

/// Global logger for this test binary: records echo lines and forwards
/// everything to an optional store bridge.
struct TestLogger {
    bridge: RwLock<Option<LogStoreLogger>>,
    echoed: Mutex<Vec<String>>,
}

static LOGGER: TestLogger = TestLogger {
    bridge: parking_lot::const_rwlock(None),
    echoed: parking_lot::const_mutex(Vec::new()),
};

impl Log for TestLogger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        if record.target() == ECHO_TARGET {
            self.echoed.lock().push(record.args().to_string());
        }
        if let Some(bridge) = self.bridge.read().as_ref() {
            bridge.log(record);
        }
    }

    fn flush(&self) {}
}

fn logger() -> &'static TestLogger {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Trace);
    });
    &LOGGER
}

#[test]
fn test_close_with_bridged_logger_returns() {
    // --- 1. ARRANGE ---
    let logger = logger();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LogStore::open(dir.path().join("bridged"), LogFormat::Text).unwrap());
    *logger.bridge.write() = Some(LogStoreLogger::new(Arc::clone(&store), log::LevelFilter::Info));
    store.append(LogLevel::Info, "before close").unwrap();
    log::warn!("through the facade");

    // --- 2. ACT ---
    let (done, finished) = crossbeam_channel::bounded(1);
    let closing = Arc::clone(&store);
    thread::spawn(move || {
        let result = closing.close();
        let _ = done.send(result.is_ok());
    });
    let closed = finished.recv_timeout(Duration::from_secs(3));
    *logger.bridge.write() = None;

    // --- 3. ASSERT ---
    assert_eq!(closed, Ok(true), "close() did not return");
    let messages: Vec<_> = LogStore::load(store.path(), LogFormat::Text)
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert!(messages.contains(&"before close".to_owned()));
    assert!(messages.iter().any(|m| m.ends_with("through the facade")));
}

#[test]
fn test_debug_console_echo_mirrors_entries() {
    // --- 1. ARRANGE ---
    let logger = logger();
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::open(dir.path().join("echoed"), LogFormat::Xml).unwrap();
    store
        .set_echo_flags(EchoFlags::DEBUG_CONSOLE.with(EchoFlags::STDERR))
        .unwrap();

    // --- 2. ACT ---
    let result = store.append(LogLevel::Important, "mirrored to the console");
    store.set_echo_flags(EchoFlags::EMPTY).unwrap();
    store.append(LogLevel::Important, "kept out of the console").unwrap();

    // --- 3. ASSERT ---
    assert!(result.is_ok());
    assert_eq!(store.len(), 2);
    let echoed = logger.echoed.lock();
    assert!(echoed.iter().any(|line| line == "mirrored to the console"));
    assert!(!echoed.iter().any(|line| line == "kept out of the console"));
}
