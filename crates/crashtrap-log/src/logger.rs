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

//! Bridge from the `log` facade into a [`LogStore`].

use crate::store::{self, LogStore};
use crashtrap_core::LogLevel;
use std::sync::Arc;

/// Target used by the debug console echo sink. Records with this target
/// are ignored to avoid feeding a store's own echo back into it.
pub const ECHO_TARGET: &str = "crashtrap::echo";

/// A `log::Log` implementation that appends records to a store.
///
/// Records raised while the current thread holds a store lock are dropped,
/// and inside a [`FaultPathGuard`](crate::FaultPathGuard) the lock wait is
/// bounded, so logging from inside a store or a fault handler cannot block
/// on the thread's own lock.
#[derive(Debug)]
pub struct LogStoreLogger {
    store: Arc<LogStore>,
    max_level: log::LevelFilter,
}

impl LogStoreLogger {
    /// Creates a logger writing records up to `max_level` into `store`.
    pub fn new(store: Arc<LogStore>, max_level: log::LevelFilter) -> Self {
        Self { store, max_level }
    }

    /// Installs the logger as the global `log` backend.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl log::Log for LogStoreLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.max_level && metadata.target() != ECHO_TARGET
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) || store::lock_held_by_current_thread() {
            return;
        }
        let level = LogLevel::from_log_level(record.level());
        let message = format!("[{}] {}", record.target(), record.args());
        if store::in_fault_path() {
            self.store.append_from_fault(level, message);
        } else {
            let _ = self.store.append(level, message);
        }
    }

    fn flush(&self) {
        if !store::lock_held_by_current_thread() {
            let _ = self.store.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn test_records_are_appended_with_mapped_level() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LogStore::open(dir.path().join("bridge"), Default::default()).unwrap());
        let logger = LogStoreLogger::new(Arc::clone(&store), log::LevelFilter::Info);

        logger.log(
            &log::Record::builder()
                .level(log::Level::Warn)
                .target("app")
                .args(format_args!("careful"))
                .build(),
        );
        logger.log(
            &log::Record::builder()
                .level(log::Level::Debug)
                .target("app")
                .args(format_args!("hidden"))
                .build(),
        );
        logger.log(
            &log::Record::builder()
                .level(log::Level::Error)
                .target(ECHO_TARGET)
                .args(format_args!("loop"))
                .build(),
        );

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warning);
        assert_eq!(entries[0].message, "[app] careful");
    }

    #[test]
    fn test_fault_path_records_use_bounded_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LogStore::open(dir.path().join("fault"), Default::default()).unwrap());
        let logger = LogStoreLogger::new(Arc::clone(&store), log::LevelFilter::Info);

        let _fault = crate::FaultPathGuard::enter();
        logger.log(
            &log::Record::builder()
                .level(log::Level::Error)
                .target("engine")
                .args(format_args!("captured"))
                .build(),
        );

        assert_eq!(store.entries()[0].message, "[engine] captured");
        assert_eq!(store.status().dropped, 0);
    }
}
