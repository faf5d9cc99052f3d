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

//! Registry of the log stores a process keeps open.

use crate::error::{LogError, LogResult};
use crate::store::{LogStore, FAULT_LOCK_TIMEOUT};
use crashtrap_core::{LogFormat, LogLevel};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A thread-safe, cloneable set of open log stores.
///
/// Fault handlers reach every store through the registry, so all fault-path
/// methods use bounded lock waits.
#[derive(Debug, Clone)]
pub struct LogRegistry {
    stores: Arc<RwLock<Vec<Arc<LogStore>>>>,
}

impl LogRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            stores: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Opens a store and registers it.
    pub fn open(&self, path: impl AsRef<Path>, format: LogFormat) -> LogResult<Arc<LogStore>> {
        let store = Arc::new(LogStore::open(path, format)?);
        self.register(Arc::clone(&store));
        Ok(store)
    }

    /// Registers an already open store.
    pub fn register(&self, store: Arc<LogStore>) {
        let path = store.path().display().to_string();
        self.stores.write().push(store);
        log::info!("Registered log store: {path}");
    }

    /// Removes the store writing to `path`. Returns it if it was registered.
    pub fn unregister(&self, path: &Path) -> Option<Arc<LogStore>> {
        let mut stores = self.stores.write();
        let index = stores.iter().position(|s| s.path() == path)?;
        Some(stores.remove(index))
    }

    /// All registered stores.
    pub fn stores(&self) -> Vec<Arc<LogStore>> {
        self.stores.read().clone()
    }

    /// Paths of the registered stores that are still open.
    pub fn open_paths(&self) -> Vec<PathBuf> {
        self.stores
            .read()
            .iter()
            .filter(|s| s.is_open())
            .map(|s| s.path().to_path_buf())
            .collect()
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends to every open store. Closed stores are skipped.
    pub fn append_all(&self, level: LogLevel, message: &str) {
        for store in self.stores.read().iter() {
            if let Err(err) = store.append(level, message) {
                log::debug!("Skipping store during broadcast: {err}");
            }
        }
    }

    /// Fault-path broadcast. Returns how many stores accepted the entry.
    pub fn append_all_from_fault(&self, level: LogLevel, message: &str) -> usize {
        let Some(stores) = self.stores.try_read_for(FAULT_LOCK_TIMEOUT) else {
            return 0;
        };
        stores
            .iter()
            .filter(|store| store.append_from_fault(level, message))
            .count()
    }

    /// Fault-path flush of every store.
    pub fn flush_all_from_fault(&self) {
        if let Some(stores) = self.stores.try_read_for(FAULT_LOCK_TIMEOUT) {
            for store in stores.iter() {
                store.flush_from_fault();
            }
        }
    }

    /// Closes and unregisters every store, returning the errors of those
    /// that failed to close (already closed stores included).
    pub fn close_all(&self) -> Vec<LogError> {
        let stores = std::mem::take(&mut *self.stores.write());
        stores
            .iter()
            .filter_map(|store| store.close().err())
            .filter(|err| !err.is_invalid_state())
            .collect()
    }
}

impl Default for LogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_every_store() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LogRegistry::new();
        let text = registry.open(dir.path().join("a"), LogFormat::Text).unwrap();
        let xml = registry.open(dir.path().join("b"), LogFormat::Xml).unwrap();

        registry.append_all(LogLevel::Info, "both");
        assert_eq!(registry.append_all_from_fault(LogLevel::Error, "fault"), 2);
        assert_eq!(text.len(), 2);
        assert_eq!(xml.len(), 2);
    }

    #[test]
    fn test_closed_store_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LogRegistry::new();
        let first = registry.open(dir.path().join("a"), LogFormat::Text).unwrap();
        registry.open(dir.path().join("b"), LogFormat::Text).unwrap();
        first.close().unwrap();

        assert_eq!(registry.open_paths().len(), 1);
        assert_eq!(registry.append_all_from_fault(LogLevel::Error, "fault"), 1);
        assert!(registry.close_all().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LogRegistry::new();
        let store = registry.open(dir.path().join("a"), LogFormat::Stream).unwrap();
        let removed = registry.unregister(store.path()).unwrap();
        assert!(Arc::ptr_eq(&removed, &store));
        assert!(registry.unregister(store.path()).is_none());
    }
}
