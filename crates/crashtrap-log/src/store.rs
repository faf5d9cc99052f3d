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

//! The bounded, thread-safe log store.

use crate::echo;
use crate::encoding;
use crate::error::{LogError, LogResult};
use crashtrap_core::{EchoFlags, EntryMode, LogEntry, LogFlags, LogFormat, LogLevel};
use parking_lot::{Mutex, MutexGuard};
use std::cell::Cell;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Capacity value meaning "no limit".
pub const UNLIMITED: usize = usize::MAX;

/// How long a fault handler waits for the store lock before dropping its entry.
pub const FAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Minimum number of evicted records left on disk before the file is compacted.
const COMPACTION_SLACK: usize = 256;

thread_local! {
    static LOCKS_HELD: Cell<usize> = const { Cell::new(0) };
    static FAULT_PATH: Cell<bool> = const { Cell::new(false) };
}

/// Returns `true` while the current thread holds the lock of any store.
pub fn lock_held_by_current_thread() -> bool {
    LOCKS_HELD.with(|held| held.get() > 0)
}

/// Returns `true` while a [`FaultPathGuard`] is alive on the current thread.
pub fn in_fault_path() -> bool {
    FAULT_PATH.with(Cell::get)
}

/// Marks the current thread as running a fault handler until dropped.
///
/// Records bridged by [`LogStoreLogger`](crate::LogStoreLogger) then wait
/// at most [`FAULT_LOCK_TIMEOUT`] for a store lock.
#[must_use]
pub struct FaultPathGuard {
    previous: bool,
    _not_send: PhantomData<*const ()>,
}

impl FaultPathGuard {
    /// Enters the fault path on the current thread.
    pub fn enter() -> Self {
        let previous = FAULT_PATH.with(|flag| flag.replace(true));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for FaultPathGuard {
    fn drop(&mut self) {
        FAULT_PATH.with(|flag| flag.set(self.previous));
    }
}

/// Counts the store locks held by the current thread.
struct HeldMarker;

impl HeldMarker {
    fn enter() -> Self {
        LOCKS_HELD.with(|held| held.set(held.get() + 1));
        Self
    }
}

impl Drop for HeldMarker {
    fn drop(&mut self) {
        LOCKS_HELD.with(|held| held.set(held.get().saturating_sub(1)));
    }
}

/// Observable health of a [`LogStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStatus {
    /// `false` once the store has been closed.
    pub open: bool,
    /// `true` if any write to the file failed since opening.
    pub degraded: bool,
    /// Message of the most recent write failure.
    pub last_error: Option<String>,
    /// Entries currently retained in memory.
    pub entries: usize,
    /// Encoded size of the retained entries.
    pub bytes: usize,
    /// Entries accepted since opening.
    pub appended: u64,
    /// Entries evicted by the capacity or byte limit.
    pub evicted: u64,
    /// Entries discarded by the level filter.
    pub filtered: u64,
    /// Fault-path entries dropped because the lock was not available in time.
    pub dropped: u64,
}

struct Retained {
    seq: u64,
    entry: LogEntry,
    record: Vec<u8>,
}

/// The log file: header and records, then an optional footer.
///
/// `body_len` marks where the next record goes, so a footer written by a
/// flush is cut off again by the next append.
struct DiskFile {
    file: File,
    body_len: u64,
    footer_len: u64,
}

impl DiskFile {
    fn create(path: &Path, header: &[u8]) -> std::io::Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(header)?;
        Ok(Self {
            file,
            body_len: header.len() as u64,
            footer_len: 0,
        })
    }

    fn append(&mut self, record: &[u8]) -> std::io::Result<()> {
        if self.footer_len > 0 {
            self.file.set_len(self.body_len)?;
            self.footer_len = 0;
        }
        self.file.seek(SeekFrom::Start(self.body_len))?;
        self.file.write_all(record)?;
        self.body_len += record.len() as u64;
        Ok(())
    }

    fn rewrite<'a>(
        &mut self,
        header: &[u8],
        records: impl Iterator<Item = &'a [u8]>,
        footer: &[u8],
    ) -> std::io::Result<()> {
        let mut buffer = header.to_vec();
        for record in records {
            buffer.extend_from_slice(record);
        }
        let body_len = buffer.len() as u64;
        buffer.extend_from_slice(footer);

        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buffer)?;
        self.file.flush()?;
        self.body_len = body_len;
        self.footer_len = footer.len() as u64;
        Ok(())
    }
}

struct StoreState {
    ring: VecDeque<Retained>,
    next_seq: u64,
    inserted: bool,
    bytes: usize,
    capacity: usize,
    byte_limit: usize,
    flags: LogFlags,
    echo: EchoFlags,
    filter: LogLevel,
    disk: Option<DiskFile>,
    closed: bool,
    stale_records: usize,
    degraded: bool,
    last_error: Option<String>,
    appended: u64,
    evicted: u64,
    filtered: u64,
    /// `log` records raised under the lock, emitted once it is released.
    notices: Vec<(log::Level, String)>,
}

impl StoreState {
    fn evict(&mut self) {
        while self.ring.len() > self.capacity
            || (self.bytes > self.byte_limit && self.ring.len() > 1)
        {
            let Some(oldest) = self.oldest_index() else {
                break;
            };
            if let Some(old) = self.ring.remove(oldest) {
                self.bytes -= old.record.len();
                self.evicted += 1;
                self.stale_records += 1;
            }
        }
    }

    /// Appended entries grow the back and inserted ones the front, so once
    /// an entry was inserted the oldest one can sit anywhere in the ring.
    fn oldest_index(&self) -> Option<usize> {
        if !self.inserted {
            return (!self.ring.is_empty()).then_some(0);
        }
        self.ring
            .iter()
            .enumerate()
            .min_by_key(|(_, retained)| retained.seq)
            .map(|(index, _)| index)
    }

    fn degrade(&mut self, err: impl std::fmt::Display) {
        if !self.degraded {
            self.notices.push((
                log::Level::Warn,
                format!("Log store write failed, continuing in memory only: {err}"),
            ));
        }
        self.degraded = true;
        self.last_error = Some(err.to_string());
    }

    fn compact(&mut self, format: LogFormat, with_footer: bool) {
        let footer = if with_footer {
            encoding::footer(format)
        } else {
            b""
        };
        let result = match self.disk.as_mut() {
            Some(disk) => disk.rewrite(
                encoding::header(format),
                self.ring.iter().map(|r| r.record.as_slice()),
                footer,
            ),
            None => Ok(()),
        };
        match result {
            Ok(()) => self.stale_records = 0,
            Err(err) => self.degrade(err),
        }
    }
}

/// A bounded store of [`LogEntry`] values backed by a file.
///
/// The in-memory ring keeps the most recent entries (strict FIFO eviction
/// by count and optional byte size). Appended entries are written through
/// to the end of the file; inserted entries go to its head, which rewrites
/// the file. The file is compacted to exactly the retained entries on
/// [`flush`](Self::flush), [`close`](Self::close) and whenever enough
/// evicted records accumulate on disk.
pub struct LogStore {
    path: PathBuf,
    format: LogFormat,
    state: Mutex<StoreState>,
    dropped: AtomicU64,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("path", &self.path)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl LogStore {
    /// Creates or truncates the log file at `path` and writes the format header.
    ///
    /// Relative paths are resolved against the directory of the running
    /// executable. A path without extension gets the format's default one.
    pub fn open(path: impl AsRef<Path>, format: LogFormat) -> LogResult<Self> {
        let path = resolve_path(path.as_ref(), format);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LogError::io(&path, e))?;
        }
        let disk = DiskFile::create(&path, encoding::header(format))
            .map_err(|e| LogError::io(&path, e))?;
        log::info!("Opened {:?} log store at '{}'", format, path.display());

        Ok(Self {
            path,
            format,
            state: Mutex::new(StoreState {
                ring: VecDeque::new(),
                next_seq: 0,
                inserted: false,
                bytes: 0,
                capacity: UNLIMITED,
                byte_limit: UNLIMITED,
                flags: LogFlags::STANDARD,
                echo: EchoFlags::EMPTY,
                filter: LogLevel::Verbose,
                disk: Some(disk),
                closed: false,
                stale_records: 0,
                degraded: false,
                last_error: None,
                appended: 0,
                evicted: 0,
                filtered: 0,
                notices: Vec::new(),
            }),
            dropped: AtomicU64::new(0),
        })
    }

    /// Reads a persisted log file back into entries.
    pub fn load(path: impl AsRef<Path>, format: LogFormat) -> LogResult<Vec<LogEntry>> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| LogError::io(path, e))?;
        encoding::decode(format, &bytes)
    }

    /// Resolved path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encoding chosen at open time.
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Appends an entry stamped with the current time and thread.
    ///
    /// Entries below the level filter are silently discarded. A failed file
    /// write does not fail the append: the entry is kept in memory and the
    /// store reports itself as degraded.
    pub fn append(&self, level: LogLevel, message: impl Into<String>) -> LogResult<()> {
        self.write_entry(EntryMode::Append, level, message)
    }

    /// Like [`append`](Self::append) but places the entry before every
    /// retained one, in memory and on disk.
    pub fn insert(&self, level: LogLevel, message: impl Into<String>) -> LogResult<()> {
        self.write_entry(EntryMode::Insert, level, message)
    }

    /// Adds an entry at the position selected by `mode`.
    pub fn write_entry(
        &self,
        mode: EntryMode,
        level: LogLevel,
        message: impl Into<String>,
    ) -> LogResult<()> {
        let entry = LogEntry::new(level, message);
        self.locked(|state| self.push_locked(state, entry, mode))
    }

    /// Appends from a fault handler.
    ///
    /// Waits at most [`FAULT_LOCK_TIMEOUT`] for the lock; on timeout the
    /// entry is dropped and counted in [`LogStatus::dropped`]. Returns
    /// `true` if the entry was stored.
    pub fn append_from_fault(&self, level: LogLevel, message: impl Into<String>) -> bool {
        let entry = LogEntry::new(level, message);
        match self.try_locked(|state| self.push_locked(state, entry, EntryMode::Append)) {
            Some(result) => result.is_ok(),
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Runs `f` under the store lock. Records queued in `notices` go to
    /// the `log` facade after the lock is released.
    fn locked<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let guard = self.state.lock();
        Self::run_locked(guard, f)
    }

    /// Like [`locked`](Self::locked) with a bounded wait.
    fn try_locked<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> Option<R> {
        let guard = self.state.try_lock_for(FAULT_LOCK_TIMEOUT)?;
        Some(Self::run_locked(guard, f))
    }

    fn run_locked<R>(
        mut guard: MutexGuard<'_, StoreState>,
        f: impl FnOnce(&mut StoreState) -> R,
    ) -> R {
        let held = HeldMarker::enter();
        let result = f(&mut guard);
        let notices = std::mem::take(&mut guard.notices);
        drop(guard);
        drop(held);
        for (level, message) in notices {
            log::log!(level, "{message}");
        }
        result
    }

    fn push_locked(&self, state: &mut StoreState, entry: LogEntry, mode: EntryMode) -> LogResult<()> {
        if state.closed {
            return Err(LogError::Closed(self.path.clone()));
        }
        if !entry.level.passes(state.filter) {
            state.filtered += 1;
            return Ok(());
        }

        let record = match encoding::encode(self.format, &entry, state.flags) {
            Ok(record) => record,
            Err(err) => {
                state.degrade(&err);
                Vec::new()
            }
        };

        if mode == EntryMode::Append && !record.is_empty() {
            if let Some(disk) = state.disk.as_mut() {
                if let Err(err) = disk.append(&record) {
                    state.degrade(err);
                }
            }
        }
        echo::mirror(&entry, state.flags, state.echo);

        let seq = state.next_seq;
        state.next_seq += 1;
        state.bytes += record.len();
        let retained = Retained { seq, entry, record };
        match mode {
            EntryMode::Append => state.ring.push_back(retained),
            EntryMode::Insert => {
                state.inserted = true;
                state.ring.push_front(retained);
            }
        }
        state.appended += 1;
        state.evict();

        if mode == EntryMode::Insert
            || state.stale_records >= state.ring.len().max(COMPACTION_SLACK)
        {
            state.compact(self.format, false);
        }
        Ok(())
    }

    /// Sets the maximum number of retained entries, evicting the oldest at once.
    pub fn set_capacity(&self, max_entries: usize) -> LogResult<()> {
        self.with_open_state(|state| {
            state.capacity = max_entries;
            state.evict();
        })
    }

    /// Sets the maximum encoded size of the retained entries.
    ///
    /// The newest entry is always kept, even when it alone exceeds the limit.
    pub fn set_byte_limit(&self, max_bytes: usize) -> LogResult<()> {
        self.with_open_state(|state| {
            state.byte_limit = max_bytes;
            state.evict();
        })
    }

    /// Selects the sinks appended entries are mirrored to.
    pub fn set_echo_flags(&self, flags: EchoFlags) -> LogResult<()> {
        self.with_open_state(|state| state.echo = flags)
    }

    /// Selects the prefixes of text lines. Affects entries appended afterwards.
    pub fn set_flags(&self, flags: LogFlags) -> LogResult<()> {
        self.with_open_state(|state| state.flags = flags)
    }

    /// Discards entries less severe than `level`.
    pub fn set_level_filter(&self, level: LogLevel) -> LogResult<()> {
        self.with_open_state(|state| state.filter = level)
    }

    /// Empties the ring and truncates the file back to its header.
    pub fn clear(&self) -> LogResult<()> {
        let format = self.format;
        self.with_open_state(|state| {
            state.ring.clear();
            state.inserted = false;
            state.bytes = 0;
            state.compact(format, false);
        })
    }

    /// Rewrites the file so it holds exactly the retained entries, then
    /// syncs it. XML files are terminated so they parse as a document.
    pub fn flush(&self) -> LogResult<()> {
        let format = self.format;
        self.with_open_state(|state| {
            state.compact(format, true);
            if let Some(disk) = state.disk.as_mut() {
                if let Err(err) = disk.file.sync_data() {
                    state.degrade(err);
                }
            }
        })
    }

    /// Like [`flush`](Self::flush) but with a bounded lock wait, for fault handlers.
    pub fn flush_from_fault(&self) -> bool {
        let format = self.format;
        self.try_locked(|state| {
            if state.closed {
                return false;
            }
            state.compact(format, true);
            true
        })
        .unwrap_or(false)
    }

    /// Flushes and releases the file. Later operations fail with [`LogError::Closed`].
    pub fn close(&self) -> LogResult<()> {
        self.locked(|state| self.close_locked(state))
    }

    fn close_locked(&self, state: &mut StoreState) -> LogResult<()> {
        if state.closed {
            return Err(LogError::Closed(self.path.clone()));
        }
        state.compact(self.format, true);
        if let Some(disk) = state.disk.take() {
            if let Err(err) = disk.file.sync_all() {
                state.degrade(err);
            }
        }
        state.closed = true;
        state.notices.push((
            log::Level::Info,
            format!("Closed log store '{}'", self.path.display()),
        ));
        Ok(())
    }

    /// Returns `true` until the store is closed.
    pub fn is_open(&self) -> bool {
        !self.state.lock().closed
    }

    /// Copies of the retained entries in file order.
    ///
    /// Appended entries follow the ones before them; inserted entries come first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.state
            .lock()
            .ring
            .iter()
            .map(|r| r.entry.clone())
            .collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.state.lock().ring.len()
    }

    /// Returns `true` if no entry is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current health and counters.
    pub fn status(&self) -> LogStatus {
        let state = self.state.lock();
        LogStatus {
            open: !state.closed,
            degraded: state.degraded,
            last_error: state.last_error.clone(),
            entries: state.ring.len(),
            bytes: state.bytes,
            appended: state.appended,
            evicted: state.evicted,
            filtered: state.filtered,
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn with_open_state(&self, f: impl FnOnce(&mut StoreState)) -> LogResult<()> {
        self.locked(|state| {
            if state.closed {
                return Err(LogError::Closed(self.path.clone()));
            }
            f(state);
            Ok(())
        })
    }

    /// Makes every later file write fail, as a full or vanished disk would.
    #[cfg(test)]
    fn break_disk(&self) -> std::io::Result<()> {
        let mut state = self.state.lock();
        if let Some(disk) = state.disk.as_mut() {
            disk.file = File::open(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        if self.state.get_mut().closed {
            return;
        }
        if let Err(err) = self.close() {
            log::warn!("Failed to close log store on drop: {err}");
        }
    }
}

/// Resolves a log path the way [`LogStore::open`] does.
pub fn resolve_path(path: &Path, format: LogFormat) -> PathBuf {
    let mut resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        executable_dir().join(path)
    };
    if resolved.extension().is_none() {
        resolved.set_extension(format.default_extension());
    }
    resolved
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_in(dir: &tempfile::TempDir, format: LogFormat) -> LogStore {
        LogStore::open(dir.path().join("test"), format).unwrap()
    }

    #[test]
    fn test_open_adds_default_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Xml);
        assert_eq!(store.path().extension().unwrap(), "xml");
        assert!(store.path().exists());
    }

    #[test]
    fn test_relative_path_resolves_next_to_executable() {
        let resolved = resolve_path(Path::new("logs/app"), LogFormat::Text);
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("logs/app.log"));
    }

    #[test]
    fn test_open_fails_on_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let err = LogStore::open(blocker.join("nested.log"), LogFormat::Text).unwrap_err();
        assert!(matches!(err, LogError::Io { .. }));
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Text);
        store.set_capacity(3).unwrap();
        for i in 0..5 {
            store.append(LogLevel::Info, format!("entry {i}")).unwrap();
        }
        let messages: Vec<_> = store.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, ["entry 2", "entry 3", "entry 4"]);
        assert_eq!(store.status().evicted, 2);
    }

    #[test]
    fn test_shrinking_capacity_evicts_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Text);
        for i in 0..10 {
            store.append(LogLevel::Info, format!("{i}")).unwrap();
        }
        store.set_capacity(4).unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(store.entries()[0].message, "6");
    }

    #[test]
    fn test_byte_limit_keeps_newest_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Text);
        store.set_flags(LogFlags::EMPTY).unwrap();
        store.set_byte_limit(10).unwrap();
        store.append(LogLevel::Info, "aaaa").unwrap();
        store.append(LogLevel::Info, "bbbb").unwrap();
        assert_eq!(store.len(), 2);
        store.append(LogLevel::Info, "a message longer than the limit").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].message, "a message longer than the limit");
    }

    #[test]
    fn test_level_filter_discards_verbose() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Text);
        store.set_level_filter(LogLevel::Info).unwrap();
        store.append(LogLevel::Verbose, "noise").unwrap();
        store.append(LogLevel::Error, "signal").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.status().filtered, 1);
    }

    #[test]
    fn test_clear_before_any_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Stream);
        store.clear().unwrap();
        store.append(LogLevel::Info, "after clear").unwrap();
        store.clear().unwrap();
        assert!(store.is_empty());
        store.flush().unwrap();
        assert!(LogStore::load(store.path(), LogFormat::Stream).unwrap().is_empty());
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Text);
        store.append(LogLevel::Info, "before").unwrap();
        store.close().unwrap();
        let err = store.append(LogLevel::Info, "after").unwrap_err();
        assert!(err.is_invalid_state());
        assert!(store.close().unwrap_err().is_invalid_state());
        assert!(store.set_capacity(1).is_err());
        assert!(!store.append_from_fault(LogLevel::Error, "late"));
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn test_flush_compacts_file_to_retained_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Text);
        store.set_capacity(2).unwrap();
        for i in 0..6 {
            store.append(LogLevel::Warning, format!("w{i}")).unwrap();
        }
        store.flush().unwrap();
        let on_disk = LogStore::load(store.path(), LogFormat::Text).unwrap();
        let messages: Vec<_> = on_disk.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["w4", "w5"]);
    }

    #[test]
    fn test_xml_append_after_flush_stays_well_formed() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Xml);
        store.append(LogLevel::Info, "one").unwrap();
        store.flush().unwrap();
        store.append(LogLevel::Info, "two").unwrap();
        store.close().unwrap();
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(text.matches("</log>").count(), 1);
        assert!(text.trim_end().ends_with("</log>"));
        assert_eq!(LogStore::load(store.path(), LogFormat::Xml).unwrap().len(), 2);
    }

    #[test]
    fn test_drop_closes_and_terminates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let store = open_in(&dir, LogFormat::Xml);
            store.append(LogLevel::Important, "dropped open").unwrap();
            store.path().to_path_buf()
        };
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("dropped open"));
        assert!(text.trim_end().ends_with("</log>"));
    }

    #[test]
    fn test_write_failure_keeps_entry_and_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Text);
        store.append(LogLevel::Info, "on disk").unwrap();
        store.break_disk().unwrap();

        store.append(LogLevel::Error, "memory only").unwrap();

        let status = store.status();
        assert!(status.degraded);
        assert!(status.last_error.is_some());
        assert_eq!(status.appended, 2);
        let messages: Vec<_> = store.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, ["on disk", "memory only"]);
        assert!(store.flush().is_ok());
    }

    #[test]
    fn test_insert_goes_first_and_eviction_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Text);
        store.set_capacity(3).unwrap();

        store.append(LogLevel::Info, "a").unwrap();
        store.insert(LogLevel::Info, "b").unwrap();
        store.append(LogLevel::Info, "c").unwrap();
        store.insert(LogLevel::Warning, "d").unwrap();

        let messages: Vec<_> = store.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, ["d", "b", "c"]);
        assert_eq!(store.status().evicted, 1);

        store.flush().unwrap();
        let on_disk = LogStore::load(store.path(), LogFormat::Text).unwrap();
        let messages: Vec<_> = on_disk.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["d", "b", "c"]);
    }

    #[test]
    fn test_insert_before_append_lands_at_file_head() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Xml);
        store.append(LogLevel::Info, "older").unwrap();
        store.write_entry(EntryMode::Insert, LogLevel::Important, "newest").unwrap();
        store.append(LogLevel::Info, "tail").unwrap();
        store.close().unwrap();

        let loaded = LogStore::load(store.path(), LogFormat::Xml).unwrap();
        let messages: Vec<_> = loaded.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["newest", "older", "tail"]);
    }

    #[test]
    fn test_lock_marker_is_released_after_each_operation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, LogFormat::Text);
        store.append(LogLevel::Info, "one").unwrap();
        store.close().unwrap();
        assert!(!lock_held_by_current_thread());
    }

    #[test]
    fn test_fault_path_guard_restores_previous_state() {
        assert!(!in_fault_path());
        {
            let _outer = FaultPathGuard::enter();
            {
                let _inner = FaultPathGuard::enter();
                assert!(in_fault_path());
            }
            assert!(in_fault_path());
        }
        assert!(!in_fault_path());
    }
}
