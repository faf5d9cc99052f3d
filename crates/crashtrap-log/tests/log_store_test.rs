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

use crashtrap_core::{LogFormat, LogLevel};
use crashtrap_log::LogStore;
use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 10;
const PER_THREAD: usize = 15;
const CAPACITY: usize = 100;

#[test]
fn test_concurrent_appends_respect_capacity_and_never_interleave() {
    // --- 1. ARRANGE ---
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LogStore::open(dir.path().join("concurrent"), LogFormat::Text).unwrap());
    store.set_capacity(CAPACITY).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    // --- 2. ACT ---
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    store
                        .append(LogLevel::Info, format!("worker {t} message {i:02}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // --- 3. ASSERT ---
    let entries = store.entries();
    assert_eq!(entries.len(), CAPACITY);
    assert_eq!(store.status().appended, (THREADS * PER_THREAD) as u64);
    assert_eq!(store.status().evicted, (THREADS * PER_THREAD - CAPACITY) as u64);

    // FIFO eviction keeps, for every worker, a suffix of its own messages in order.
    let mut per_worker: HashMap<usize, Vec<usize>> = HashMap::new();
    for entry in &entries {
        let parts: Vec<_> = entry.message.split(' ').collect();
        assert_eq!(parts.len(), 4, "garbled message: {:?}", entry.message);
        let worker: usize = parts[1].parse().unwrap();
        let index: usize = parts[3].parse().unwrap();
        per_worker.entry(worker).or_default().push(index);
    }
    for indices in per_worker.values() {
        let first = indices[0];
        let expected: Vec<usize> = (first..PER_THREAD).collect();
        assert_eq!(indices, &expected);
    }

    // The compacted file holds exactly the retained lines, one per entry.
    store.close().unwrap();
    let text = std::fs::read_to_string(store.path()).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), CAPACITY);
    for line in lines {
        assert!(line.starts_with('['), "line without timestamp: {line}");
        assert!(line.contains("] INFO: worker "), "garbled line: {line}");
    }
}

#[test]
fn test_text_round_trip_preserves_message_and_level() {
    // --- 1. ARRANGE ---
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::open(dir.path().join("round_trip.txt"), LogFormat::Text).unwrap();
    let written = [
        (LogLevel::Error, "disk full"),
        (LogLevel::Warning, "retrying\nwith a second line"),
        (LogLevel::Important, "user: admin"),
        (LogLevel::Info, "path C:\\temp"),
        (LogLevel::Verbose, "tick"),
    ];

    // --- 2. ACT ---
    for (level, message) in written {
        store.append(level, message).unwrap();
    }
    let originals = store.entries();
    store.close().unwrap();
    let loaded = LogStore::load(store.path(), LogFormat::Text).unwrap();

    // --- 3. ASSERT ---
    assert_eq!(loaded.len(), written.len());
    for ((level, message), (back, original)) in written.iter().zip(loaded.iter().zip(&originals)) {
        assert_eq!(back.level, *level);
        assert_eq!(back.message, *message);
        assert_eq!(back.timestamp.timestamp(), original.timestamp.timestamp());
    }
}

#[test]
fn test_stream_and_xml_round_trip_keep_thread_identity() {
    let dir = tempfile::tempdir().unwrap();
    for format in [LogFormat::Stream, LogFormat::Xml] {
        let store = LogStore::open(dir.path().join("identity"), format).unwrap();
        store.append(LogLevel::Important, "from main").unwrap();
        let originals = store.entries();
        store.close().unwrap();

        let loaded = LogStore::load(store.path(), format).unwrap();
        assert_eq!(loaded.len(), 1, "{format:?}");
        assert_eq!(loaded[0].thread_id, originals[0].thread_id);
        assert_eq!(loaded[0].message, "from main");
    }
}
