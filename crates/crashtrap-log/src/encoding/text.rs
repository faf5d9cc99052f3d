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

//! Human-readable line format: `[YYYY/MM/DD HH:MM:SS] LEVEL: message`.
//!
//! Both prefixes are optional, driven by [`LogFlags`]. Line breaks and
//! backslashes inside messages are escaped so one entry is always one line.

use chrono::{DateTime, NaiveDateTime, Utc};
use crashtrap_core::log::TIMESTAMP_FORMAT;
use crashtrap_core::{LogEntry, LogFlags, LogLevel};

/// Renders one entry as a terminated line.
pub fn encode_line(entry: &LogEntry, flags: LogFlags) -> String {
    let mut line = String::with_capacity(entry.message.len() + 32);
    if flags.contains(LogFlags::SHOW_TIMESTAMP) {
        line.push('[');
        line.push_str(&entry.timestamp_text());
        line.push_str("] ");
    }
    if flags.contains(LogFlags::SHOW_LEVEL) {
        line.push_str(entry.level.as_str());
        line.push_str(": ");
    }
    escape_into(&entry.message, &mut line);
    line.push('\n');
    line
}

fn escape_into(message: &str, out: &mut String) {
    for c in message.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parses one line. Missing prefixes default to the epoch and `INFO`.
pub fn decode_line(line: &str) -> LogEntry {
    let mut rest = line.trim_end_matches(['\r', '\n']);
    let mut timestamp = DateTime::<Utc>::default();
    if let Some(stripped) = rest.strip_prefix('[') {
        if let Some((stamp, tail)) = stripped.split_once("] ") {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT) {
                timestamp = parsed.and_utc();
                rest = tail;
            }
        }
    }
    let mut level = LogLevel::Info;
    if let Some((prefix, tail)) = rest.split_once(": ") {
        if let Ok(parsed) = prefix.parse::<LogLevel>() {
            level = parsed;
            rest = tail;
        }
    }
    LogEntry {
        timestamp,
        level,
        thread_id: String::new(),
        thread_name: None,
        message: unescape(rest),
    }
}

/// Parses a whole text file, skipping blank lines.
pub fn decode(text: &str) -> Vec<LogEntry> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(decode_line)
        .collect()
}
