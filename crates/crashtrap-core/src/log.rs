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

//! Log record model shared by every log store format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a [`LogEntry`], from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// A failure, including captured faults.
    Error = 1,
    /// Something degraded but execution continues.
    Warning = 2,
    /// Noteworthy information that should survive most filters.
    Important = 3,
    /// Regular information.
    Info = 4,
    /// Detailed tracing.
    Verbose = 5,
}

impl LogLevel {
    /// All levels, most severe first.
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Important,
        LogLevel::Info,
        LogLevel::Verbose,
    ];

    /// Upper-case name used in text and XML output.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Important => "IMPORTANT",
            LogLevel::Info => "INFO",
            LogLevel::Verbose => "VERBOSE",
        }
    }

    /// Returns `true` if an entry of this level passes `filter`.
    ///
    /// A filter of `Info` keeps `Error`, `Warning`, `Important` and `Info`.
    pub fn passes(&self, filter: LogLevel) -> bool {
        *self <= filter
    }

    /// Closest `log` crate level, used by the debug console echo sink.
    pub fn to_log_level(&self) -> ::log::Level {
        match self {
            LogLevel::Error => ::log::Level::Error,
            LogLevel::Warning => ::log::Level::Warn,
            LogLevel::Important | LogLevel::Info => ::log::Level::Info,
            LogLevel::Verbose => ::log::Level::Debug,
        }
    }

    /// Maps a `log` crate level onto a store level.
    pub fn from_log_level(level: ::log::Level) -> Self {
        match level {
            ::log::Level::Error => LogLevel::Error,
            ::log::Level::Warn => LogLevel::Warning,
            ::log::Level::Info => LogLevel::Info,
            ::log::Level::Debug | ::log::Level::Trace => LogLevel::Verbose,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown log level '{s}'"))
    }
}

/// Persisted encoding of a log store. Fixed when the store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One human-readable line per entry.
    #[default]
    Text,
    /// An XML document with one `<entry>` element per entry.
    Xml,
    /// Length-prefixed binary records.
    Stream,
}

impl LogFormat {
    /// File extension used when the caller gives a path without one.
    pub fn default_extension(&self) -> &'static str {
        match self {
            LogFormat::Text => "log",
            LogFormat::Xml => "xml",
            LogFormat::Stream => "bin",
        }
    }
}

crate::crashtrap_bitflags! {
    /// Prefixes written in front of each text line.
    pub struct LogFlags: u32 {
        /// `[YYYY/MM/DD HH:MM:SS]` prefix.
        const SHOW_TIMESTAMP = 1 << 0;
        /// `LEVEL:` prefix.
        const SHOW_LEVEL = 1 << 1;
    }
}

impl LogFlags {
    /// Timestamp and level, the default for new stores.
    pub const STANDARD: Self = Self::SHOW_TIMESTAMP.with(Self::SHOW_LEVEL);
}

crate::crashtrap_bitflags! {
    /// Secondary sinks every appended entry is mirrored to.
    pub struct EchoFlags: u32 {
        /// Process standard output.
        const STDOUT = 1 << 0;
        /// Process standard error.
        const STDERR = 1 << 1;
        /// The installed `log` facade logger.
        const DEBUG_CONSOLE = 1 << 2;
    }
}

/// Where a new entry goes in the store and its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// After every retained entry.
    #[default]
    Append,
    /// Before every retained entry, so the newest is read first.
    Insert,
}

/// One immutable record of a log store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Identifier of the appending thread.
    pub thread_id: String,
    /// Name of the appending thread, if it has one.
    pub thread_name: Option<String>,
    /// Message text.
    pub message: String,
}

impl LogEntry {
    /// Creates an entry stamped with the current time and calling thread.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        let current = std::thread::current();
        Self {
            timestamp: Utc::now(),
            level,
            thread_id: format!("{:?}", current.id()),
            thread_name: current.name().map(str::to_owned),
            message: message.into(),
        }
    }

    /// Text form of the timestamp, second precision.
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// `strftime` pattern of the text timestamp prefix.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering_and_filter() {
        assert!(LogLevel::Error < LogLevel::Verbose);
        assert!(LogLevel::Warning.passes(LogLevel::Info));
        assert!(!LogLevel::Verbose.passes(LogLevel::Important));
        assert!(LogLevel::Info.passes(LogLevel::Info));
    }

    #[test]
    fn test_level_parse_is_case_insensitive() {
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!(" IMPORTANT ".parse::<LogLevel>(), Ok(LogLevel::Important));
        assert!("fatal".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_serde_names() {
        let json = serde_json::to_string(&LogLevel::Important).unwrap();
        assert_eq!(json, "\"IMPORTANT\"");
    }

    #[test]
    fn test_standard_flags() {
        assert!(LogFlags::STANDARD.contains(LogFlags::SHOW_LEVEL));
        assert!(LogFlags::STANDARD.contains(LogFlags::SHOW_TIMESTAMP));
    }

    #[test]
    fn test_entry_records_thread() {
        let handle = std::thread::Builder::new()
            .name("writer".into())
            .spawn(|| LogEntry::new(LogLevel::Info, "hello"))
            .unwrap();
        let entry = handle.join().unwrap();
        assert_eq!(entry.thread_name.as_deref(), Some("writer"));
        assert!(entry.thread_id.starts_with("ThreadId("));
    }
}
