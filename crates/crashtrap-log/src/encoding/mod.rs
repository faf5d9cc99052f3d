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

//! On-disk encodings of log entries.
//!
//! Every format has a fixed header, a per-entry record and an optional
//! footer. Records are self-contained so a file cut short by a crash still
//! decodes up to its last complete entry.

use crate::error::LogResult;
use crashtrap_core::{LogEntry, LogFlags, LogFormat};

pub mod stream;
pub mod text;
pub mod xml;

/// Bytes written when a file is created or cleared.
pub fn header(format: LogFormat) -> &'static [u8] {
    match format {
        LogFormat::Text => b"",
        LogFormat::Xml => xml::HEADER,
        LogFormat::Stream => stream::HEADER,
    }
}

/// Bytes that close a complete file.
pub fn footer(format: LogFormat) -> &'static [u8] {
    match format {
        LogFormat::Xml => xml::FOOTER,
        LogFormat::Text | LogFormat::Stream => b"",
    }
}

/// Encodes one entry as a complete record.
pub fn encode(format: LogFormat, entry: &LogEntry, flags: LogFlags) -> LogResult<Vec<u8>> {
    match format {
        LogFormat::Text => Ok(text::encode_line(entry, flags).into_bytes()),
        LogFormat::Xml => xml::encode_entry(entry),
        LogFormat::Stream => stream::encode_record(entry),
    }
}

/// Decodes a whole file.
pub fn decode(format: LogFormat, bytes: &[u8]) -> LogResult<Vec<LogEntry>> {
    match format {
        LogFormat::Text => Ok(text::decode(&String::from_utf8_lossy(bytes))),
        LogFormat::Xml => xml::decode(&String::from_utf8_lossy(bytes)),
        LogFormat::Stream => stream::decode(bytes),
    }
}
