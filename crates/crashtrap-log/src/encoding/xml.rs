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

//! XML format: one `<entry>` element per record inside a `<log>` root.
//!
//! The closing `</log>` is only written when the store is flushed or
//! closed. The reader is lenient and accepts a file cut short after any
//! complete entry.

use crate::error::{LogError, LogResult};
use chrono::{DateTime, SecondsFormat, Utc};
use crashtrap_core::{LogEntry, LogLevel};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Document prologue and root start tag.
pub const HEADER: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<log>\n";
/// Root end tag.
pub const FOOTER: &[u8] = b"</log>\n";

fn malformed(err: impl std::fmt::Display) -> LogError {
    LogError::Malformed(err.to_string())
}

/// Encodes one entry as an `<entry>` element followed by a newline.
pub fn encode_entry(entry: &LogEntry) -> LogResult<Vec<u8>> {
    let time = entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut start = BytesStart::new("entry");
    start.push_attribute(("time", time.as_str()));
    start.push_attribute(("level", entry.level.as_str()));
    start.push_attribute(("thread", entry.thread_id.as_str()));
    if let Some(name) = &entry.thread_name {
        start.push_attribute(("name", name.as_str()));
    }

    let mut writer = Writer::new(Vec::with_capacity(entry.message.len() + 96));
    writer.write_event(Event::Start(start)).map_err(malformed)?;
    writer
        .write_event(Event::Text(BytesText::new(&entry.message)))
        .map_err(malformed)?;
    writer
        .write_event(Event::End(BytesEnd::new("entry")))
        .map_err(malformed)?;
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes every complete `<entry>` of a document.
pub fn decode(document: &str) -> LogResult<Vec<LogEntry>> {
    let mut reader = Reader::from_str(document);
    let mut entries = Vec::new();
    let mut current: Option<LogEntry> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => {
                if entries.is_empty() && current.is_none() {
                    return Err(malformed(err));
                }
                log::warn!("Stopping XML log decode at a damaged record: {err}");
                break;
            }
        };
        match event {
            Event::Start(start) if start.name().as_ref() == b"entry" => {
                current = Some(entry_from_attributes(&start)?);
            }
            Event::Text(text) => {
                if let Some(entry) = current.as_mut() {
                    entry.message.push_str(&text.unescape().map_err(malformed)?);
                }
            }
            Event::End(end) if end.name().as_ref() == b"entry" => {
                if let Some(entry) = current.take() {
                    entries.push(entry);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

fn entry_from_attributes(start: &BytesStart<'_>) -> LogResult<LogEntry> {
    let mut entry = LogEntry {
        timestamp: DateTime::<Utc>::default(),
        level: LogLevel::Info,
        thread_id: String::new(),
        thread_name: None,
        message: String::new(),
    };
    for attribute in start.attributes() {
        let attribute = attribute.map_err(malformed)?;
        let value = attribute.unescape_value().map_err(malformed)?;
        match attribute.key.as_ref() {
            b"time" => {
                entry.timestamp = DateTime::parse_from_rfc3339(&value)
                    .map_err(malformed)?
                    .with_timezone(&Utc);
            }
            b"level" => entry.level = value.parse().map_err(LogError::Malformed)?,
            b"thread" => entry.thread_id = value.into_owned(),
            b"name" => entry.thread_name = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_in_message_is_escaped() {
        let entry = LogEntry::new(LogLevel::Error, "a < b && c > \"d\"");
        let bytes = encode_entry(&entry).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("a &lt; b &amp;&amp; c &gt;"));
        assert!(text.ends_with("</entry>\n"));
    }

    #[test]
    fn test_document_round_trip() {
        let first = LogEntry::new(LogLevel::Important, "started <ok>");
        let second = LogEntry::new(LogLevel::Verbose, "line one\nline two");
        let mut doc = HEADER.to_vec();
        doc.extend(encode_entry(&first).unwrap());
        doc.extend(encode_entry(&second).unwrap());
        doc.extend_from_slice(FOOTER);

        let entries = decode(&String::from_utf8(doc).unwrap()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "started <ok>");
        assert_eq!(entries[0].level, LogLevel::Important);
        assert_eq!(entries[0].thread_id, first.thread_id);
        assert_eq!(entries[1].message, "line one\nline two");
    }

    #[test]
    fn test_unterminated_document_keeps_complete_entries() {
        let mut doc = HEADER.to_vec();
        doc.extend(encode_entry(&LogEntry::new(LogLevel::Info, "kept")).unwrap());
        doc.extend_from_slice(b"<entry time=\"2025-01-01T00:00:00Z\" level=\"INFO\">cut");

        let entries = decode(&String::from_utf8(doc).unwrap()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "kept");
    }
}
