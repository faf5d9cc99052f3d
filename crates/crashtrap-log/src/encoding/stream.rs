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

//! Binary stream format.
//!
//! Layout: the 6-byte header `CTLS` + version (u16 LE), then records made
//! of a u32 LE payload length followed by the `bincode` encoding of the
//! entry. A truncated trailing record is ignored on decode.

use crate::error::{LogError, LogResult};
use crashtrap_core::LogEntry;

/// Magic bytes and format version 1.
pub const HEADER: &[u8] = b"CTLS\x01\x00";

const LENGTH_PREFIX: usize = 4;

/// Encodes one length-prefixed record.
pub fn encode_record(entry: &LogEntry) -> LogResult<Vec<u8>> {
    let config = bincode::config::standard();
    let payload = bincode::serde::encode_to_vec(entry, config)
        .map_err(|e| LogError::Malformed(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| LogError::Malformed("record larger than 4 GiB".into()))?;
    let mut record = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    record.extend_from_slice(&length.to_le_bytes());
    record.extend_from_slice(&payload);
    Ok(record)
}

/// Decodes a whole stream, header included.
pub fn decode(bytes: &[u8]) -> LogResult<Vec<LogEntry>> {
    let body = bytes
        .strip_prefix(HEADER)
        .ok_or_else(|| LogError::Malformed("missing stream header".into()))?;
    let config = bincode::config::standard();
    let mut entries = Vec::new();
    let mut cursor = body;

    while cursor.len() >= LENGTH_PREFIX {
        let (prefix, rest) = cursor.split_at(LENGTH_PREFIX);
        let length = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if rest.len() < length {
            log::debug!("Ignoring truncated stream record ({} of {length} bytes)", rest.len());
            break;
        }
        let (payload, tail) = rest.split_at(length);
        let (entry, _): (LogEntry, usize) = bincode::serde::decode_from_slice(payload, config)
            .map_err(|e| LogError::Malformed(e.to_string()))?;
        entries.push(entry);
        cursor = tail;
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashtrap_core::LogLevel;

    #[test]
    fn test_stream_keeps_every_field() {
        let entry = LogEntry::new(LogLevel::Warning, "binary\0safe");
        let mut bytes = HEADER.to_vec();
        bytes.extend(encode_record(&entry).unwrap());
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, vec![entry]);
    }

    #[test]
    fn test_truncated_tail_is_ignored() {
        let mut bytes = HEADER.to_vec();
        bytes.extend(encode_record(&LogEntry::new(LogLevel::Info, "one")).unwrap());
        let second = encode_record(&LogEntry::new(LogLevel::Info, "two")).unwrap();
        bytes.extend_from_slice(&second[..second.len() - 2]);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].message, "one");
    }

    #[test]
    fn test_foreign_file_is_rejected() {
        let err = decode(b"[2025/01/01 00:00:00] INFO: text").unwrap_err();
        assert!(matches!(err, LogError::Malformed(_)));
    }
}
