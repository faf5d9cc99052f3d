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

//! Binary framing understood by report collectors.
//!
//! A message is a fixed header followed by four length-prefixed strings and
//! the raw report bytes:
//!
//! | field        | encoding                          |
//! |--------------|-----------------------------------|
//! | signature    | `u32` LE, bytes `BT01`            |
//! | size         | `u32` LE, whole message           |
//! | type         | `u8`, `1` for a compound message  |
//! | flags        | `u32` LE, `0`                     |
//! | app name     | 7-bit varint length + UTF-8       |
//! | app version  | 7-bit varint length + UTF-8       |
//! | extension    | 7-bit varint length + UTF-8       |
//! | e-mail       | 7-bit varint length + UTF-8       |
//! | payload      | remaining bytes                   |

use crate::error::{DispatchError, DispatchResult};

/// `BT01` read as a little-endian `u32`.
pub const SIGNATURE: u32 = u32::from_le_bytes(*b"BT01");
/// Compound message carrying metadata and a report file.
pub const MESSAGE_COMPOUND: u8 = 1;
/// Signature, size, type and flags.
pub const HEADER_LEN: usize = 4 + 4 + 1 + 4;

/// Fields of a collector message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorMessage<'a> {
    /// Application name.
    pub app_name: &'a str,
    /// Application version, empty when unknown.
    pub app_version: &'a str,
    /// Extension of the attached file, without the dot.
    pub extension: &'a str,
    /// Address the collector notifies, empty when unset.
    pub notification_email: &'a str,
    /// Report bytes.
    pub payload: &'a [u8],
}

impl CollectorMessage<'_> {
    /// Serializes the message.
    pub fn encode(&self) -> DispatchResult<Vec<u8>> {
        let strings = [
            self.app_name,
            self.app_version,
            self.extension,
            self.notification_email,
        ];
        let body_len: usize = strings.iter().map(|s| varint_len(s.len()) + s.len()).sum::<usize>()
            + self.payload.len();
        let total = HEADER_LEN + body_len;
        let total_u32 = u32::try_from(total)
            .map_err(|_| DispatchError::Encode(format!("message of {total} bytes is too large")))?;

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&SIGNATURE.to_le_bytes());
        out.extend_from_slice(&total_u32.to_le_bytes());
        out.push(MESSAGE_COMPOUND);
        out.extend_from_slice(&0u32.to_le_bytes());
        for s in strings {
            write_string(&mut out, s);
        }
        out.extend_from_slice(self.payload);
        debug_assert_eq!(out.len(), total);
        Ok(out)
    }

    /// Parses a message produced by [`CollectorMessage::encode`].
    pub fn decode(bytes: &'_ [u8]) -> DispatchResult<CollectorMessage<'_>> {
        let malformed = |what: &str| DispatchError::Encode(format!("malformed collector message: {what}"));
        if bytes.len() < HEADER_LEN {
            return Err(malformed("short header"));
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        if word(0) != SIGNATURE {
            return Err(malformed("bad signature"));
        }
        if word(4) as usize != bytes.len() {
            return Err(malformed("size mismatch"));
        }
        if bytes[8] != MESSAGE_COMPOUND {
            return Err(malformed("unknown message type"));
        }

        let mut cursor = HEADER_LEN;
        let mut strings = [""; 4];
        for slot in &mut strings {
            *slot = read_string(bytes, &mut cursor).ok_or_else(|| malformed("bad string field"))?;
        }
        let [app_name, app_version, extension, notification_email] = strings;
        Ok(CollectorMessage {
            app_name,
            app_version,
            extension,
            notification_email,
            payload: &bytes[cursor..],
        })
    }
}

fn varint_len(mut value: usize) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    let mut value = s.len();
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
    out.extend_from_slice(s.as_bytes());
}

fn read_string<'a>(bytes: &'a [u8], cursor: &mut usize) -> Option<&'a str> {
    let (len, used) = read_varint(bytes.get(*cursor..)?)?;
    let start = *cursor + used;
    let end = start.checked_add(len).filter(|end| *end <= bytes.len())?;
    let s = std::str::from_utf8(&bytes[start..end]).ok()?;
    *cursor = end;
    Some(s)
}

fn read_varint(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0usize;
    for (index, byte) in bytes.iter().enumerate().take(5) {
        value |= ((byte & 0x7f) as usize) << (7 * index);
        if byte & 0x80 == 0 {
            return Some((value, index + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let message = CollectorMessage {
            app_name: "demo",
            app_version: "1.0",
            extension: "log",
            notification_email: "",
            payload: b"report",
        };
        let bytes = message.encode().unwrap();
        assert_eq!(&bytes[..4], b"BT01");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize, bytes.len());
        assert_eq!(bytes[8], 1);
        assert_eq!(&bytes[9..13], &[0, 0, 0, 0]);
        assert_eq!(&bytes[13..18], b"\x04demo");
        assert!(bytes.ends_with(b"\x00report"));
        assert_eq!(CollectorMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_long_strings_use_multibyte_length() {
        let name = "n".repeat(300);
        let message = CollectorMessage {
            app_name: &name,
            app_version: "",
            extension: "xml",
            notification_email: "ops@example.com",
            payload: &[],
        };
        let bytes = message.encode().unwrap();
        // 300 = 0b10_0101100 -> 0xac 0x02
        assert_eq!(&bytes[13..15], &[0xac, 0x02]);
        let decoded = CollectorMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.app_name.len(), 300);
        assert_eq!(decoded.notification_email, "ops@example.com");
    }

    #[test]
    fn test_rejects_truncated_message() {
        let bytes = CollectorMessage {
            app_name: "demo",
            app_version: "1",
            extension: "log",
            notification_email: "",
            payload: b"x",
        }
        .encode()
        .unwrap();
        assert!(CollectorMessage::decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(CollectorMessage::decode(&bytes[..6]).is_err());
    }
}
