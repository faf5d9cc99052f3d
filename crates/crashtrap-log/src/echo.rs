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

//! Mirrored output of appended entries.

use crate::encoding::text;
use crashtrap_core::{EchoFlags, LogEntry, LogFlags};
use std::io::Write;

/// Writes `entry` to every sink in `sinks`. Failures are ignored.
pub(crate) fn mirror(entry: &LogEntry, flags: LogFlags, sinks: EchoFlags) {
    if sinks.is_empty() {
        return;
    }
    let line = text::encode_line(entry, flags);
    if sinks.contains(EchoFlags::STDOUT) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }
    if sinks.contains(EchoFlags::STDERR) {
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }
    if sinks.contains(EchoFlags::DEBUG_CONSOLE) {
        log::log!(
            target: crate::logger::ECHO_TARGET,
            entry.level.to_log_level(),
            "{}",
            entry.message
        );
    }
}
