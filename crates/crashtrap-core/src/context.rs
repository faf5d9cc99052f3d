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

//! Summary of the execution context a report was captured from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a report came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// A synchronous or asynchronous POSIX signal (segfault, abort, ...).
    NativeSignal,
    /// An uncaught panic.
    Panic,
    /// An on-demand snapshot, no fault involved.
    Snapshot,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::NativeSignal => f.write_str("native fault"),
            FaultKind::Panic => f.write_str("panic"),
            FaultKind::Snapshot => f.write_str("snapshot"),
        }
    }
}

/// Description of the faulting thread and condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSummary {
    /// Kind of fault.
    pub kind: FaultKind,
    /// Human-readable reason, e.g. `SIGSEGV (invalid memory reference)`.
    pub reason: String,
    /// Signal number for native faults.
    pub signal: Option<i32>,
    /// `si_code` for native faults.
    pub code: Option<i32>,
    /// Faulting data address, when the signal reports one.
    pub fault_address: Option<u64>,
    /// Source location of a panic, `file:line:column`.
    pub location: Option<String>,
    /// Faulting thread identifier.
    pub thread_id: String,
    /// Faulting thread name.
    pub thread_name: Option<String>,
}

impl ContextSummary {
    /// A summary for the calling thread.
    pub fn for_current_thread(kind: FaultKind, reason: impl Into<String>) -> Self {
        let current = std::thread::current();
        Self {
            kind,
            reason: reason.into(),
            signal: None,
            code: None,
            fault_address: None,
            location: None,
            thread_id: format!("{:?}", current.id()),
            thread_name: current.name().map(str::to_owned),
        }
    }

    /// One-line description used for log summaries.
    pub fn headline(&self) -> String {
        let thread = self.thread_name.as_deref().unwrap_or(&self.thread_id);
        let mut line = format!("{} on thread '{}': {}", self.kind, thread, self.reason);
        if let Some(address) = self.fault_address {
            line.push_str(&format!(" at address 0x{address:x}"));
        }
        if let Some(location) = &self.location {
            line.push_str(&format!(" ({location})"));
        }
        line
    }
}
