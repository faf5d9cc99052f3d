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

//! Managed stack walker over a trace recorded with a panic.
//!
//! A panic carries a [`backtrace::Backtrace`] captured by the panic hook.
//! The walker resolves it on construction and hides the frames that belong
//! to the panic runtime and to the capture itself, so the first frame is
//! the code that panicked.

use super::{symbol_from, MAX_FRAMES};
use crashtrap_core::{ModuleRecord, ModuleRef, StackFrame, StackWalker};

/// Symbols that mark the entry into the panic runtime.
const PANIC_ENTRY_POINTS: &[&str] = &[
    "core::panicking::",
    "rust_begin_unwind",
    "std::panicking::begin_panic",
    "std::panicking::rust_panic_with_hook",
    "core::result::unwrap_failed",
    "core::option::unwrap_failed",
    "core::option::expect_failed",
];

/// Symbols of the capture machinery itself.
const CAPTURE_FRAMES: &[&str] = &["backtrace::", "crashtrap_infra::walker::managed::"];

/// How far from the top the panic runtime is searched for.
const PANIC_SEARCH_DEPTH: usize = 64;

/// Walks a resolved panic trace.
#[derive(Debug)]
pub struct ManagedStackWalker {
    frames: Vec<StackFrame>,
    position: usize,
}

impl ManagedStackWalker {
    /// Binds to a trace captured with a panic.
    pub fn from_backtrace(mut trace: backtrace::Backtrace, modules: &[ModuleRecord]) -> Self {
        trace.resolve();
        let frames: Vec<StackFrame> = trace
            .frames()
            .iter()
            .take(MAX_FRAMES + PANIC_SEARCH_DEPTH)
            .map(|frame| convert(frame, modules))
            .collect();
        let start = first_user_frame(&frames);
        let mut frames = frames;
        frames.drain(..start);
        frames.truncate(MAX_FRAMES);
        Self {
            frames,
            position: 0,
        }
    }

    /// Binds to the calling thread's current stack.
    #[inline(never)]
    pub fn current_thread(modules: &[ModuleRecord]) -> Self {
        Self::from_backtrace(backtrace::Backtrace::new_unresolved(), modules)
    }
}

fn convert(frame: &backtrace::BacktraceFrame, modules: &[ModuleRecord]) -> StackFrame {
    let ip = frame.ip() as u64;
    let symbol = frame.symbols().iter().find_map(|s| {
        symbol_from(s.name(), s.addr(), s.filename(), s.lineno(), s.colno(), ip)
    });
    StackFrame {
        address: ip,
        module: ModuleRef::locate(ip, modules),
        symbol,
    }
}

fn matches_any(frame: &StackFrame, patterns: &[&str]) -> bool {
    frame
        .function()
        .is_some_and(|name| patterns.iter().any(|p| name.contains(p)))
}

/// Index of the first frame that belongs to the code being inspected.
fn first_user_frame(frames: &[StackFrame]) -> usize {
    let window = &frames[..frames.len().min(PANIC_SEARCH_DEPTH)];
    if let Some(last) = window
        .iter()
        .rposition(|f| matches_any(f, PANIC_ENTRY_POINTS))
    {
        return last + 1;
    }
    window
        .iter()
        .rposition(|f| matches_any(f, CAPTURE_FRAMES))
        .map_or(0, |last| last + 1)
}

impl Iterator for ManagedStackWalker {
    type Item = StackFrame;

    fn next(&mut self) -> Option<StackFrame> {
        let frame = self.frames.get(self.position).cloned()?;
        self.position += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl StackWalker for ManagedStackWalker {
    fn init_trace(&mut self) {
        self.position = 0;
    }

    fn remaining(&self) -> usize {
        self.frames.len() - self.position
    }

    fn depth(&self) -> usize {
        self.frames.len()
    }
}
