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

//! Native stack walker over raw instruction pointers.
//!
//! The trace is captured once, into a fixed-size buffer, when the walker is
//! built. Symbols are resolved lazily, one frame at a time, so a damaged
//! symbol table only degrades the frames it affects.

use super::{symbol_from, MAX_FRAMES};
use crashtrap_core::{ModuleRecord, ModuleRef, StackFrame, StackWalker};
use std::ffi::c_void;

/// Walks the instruction pointers of one captured native stack.
pub struct NativeStackWalker {
    ips: [u64; MAX_FRAMES],
    len: usize,
    position: usize,
    first_is_exact: bool,
    modules: Vec<ModuleRecord>,
}

impl std::fmt::Debug for NativeStackWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeStackWalker")
            .field("depth", &self.len)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl NativeStackWalker {
    /// Captures the calling thread's stack, starting at the caller of this function.
    #[inline(never)]
    pub fn capture_current(modules: Vec<ModuleRecord>) -> Self {
        let marker = Self::capture_current as usize;
        Self::capture(Some(marker), None, modules)
    }

    /// Captures from inside a signal handler.
    ///
    /// When `pc` (the faulting program counter) appears in the trace, the
    /// walk starts there and the handler frames are dropped. Otherwise it
    /// starts at the caller of this function.
    #[inline(never)]
    pub fn capture_fault(pc: Option<u64>, modules: Vec<ModuleRecord>) -> Self {
        let marker = Self::capture_fault as usize;
        Self::capture(Some(marker), pc, modules)
    }

    /// Builds a walker over known addresses, innermost first.
    pub fn from_addresses(addresses: &[u64], modules: Vec<ModuleRecord>) -> Self {
        let mut ips = [0u64; MAX_FRAMES];
        let len = addresses.len().min(MAX_FRAMES);
        ips[..len].copy_from_slice(&addresses[..len]);
        Self {
            ips,
            len,
            position: 0,
            first_is_exact: true,
            modules,
        }
    }

    fn capture(marker: Option<usize>, pc: Option<u64>, modules: Vec<ModuleRecord>) -> Self {
        let mut ips = [0u64; MAX_FRAMES];
        let mut len = 0;
        let mut marker_index = None;
        let mut pc_index = None;

        // Unsynchronized so a fault inside a synchronized trace cannot deadlock.
        unsafe {
            backtrace::trace_unsynchronized(|frame| {
                let ip = frame.ip() as u64;
                if marker_index.is_none() && Some(frame.symbol_address() as usize) == marker {
                    marker_index = Some(len);
                }
                if pc_index.is_none() && pc == Some(ip) {
                    pc_index = Some(len);
                }
                ips[len] = ip;
                len += 1;
                len < MAX_FRAMES
            });
        }

        let start = match (pc_index, marker_index) {
            (Some(index), _) => index,
            (None, Some(index)) => index + 1,
            (None, None) => 0,
        };
        ips.copy_within(start..len, 0);
        Self {
            ips,
            len: len - start,
            position: 0,
            first_is_exact: pc_index.is_some(),
            modules,
        }
    }

    /// Raw addresses of the captured trace.
    pub fn addresses(&self) -> &[u64] {
        &self.ips[..self.len]
    }

    /// Modules used to attribute frames.
    pub fn modules(&self) -> &[ModuleRecord] {
        &self.modules
    }

    fn resolve(&self, index: usize) -> StackFrame {
        let ip = self.ips[index];
        // Return addresses point past the call; look up the call itself.
        let lookup = if index == 0 && self.first_is_exact {
            ip
        } else {
            ip.saturating_sub(1)
        };
        let mut symbol = None;
        backtrace::resolve(lookup as *mut c_void, |s| {
            if symbol.is_none() {
                symbol = symbol_from(s.name(), s.addr(), s.filename(), s.lineno(), s.colno(), ip);
            }
        });
        StackFrame {
            address: ip,
            module: ModuleRef::locate(ip, &self.modules),
            symbol,
        }
    }
}

impl Iterator for NativeStackWalker {
    type Item = StackFrame;

    fn next(&mut self) -> Option<StackFrame> {
        if self.position >= self.len {
            return None;
        }
        let frame = self.resolve(self.position);
        self.position += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.position;
        (remaining, Some(remaining))
    }
}

impl StackWalker for NativeStackWalker {
    fn init_trace(&mut self) {
        self.position = 0;
    }

    fn remaining(&self) -> usize {
        self.len - self.position
    }

    fn depth(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashtrap_core::ModuleKind;

    #[inline(never)]
    fn capture_here() -> NativeStackWalker {
        NativeStackWalker::capture_current(Vec::new())
    }

    #[test]
    fn test_capture_produces_frames() {
        let walker = capture_here();
        assert!(walker.depth() > 0);
        assert!(walker.depth() <= MAX_FRAMES);
        assert_eq!(walker.remaining(), walker.depth());
    }

    #[test]
    fn test_unresolvable_address_degrades_to_module_offset() {
        let module = ModuleRecord {
            kind: ModuleKind::Native,
            base: Some(0x10),
            size: 0x100,
            name: "fake.so".into(),
            path: None,
            version: None,
        };
        let mut walker = NativeStackWalker::from_addresses(&[0x20, 0x4000], vec![module]);
        let first = walker.first_frame().unwrap();
        assert_eq!(first.address, 0x20);
        assert_eq!(first.module.as_ref().map(|m| m.offset), Some(0x10));
        let second = walker.next_frame().unwrap();
        assert!(second.module.is_none());
        assert!(walker.next_frame().is_none());
    }
}
