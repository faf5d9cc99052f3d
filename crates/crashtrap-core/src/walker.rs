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

//! Cursor contracts for stack walking and module enumeration.
//!
//! Both are iterators with an explicit rewind: `first_*` restarts the
//! sequence, `next_*` advances, and both yield `None` once the end is
//! reached. Instances are single-owner and must not be shared across
//! threads while walking.

use crate::frame::StackFrame;
use crate::module::ModuleRecord;

/// Lazy, finite sequence of frames for one execution context.
///
/// Frames come innermost first (fault site first).
pub trait StackWalker: Iterator<Item = StackFrame> {
    /// Rewinds the walker to the top of its bound context.
    fn init_trace(&mut self);

    /// Number of frames not yet produced.
    fn remaining(&self) -> usize;

    /// Total number of frames in the bound context.
    fn depth(&self) -> usize;

    /// Rewinds and returns the first frame.
    fn first_frame(&mut self) -> Option<StackFrame> {
        self.init_trace();
        self.next()
    }

    /// Advances to the next frame.
    fn next_frame(&mut self) -> Option<StackFrame> {
        self.next()
    }

    /// Rewinds and collects every frame.
    fn collect_frames(&mut self) -> Vec<StackFrame> {
        let mut frames = Vec::with_capacity(self.depth());
        let mut frame = self.first_frame();
        while let Some(f) = frame {
            frames.push(f);
            frame = self.next_frame();
        }
        frames
    }
}

/// Lazy, finite sequence of loaded modules in load order.
pub trait ModuleEnumerator: Iterator<Item = ModuleRecord> {
    /// Takes a fresh snapshot of the loaded modules and rewinds.
    fn init_modules(&mut self);

    /// Re-snapshots and returns the first module.
    fn first_module(&mut self) -> Option<ModuleRecord> {
        self.init_modules();
        self.next()
    }

    /// Advances to the next module of the current snapshot.
    fn next_module(&mut self) -> Option<ModuleRecord> {
        self.next()
    }

    /// Re-snapshots and collects every module.
    fn collect_modules(&mut self) -> Vec<ModuleRecord> {
        let mut modules = Vec::new();
        let mut module = self.first_module();
        while let Some(m) = module {
            modules.push(m);
            module = self.next_module();
        }
        modules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedWalker {
        frames: Vec<StackFrame>,
        position: usize,
    }

    impl Iterator for FixedWalker {
        type Item = StackFrame;
        fn next(&mut self) -> Option<StackFrame> {
            let frame = self.frames.get(self.position).cloned()?;
            self.position += 1;
            Some(frame)
        }
    }

    impl StackWalker for FixedWalker {
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

    #[test]
    fn test_default_cursor_methods_restart() {
        let mut walker = FixedWalker {
            frames: vec![StackFrame::raw(1), StackFrame::raw(2)],
            position: 0,
        };
        assert_eq!(walker.first_frame().map(|f| f.address), Some(1));
        assert_eq!(walker.next_frame().map(|f| f.address), Some(2));
        assert_eq!(walker.next_frame(), None);
        assert_eq!(walker.first_frame().map(|f| f.address), Some(1));
        assert_eq!(walker.collect_frames().len(), 2);
        assert_eq!(walker.remaining(), 0);
    }
}
