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

//! Execution contexts a stack walker can bind to.

use crate::walker::managed::ManagedStackWalker;
use crate::walker::native::NativeStackWalker;
use crashtrap_core::{ModuleRecord, StackWalker};

/// Where the frames of a report come from.
#[derive(Debug)]
pub enum ExecutionContext {
    /// The calling thread, from the caller of [`ExecutionContext::walker`] outwards.
    CurrentThread,
    /// The faulting thread, walked from inside its signal handler.
    NativeFault {
        /// Program counter at the fault, when the platform exposes it.
        pc: Option<u64>,
    },
    /// A trace recorded when a panic was raised.
    Captured(backtrace::Backtrace),
}

impl ExecutionContext {
    /// Builds the walker matching this context.
    ///
    /// Native contexts are captured here, so this must run on the thread
    /// being reported. `modules` is used to attribute frames.
    #[inline(never)]
    pub fn walker(self, modules: &[ModuleRecord]) -> Box<dyn StackWalker> {
        match self {
            ExecutionContext::CurrentThread => {
                Box::new(NativeStackWalker::capture_current(modules.to_vec()))
            }
            ExecutionContext::NativeFault { pc } => {
                Box::new(NativeStackWalker::capture_fault(pc, modules.to_vec()))
            }
            ExecutionContext::Captured(trace) => {
                Box::new(ManagedStackWalker::from_backtrace(trace, modules))
            }
        }
    }
}
