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

use crate::engine::EngineInner;
use crashtrap_infra::platform::AltStack;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::ThreadId;

/// Keeps the thread that created it registered for fault capture.
///
/// The guard is bound to its thread and unregisters it on drop, including
/// during unwinding. It also makes sure the thread has an alternate signal
/// stack, so a stack overflow can still be reported.
#[must_use = "the thread is unregistered as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ThreadGuard {
    engine: Arc<EngineInner>,
    thread: ThreadId,
    _alt_stack: Option<AltStack>,
    _not_send: PhantomData<*const ()>,
}

impl ThreadGuard {
    pub(crate) fn new(engine: Arc<EngineInner>) -> Self {
        let alt_stack = match AltStack::install() {
            Ok(stack) => Some(stack),
            Err(e) => {
                log::warn!("No alternate signal stack for this thread: {e}");
                None
            }
        };
        Self {
            engine,
            thread: std::thread::current().id(),
            _alt_stack: alt_stack,
            _not_send: PhantomData,
        }
    }

    /// The registered thread.
    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.engine.unregister(self.thread);
    }
}
