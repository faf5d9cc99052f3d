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

//! Process-wide entry points: the signal callback and the panic hook.
//!
//! Both need to find the installed engine without any argument, so the
//! engine is published in [`ACTIVE`] while it is installed. Only one
//! engine can own the handlers at a time.

use crate::engine::{self, EngineInner};
use crate::error::{EngineError, EngineResult};
use crate::fault::FaultSource;
use backtrace::Backtrace;
use crashtrap_core::ExitMode;
use crashtrap_infra::platform::signals;
use crashtrap_infra::SignalInfo;
use parking_lot::{Mutex, RwLock};
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::time::Duration;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

static ACTIVE: RwLock<Option<Arc<EngineInner>>> = parking_lot::const_rwlock(None);
static PREVIOUS_HOOK: Mutex<Option<Arc<PanicHook>>> = parking_lot::const_mutex(None);

const HANDLER_LOCK_TIMEOUT: Duration = Duration::from_millis(200);

pub(crate) fn activate(engine: &Arc<EngineInner>) -> EngineResult<()> {
    {
        let mut active = ACTIVE.write();
        if let Some(current) = active.as_ref() {
            if !Arc::ptr_eq(current, engine) {
                return Err(EngineError::AlreadyInstalled);
            }
        }
        *active = Some(Arc::clone(engine));
    }

    if let Err(e) = signals::install(on_signal) {
        *ACTIVE.write() = None;
        return Err(EngineError::Install(e));
    }

    let previous: Arc<PanicHook> = Arc::new(panic::take_hook());
    *PREVIOUS_HOOK.lock() = Some(previous);
    panic::set_hook(Box::new(on_panic));
    log::info!("Process-wide fault filter installed");
    Ok(())
}

pub(crate) fn deactivate(engine: &Arc<EngineInner>) {
    let mut active = ACTIVE.write();
    if !active.as_ref().is_some_and(|current| Arc::ptr_eq(current, engine)) {
        return;
    }
    signals::uninstall();
    if let Some(previous) = PREVIOUS_HOOK.lock().take() {
        if !std::thread::panicking() {
            panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| previous(info)));
        }
    }
    *active = None;
    log::info!("Process-wide fault filter removed");
}

fn active_engine() -> Option<Arc<EngineInner>> {
    ACTIVE.try_read_for(HANDLER_LOCK_TIMEOUT)?.clone()
}

fn on_signal(info: &SignalInfo) -> ExitMode {
    if engine::in_fault_pipeline() {
        return ExitMode::ContinueSearch;
    }
    let Some(engine) = active_engine() else {
        return ExitMode::ContinueSearch;
    };
    match engine.handle_fault(FaultSource::native(*info)) {
        Some(outcome) => outcome.action,
        None => ExitMode::ContinueSearch,
    }
}

fn on_panic(info: &PanicHookInfo<'_>) {
    // Caught and recorded by the pipeline that raised it.
    if engine::in_fault_pipeline() {
        return;
    }
    let outcome = active_engine().and_then(|engine| {
        let message = panic_message(info);
        let location = info.location().map(ToString::to_string);
        engine.handle_fault(FaultSource::managed(message, location, Backtrace::new_unresolved()))
    });

    match outcome.map(|o| o.action) {
        Some(ExitMode::Terminate) => {
            // abort() raises SIGABRT, which must not be reported a second time.
            signals::uninstall();
            eprintln!("fatal: {}", panic_message(info));
            std::process::abort();
        }
        // Unwinding continues without the default message.
        Some(ExitMode::Resume) => {}
        Some(ExitMode::ContinueSearch) | None => call_previous_hook(info),
    }
}

fn call_previous_hook(info: &PanicHookInfo<'_>) {
    let previous = PREVIOUS_HOOK.try_lock_for(HANDLER_LOCK_TIMEOUT).and_then(|hook| hook.clone());
    if let Some(previous) = previous {
        previous(info);
    }
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}
