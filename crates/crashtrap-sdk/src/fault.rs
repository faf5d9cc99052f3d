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

//! The two ways a fault reaches the engine.

use backtrace::Backtrace;
use crashtrap_core::{ContextSummary, ExitMode, FaultKind, Report};
use crashtrap_dispatch::DispatchSummary;
use crashtrap_infra::{ExecutionContext, SignalInfo};
use std::sync::Arc;

/// A fault delivered by the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFault {
    /// Signal details.
    pub info: SignalInfo,
}

/// An uncaught panic.
#[derive(Debug)]
pub struct ManagedFault {
    /// Panic payload, rendered as text.
    pub message: String,
    /// `file:line:column` of the panic.
    pub location: Option<String>,
    /// Trace recorded where the panic was raised.
    pub trace: Backtrace,
}

/// A fault to report.
#[derive(Debug)]
pub enum FaultSource {
    /// OS signal, walked from the signal handler.
    Native(NativeFault),
    /// Panic, walked from the trace recorded by the panic hook.
    Managed(ManagedFault),
}

impl FaultSource {
    /// A native fault as delivered to the signal handler.
    pub fn native(info: SignalInfo) -> Self {
        FaultSource::Native(NativeFault { info })
    }

    /// A native fault for `signal`, raised by the caller itself.
    pub fn simulated_native(signal: i32) -> Self {
        Self::native(SignalInfo::simulated(signal))
    }

    /// A panic with an already recorded trace.
    pub fn managed(message: impl Into<String>, location: Option<String>, trace: Backtrace) -> Self {
        FaultSource::Managed(ManagedFault {
            message: message.into(),
            location,
            trace,
        })
    }

    /// A panic raised at the call site, with a trace recorded now.
    #[track_caller]
    pub fn simulated_panic(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller().to_string();
        Self::managed(message, Some(location), Backtrace::new_unresolved())
    }

    /// Kind recorded in the report.
    pub fn kind(&self) -> FaultKind {
        match self {
            FaultSource::Native(_) => FaultKind::NativeSignal,
            FaultSource::Managed(_) => FaultKind::Panic,
        }
    }

    pub(crate) fn into_context(self) -> (ContextSummary, ExecutionContext) {
        match self {
            FaultSource::Native(NativeFault { info }) => {
                let mut summary =
                    ContextSummary::for_current_thread(FaultKind::NativeSignal, info.description());
                summary.signal = Some(info.signal);
                summary.code = Some(info.code);
                summary.fault_address = info.fault_address;
                (summary, ExecutionContext::NativeFault { pc: info.pc })
            }
            FaultSource::Managed(fault) => {
                let mut summary = ContextSummary::for_current_thread(FaultKind::Panic, fault.message);
                summary.location = fault.location;
                (summary, ExecutionContext::Captured(fault.trace))
            }
        }
    }
}

/// What handling a fault produced.
#[derive(Debug, Clone)]
pub struct FaultOutcome {
    /// The report, as handed to the dispatcher.
    pub report: Arc<Report>,
    /// What the handler should do next.
    pub action: ExitMode,
    /// Delivery outcome. `None` when the module filter excluded the fault.
    pub dispatch: Option<DispatchSummary>,
}

impl FaultOutcome {
    /// Returns `true` if the report went through the dispatcher.
    pub fn was_dispatched(&self) -> bool {
        self.dispatch.is_some()
    }
}
