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

//! # Crashtrap SDK
//!
//! The public face of crash capture. An application builds one
//! [`EngineState`], configures it, installs the process-wide filter and has
//! every worker thread hold a [`ThreadGuard`]:
//!
//! ```no_run
//! use crashtrap_sdk::prelude::*;
//!
//! let engine = EngineState::new();
//! engine.configure(ReportConfig::new("demo").with_version("1.0"))?;
//! engine.open_log("demo.log", LogFormat::Text)?;
//! engine.install_process_wide_filter()?;
//!
//! std::thread::scope(|scope| {
//!     scope.spawn(|| {
//!         let _guard = engine.register_thread();
//!         // work that may fault
//!     });
//! });
//! # Ok::<(), crashtrap_sdk::EngineError>(())
//! ```
//!
//! A fault on a registered thread, whether a signal or a panic, produces one
//! [`Report`](crashtrap_core::Report), an `ERROR` entry in every open log
//! and a best-effort delivery to the configured destinations.

#![warn(missing_docs)]

mod engine;
mod error;
mod fault;
mod handlers;
mod thread;

pub use engine::{EnginePhase, EngineState, ReportHook};
pub use error::{EngineError, EngineResult};
pub use fault::{FaultOutcome, FaultSource, ManagedFault, NativeFault};
pub use thread::ThreadGuard;

pub use crashtrap_core as core;
pub use crashtrap_dispatch as dispatch;
pub use crashtrap_infra as infra;
pub use crashtrap_log as log_store;

crashtrap_infra::register_component!();

/// Everything an application needs to set up crash capture.
pub mod prelude {
    pub use crate::{EngineError, EnginePhase, EngineState, FaultSource, ThreadGuard};
    pub use crashtrap_core::{
        DumpPolicy, ExitMode, LogFormat, LogLevel, Report, ReportActivity, ReportConfig,
        ReportFlags, ReportFormat, SupportEndpoint,
    };
    pub use crashtrap_infra::register_component;
    pub use crashtrap_log::LogStore;
}
