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

//! # Crashtrap Core
//!
//! Foundational crate containing the crash model (log entries, frames,
//! modules, reports), the configuration surface and the cursor traits that
//! the platform walkers and enumerators implement.

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod log;
pub mod module;
pub mod report;
pub mod utils;
pub mod walker;

pub use config::{
    DumpPolicy, ExitMode, ReportActivity, ReportConfig, ReportFlags, ReportFormat,
    SupportEndpoint,
};
pub use context::{ContextSummary, FaultKind};
pub use error::{ConfigError, ConfigResult};
pub use frame::{ModuleRef, StackFrame, Symbol};
pub use log::{EchoFlags, EntryMode, LogEntry, LogFlags, LogFormat, LogLevel};
pub use module::{ModuleKind, ModuleRecord};
pub use report::{ApplicationInfo, ProcessInfo, Report, ReportBuilder, SystemInfo};
pub use walker::{ModuleEnumerator, StackWalker};

#[doc(hidden)]
pub use serde as __serde;
