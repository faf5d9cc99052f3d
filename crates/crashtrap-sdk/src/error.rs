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

use crate::engine::EnginePhase;
use crashtrap_core::ConfigError;
use crashtrap_dispatch::DispatchError;
use crashtrap_log::LogError;
use thiserror::Error;

/// Errors reported by [`EngineState`](crate::EngineState) outside the fault path.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The operation is not allowed in the current phase.
    #[error("engine is {found}, operation requires {expected}")]
    InvalidState {
        /// Phase the operation needs.
        expected: EnginePhase,
        /// Phase the engine is in.
        found: EnginePhase,
    },
    /// Another engine owns the process-wide handlers.
    #[error("another engine already owns the process-wide fault handlers")]
    AlreadyInstalled,
    /// A log store could not be opened or closed.
    #[error(transparent)]
    Io(#[from] LogError),
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The OS refused to install a handler.
    #[error("cannot install fault handlers: {0}")]
    Install(#[source] std::io::Error),
    /// An on-demand report could not be delivered.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
