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

//! Dispatch failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a report could not be rendered or delivered.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The collector could not be reached.
    #[error("cannot connect to collector {endpoint}: {source}")]
    Connect {
        /// `host:port` of the collector.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The attempt did not finish in time and was abandoned.
    #[error("delivery to {endpoint} timed out after {timeout:?}")]
    Timeout {
        /// Destination of the attempt.
        endpoint: String,
        /// The configured bound.
        timeout: Duration,
    },
    /// The web collector failed or answered with an error status.
    #[error("HTTP delivery to {endpoint} failed: {reason}")]
    Http {
        /// Upload URL.
        endpoint: String,
        /// Transport error or status line.
        reason: String,
    },
    /// The delivery thread ended without reporting a result.
    #[error("delivery to {endpoint} aborted")]
    Aborted {
        /// Destination of the attempt.
        endpoint: String,
    },
    /// A local file could not be written.
    #[error("cannot write report file '{path}': {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The report could not be rendered or bundled.
    #[error("cannot encode report: {0}")]
    Encode(String),
    /// No destination is configured.
    #[error("no destination configured")]
    NoDestination,
}

/// Result alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
