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

//! Errors raised by log stores.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a log store operation.
#[derive(Debug, Error)]
pub enum LogError {
    /// The log file could not be created, read or written.
    #[error("log file '{path}': {source}")]
    Io {
        /// Path of the log file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The store is closed.
    #[error("log store '{0}' is closed")]
    Closed(PathBuf),
    /// A persisted file could not be decoded.
    #[error("malformed log data: {0}")]
    Malformed(String),
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for operations attempted on a closed store.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, LogError::Closed(_))
    }
}

/// Result alias for log store operations.
pub type LogResult<T> = Result<T, LogError>;
