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

//! # Crashtrap Log
//!
//! Thread-safe, bounded, append-only log stores.
//!
//! A [`LogStore`] keeps the most recent entries in memory and writes each
//! one through to disk in the encoding chosen at open time. Appends are
//! serialized by a single lock covering eviction, the file write and the
//! echo sinks, so entries never interleave.

#![warn(missing_docs)]

pub mod encoding;
pub mod error;
pub mod logger;
pub mod registry;
pub mod store;

mod echo;

pub use error::{LogError, LogResult};
pub use logger::LogStoreLogger;
pub use registry::LogRegistry;
pub use store::{FaultPathGuard, LogStatus, LogStore, UNLIMITED};
