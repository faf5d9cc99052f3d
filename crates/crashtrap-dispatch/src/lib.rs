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

//! # Crashtrap Dispatch
//!
//! Turns a captured [`Report`](crashtrap_core::Report) into a payload
//! (text, XML, or a zip bundle with the log files) and delivers it: saved
//! in a local directory, sent to a collector over TCP, or posted to a web
//! collector over HTTP.
//!
//! Delivery is best-effort. Every remote attempt is bounded by a timeout,
//! never retried, and failures are journaled as `WARNING` log entries
//! instead of being raised into the fault handler.

#![warn(missing_docs)]

pub mod dispatcher;
pub mod error;
pub mod payload;
pub mod protocol;
pub mod render;
pub mod transport;

pub use dispatcher::{DispatchReceipt, DispatchSummary, Destination, ReportDispatcher};
pub use error::{DispatchError, DispatchResult};
pub use payload::ReportPayload;
