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

//! # Crashtrap Infra
//!
//! Concrete implementations of the core contracts on top of the host
//! platform: native and managed stack walkers built on `backtrace`, module
//! enumerators, POSIX signal plumbing and `sysinfo` system probes.

#![warn(missing_docs)]

pub mod context;
pub mod modules;
pub mod platform;
pub mod walker;

pub use context::ExecutionContext;
pub use modules::component::{Component, ComponentEnumerator};
pub use modules::native::NativeModuleEnumerator;
pub use walker::managed::ManagedStackWalker;
pub use platform::{SignalInfo, SysinfoProbe};
pub use walker::native::NativeStackWalker;

#[doc(hidden)]
pub use inventory as __inventory;

crate::register_component!();
