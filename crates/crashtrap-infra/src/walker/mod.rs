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

//! Stack walker implementations.

use crashtrap_core::Symbol;

pub mod managed;
pub mod native;

/// Most frames a walker keeps.
pub const MAX_FRAMES: usize = 256;

/// Converts a resolved `backtrace` symbol for the instruction at `ip`.
pub(crate) fn symbol_from(
    name: Option<backtrace::SymbolName<'_>>,
    addr: Option<*mut std::ffi::c_void>,
    file: Option<&std::path::Path>,
    line: Option<u32>,
    column: Option<u32>,
    ip: u64,
) -> Option<Symbol> {
    if name.is_none() && file.is_none() {
        return None;
    }
    Some(Symbol {
        name: name
            .map(|n| format!("{n:#}"))
            .unwrap_or_else(|| "<unknown>".to_string()),
        offset: addr.map(|a| ip.wrapping_sub(a as u64)),
        file: file.map(|p| p.display().to_string()),
        line,
        column,
    })
}
