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

//! Stack frame model.
//!
//! Frames are always listed innermost first: index 0 is the fault site and
//! the last frame is the outermost caller (usually the thread entry point).

use crate::module::ModuleRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Module that contains a frame's instruction address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRef {
    /// Display name of the module.
    pub name: String,
    /// Load address of the module.
    pub base: u64,
    /// Offset of the instruction from `base`.
    pub offset: u64,
}

impl ModuleRef {
    /// Finds the native module that maps `address`.
    pub fn locate(address: u64, modules: &[ModuleRecord]) -> Option<Self> {
        modules
            .iter()
            .find(|module| module.contains(address))
            .and_then(|module| {
                let base = module.base?;
                Some(Self {
                    name: module.name.clone(),
                    base,
                    offset: address - base,
                })
            })
    }
}

/// Symbolic information resolved for a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Demangled function name.
    pub name: String,
    /// Byte offset of the instruction inside the function, when known.
    pub offset: Option<u64>,
    /// Source file.
    pub file: Option<String>,
    /// Source line.
    pub line: Option<u32>,
    /// Source column.
    pub column: Option<u32>,
}

/// One frame of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Instruction address.
    pub address: u64,
    /// Enclosing module, when the address falls in a known mapping.
    pub module: Option<ModuleRef>,
    /// Resolved symbol. `None` means the frame degraded to its raw address.
    pub symbol: Option<Symbol>,
}

impl StackFrame {
    /// An unresolved frame.
    pub fn raw(address: u64) -> Self {
        Self {
            address,
            module: None,
            symbol: None,
        }
    }

    /// Returns `true` if a symbol name was resolved.
    pub fn is_resolved(&self) -> bool {
        self.symbol.is_some()
    }

    /// Function name, when resolved.
    pub fn function(&self) -> Option<&str> {
        self.symbol.as_ref().map(|s| s.name.as_str())
    }

    /// `file:line` when both are known.
    pub fn source_location(&self) -> Option<String> {
        let symbol = self.symbol.as_ref()?;
        match (&symbol.file, symbol.line) {
            (Some(file), Some(line)) => Some(format!("{file}:{line}")),
            (Some(file), None) => Some(file.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.address)?;
        if let Some(module) = &self.module {
            write!(f, " {}+0x{:x}", module.name, module.offset)?;
        }
        if let Some(symbol) = &self.symbol {
            write!(f, " {}()", symbol.name)?;
            if let Some(offset) = symbol.offset {
                let unit = if offset == 1 { "byte" } else { "bytes" };
                write!(f, "+{offset} {unit}")?;
            }
        }
        if let Some(location) = self.source_location() {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleKind;

    fn module(name: &str, base: u64, size: u64) -> ModuleRecord {
        ModuleRecord {
            kind: ModuleKind::Native,
            base: Some(base),
            size,
            name: name.into(),
            path: None,
            version: None,
        }
    }

    #[test]
    fn test_locate_computes_offset() {
        let modules = [module("libc.so.6", 0x7000, 0x1000), module("app", 0x1000, 0x500)];
        let found = ModuleRef::locate(0x1234, &modules).unwrap();
        assert_eq!(found.name, "app");
        assert_eq!(found.offset, 0x234);
        assert!(ModuleRef::locate(0x9000, &modules).is_none());
    }

    #[test]
    fn test_display_degrades_to_module_offset() {
        let frame = StackFrame {
            address: 0x1234,
            module: Some(ModuleRef {
                name: "app".into(),
                base: 0x1000,
                offset: 0x234,
            }),
            symbol: None,
        };
        assert_eq!(frame.to_string(), "0x0000000000001234 app+0x234");
    }

    #[test]
    fn test_display_with_symbol() {
        let mut frame = StackFrame::raw(0x10);
        frame.symbol = Some(Symbol {
            name: "app::main".into(),
            offset: Some(1),
            file: Some("src/main.rs".into()),
            line: Some(7),
            column: None,
        });
        assert_eq!(
            frame.to_string(),
            "0x0000000000000010 app::main()+1 byte at src/main.rs:7"
        );
        assert_eq!(frame.function(), Some("app::main"));
    }
}
