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

//! Loaded module model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of code unit a [`ModuleRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// A native image mapped in the address space (executable, shared object).
    Native,
    /// A statically registered component, identified by name and version.
    Component,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Native => f.write_str("native"),
            ModuleKind::Component => f.write_str("component"),
        }
    }
}

/// One loaded module, as seen at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Native image or component.
    pub kind: ModuleKind,
    /// Load address. Components have none.
    pub base: Option<u64>,
    /// Size of the mapping in bytes, zero when unknown.
    pub size: u64,
    /// Display name.
    pub name: String,
    /// Full path of the image, when known.
    pub path: Option<String>,
    /// Version string, when known.
    pub version: Option<String>,
}

impl ModuleRecord {
    /// Returns `true` if `address` lies inside this module's mapping.
    pub fn contains(&self, address: u64) -> bool {
        match self.base {
            Some(base) if self.size > 0 => address >= base && address - base < self.size,
            _ => false,
        }
    }
}

impl fmt::Display for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(version) = &self.version {
            write!(f, " {version}")?;
        }
        if let Some(base) = self.base {
            write!(f, " @ 0x{base:016x} ({} bytes)", self.size)?;
        }
        Ok(())
    }
}
