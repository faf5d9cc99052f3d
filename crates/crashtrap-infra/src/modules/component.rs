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

//! Statically registered components.
//!
//! Crates announce themselves with [`register_component!`](crate::register_component),
//! which records their package name and version at link time. The
//! component list is the Rust counterpart of a managed runtime's loaded
//! assemblies: it names the code units and versions that make up the
//! process, independently of how they were linked.

use crashtrap_core::{ModuleEnumerator, ModuleKind, ModuleRecord};

/// A crate linked into the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    /// Package name.
    pub name: &'static str,
    /// Package version.
    pub version: &'static str,
    /// Module path of the registration site.
    pub module_path: &'static str,
}

inventory::collect!(Component);

/// Registers the calling crate (or an explicit name and version) as a component.
#[macro_export]
macro_rules! register_component {
    () => {
        $crate::__inventory::submit! {
            $crate::Component {
                name: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
                module_path: module_path!(),
            }
        }
    };
    ($name:expr, $version:expr) => {
        $crate::__inventory::submit! {
            $crate::Component {
                name: $name,
                version: $version,
                module_path: module_path!(),
            }
        }
    };
}

/// Enumerates registered components.
///
/// Order follows the link-time collection order, which is stable for the
/// lifetime of the process.
#[derive(Debug, Default)]
pub struct ComponentEnumerator {
    snapshot: Vec<ModuleRecord>,
    position: usize,
}

impl ComponentEnumerator {
    /// Creates an enumerator with a fresh snapshot.
    pub fn new() -> Self {
        let mut enumerator = Self::default();
        enumerator.init_modules();
        enumerator
    }
}

impl Iterator for ComponentEnumerator {
    type Item = ModuleRecord;

    fn next(&mut self) -> Option<ModuleRecord> {
        let module = self.snapshot.get(self.position).cloned()?;
        self.position += 1;
        Some(module)
    }
}

impl ModuleEnumerator for ComponentEnumerator {
    fn init_modules(&mut self) {
        self.snapshot = inventory::iter::<Component>
            .into_iter()
            .map(|component| ModuleRecord {
                kind: ModuleKind::Component,
                base: None,
                size: 0,
                name: component.name.to_string(),
                path: Some(component.module_path.to_string()),
                version: Some(component.version.to_string()),
            })
            .collect();
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::register_component!("component-test-fixture", "0.0.1");

    #[test]
    fn test_registered_components_are_listed() {
        let modules = ComponentEnumerator::new().collect_modules();
        assert!(modules
            .iter()
            .any(|m| m.name == "crashtrap-infra" && m.kind == ModuleKind::Component));
        let fixture = modules
            .iter()
            .find(|m| m.name == "component-test-fixture")
            .unwrap();
        assert_eq!(fixture.version.as_deref(), Some("0.0.1"));
    }
}
