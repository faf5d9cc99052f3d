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

//! Native image enumeration.
//!
//! On Linux and Android the loaded images come from `dl_iterate_phdr`, in
//! the loader's own order (executable first). Elsewhere the enumerator
//! reports the executable alone.

use crashtrap_core::{ModuleEnumerator, ModuleKind, ModuleRecord};
use std::path::Path;

/// Enumerates the native images mapped in the process.
#[derive(Debug, Default)]
pub struct NativeModuleEnumerator {
    snapshot: Vec<ModuleRecord>,
    position: usize,
}

impl NativeModuleEnumerator {
    /// Creates an enumerator with a fresh snapshot.
    pub fn new() -> Self {
        let mut enumerator = Self::default();
        enumerator.init_modules();
        enumerator
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> &[ModuleRecord] {
        &self.snapshot
    }
}

impl Iterator for NativeModuleEnumerator {
    type Item = ModuleRecord;

    fn next(&mut self) -> Option<ModuleRecord> {
        let module = self.snapshot.get(self.position).cloned()?;
        self.position += 1;
        Some(module)
    }
}

impl ModuleEnumerator for NativeModuleEnumerator {
    fn init_modules(&mut self) {
        self.snapshot = loaded_images();
        if self.snapshot.is_empty() {
            self.snapshot.extend(executable_record());
        }
        self.position = 0;
    }
}

fn record(path: &str, base: Option<u64>, size: u64) -> ModuleRecord {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    ModuleRecord {
        kind: ModuleKind::Native,
        base,
        size,
        name,
        path: Some(path.to_string()),
        version: None,
    }
}

fn executable_record() -> Option<ModuleRecord> {
    let exe = std::env::current_exe().ok()?;
    Some(record(&exe.to_string_lossy(), None, 0))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn loaded_images() -> Vec<ModuleRecord> {
    use std::ffi::{c_int, c_void, CStr};

    unsafe extern "C" fn visit(
        info: *mut libc::dl_phdr_info,
        _size: libc::size_t,
        data: *mut c_void,
    ) -> c_int {
        let modules = &mut *(data as *mut Vec<ModuleRecord>);
        let info = &*info;
        let headers = if info.dlpi_phdr.is_null() {
            &[][..]
        } else {
            std::slice::from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize)
        };

        let mut low = u64::MAX;
        let mut high = 0u64;
        for header in headers.iter().filter(|h| h.p_type == libc::PT_LOAD) {
            low = low.min(header.p_vaddr as u64);
            high = high.max(header.p_vaddr as u64 + header.p_memsz as u64);
        }
        let bias = info.dlpi_addr as u64;
        let (base, size) = if high > low {
            (bias + low, high - low)
        } else {
            (bias, 0)
        };

        let name = if info.dlpi_name.is_null() || *info.dlpi_name == 0 {
            None
        } else {
            Some(CStr::from_ptr(info.dlpi_name).to_string_lossy().into_owned())
        };
        let module = match name {
            Some(path) => record(&path, Some(base), size),
            // The loader reports the executable with an empty name.
            None => match std::env::current_exe() {
                Ok(exe) => record(&exe.to_string_lossy(), Some(base), size),
                Err(_) => record("<main>", Some(base), size),
            },
        };
        modules.push(module);
        0
    }

    let mut modules: Vec<ModuleRecord> = Vec::new();
    unsafe {
        libc::dl_iterate_phdr(Some(visit), &mut modules as *mut Vec<ModuleRecord> as *mut c_void);
    }
    modules
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn loaded_images() -> Vec<ModuleRecord> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_not_empty() {
        let mut enumerator = NativeModuleEnumerator::new();
        assert!(!enumerator.snapshot().is_empty());
        assert!(enumerator.first_module().is_some());
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_code_address_falls_in_a_module() {
        let here = test_code_address_falls_in_a_module as usize as u64;
        let enumerator = NativeModuleEnumerator::new();
        assert!(enumerator.snapshot().iter().any(|m| m.contains(here)));
    }
}
