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

//! System and process metadata, collected with `sysinfo`.

use crashtrap_core::{ProcessInfo, SystemInfo};
use std::sync::{Arc, Mutex};
use sysinfo::{ProcessesToUpdate, System};

/// Collects host and process metadata for reports.
///
/// The `sysinfo` state is created up front so a fault only pays for a
/// refresh, not for the initial enumeration.
#[derive(Clone)]
pub struct SysinfoProbe {
    system: Arc<Mutex<System>>,
}

impl std::fmt::Debug for SysinfoProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoProbe").finish_non_exhaustive()
    }
}

impl SysinfoProbe {
    /// Creates a probe with CPU and memory data already loaded.
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_cpu_all();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }

    /// Host metadata. Falls back to the static fields when the probe is busy.
    pub fn system_info(&self) -> SystemInfo {
        let mut info = SystemInfo {
            os: System::long_os_version(),
            kernel: System::kernel_version(),
            host_name: System::host_name(),
            user_name: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .ok(),
            ..SystemInfo::default()
        };
        if let Ok(mut system) = self.system.try_lock() {
            system.refresh_memory();
            info.cpu_brand = system.cpus().first().map(|c| c.brand().trim().to_string());
            info.cpu_count = system.cpus().len();
            info.total_memory = system.total_memory();
            info.used_memory = system.used_memory();
        }
        info
    }

    /// Process metadata. The environment is only collected when `detailed`.
    pub fn process_info(&self, detailed: bool) -> ProcessInfo {
        let mut info = ProcessInfo {
            pid: std::process::id(),
            executable: std::env::current_exe()
                .ok()
                .map(|p| p.display().to_string()),
            command_line: std::env::args_os()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
            current_dir: std::env::current_dir()
                .ok()
                .map(|p| p.display().to_string()),
            environment: Vec::new(),
            memory: None,
        };
        if detailed {
            let mut environment: Vec<(String, String)> = std::env::vars_os()
                .map(|(k, v)| {
                    (
                        k.to_string_lossy().into_owned(),
                        v.to_string_lossy().into_owned(),
                    )
                })
                .collect();
            environment.sort();
            info.environment = environment;
        }
        if let (Ok(pid), Ok(mut system)) = (sysinfo::get_current_pid(), self.system.try_lock()) {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            info.memory = system.process(pid).map(|p| p.memory());
        }
        info
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}
