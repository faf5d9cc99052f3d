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

//! Crash capture demo.
//!
//! Usage: `sandbox [panic|segv|abort|snapshot] [config.json]`
//!
//! Without a configuration file, reports are saved under the system
//! temporary directory and nothing is sent.

use anyhow::{bail, Context, Result};
use crashtrap_sdk::core::EchoFlags;
use crashtrap_sdk::log_store::LogStoreLogger;
use crashtrap_sdk::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Panic,
    Segv,
    Abort,
    Snapshot,
}

impl Trigger {
    fn parse(arg: Option<&str>) -> Result<Self> {
        Ok(match arg.unwrap_or("panic") {
            "panic" => Trigger::Panic,
            "segv" => Trigger::Segv,
            "abort" => Trigger::Abort,
            "snapshot" => Trigger::Snapshot,
            other => bail!("unknown trigger '{other}', expected panic, segv, abort or snapshot"),
        })
    }
}

fn load_config(path: Option<&str>) -> Result<ReportConfig> {
    match path {
        Some(path) => ReportConfig::from_file(path)
            .with_context(|| format!("cannot load configuration from '{path}'")),
        None => Ok(ReportConfig::new("sandbox")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_flags(ReportFlags::DETAILED_MODE)
            .with_activity(ReportActivity::Save)),
    }
}

#[inline(never)]
fn crash(trigger: Trigger) {
    match trigger {
        Trigger::Panic => {
            let values: Vec<u32> = Vec::new();
            let index = std::hint::black_box(3);
            log::info!("About to read element {index}");
            println!("{}", values[index]);
        }
        Trigger::Segv => unsafe {
            let pointer = std::hint::black_box(std::ptr::null_mut::<u32>());
            pointer.write_volatile(42);
        },
        Trigger::Abort => std::process::abort(),
        Trigger::Snapshot => {}
    }
}

fn main() -> Result<()> {
    // With RUST_LOG set the console logger takes the facade, otherwise it
    // goes into the store, which echoes to stderr.
    let console_logging = std::env::var_os("RUST_LOG").is_some();
    if console_logging {
        env_logger::init();
    }

    let args: Vec<String> = std::env::args().collect();
    let trigger = Trigger::parse(args.get(1).map(String::as_str))?;
    let config = load_config(args.get(2).map(String::as_str))?;
    let report_dir = config.resolved_report_dir();

    let engine = EngineState::new();
    engine.configure(config)?;
    let store = engine.open_log("sandbox", LogFormat::Text)?;
    store.set_capacity(500)?;
    if !console_logging {
        store.set_echo_flags(EchoFlags::STDERR)?;
        if let Err(e) = LogStoreLogger::new(store.clone(), log::LevelFilter::Info).install() {
            eprintln!("cannot route log records into the store: {e}");
        }
    }
    engine.install_process_wide_filter()?;
    log::info!("Sandbox armed, reports go to '{}'", report_dir.display());

    if trigger == Trigger::Snapshot {
        let path = engine.save_snapshot(&report_dir)?;
        println!("Snapshot saved to {}", path.display());
        return Ok(());
    }

    let completed = AtomicUsize::new(0);
    thread::scope(|scope| -> Result<()> {
        for worker in 0..WORKERS {
            let engine = &engine;
            let completed = &completed;
            let store = &store;
            thread::Builder::new()
                .name(format!("worker-{worker}"))
                .spawn_scoped(scope, move || {
                    let _guard = match engine.register_thread() {
                        Ok(guard) => guard,
                        Err(e) => {
                            log::error!("Worker {worker} not protected: {e}");
                            return;
                        }
                    };
                    for step in 0..5 {
                        let _ = store.append(LogLevel::Info, format!("worker {worker} step {step}"));
                        thread::sleep(Duration::from_millis(10));
                    }
                    if worker == WORKERS - 1 {
                        crash(trigger);
                    }
                    completed.fetch_add(1, Ordering::SeqCst);
                })?;
        }
        Ok(())
    })?;

    println!(
        "{} of {} workers completed, {} report(s) captured",
        completed.load(Ordering::SeqCst),
        WORKERS,
        engine.report_count()
    );
    engine.shutdown()?;
    Ok(())
}
