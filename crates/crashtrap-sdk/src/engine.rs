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

//! The engine state object and its fault pipeline.

use crate::error::{EngineError, EngineResult};
use crate::fault::{FaultOutcome, FaultSource};
use crate::handlers;
use crate::thread::ThreadGuard;
use crashtrap_core::{
    ContextSummary, FaultKind, LogFormat, LogLevel, ModuleEnumerator, ModuleRecord,
    Report, ReportConfig, ReportFlags,
};
use crashtrap_dispatch::{DispatchReceipt, Destination, ReportDispatcher};
use crashtrap_infra::platform::signals;
use crashtrap_infra::{ComponentEnumerator, ExecutionContext, NativeModuleEnumerator, SysinfoProbe};
use crashtrap_log::{FaultPathGuard, LogRegistry, LogStore};
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

/// Bound on lock waits inside the fault path.
const FAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(200);

/// Callback run with the finished report, before or after dispatch.
pub type ReportHook = Arc<dyn Fn(&Report) + Send + Sync>;

/// Lifecycle of an [`EngineState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnginePhase {
    /// No configuration yet.
    Unconfigured,
    /// Configured; handlers not installed or no thread registered.
    Configured,
    /// Handlers installed and at least one thread registered.
    Armed,
    /// At least one fault is being handled.
    Faulted,
    /// Handlers removed and stores closed.
    Shutdown,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnginePhase::Unconfigured => "UNCONFIGURED",
            EnginePhase::Configured => "CONFIGURED",
            EnginePhase::Armed => "ARMED",
            EnginePhase::Faulted => "FAULTED",
            EnginePhase::Shutdown => "SHUTDOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct RegisteredThread {
    name: Option<String>,
    guards: usize,
}

/// Shared between the engine handle, thread guards and the process-wide handlers.
pub(crate) struct EngineInner {
    config: RwLock<Option<ReportConfig>>,
    installed: AtomicBool,
    shutdown: AtomicBool,
    faults_in_progress: AtomicUsize,
    threads: Mutex<HashMap<ThreadId, RegisteredThread>>,
    logs: LogRegistry,
    probe: SysinfoProbe,
    pre_dispatch: RwLock<Option<ReportHook>>,
    post_dispatch: RwLock<Option<ReportHook>>,
    reports: AtomicU64,
    last_report: Mutex<Option<Arc<Report>>>,
}

impl fmt::Debug for EngineInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineInner")
            .field("phase", &self.phase())
            .field("logs", &self.logs.len())
            .field("reports", &self.reports.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

thread_local! {
    static IN_PIPELINE: Cell<bool> = const { Cell::new(false) };
}

/// Returns `true` while the calling thread runs the fault pipeline.
///
/// A panic or signal raised there is not captured again: the handlers
/// leave it to the pipeline's own guards or to the previous handler.
pub(crate) fn in_fault_pipeline() -> bool {
    IN_PIPELINE.with(Cell::get)
}

/// The calling thread's stay in the fault pipeline.
///
/// Counts towards [`EnginePhase::Faulted`] and keeps bridged log records
/// on the bounded fault path until dropped.
struct FaultScope<'a> {
    counter: &'a AtomicUsize,
    _log_path: FaultPathGuard,
}

impl<'a> FaultScope<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        IN_PIPELINE.with(|flag| flag.set(true));
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter,
            _log_path: FaultPathGuard::enter(),
        }
    }
}

impl Drop for FaultScope<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        IN_PIPELINE.with(|flag| flag.set(false));
    }
}

/// Runs `f` and turns a panic into `None`.
///
/// Inside a panic hook a second panic aborts the process, so there `f`
/// runs on a helper thread instead.
fn isolated<R: Send>(f: impl FnOnce() -> R + Send) -> Option<R> {
    if !std::thread::panicking() {
        return panic::catch_unwind(AssertUnwindSafe(f)).ok();
    }
    std::thread::scope(|scope| {
        std::thread::Builder::new()
            .name("crashtrap-isolated".into())
            .spawn_scoped(scope, f)
            .ok()?
            .join()
            .ok()
    })
}

impl EngineInner {
    fn new() -> Self {
        Self {
            config: RwLock::new(None),
            installed: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            faults_in_progress: AtomicUsize::new(0),
            threads: Mutex::new(HashMap::new()),
            logs: LogRegistry::new(),
            probe: SysinfoProbe::new(),
            pre_dispatch: RwLock::new(None),
            post_dispatch: RwLock::new(None),
            reports: AtomicU64::new(0),
            last_report: Mutex::new(None),
        }
    }

    pub(crate) fn phase(&self) -> EnginePhase {
        if self.shutdown.load(Ordering::SeqCst) {
            EnginePhase::Shutdown
        } else if self.faults_in_progress.load(Ordering::SeqCst) > 0 {
            EnginePhase::Faulted
        } else if self.installed.load(Ordering::SeqCst) && !self.threads.lock().is_empty() {
            EnginePhase::Armed
        } else if self.config.read().is_some() {
            EnginePhase::Configured
        } else {
            EnginePhase::Unconfigured
        }
    }

    fn config_snapshot(&self) -> Option<ReportConfig> {
        self.config.try_read_for(FAULT_LOCK_TIMEOUT)?.clone()
    }

    pub(crate) fn register_current(&self) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let current = std::thread::current();
        let mut threads = self.threads.lock();
        let entry = threads.entry(current.id()).or_insert_with(|| RegisteredThread {
            name: current.name().map(str::to_owned),
            guards: 0,
        });
        entry.guards += 1;
        if entry.guards == 1 {
            log::debug!(
                "Registered thread '{}' for fault capture",
                entry.name.as_deref().unwrap_or("<unnamed>")
            );
        }
        true
    }

    pub(crate) fn unregister(&self, id: ThreadId) {
        let mut threads = self.threads.lock();
        if let Some(entry) = threads.get_mut(&id) {
            entry.guards -= 1;
            if entry.guards == 0 {
                threads.remove(&id);
            }
        }
    }

    pub(crate) fn is_current_registered(&self) -> bool {
        let id = std::thread::current().id();
        self.threads
            .try_lock_for(FAULT_LOCK_TIMEOUT)
            .is_some_and(|threads| threads.contains_key(&id))
    }

    /// The whole fault pipeline. Never panics.
    pub(crate) fn handle_fault(&self, source: FaultSource) -> Option<FaultOutcome> {
        if in_fault_pipeline()
            || self.shutdown.load(Ordering::SeqCst)
            || !self.is_current_registered()
        {
            return None;
        }
        let _scope = FaultScope::enter(&self.faults_in_progress);
        let config = self.config_snapshot()?;

        let kind = source.kind();
        let (summary, context) = source.into_context();
        let report = Arc::new(self.build_report_guarded(&config, summary, context));
        self.reports.fetch_add(1, Ordering::SeqCst);
        if let Some(mut last) = self.last_report.try_lock_for(FAULT_LOCK_TIMEOUT) {
            *last = Some(Arc::clone(&report));
        }

        let headline = report.context.headline();
        self.logs.append_all_from_fault(LogLevel::Error, &headline);
        log::error!("Captured {headline}");

        let dispatch = match config.module_filter.as_deref() {
            Some(module) if !report.passes_through(module) => {
                log::info!("Fault does not pass through '{module}', report not dispatched");
                None
            }
            _ => Some(self.dispatch_guarded(&report, &config)),
        };

        self.logs.flush_all_from_fault();
        if kind != FaultKind::Snapshot && config.flags.contains(ReportFlags::RESTART_APP) {
            restart_application();
        }

        Some(FaultOutcome {
            report,
            action: config.exit_mode,
            dispatch,
        })
    }

    fn build_report_guarded(
        &self,
        config: &ReportConfig,
        summary: ContextSummary,
        context: ExecutionContext,
    ) -> Report {
        let fallback = summary.clone();
        let built = panic::catch_unwind(AssertUnwindSafe(|| self.build_report(config, summary, context)));
        built.unwrap_or_else(|_| {
            log::warn!("Report construction panicked, keeping a partial report");
            Report::builder(config, fallback)
                .degraded("report construction panicked")
                .build()
        })
    }

    fn build_report(
        &self,
        config: &ReportConfig,
        summary: ContextSummary,
        context: ExecutionContext,
    ) -> Report {
        let detailed = config.flags.contains(ReportFlags::DETAILED_MODE);
        let modules = collect_modules();
        let mut walker = context.walker(&modules);
        Report::builder(config, summary)
            .frames_from(walker.as_mut())
            .modules(modules)
            .process(self.probe.process_info(detailed))
            .system(self.probe.system_info())
            .detailed(detailed)
            .build()
    }

    fn run_hook(&self, hook: &RwLock<Option<ReportHook>>, report: &Report, name: &str) {
        let Some(hook) = hook.try_read_for(FAULT_LOCK_TIMEOUT).and_then(|h| h.clone()) else {
            return;
        };
        if isolated(|| hook(report)).is_none() {
            log::warn!("The {name} hook panicked");
            self.logs
                .append_all_from_fault(LogLevel::Warning, &format!("{name} hook panicked"));
        }
    }

    fn dispatch_guarded(&self, report: &Report, config: &ReportConfig) -> crashtrap_dispatch::DispatchSummary {
        self.run_hook(&self.pre_dispatch, report, "pre-dispatch");
        let attachments = if config.flags.contains(ReportFlags::ATTACH_REPORT) {
            self.logs.open_paths()
        } else {
            Vec::new()
        };
        let dispatcher = ReportDispatcher::new(config).with_journal(self.logs.clone());
        let summary = isolated(|| dispatcher.dispatch_report(report, config, &attachments))
            .unwrap_or_else(|| {
                let line = "report dispatch panicked".to_owned();
                self.logs.append_all_from_fault(LogLevel::Warning, &line);
                crashtrap_dispatch::DispatchSummary {
                    failures: vec![line],
                    ..Default::default()
                }
            });
        self.run_hook(&self.post_dispatch, report, "post-dispatch");
        summary
    }

    pub(crate) fn snapshot(&self) -> EngineResult<(Arc<Report>, ReportConfig)> {
        let config = self.config.read().clone().ok_or(EngineError::InvalidState {
            expected: EnginePhase::Configured,
            found: self.phase(),
        })?;
        self.ensure_running()?;
        let summary = ContextSummary::for_current_thread(FaultKind::Snapshot, "on-demand snapshot");
        let report = Arc::new(self.build_report(&config, summary, ExecutionContext::CurrentThread));
        self.reports.fetch_add(1, Ordering::SeqCst);
        *self.last_report.lock() = Some(Arc::clone(&report));
        Ok((report, config))
    }

    fn ensure_running(&self) -> EngineResult<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(EngineError::InvalidState {
                expected: EnginePhase::Configured,
                found: EnginePhase::Shutdown,
            });
        }
        Ok(())
    }
}

fn collect_modules() -> Vec<ModuleRecord> {
    let mut modules = NativeModuleEnumerator::new().collect_modules();
    modules.extend(ComponentEnumerator::new().collect_modules());
    modules
}

fn restart_application() {
    let Ok(exe) = std::env::current_exe() else {
        log::warn!("Cannot restart: executable path unknown");
        return;
    };
    match std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .spawn()
    {
        Ok(child) => log::info!("Restarted '{}' as pid {}", exe.display(), child.id()),
        Err(e) => log::warn!("Cannot restart '{}': {}", exe.display(), e),
    }
}

/// Process crash capture, configured once and passed to every entry point.
///
/// Dropping the engine shuts it down: handlers are removed, the previous
/// panic hook and signal actions come back, and every open log is closed.
#[derive(Debug)]
pub struct EngineState {
    inner: Arc<EngineInner>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    /// An unconfigured engine.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner::new()),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> EnginePhase {
        self.inner.phase()
    }

    /// Sets the report configuration. Later calls replace earlier ones.
    pub fn configure(&self, config: ReportConfig) -> EngineResult<()> {
        self.inner.ensure_running()?;
        config.validate()?;
        log::info!(
            "Crash reporting configured for '{}' (endpoint: {})",
            config.app_name,
            config.endpoint
        );
        *self.inner.config.write() = Some(config);
        Ok(())
    }

    /// The active configuration.
    pub fn config(&self) -> Option<ReportConfig> {
        self.inner.config.read().clone()
    }

    /// Hooks the fatal signals and the panic hook for the whole process.
    ///
    /// Requires a configuration. Calling it again is a no-op.
    pub fn install_process_wide_filter(&self) -> EngineResult<()> {
        self.inner.ensure_running()?;
        let Some(dump) = self.inner.config.read().as_ref().map(|c| c.dump) else {
            return Err(EngineError::InvalidState {
                expected: EnginePhase::Configured,
                found: self.phase(),
            });
        };
        if self.inner.installed.load(Ordering::SeqCst) {
            return Ok(());
        }

        handlers::activate(&self.inner)?;
        if let Err(e) = signals::apply_dump_policy(dump) {
            log::warn!("Cannot apply dump policy {dump:?}: {e}");
        }
        self.inner.installed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Protects the calling thread until the guard is dropped.
    ///
    /// Faults on threads that never registered are left to whatever handled
    /// them before the engine was installed.
    pub fn register_thread(&self) -> EngineResult<ThreadGuard> {
        if !self.inner.register_current() {
            return Err(EngineError::InvalidState {
                expected: EnginePhase::Configured,
                found: EnginePhase::Shutdown,
            });
        }
        Ok(ThreadGuard::new(Arc::clone(&self.inner)))
    }

    /// Returns `true` if the calling thread holds a [`ThreadGuard`].
    pub fn is_thread_registered(&self) -> bool {
        self.inner.is_current_registered()
    }

    /// Number of registered threads.
    pub fn registered_threads(&self) -> usize {
        self.inner.threads.lock().len()
    }

    /// Reports `source` as a fault on the calling thread.
    ///
    /// Returns `None` when the engine is shut down, unconfigured, or the
    /// thread is not registered. Never panics and never fails: problems
    /// while building or delivering the report end up in the report's
    /// degradations and as `WARNING` log entries.
    pub fn handle_fault(&self, source: FaultSource) -> Option<FaultOutcome> {
        self.inner.handle_fault(source)
    }

    /// Builds a report of the calling thread without any fault.
    pub fn capture_snapshot(&self) -> EngineResult<Arc<Report>> {
        self.inner.snapshot().map(|(report, _)| report)
    }

    /// Captures a snapshot and saves it into `dir`.
    pub fn save_snapshot(&self, dir: impl AsRef<Path>) -> EngineResult<PathBuf> {
        let (report, config) = self.inner.snapshot()?;
        let payload = self.payload(&report, &config)?;
        let receipt = ReportDispatcher::new(&config)
            .dispatch(&payload, &Destination::LocalDir(dir.as_ref().to_path_buf()))?;
        receipt
            .saved_to
            .ok_or(EngineError::Dispatch(crashtrap_dispatch::DispatchError::NoDestination))
    }

    /// Captures a snapshot and sends it to the configured endpoint.
    pub fn send_snapshot(&self) -> EngineResult<DispatchReceipt> {
        let (report, config) = self.inner.snapshot()?;
        let destination = Destination::from_endpoint(&config.endpoint)
            .ok_or(crashtrap_dispatch::DispatchError::NoDestination)?;
        let payload = self.payload(&report, &config)?;
        Ok(ReportDispatcher::new(&config).dispatch(&payload, &destination)?)
    }

    fn payload(
        &self,
        report: &Report,
        config: &ReportConfig,
    ) -> EngineResult<crashtrap_dispatch::ReportPayload> {
        let attachments = if config.flags.contains(ReportFlags::ATTACH_REPORT) {
            self.inner.logs.open_paths()
        } else {
            Vec::new()
        };
        Ok(crashtrap_dispatch::ReportPayload::build(report, config, &attachments)?)
    }

    /// Opens a log store and registers it with the engine.
    ///
    /// Fault summaries and delivery failures are appended to every
    /// registered store.
    pub fn open_log(&self, path: impl AsRef<Path>, format: LogFormat) -> EngineResult<Arc<LogStore>> {
        self.inner.ensure_running()?;
        Ok(self.inner.logs.open(path, format)?)
    }

    /// The stores registered with the engine.
    pub fn logs(&self) -> &LogRegistry {
        &self.inner.logs
    }

    /// Runs `hook` with every report before it is dispatched.
    pub fn set_pre_dispatch_hook(&self, hook: impl Fn(&Report) + Send + Sync + 'static) {
        *self.inner.pre_dispatch.write() = Some(Arc::new(hook));
    }

    /// Runs `hook` with every report after it was dispatched.
    pub fn set_post_dispatch_hook(&self, hook: impl Fn(&Report) + Send + Sync + 'static) {
        *self.inner.post_dispatch.write() = Some(Arc::new(hook));
    }

    /// Number of reports built so far.
    pub fn report_count(&self) -> u64 {
        self.inner.reports.load(Ordering::SeqCst)
    }

    /// The most recent report.
    pub fn last_report(&self) -> Option<Arc<Report>> {
        self.inner.last_report.lock().clone()
    }

    /// Removes the handlers and closes every store. Idempotent.
    pub fn shutdown(&self) -> EngineResult<()> {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::info!("Crash reporting shutting down...");
        if self.inner.installed.swap(false, Ordering::SeqCst) {
            handlers::deactivate(&self.inner);
        }
        self.inner.threads.lock().clear();

        let mut errors = self.inner.logs.close_all();
        log::info!("Crash reporting shutdown complete.");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Io(errors.remove(0)))
        }
    }
}

impl Drop for EngineState {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Error while closing logs during shutdown: {e}");
        }
    }
}
