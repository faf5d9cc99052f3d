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

//! POSIX fault signal plumbing.
//!
//! [`install`] routes SIGSEGV, SIGBUS, SIGILL, SIGFPE and SIGABRT to a
//! single [`FaultCallback`] that runs on the faulting thread, on its
//! alternate signal stack when one is set up with [`AltStack`]. The
//! callback's [`ExitMode`] decides what happens next: re-raise with the
//! default disposition, chain to the handler that was installed before, or
//! return to the faulting code.
//!
//! On non-Unix targets every function is a no-op.

use crashtrap_core::{DumpPolicy, ExitMode};

/// Called on the faulting thread. Must not unwind.
pub type FaultCallback = fn(&SignalInfo) -> ExitMode;

/// What the kernel told us about a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalInfo {
    /// Signal number.
    pub signal: i32,
    /// `si_code`.
    pub code: i32,
    /// Faulting data address, for memory and arithmetic faults.
    pub fault_address: Option<u64>,
    /// Program counter at the fault, when the architecture is supported.
    pub pc: Option<u64>,
}

impl SignalInfo {
    /// A synthetic fault for `signal`, as if raised by the process itself.
    pub fn simulated(signal: i32) -> Self {
        Self {
            signal,
            code: 0,
            fault_address: None,
            pc: None,
        }
    }

    /// Conventional name, e.g. `SIGSEGV`.
    pub fn name(&self) -> &'static str {
        imp::signal_name(self.signal)
    }

    /// Name followed by a short explanation.
    pub fn description(&self) -> String {
        format!("{} ({})", self.name(), imp::signal_meaning(self.signal))
    }
}

pub use imp::{
    apply_dump_policy, install, is_installed, uninstall, AltStack, FATAL_SIGNALS, SIGABRT,
    SIGSEGV,
};

#[cfg(unix)]
mod imp {
    use super::{DumpPolicy, ExitMode, FaultCallback, SignalInfo};
    use std::cell::{Cell, UnsafeCell};
    use std::ffi::{c_int, c_void};
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Segmentation fault.
    pub const SIGSEGV: i32 = libc::SIGSEGV;
    /// Abort.
    pub const SIGABRT: i32 = libc::SIGABRT;

    /// Signals routed to the fault callback.
    pub const FATAL_SIGNALS: [i32; 5] = [
        libc::SIGSEGV,
        libc::SIGBUS,
        libc::SIGILL,
        libc::SIGFPE,
        libc::SIGABRT,
    ];

    static CALLBACK: AtomicUsize = AtomicUsize::new(0);
    static INSTALLED: AtomicBool = AtomicBool::new(false);
    static INSTALL_LOCK: Mutex<()> = Mutex::new(());

    /// Actions replaced by [`install`]. Written only under `INSTALL_LOCK`
    /// while our handler is not installed; read by the handler.
    struct SavedActions(UnsafeCell<[Option<libc::sigaction>; 5]>);
    unsafe impl Sync for SavedActions {}
    static PREVIOUS: SavedActions = SavedActions(UnsafeCell::new([None; 5]));

    thread_local! {
        static IN_HANDLER: Cell<bool> = const { Cell::new(false) };
    }

    pub(super) fn signal_name(signal: i32) -> &'static str {
        match signal {
            libc::SIGSEGV => "SIGSEGV",
            libc::SIGBUS => "SIGBUS",
            libc::SIGILL => "SIGILL",
            libc::SIGFPE => "SIGFPE",
            libc::SIGABRT => "SIGABRT",
            _ => "SIGNAL",
        }
    }

    pub(super) fn signal_meaning(signal: i32) -> &'static str {
        match signal {
            libc::SIGSEGV => "invalid memory reference",
            libc::SIGBUS => "bus error",
            libc::SIGILL => "illegal instruction",
            libc::SIGFPE => "arithmetic exception",
            libc::SIGABRT => "abort",
            _ => "unexpected signal",
        }
    }

    /// Routes the fatal signals to `callback`. Calling it again only
    /// replaces the callback.
    pub fn install(callback: FaultCallback) -> io::Result<()> {
        let _guard = INSTALL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        CALLBACK.store(callback as usize, Ordering::SeqCst);
        if INSTALLED.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut previous = [None; 5];
        for (slot, &signal) in previous.iter_mut().zip(FATAL_SIGNALS.iter()) {
            unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = handle_signal as usize;
                action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
                libc::sigemptyset(&mut action.sa_mask);
                let mut old: libc::sigaction = std::mem::zeroed();
                if libc::sigaction(signal, &action, &mut old) != 0 {
                    let err = io::Error::last_os_error();
                    restore(&previous);
                    return Err(err);
                }
                *slot = Some(old);
            }
        }
        unsafe {
            *PREVIOUS.0.get() = previous;
        }
        INSTALLED.store(true, Ordering::SeqCst);
        log::info!("Installed fault handlers for {} signals", FATAL_SIGNALS.len());
        Ok(())
    }

    fn restore(actions: &[Option<libc::sigaction>; 5]) {
        for (action, &signal) in actions.iter().zip(FATAL_SIGNALS.iter()) {
            if let Some(action) = action {
                unsafe {
                    libc::sigaction(signal, action, std::ptr::null_mut());
                }
            }
        }
    }

    /// Puts back the actions that were active before [`install`].
    pub fn uninstall() {
        let _guard = INSTALL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        if !INSTALLED.swap(false, Ordering::SeqCst) {
            return;
        }
        let previous = unsafe { *PREVIOUS.0.get() };
        restore(&previous);
        CALLBACK.store(0, Ordering::SeqCst);
        log::info!("Removed fault handlers");
    }

    /// Returns `true` while our handlers are installed.
    pub fn is_installed() -> bool {
        INSTALLED.load(Ordering::SeqCst)
    }

    extern "C" fn handle_signal(signal: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
        if IN_HANDLER.with(|flag| flag.replace(true)) {
            // Fault inside the fault handler: give up on reporting.
            terminate(signal);
            return;
        }

        let details = unsafe { read_signal_info(signal, info, context) };
        let callback = CALLBACK.load(Ordering::SeqCst);
        let mode = if callback == 0 {
            ExitMode::ContinueSearch
        } else {
            let callback: FaultCallback = unsafe { std::mem::transmute(callback) };
            callback(&details)
        };

        IN_HANDLER.with(|flag| flag.set(false));
        match mode {
            ExitMode::Resume => {}
            ExitMode::ContinueSearch => unsafe { chain(signal, info, context) },
            ExitMode::Terminate => terminate(signal),
        }
    }

    unsafe fn read_signal_info(
        signal: c_int,
        info: *mut libc::siginfo_t,
        context: *mut c_void,
    ) -> SignalInfo {
        let mut details = SignalInfo::simulated(signal);
        if info.is_null() {
            return details;
        }
        details.code = (*info).si_code;
        if matches!(
            signal,
            libc::SIGSEGV | libc::SIGBUS | libc::SIGILL | libc::SIGFPE
        ) {
            let address = fault_address(info);
            details.fault_address = (address != 0).then_some(address);
        }
        details.pc = program_counter(context);
        details
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe fn fault_address(info: *mut libc::siginfo_t) -> u64 {
        (*info).si_addr() as u64
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    unsafe fn fault_address(info: *mut libc::siginfo_t) -> u64 {
        (*info).si_addr as u64
    }

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    unsafe fn program_counter(context: *mut c_void) -> Option<u64> {
        let context = context as *const libc::ucontext_t;
        (!context.is_null())
            .then(|| (*context).uc_mcontext.gregs[libc::REG_RIP as usize] as u64)
    }

    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    unsafe fn program_counter(context: *mut c_void) -> Option<u64> {
        let context = context as *const libc::ucontext_t;
        (!context.is_null()).then(|| (*context).uc_mcontext.pc)
    }

    #[cfg(not(all(
        target_os = "linux",
        any(target_arch = "x86_64", target_arch = "aarch64")
    )))]
    unsafe fn program_counter(_context: *mut c_void) -> Option<u64> {
        None
    }

    /// Hands the signal to the action that was installed before ours.
    unsafe fn chain(signal: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
        let previous = &*PREVIOUS.0.get();
        let action = FATAL_SIGNALS
            .iter()
            .position(|&s| s == signal)
            .and_then(|index| previous[index]);
        let Some(action) = action else {
            terminate(signal);
            return;
        };
        match action.sa_sigaction {
            libc::SIG_DFL => terminate(signal),
            libc::SIG_IGN => {}
            handler if action.sa_flags & libc::SA_SIGINFO != 0 => {
                let handler: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) =
                    std::mem::transmute(handler);
                handler(signal, info, context);
            }
            handler => {
                let handler: extern "C" fn(c_int) = std::mem::transmute(handler);
                handler(signal);
            }
        }
    }

    /// Restores the default action and re-raises. The signal is blocked
    /// while the handler runs, so it is delivered once the handler returns
    /// and the process dies with the original signal.
    fn terminate(signal: c_int) {
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
            libc::raise(signal);
        }
    }

    const ALT_STACK_SIZE: usize = 64 * 1024;

    /// A per-thread alternate signal stack, so faults caused by stack
    /// exhaustion can still run the handler.
    ///
    /// If the thread already has one (the Rust runtime installs its own on
    /// most threads) it is kept and nothing is allocated.
    #[derive(Debug)]
    pub struct AltStack {
        mapping: Option<(*mut c_void, usize)>,
    }

    impl AltStack {
        /// Ensures the calling thread has an alternate signal stack.
        pub fn install() -> io::Result<Self> {
            unsafe {
                let mut current: libc::stack_t = std::mem::zeroed();
                if libc::sigaltstack(std::ptr::null(), &mut current) != 0 {
                    return Err(io::Error::last_os_error());
                }
                if current.ss_flags & libc::SS_DISABLE == 0 {
                    return Ok(Self { mapping: None });
                }

                let page = libc::sysconf(libc::_SC_PAGESIZE).max(4096) as usize;
                let length = ALT_STACK_SIZE + page;
                let memory = libc::mmap(
                    std::ptr::null_mut(),
                    length,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANON,
                    -1,
                    0,
                );
                if memory == libc::MAP_FAILED {
                    return Err(io::Error::last_os_error());
                }
                // Guard page below the stack.
                libc::mprotect(memory, page, libc::PROT_NONE);

                let stack = libc::stack_t {
                    ss_sp: (memory as *mut u8).add(page) as *mut c_void,
                    ss_flags: 0,
                    ss_size: ALT_STACK_SIZE,
                };
                if libc::sigaltstack(&stack, std::ptr::null_mut()) != 0 {
                    let err = io::Error::last_os_error();
                    libc::munmap(memory, length);
                    return Err(err);
                }
                Ok(Self {
                    mapping: Some((memory, length)),
                })
            }
        }

        /// Returns `true` if this guard allocated the stack.
        pub fn is_owned(&self) -> bool {
            self.mapping.is_some()
        }
    }

    impl Drop for AltStack {
        fn drop(&mut self) {
            if let Some((memory, length)) = self.mapping.take() {
                unsafe {
                    let disable = libc::stack_t {
                        ss_sp: std::ptr::null_mut(),
                        ss_flags: libc::SS_DISABLE,
                        ss_size: 0,
                    };
                    libc::sigaltstack(&disable, std::ptr::null_mut());
                    libc::munmap(memory, length);
                }
            }
        }
    }

    /// Adjusts the core file size limit for `policy`.
    pub fn apply_dump_policy(policy: DumpPolicy) -> io::Result<()> {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        unsafe {
            if libc::getrlimit(libc::RLIMIT_CORE, &mut limit) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        match policy {
            DumpPolicy::Mini => return Ok(()),
            DumpPolicy::None => limit.rlim_cur = 0,
            DumpPolicy::Full => limit.rlim_cur = limit.rlim_max,
        }
        unsafe {
            if libc::setrlimit(libc::RLIMIT_CORE, &limit) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        log::debug!("Core file limit set to {} for {:?}", limit.rlim_cur, policy);
        Ok(())
    }
}

#[cfg(not(unix))]
mod imp {
    use super::{DumpPolicy, FaultCallback};
    use std::io;

    /// Segmentation fault.
    pub const SIGSEGV: i32 = 11;
    /// Abort.
    pub const SIGABRT: i32 = 22;
    /// Signals routed to the fault callback.
    pub const FATAL_SIGNALS: [i32; 0] = [];

    pub(super) fn signal_name(_signal: i32) -> &'static str {
        "SIGNAL"
    }

    pub(super) fn signal_meaning(_signal: i32) -> &'static str {
        "unsupported platform"
    }

    /// No-op on this platform.
    pub fn install(_callback: FaultCallback) -> io::Result<()> {
        Ok(())
    }

    /// No-op on this platform.
    pub fn uninstall() {}

    /// Always `false` on this platform.
    pub fn is_installed() -> bool {
        false
    }

    /// No-op on this platform.
    #[derive(Debug)]
    pub struct AltStack;

    impl AltStack {
        /// No-op on this platform.
        pub fn install() -> io::Result<Self> {
            Ok(Self)
        }

        /// Always `false` on this platform.
        pub fn is_owned(&self) -> bool {
            false
        }
    }

    /// No-op on this platform.
    pub fn apply_dump_policy(_policy: DumpPolicy) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_signal_description() {
        let info = SignalInfo::simulated(SIGSEGV);
        assert_eq!(info.name(), "SIGSEGV");
        assert_eq!(info.description(), "SIGSEGV (invalid memory reference)");
    }

    #[test]
    fn test_alt_stack_guard_is_reentrant_per_thread() {
        std::thread::spawn(|| {
            let first = AltStack::install().unwrap();
            let second = AltStack::install().unwrap();
            assert!(!second.is_owned());
            drop(second);
            drop(first);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_mini_dump_policy_leaves_limit_untouched() {
        apply_dump_policy(DumpPolicy::Mini).unwrap();
    }
}
