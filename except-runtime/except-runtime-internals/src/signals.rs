//! The synchronous-signal adapter.
//!
//! While at least one thread is inside a `try`, the engine owns the process
//! dispositions for `SIGABRT`, `SIGFPE`, `SIGILL`, `SIGSEGV`, and `SIGBUS`.
//! A trap delivered to a thread with an active frame is translated into the
//! corresponding exception class and re-enters that frame's state machine
//! through its jump pad; a trap on any other thread is handed to whatever
//! handler the host had installed.
//!
//! Under the shared policy (the `shared-signal-handlers` feature) the saved
//! dispositions live in one process-wide slot, installed by the first thread
//! to enter a `try` and restored when the count of threads inside `try`
//! reaches zero. Under the private policy each context saves and restores
//! around its own outermost `try` — and because dispositions are
//! process-wide, that policy admits only one thread inside a `try` at a
//! time; a second concurrent entrant is refused with a panic before it can
//! save the engine's own handler as the "host" disposition and clobber the
//! real one.
//!
//! This module also owns the panic hook that keeps the engine's control-flow
//! panics (throws, deferred returns) from being reported as crashes; the
//! host's hook is saved on first use and restored on last exit, and every
//! panic that is not an engine payload is delegated to it.
//!
//! Only synchronous, thread-directed signals are handled. This function is
//! only designed for traps that are the direct result of execution on the
//! faulting thread; asynchronous signals are not translated.

use crate::class::{self, ExceptionClass};
use crate::context;
use crate::machine;
use lazy_static::lazy_static;
use libc::{c_int, c_void, siginfo_t};
use nix::sys::signal::{
    pthread_sigmask, raise, sigaction, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use std::panic;
use std::sync::{Arc, Mutex};

lazy_static! {
    // TODO: work out an alternative that is signal-safe for
    // `reraise_host_signal_in_handler` under the shared policy
    static ref ENGINE_SIGNAL_STATE: Mutex<EngineSignalState> =
        Mutex::new(EngineSignalState::new());
}

type SavedPanicHook = Arc<Box<dyn Fn(&panic::PanicHookInfo<'_>) + Sync + Send + 'static>>;

struct EngineSignalState {
    /// Threads currently inside any `try`.
    try_threads: usize,
    /// Threads inside a `try` plus active return scopes; governs the hook.
    hook_users: usize,
    #[cfg(feature = "shared-signal-handlers")]
    saved: Option<SavedHandlers>,
    saved_panic_hook: Option<SavedPanicHook>,
}

impl EngineSignalState {
    fn new() -> Self {
        EngineSignalState {
            try_threads: 0,
            hook_users: 0,
            #[cfg(feature = "shared-signal-handlers")]
            saved: None,
            saved_panic_hook: None,
        }
    }
}

/// The previously-installed dispositions for each adapted signal.
pub(crate) struct SavedHandlers {
    saved_sigabrt: SigAction,
    saved_sigfpe: SigAction,
    saved_sigill: SigAction,
    saved_sigsegv: SigAction,
    saved_sigbus: SigAction,
}

// raw pointers in the saved types
unsafe impl Send for SavedHandlers {}

impl SavedHandlers {
    fn for_signal(&self, sig: Signal) -> SigAction {
        match sig {
            Signal::SIGABRT => self.saved_sigabrt.clone(),
            Signal::SIGFPE => self.saved_sigfpe.clone(),
            Signal::SIGILL => self.saved_sigill.clone(),
            Signal::SIGSEGV => self.saved_sigsegv.clone(),
            Signal::SIGBUS => self.saved_sigbus.clone(),
            sig => panic!("signal {:?} is not adapted", sig),
        }
    }
}

/// Called when a thread's frame stack goes from empty to non-empty.
///
/// Under the private policy this refuses a second concurrent entrant:
/// dispositions are process-wide, so a second thread's `sigaction()` would
/// save the engine's own handler as the "host" disposition and clobber the
/// real one on exit. The refusal happens before any state changes.
pub(crate) fn thread_entered_try() {
    {
        let mut state = ENGINE_SIGNAL_STATE.lock().unwrap();
        #[cfg(not(feature = "shared-signal-handlers"))]
        {
            if state.try_threads != 0 {
                drop(state);
                panic!(
                    "the private signal-handler policy admits one thread inside a 'try' at a \
                     time; build with the shared-signal-handlers feature for overlapping try \
                     scopes"
                );
            }
        }
        state.try_threads += 1;
        state.hook_users += 1;
        if state.hook_users == 1 {
            state.saved_panic_hook = Some(install_filter_hook());
        }
        #[cfg(feature = "shared-signal-handlers")]
        {
            if state.try_threads == 1 {
                state.saved = Some(unsafe { install_engine_handlers() });
                tracing::debug!("installed engine signal handlers");
            }
        }
    }
    #[cfg(not(feature = "shared-signal-handlers"))]
    {
        context::store_private_handlers(unsafe { install_engine_handlers() });
        tracing::debug!("installed engine signal handlers for this context");
    }
    context::register_thread();
}

/// Called when a thread's frame stack empties. Returns true iff the host
/// dispositions were actually restored, which is what decides whether an
/// unhandled trap is re-raised afterwards.
pub(crate) fn thread_left_try() -> bool {
    context::deregister_thread();
    let mut state = ENGINE_SIGNAL_STATE.lock().unwrap();
    state.try_threads -= 1;
    state.hook_users -= 1;
    if state.hook_users == 0 {
        restore_panic_hook(&mut state);
    }
    #[cfg(feature = "shared-signal-handlers")]
    {
        if state.try_threads == 0 {
            if let Some(saved) = state.saved.take() {
                unsafe { restore_host_handlers(&saved) };
                tracing::debug!("restored host signal handlers");
                return true;
            }
        }
        return false;
    }
    #[cfg(not(feature = "shared-signal-handlers"))]
    {
        drop(state);
        match context::take_private_handlers() {
            Some(saved) => {
                unsafe { restore_host_handlers(&saved) };
                tracing::debug!("restored host signal handlers for this context");
                return true;
            }
            None => return false,
        }
    }
}

/// Releases the global share of a thread that died inside a `try` without
/// running its own teardown. Under the private policy the dead thread's
/// saved dispositions are gone with it; only the counters can be repaired.
pub(crate) fn release_dead_thread() {
    let mut state = ENGINE_SIGNAL_STATE.lock().unwrap();
    state.try_threads -= 1;
    state.hook_users -= 1;
    if state.hook_users == 0 {
        restore_panic_hook(&mut state);
    }
    #[cfg(feature = "shared-signal-handlers")]
    {
        if state.try_threads == 0 {
            if let Some(saved) = state.saved.take() {
                unsafe { restore_host_handlers(&saved) };
                tracing::debug!("restored host signal handlers after thread death");
            }
        }
    }
}

/// Called around a `return_scope` activation so the panic hook covers
/// deferred returns taken outside any `try`.
pub(crate) fn scope_entered() {
    let mut state = ENGINE_SIGNAL_STATE.lock().unwrap();
    state.hook_users += 1;
    if state.hook_users == 1 {
        state.saved_panic_hook = Some(install_filter_hook());
    }
}

pub(crate) fn scope_left() {
    let mut state = ENGINE_SIGNAL_STATE.lock().unwrap();
    state.hook_users -= 1;
    if state.hook_users == 0 {
        restore_panic_hook(&mut state);
    }
}

/// Whether the engine currently owns the signal dispositions. Under the
/// private policy this reports on the calling thread's context.
pub fn handlers_installed() -> bool {
    #[cfg(feature = "shared-signal-handlers")]
    {
        return ENGINE_SIGNAL_STATE.lock().unwrap().saved.is_some();
    }
    #[cfg(not(feature = "shared-signal-handlers"))]
    {
        return context::with_private_handlers(|saved| saved.is_some());
    }
}

/// Re-raises a trap after the host dispositions have been restored, so the
/// surrounding process observes the original signal.
pub(crate) fn reraise_trap(signum: i32) {
    let sig = Signal::try_from(signum).expect("recorded signal number is a valid signal");
    tracing::warn!(signal = ?sig, "re-raising unhandled trap with host disposition");
    raise(sig).expect("raise succeeds");
}

fn install_filter_hook() -> SavedPanicHook {
    let saved_hook = Arc::new(panic::take_hook());
    let closure_saved_hook = saved_hook.clone();
    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        if payload.is::<machine::ThrowPayload>()
            || payload.is::<machine::ReturnPayload>()
            || payload.is::<machine::FunctionReturn>()
        {
            // engine control flow rides this panic; it is not a crash, so
            // say nothing
        } else {
            closure_saved_hook(panic_info);
        }
    }));
    saved_hook
}

fn restore_panic_hook(state: &mut EngineSignalState) {
    drop(panic::take_hook());
    state
        .saved_panic_hook
        .take()
        .map(|hook| Arc::try_unwrap(hook).map(panic::set_hook));
}

unsafe fn install_engine_handlers() -> SavedHandlers {
    let mut masked_signals = SigSet::empty();
    masked_signals.add(Signal::SIGABRT);
    masked_signals.add(Signal::SIGFPE);
    masked_signals.add(Signal::SIGILL);
    masked_signals.add(Signal::SIGSEGV);
    masked_signals.add(Signal::SIGBUS);

    // sigaction dispositions persist across delivery, so the handler does
    // not need to re-arm itself.
    let sa = SigAction::new(
        SigHandler::SigAction(handle_signal),
        SaFlags::SA_RESTART | SaFlags::SA_SIGINFO,
        masked_signals,
    );
    SavedHandlers {
        saved_sigabrt: sigaction(Signal::SIGABRT, &sa).expect("sigaction succeeds"),
        saved_sigfpe: sigaction(Signal::SIGFPE, &sa).expect("sigaction succeeds"),
        saved_sigill: sigaction(Signal::SIGILL, &sa).expect("sigaction succeeds"),
        saved_sigsegv: sigaction(Signal::SIGSEGV, &sa).expect("sigaction succeeds"),
        saved_sigbus: sigaction(Signal::SIGBUS, &sa).expect("sigaction succeeds"),
    }
}

unsafe fn restore_host_handlers(saved: &SavedHandlers) {
    sigaction(Signal::SIGABRT, &saved.saved_sigabrt).expect("sigaction succeeds");
    sigaction(Signal::SIGFPE, &saved.saved_sigfpe).expect("sigaction succeeds");
    sigaction(Signal::SIGILL, &saved.saved_sigill).expect("sigaction succeeds");
    sigaction(Signal::SIGSEGV, &saved.saved_sigsegv).expect("sigaction succeeds");
    sigaction(Signal::SIGBUS, &saved.saved_sigbus).expect("sigaction succeeds");
}

/// Signal handler installed while any thread is inside a `try`.
///
/// Every installed signal maps to exactly one exception class; a signal this
/// handler will not translate is never installed for, so an unknown signal
/// here is a bug.
extern "C" fn handle_signal(signum: c_int, siginfo_ptr: *mut siginfo_t, ucontext_ptr: *mut c_void) {
    let signal = Signal::try_from(signum).expect("signum is a valid signal");
    let class: &'static ExceptionClass = match signal {
        Signal::SIGABRT => &class::ABNORMAL_TERMINATION,
        Signal::SIGFPE => &class::ARITHMETIC_EXCEPTION,
        Signal::SIGILL => &class::ILLEGAL_INSTRUCTION,
        Signal::SIGSEGV => &class::SEGMENTATION_FAULT,
        Signal::SIGBUS => &class::BUS_ERROR,
        signal => panic!("unexpected signal in engine signal handler: {:?}", signal),
    };
    // Remember the number on the class so an unhandled trap can be re-raised
    // at teardown.
    class.record_signal(signum);

    let pad = context::current_pad();
    if pad.is_null() {
        // A trap on a thread with no active `try`: restore control to
        // whatever the host installed, and return if that handler returns.
        unsafe {
            reraise_host_signal_in_handler(signal, signum, siginfo_ptr, ucontext_ptr);
        }
        return;
    }

    context::set_pending_signal(class);
    unsafe { crate::sysdeps::pad_raise(pad) }
}

unsafe fn reraise_host_signal_in_handler(
    sig: Signal,
    signum: c_int,
    siginfo_ptr: *mut siginfo_t,
    ucontext_ptr: *mut c_void,
) {
    let saved_handler = {
        #[cfg(feature = "shared-signal-handlers")]
        let looked_up = ENGINE_SIGNAL_STATE
            .lock()
            .unwrap()
            .saved
            .as_ref()
            .map(|saved| saved.for_signal(sig));
        #[cfg(not(feature = "shared-signal-handlers"))]
        let looked_up = context::with_private_handlers(|saved| saved.map(|s| s.for_signal(sig)));

        match looked_up {
            Some(handler) => handler,
            None => {
                // This case is fishy: the last frame spun down and restored
                // the host handlers while this handler was already running.
                // Unmask and re-raise; the reinstalled host handler takes it
                // from here. A second fault before then is a double fault
                // and the process is going down anyway.
                let mut unmask = SigSet::empty();
                unmask.add(sig);
                pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&unmask), None)
                    .expect("pthread_sigmask succeeds");
                raise(sig).expect("raise succeeds");
                return;
            }
        }
    };

    match saved_handler.handler() {
        SigHandler::SigDfl => {
            // reinstall the default disposition and re-raise; this should
            // terminate the program
            sigaction(sig, &saved_handler).expect("sigaction succeeds");
            let mut unmask = SigSet::empty();
            unmask.add(sig);
            pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&unmask), None)
                .expect("pthread_sigmask succeeds");
            raise(sig).expect("raise succeeds");
        }
        SigHandler::SigIgn => {
            // nothing to do; a host ignoring these signals is on its own
        }
        SigHandler::Handler(f) => f(signum),
        SigHandler::SigAction(f) => f(signum, siginfo_ptr, ucontext_ptr),
    }
}
