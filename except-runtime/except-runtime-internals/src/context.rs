//! Per-thread exception contexts.
//!
//! Each thread owns one context: its frame stack, a scratch buffer for
//! formatting diagnostics, the jump-pad pointer the signal handler follows,
//! and (under the private handler policy) its saved signal dispositions.
//! Contexts live in thread-local storage and are created lazily on first
//! use.
//!
//! In a multi-threaded build a process-wide registry additionally records
//! which threads are currently inside a `try`, so that a surviving thread
//! can reclaim the bookkeeping of one that died without running its TLS
//! destructors (`cease_thread`). A context dropped normally cleans up after
//! itself.
//!
//! The fields the signal handler reads and writes (`current_pad`,
//! `pending_signal`) are plain `Cell`s: the handler must never contend with
//! a `RefCell` borrow taken by interrupted engine code.

use crate::class::ExceptionClass;
use crate::error::Error;
#[cfg(not(feature = "threads"))]
use crate::except_bail;
#[cfg(feature = "threads")]
use crate::{except_ensure, except_format_err};
use crate::exception::Exception;
use crate::frame::{Frame, FrameState, Scope};
use crate::signals;
use libc::c_void;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "threads")]
use lazy_static::lazy_static;
#[cfg(feature = "threads")]
use std::collections::HashSet;
#[cfg(feature = "threads")]
use std::sync::Mutex;

static NEXT_THREAD_IDENTITY: AtomicU64 = AtomicU64::new(1);

#[cfg(feature = "threads")]
lazy_static! {
    /// Threads currently inside some `try`. Mutated only on a context's
    /// empty/non-empty frame-stack transitions, under the lock.
    static ref THREAD_REGISTRY: Mutex<HashSet<u64>> = Mutex::new(HashSet::new());
}

thread_local! {
    static CONTEXT: Context = Context::new();
}

pub(crate) struct Context {
    id: u64,
    frames: RefCell<Vec<Frame>>,
    /// Frame-stack depths at which `return_scope` activations began; the
    /// innermost entry bounds `first_in_function`.
    activation_bases: RefCell<Vec<usize>>,
    /// The innermost armed jump pad, or null when no pad is armed. Read by
    /// the signal handler.
    current_pad: Cell<*mut c_void>,
    /// The class a just-delivered trap was translated into; consumed by the
    /// frame scaffolding after the jump lands.
    pending_signal: Cell<Option<&'static ExceptionClass>>,
    /// Scratch used to format one diagnostic line at a time, so concurrent
    /// threads' diagnostics reach the sink as whole lines.
    scratch: RefCell<String>,
    /// Whether this thread is currently counted as being inside a `try`.
    counted: Cell<bool>,
    #[cfg(not(feature = "shared-signal-handlers"))]
    saved_signals: RefCell<Option<signals::SavedHandlers>>,
}

impl Context {
    fn new() -> Self {
        let id = NEXT_THREAD_IDENTITY.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(thread = id, "created exception context");
        Context {
            id,
            frames: RefCell::new(Vec::new()),
            activation_bases: RefCell::new(Vec::new()),
            current_pad: Cell::new(ptr::null_mut()),
            pending_signal: Cell::new(None),
            scratch: RefCell::new(String::new()),
            counted: Cell::new(false),
            #[cfg(not(feature = "shared-signal-handlers"))]
            saved_signals: RefCell::new(None),
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // A context dropped with live bookkeeping belongs to a thread that
        // exited from inside a `try`; release its share of the global state
        // so handler restoration still converges.
        if self.counted.get() {
            #[cfg(feature = "threads")]
            {
                THREAD_REGISTRY.lock().unwrap().remove(&self.id);
            }
            signals::release_dead_thread();
            tracing::warn!(thread = self.id, "context dropped while inside a 'try'");
        }
    }
}

/// The engine's stable per-thread identity.
pub fn thread_identity() -> u64 {
    CONTEXT.with(|c| c.id)
}

/// Reclaims the engine bookkeeping of a dead thread.
///
/// Must be called by a surviving thread that observed the death of a thread
/// which may have been inside a `try`; the target cannot be the caller.
/// Reclaiming an unknown or already-clean thread is a no-op.
#[cfg(feature = "threads")]
pub fn cease_thread(id: u64) -> Result<(), Error> {
    except_ensure!(
        id != thread_identity(),
        "cease_thread cannot target the calling thread (thread {})",
        id
    );
    let was_inside_try = THREAD_REGISTRY
        .lock()
        .map_err(|_| except_format_err!("thread registry lock poisoned"))?
        .remove(&id);
    if was_inside_try {
        signals::release_dead_thread();
        tracing::warn!(thread = id, "reclaimed bookkeeping for a ceased thread");
    }
    Ok(())
}

/// In a single-threaded build there is nothing to reclaim.
#[cfg(not(feature = "threads"))]
pub fn cease_thread(_id: u64) -> Result<(), Error> {
    except_bail!("cease_thread requires a build with the threads feature");
}

#[cfg(feature = "threads")]
pub(crate) fn register_thread() {
    CONTEXT.with(|c| {
        THREAD_REGISTRY.lock().unwrap().insert(c.id);
        c.counted.set(true);
    });
}

#[cfg(feature = "threads")]
pub(crate) fn deregister_thread() {
    CONTEXT.with(|c| {
        THREAD_REGISTRY.lock().unwrap().remove(&c.id);
        c.counted.set(false);
    });
}

#[cfg(not(feature = "threads"))]
pub(crate) fn register_thread() {
    CONTEXT.with(|c| c.counted.set(true));
}

#[cfg(not(feature = "threads"))]
pub(crate) fn deregister_thread() {
    CONTEXT.with(|c| c.counted.set(false));
}

/// Pushes a frame for a `try` at `file:line`.
pub(crate) fn push_frame(file: &'static str, line: u32) {
    CONTEXT.with(|c| {
        let mut frames = c.frames.borrow_mut();
        let base = c.activation_bases.borrow().last().copied().unwrap_or(0);
        let first_in_function = frames.len() == base;
        frames.push(Frame::new(file, line, first_in_function));
    })
}

/// Pops the top frame; returns it and whether the stack is now empty.
pub(crate) fn pop_frame() -> (Frame, bool) {
    CONTEXT.with(|c| {
        let mut frames = c.frames.borrow_mut();
        let frame = frames.pop().expect("a frame is active when popping");
        (frame, frames.is_empty())
    })
}

pub(crate) fn frame_count() -> usize {
    CONTEXT.with(|c| c.frames.borrow().len())
}

/// The scope currently holding control on the calling thread: the innermost
/// frame's sub-block, or `Outside` when no frame is active.
pub fn current_scope() -> Scope {
    CONTEXT.with(|c| {
        c.frames
            .borrow()
            .last()
            .map(|f| f.scope)
            .unwrap_or(Scope::Outside)
    })
}

pub(crate) fn set_top_scope(scope: Scope) {
    CONTEXT.with(|c| {
        if let Some(top) = c.frames.borrow_mut().last_mut() {
            top.scope = scope;
        }
    })
}

pub(crate) fn top_state() -> FrameState {
    CONTEXT.with(|c| {
        c.frames
            .borrow()
            .last()
            .expect("a frame is active")
            .state
    })
}

/// A clone of the top frame's exception, if one is recorded.
pub(crate) fn top_exception() -> Option<Exception> {
    CONTEXT.with(|c| c.frames.borrow().last().and_then(|f| f.exception.clone()))
}

pub(crate) fn mark_caught() {
    CONTEXT.with(|c| {
        let mut frames = c.frames.borrow_mut();
        let top = frames.last_mut().expect("a frame is active");
        top.state = FrameState::Caught;
    })
}

/// Installs `exc` as the top frame's pending exception, overruling whatever
/// was pending before (an earlier exception, a deferred return, or a foreign
/// panic).
pub(crate) fn override_pending(exc: Exception) {
    CONTEXT.with(|c| {
        let mut frames = c.frames.borrow_mut();
        let top = frames.last_mut().expect("a frame is active");
        top.exception = Some(exc);
        top.pending_return = None;
        top.pending_foreign = None;
        top.state = FrameState::Pending;
    })
}

/// Installs a deferred return as the top frame's pending event.
pub(crate) fn override_with_return(
    value: Box<dyn Any + Send>,
    file: &'static str,
    line: u32,
) {
    CONTEXT.with(|c| {
        let mut frames = c.frames.borrow_mut();
        let top = frames.last_mut().expect("a frame is active");
        top.exception = Some(Exception::new(&crate::class::RETURN_EVENT, None, file, line));
        top.pending_return = Some(value);
        top.pending_foreign = None;
        top.state = FrameState::Pending;
    })
}

/// Installs a foreign panic as the top frame's pending event; it will be
/// resumed after the `finally` blocks have run.
pub(crate) fn override_with_foreign(payload: Box<dyn Any + Send>) {
    CONTEXT.with(|c| {
        let mut frames = c.frames.borrow_mut();
        let top = frames.last_mut().expect("a frame is active");
        top.exception = None;
        top.pending_return = None;
        top.pending_foreign = Some(payload);
        top.state = FrameState::Pending;
    })
}

pub(crate) fn enter_activation() {
    CONTEXT.with(|c| {
        let depth = c.frames.borrow().len();
        c.activation_bases.borrow_mut().push(depth);
    })
}

pub(crate) fn leave_activation() {
    CONTEXT.with(|c| {
        c.activation_bases
            .borrow_mut()
            .pop()
            .expect("an activation is active when leaving");
    })
}

pub(crate) fn current_pad() -> *mut c_void {
    CONTEXT.with(|c| c.current_pad.get())
}

pub(crate) fn set_current_pad(pad: *mut c_void) {
    CONTEXT.with(|c| c.current_pad.set(pad));
}

pub(crate) fn set_pending_signal(class: &'static ExceptionClass) {
    CONTEXT.with(|c| c.pending_signal.set(Some(class)));
}

pub(crate) fn take_pending_signal() -> Option<&'static ExceptionClass> {
    CONTEXT.with(|c| c.pending_signal.take())
}

pub(crate) fn with_frames<R>(f: impl FnOnce(&[Frame]) -> R) -> R {
    CONTEXT.with(|c| f(&c.frames.borrow()))
}

pub(crate) fn with_scratch<R>(f: impl FnOnce(&mut String) -> R) -> R {
    CONTEXT.with(|c| f(&mut c.scratch.borrow_mut()))
}

#[cfg(not(feature = "shared-signal-handlers"))]
pub(crate) fn store_private_handlers(saved: signals::SavedHandlers) {
    CONTEXT.with(|c| *c.saved_signals.borrow_mut() = Some(saved));
}

#[cfg(not(feature = "shared-signal-handlers"))]
pub(crate) fn take_private_handlers() -> Option<signals::SavedHandlers> {
    CONTEXT.with(|c| c.saved_signals.borrow_mut().take())
}

#[cfg(not(feature = "shared-signal-handlers"))]
pub(crate) fn with_private_handlers<R>(
    f: impl FnOnce(Option<&signals::SavedHandlers>) -> R,
) -> R {
    CONTEXT.with(|c| f(c.saved_signals.borrow().as_ref()))
}
