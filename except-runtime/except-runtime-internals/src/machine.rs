//! The `try`/`catch`/`finally` state machine.
//!
//! One [`run_frame`] call is one lexical `try … catch* … finally` construct;
//! the [`attempt!`](crate::attempt) macro expands to it. The frame's user
//! blocks run behind a single dispatcher closure so one set of captures
//! serves the `try` body, every `catch` body, and the `finally` body.
//!
//! Control flow out of user code rides panic unwinding with typed payloads:
//! [`ThrowPayload`] for throws, [`ReturnPayload`] for deferred returns still
//! propagating between frames, and [`FunctionReturn`] for a deferred return
//! that has reached its function boundary and is travelling to the enclosing
//! [`return_scope`]. Each user block is individually wrapped in
//! `catch_unwind`, which is what gives the protocol its shape: a throw from
//! a `try` block is seen before the catch clauses run, a throw from a
//! `catch` or `finally` body is seen after they can no longer run, and in
//! both cases the new exception overrules whatever was pending.
//!
//! Synchronous signals cannot unwind out of their handler, so they re-enter
//! the frame through its jump pad instead (see `sysdeps`); the pad re-entry
//! joins this same machine at the phase the recorded scope dictates.

use crate::class;
use crate::context;
use crate::diagnostics;
use crate::exception::Exception;
use crate::frame::{FrameState, Scope, TrySite};
use crate::signals;
use crate::sysdeps;
use crate::validator;
use std::any::Any;
use std::panic::{catch_unwind, panic_any, resume_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

/// A thrown exception travelling between frames.
pub(crate) struct ThrowPayload {
    pub(crate) exception: Exception,
}

/// A deferred return travelling between frames of the same function.
pub(crate) struct ReturnPayload {
    pub(crate) value: Box<dyn Any + Send>,
    pub(crate) file: &'static str,
    pub(crate) line: u32,
}

/// A deferred return that has crossed its `firstInFunction` frame and is
/// travelling to the enclosing `return_scope`.
pub(crate) struct FunctionReturn {
    pub(crate) value: Box<dyn Any + Send>,
}

/// One catch clause's metadata: the class it names and the source line of
/// the construct, used by the debug validator's diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct ArmSpec {
    pub class: &'static class::ExceptionClass,
    pub line: u32,
}

/// Selects which user block the dispatcher closure should run.
pub enum Clause<'a> {
    Try,
    /// The catch body at this index, receiving the matched exception.
    Catch(usize, &'a Exception),
    Finally,
}

/// Raises a fresh exception of `class` from `file:line`.
pub fn throw_new(class: &'static class::ExceptionClass, file: &'static str, line: u32) -> ! {
    raise(Exception::new(class, None, file, line))
}

/// Raises a fresh exception of `class` carrying `data`.
pub fn throw_with_data<T: Any + Send + Sync>(
    class: &'static class::ExceptionClass,
    data: T,
    file: &'static str,
    line: u32,
) -> ! {
    raise(Exception::new(class, Some(Arc::new(data)), file, line))
}

/// Re-raises a caught exception with its original class, data, and origin.
pub(crate) fn rethrow(exc: Exception) -> ! {
    raise(exc)
}

fn raise(exc: Exception) -> ! {
    if context::frame_count() == 0 {
        // No frame can catch this; apply the terminal action immediately.
        // The host dispositions are active (handlers are installed only
        // while frames exist), so a trap class with a recorded signal
        // re-raises it.
        terminal_action(exc.clone(), true);
        panic!("uncaught {} with no active 'try'", exc.class().name());
    }
    panic_any(ThrowPayload { exception: exc });
}

/// Begins a deferred return: raises `ReturnEvent` so every enclosing
/// `finally` up to the function boundary runs, then the enclosing
/// [`return_scope`] produces `value`.
#[doc(hidden)]
pub fn early_return(value: Box<dyn Any + Send>, file: &'static str, line: u32) -> ! {
    if context::frame_count() == 0 {
        panic_any(FunctionReturn { value });
    }
    panic_any(ReturnPayload { value, file, line });
}

/// Marks a function-activation boundary for deferred returns.
///
/// Runs `body`; if a `try_return!` fires anywhere inside (after running
/// every intervening `finally`), its value becomes the result. The value's
/// type must be the closure's return type.
pub fn return_scope<R: Any>(body: impl FnOnce() -> R) -> R {
    context::enter_activation();
    signals::scope_entered();
    let result = catch_unwind(AssertUnwindSafe(body));
    signals::scope_left();
    context::leave_activation();
    match result {
        Ok(value) => value,
        Err(payload) => {
            if payload.is::<FunctionReturn>() {
                let fr = payload
                    .downcast::<FunctionReturn>()
                    .expect("payload is a FunctionReturn");
                match fr.value.downcast::<R>() {
                    Ok(value) => *value,
                    Err(_) => panic!(
                        "deferred return value does not have the return scope's type"
                    ),
                }
            } else {
                resume_unwind(payload)
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    Try,
    Catches,
    Finally,
    Done,
}

struct PhaseEnv<'a> {
    arms: &'a [ArmSpec],
    block: &'a mut dyn FnMut(Clause<'_>),
    phase: Phase,
}

impl<'a> PhaseEnv<'a> {
    /// Runs the remaining phases of the frame. Interrupted and re-entered
    /// when a signal jump lands in the middle of a user block.
    fn run(&mut self) {
        loop {
            match self.phase {
                Phase::Try => {
                    context::set_top_scope(Scope::Try);
                    let result = catch_unwind(AssertUnwindSafe(|| (self.block)(Clause::Try)));
                    context::set_top_scope(Scope::Internal);
                    if let Err(payload) = result {
                        intercept(payload);
                    }
                    self.phase = Phase::Catches;
                }
                Phase::Catches => {
                    self.dispatch_catches();
                    self.phase = Phase::Finally;
                }
                Phase::Finally => {
                    context::set_top_scope(Scope::Finally);
                    let result = catch_unwind(AssertUnwindSafe(|| (self.block)(Clause::Finally)));
                    context::set_top_scope(Scope::Internal);
                    if let Err(payload) = result {
                        intercept(payload);
                    }
                    self.phase = Phase::Done;
                }
                Phase::Done => return,
            }
        }
    }

    /// Runs the first catch clause whose class the pending exception derives
    /// from, if any. Later clauses are never consulted, and an exception
    /// thrown by the selected body does not re-enter the clause list.
    fn dispatch_catches(&mut self) {
        if context::top_state() != FrameState::Pending {
            return;
        }
        // A pending foreign panic has no class and matches nothing; a
        // pending ReturnEvent is internal and must stay invisible here.
        let exc = match context::top_exception() {
            Some(exc) => exc,
            None => return,
        };
        if ptr::eq(exc.class(), &class::RETURN_EVENT) {
            return;
        }
        for (index, arm) in self.arms.iter().enumerate() {
            if exc.class().is_derived(arm.class) {
                context::mark_caught();
                context::set_top_scope(Scope::Catch);
                let result =
                    catch_unwind(AssertUnwindSafe(|| (self.block)(Clause::Catch(index, &exc))));
                context::set_top_scope(Scope::Internal);
                if let Err(payload) = result {
                    intercept(payload);
                }
                break;
            }
        }
    }
}

/// Records an unwind caught at a block boundary into the top frame,
/// overruling whatever was pending before.
fn intercept(payload: Box<dyn Any + Send>) {
    if payload.is::<ThrowPayload>() {
        let tp = payload
            .downcast::<ThrowPayload>()
            .expect("payload is a ThrowPayload");
        context::override_pending(tp.exception);
    } else if payload.is::<ReturnPayload>() {
        let rp = payload
            .downcast::<ReturnPayload>()
            .expect("payload is a ReturnPayload");
        context::override_with_return(rp.value, rp.file, rp.line);
    } else if payload.is::<FunctionReturn>() {
        panic!("a deferred return escaped its function boundary");
    } else {
        context::override_with_foreign(payload);
    }
}

/// Runs one `try … catch* … finally` construct. This is the expansion
/// target of [`attempt!`](crate::attempt); the dispatcher closure receives a
/// [`Clause`] selecting which user block to execute.
pub fn run_frame(
    site: &'static TrySite,
    file: &'static str,
    line: u32,
    arms: &[ArmSpec],
    block: &mut dyn FnMut(Clause<'_>),
) {
    // Enter the try scope before the frame exists: if the adapter refuses
    // entry (private-policy overlap), the engine's state is untouched.
    if context::frame_count() == 0 {
        signals::thread_entered_try();
    }
    context::push_frame(file, line);
    if cfg!(debug_assertions) {
        validator::check_catch_list(site, file, line, arms);
    }

    let mut env = PhaseEnv {
        arms,
        block,
        phase: Phase::Try,
    };
    loop {
        let completed = sysdeps::pad_enter(&mut || env.run());
        if completed {
            break;
        }
        // A signal jump landed: the handler recorded the translated class,
        // and the phase the block was interrupted in dictates where the
        // machine resumes. A signal during `finally` must not run it again.
        let signal_class =
            context::take_pending_signal().expect("signal jump recorded its class");
        context::override_pending(Exception::new(signal_class, None, "?", 0));
        tracing::debug!(
            class = signal_class.name(),
            "synchronous trap rejoined its frame"
        );
        env.phase = match env.phase {
            Phase::Try => Phase::Catches,
            Phase::Catches => Phase::Finally,
            Phase::Finally | Phase::Done => Phase::Done,
        };
        if env.phase == Phase::Done {
            break;
        }
    }

    teardown();
}

/// The frame's final act: pop it and resolve whatever is still pending.
fn teardown() {
    let (mut frame, now_empty) = context::pop_frame();
    let mut handlers_restored = false;
    if now_empty {
        handlers_restored = signals::thread_left_try();
    }

    if frame.state != FrameState::Pending {
        return;
    }

    // A foreign panic has had its finally blocks; let it keep going.
    if let Some(payload) = frame.pending_foreign.take() {
        resume_unwind(payload);
    }

    let exc = frame
        .exception
        .take()
        .expect("a pending frame carries an exception");

    if ptr::eq(exc.class(), &class::RETURN_EVENT) {
        let value = frame
            .pending_return
            .take()
            .expect("a pending return carries a value");
        if frame.first_in_function {
            // The deferred return stops crossing frames here and travels
            // straight to the enclosing return_scope.
            resume_unwind(Box::new(FunctionReturn { value }));
        }
        resume_unwind(Box::new(ReturnPayload {
            value,
            file: exc.file(),
            line: exc.line(),
        }));
    }

    if !now_empty {
        // Inner level: rethrow into the enclosing frame.
        resume_unwind(Box::new(ThrowPayload { exception: exc }));
    }

    terminal_action(exc, handlers_restored);
}

/// Resolves an exception whose frame stack has emptied. The class alone
/// picks the action.
fn terminal_action(exc: Exception, handlers_restored: bool) {
    if ptr::eq(exc.class(), &class::FAILED_ASSERTION) {
        assertion_terminator(&exc);
        return;
    }
    if exc.class().is_derived(&class::RUNTIME_EXCEPTION) && handlers_restored {
        if let Some(signum) = exc.class().signal() {
            signals::reraise_trap(signum);
            return;
        }
    }
    diagnostics::lost(&exc);
}

fn assertion_terminator(exc: &Exception) {
    match exc.data().and_then(|d| d.downcast_ref::<&'static str>()) {
        Some(expr) => diagnostics::emit(format_args!("{} Failed expression: {}", exc.message(), expr)),
        None => diagnostics::emit(format_args!("{}", exc.message())),
    }
    if cfg!(feature = "abort-on-assert") {
        std::process::abort();
    }
}

/// One `try … catch* … finally` construct.
///
/// Zero or more `catch (CLASS, e)` clauses follow the `try` block, and
/// exactly one `finally` block (possibly empty) closes the construct. The
/// first clause whose class the thrown exception derives from receives it;
/// the `finally` block runs exactly once on every path out.
///
/// ```
/// use except_runtime_internals::{attempt, throw};
/// use except_runtime_internals::class::EXCEPTION;
///
/// attempt! {
///     try {
///         throw!(EXCEPTION);
///     }
///     catch (EXCEPTION, e) {
///         println!("{}", e.message());
///     }
///     finally {}
/// }
/// ```
#[macro_export]
macro_rules! attempt {
    (
        try $try_body:block
        $( catch ($class:path, $exc:ident) $catch_body:block )*
        finally $finally_body:block
    ) => {{
        static __SITE: $crate::frame::TrySite = $crate::frame::TrySite::new();
        let __arms: &[$crate::machine::ArmSpec] = &[
            $( $crate::machine::ArmSpec { class: &$class, line: ::core::line!() }, )*
        ];
        $crate::machine::run_frame(
            &__SITE,
            ::core::file!(),
            ::core::line!(),
            __arms,
            &mut |__clause| match __clause {
                $crate::machine::Clause::Try => {
                    $try_body;
                }
                $crate::machine::Clause::Finally => {
                    $finally_body;
                }
                #[allow(unused_variables)]
                $crate::machine::Clause::Catch(__index, __exc) => {
                    #[allow(unused_mut)]
                    let mut __k = 0usize;
                    $(
                        if __index == __k {
                            let $exc = __exc;
                            $catch_body;
                            return;
                        }
                        __k += 1;
                    )*
                    let _ = __k;
                    ::core::unreachable!("no catch clause at dispatched index");
                }
            },
        );
    }};
}

/// Raises an exception: a class descriptor throws fresh from this source
/// position; a caught [`Exception`](crate::exception::Exception) instance
/// rethrows precisely, keeping its original origin. The two-argument form
/// attaches data retrievable through `Exception::data`.
#[macro_export]
macro_rules! throw {
    ($class:expr, $data:expr) => {
        $crate::machine::throw_with_data(&$class, $data, ::core::file!(), ::core::line!())
    };
    ($what:expr) => {{
        use $crate::exception::Raise as _;
        (&$what).raise_at(::core::file!(), ::core::line!())
    }};
}

/// A deferred return: runs every enclosing `finally` up to the function
/// boundary, then makes the enclosing [`return_scope`] produce the value
/// (`()` if none is given). A `try_return!` from a `finally` overrules a
/// pending exception or an earlier deferred return.
#[macro_export]
macro_rules! try_return {
    () => {
        $crate::try_return!(())
    };
    ($value:expr) => {
        $crate::machine::early_return(
            ::std::boxed::Box::new($value),
            ::core::file!(),
            ::core::line!(),
        )
    };
}
