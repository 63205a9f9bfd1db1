//! # Except Runtime
//!
//! This crate brings Java-style `try`/`catch`/`finally` semantics to Rust
//! programs that want centralized exception handling: a user-extensible
//! exception-class hierarchy, propagation and precise rethrow across nested
//! frames, `finally` blocks that run on every path out (including early
//! returns), and synchronous hardware traps (`SIGSEGV`, `SIGFPE`, `SIGILL`,
//! `SIGBUS`, `SIGABRT`) delivered to the faulting thread as catchable
//! exceptions.
//!
//! ## Handling an exception
//!
//! A construct is written with [`attempt!`]: one `try` block, zero or more
//! `catch` clauses, and exactly one `finally` block (possibly empty). The
//! first clause whose class the thrown exception *derives from* receives it;
//! an exception caught by no clause propagates to the enclosing construct
//! after the `finally` block has run.
//!
//! ```
//! use except_runtime::{attempt, define_exception_class, throw};
//! use except_runtime::EXCEPTION;
//!
//! define_exception_class!(ParseError extends EXCEPTION);
//! define_exception_class!(BadDigit extends ParseError);
//!
//! attempt! {
//!     try {
//!         throw!(BadDigit);
//!     }
//!     catch (ParseError, e) {
//!         // receives BadDigit: a catch matches the class and everything
//!         // below it
//!         println!("{}", e.message());
//!     }
//!     finally {
//!         // runs exactly once on every path out of the construct
//!     }
//! }
//! ```
//!
//! Exceptions are values: [`Exception::class`], [`Exception::message`]
//! (`<name>: file "<f>", line <n>.`), [`Exception::data`] for whatever the
//! throw site attached, and [`Exception::print_try_trace`] for the current
//! handler stack. `throw!(e)` on a caught instance is a precise rethrow that
//! keeps the original origin.
//!
//! ## Early returns through `finally`
//!
//! A plain Rust `return` cannot leave a `try` block (the blocks are closures
//! under the hood, and the compiler will say so). Use [`try_return!`] inside
//! a [`return_scope`] instead: every `finally` between the return site and
//! the function boundary runs, and the scope produces the value. A
//! `try_return!` or `throw!` from a `finally` block overrules whatever was
//! pending.
//!
//! ```
//! use except_runtime::{attempt, return_scope, try_return};
//! use except_runtime::THROWABLE;
//!
//! fn six() -> i32 {
//!     return_scope(|| {
//!         attempt! {
//!             try {
//!                 try_return!(6);
//!             }
//!             catch (THROWABLE, _e) {
//!                 unreachable!("a deferred return is not catchable");
//!             }
//!             finally {}
//!         }
//!         0
//!     })
//! }
//! assert_eq!(six(), 6);
//! ```
//!
//! ## Traps as exceptions
//!
//! While any thread is inside a `try`, the runtime owns the dispositions for
//! the five synchronous signals and translates a trap on such a thread into
//! the matching exception class (`SegmentationFault`, `ArithmeticException`,
//! `IllegalInstruction`, `BusError`, `AbnormalTermination` — all below
//! `RuntimeException`). The trap has no source position: its message reads
//! `file "?", line 0`. A trap exception that reaches the outermost scope
//! uncaught is re-raised as the original signal once the host dispositions
//! are back in place.
//!
//! The jump out of the signal handler does not run Rust destructors between
//! the faulting point and the `try`; cleanup that must happen on a trap
//! belongs in `finally` blocks.
//!
//! ## Interaction with host signal handlers
//!
//! The previously-installed handlers are saved when the first thread enters
//! a `try` and restored when the last one leaves (with the default
//! `shared-signal-handlers` policy; without it, each thread saves and
//! restores around its own outermost `try`). During that window other code
//! must not modify those dispositions. A trap caught on a thread that is
//! *not* inside a `try` is forwarded to the saved host handler.
//!
//! Signal dispositions are process-wide, so the private policy admits only
//! one thread inside a `try` at a time: a second concurrent entrant would
//! save the engine's own handler as the "host" disposition and clobber the
//! real one on exit, and is therefore refused with a panic. Programs with
//! overlapping `try` scopes across threads must use the shared policy.
//!
//! ## Threads
//!
//! Every thread carries its own handler stack; exceptions never cross
//! threads. The engine adapts to host-created threads lazily. A thread
//! killed while inside a `try` leaks its share of the global bookkeeping
//! unless a surviving thread calls [`cease_thread`] with its
//! [`thread_identity`].
//!
//! ## Diagnostics
//!
//! Lost exceptions (`<name> lost: <file>:<line>`), debug-build catch-list
//! warnings, and assertion failures go to a single diagnostic stream,
//! standard error by default; swap it with [`set_diagnostic_sink`]. Debug
//! builds also validate each `try` site's catch list once: a clause
//! duplicating or shadowed by an earlier clause is reported, as is a `try`
//! with no clauses at all.

#![deny(bare_trait_objects)]

pub use except_runtime_internals::class::{
    ExceptionClass, ABNORMAL_TERMINATION, ARITHMETIC_EXCEPTION, BUS_ERROR, EXCEPTION,
    FAILED_ASSERTION, ILLEGAL_INSTRUCTION, OUT_OF_MEMORY_ERROR, RUNTIME_EXCEPTION,
    SEGMENTATION_FAULT, THROWABLE,
};
pub use except_runtime_internals::context::{cease_thread, current_scope, thread_identity};
pub use except_runtime_internals::frame::Scope;
pub use except_runtime_internals::diagnostics::set_diagnostic_sink;
pub use except_runtime_internals::error::Error;
pub use except_runtime_internals::exception::{Exception, Raise};
pub use except_runtime_internals::machine::{return_scope, ArmSpec, Clause};
pub use except_runtime_internals::oom;
pub use except_runtime_internals::signals::handlers_installed;
pub use except_runtime_internals::{
    attempt, define_exception_class, except_assert, except_bail, except_check, except_ensure,
    except_format_err, except_validate, throw, try_return,
};
