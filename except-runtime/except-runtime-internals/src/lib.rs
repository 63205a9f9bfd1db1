//! `except-runtime` is a centralized exception-handling runtime: Java-style
//! `try`/`catch`/`finally` with a user-extensible class hierarchy,
//! propagation across nested frames, deferred returns that still run every
//! `finally`, and synchronous signals (`SIGSEGV` and friends) delivered as
//! catchable exceptions.
//!
//! This crate holds the engine internals; the `except-runtime` facade crate
//! re-exports the supported surface.

#![deny(bare_trait_objects)]

pub mod class;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod exception;
pub mod frame;
pub mod machine;
pub mod oom;
pub mod signals;
pub(crate) mod sysdeps;
pub(crate) mod validator;

mod assert_macros;

pub use crate::context::{cease_thread, current_scope, thread_identity};
pub use crate::frame::Scope;
pub use crate::diagnostics::set_diagnostic_sink;
pub use crate::error::Error;
pub use crate::exception::{Exception, Raise};
pub use crate::machine::return_scope;
pub use crate::signals::handlers_installed;
