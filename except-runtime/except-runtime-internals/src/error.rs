use anyhow::Error as AnyError;
use thiserror::Error;

/// Engine errors.
///
/// These are ordinary Rust errors returned by the engine's own fallible
/// entry points; they are unrelated to the exceptions the engine manages.
#[derive(Debug, Error)]
pub enum Error {
    /// A catch-all for internal errors that are likely unrecoverable by the
    /// engine user.
    #[error("Internal error: {}", _0)]
    InternalError(#[source] AnyError),
}

#[macro_export]
macro_rules! except_bail {
    ($e:expr) => {
        return Err($crate::except_format_err!($e));
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::except_format_err!($fmt, $($arg)*));
    };
}

#[macro_export]
macro_rules! except_ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            $crate::except_bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::except_bail!($fmt, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! except_format_err {
    ($($arg:tt)*) => { $crate::error::Error::InternalError(anyhow::format_err!($($arg)*)) }
}
