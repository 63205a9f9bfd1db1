//! Assertion macros that throw instead of aborting.
//!
//! In debug builds a failed condition throws `FailedAssertion` carrying the
//! stringified expression as data; what happens in release builds varies per
//! macro. An uncaught `FailedAssertion` reaching the outermost scope prints
//! on the diagnostic channel and, with the `abort-on-assert` feature,
//! aborts the process.

/// Debug: throws `FailedAssertion` when `cond` is false. Release: does not
/// evaluate `cond` at all.
#[macro_export]
macro_rules! except_assert {
    ($cond:expr) => {
        if ::core::cfg!(debug_assertions) && !($cond) {
            $crate::throw!($crate::class::FAILED_ASSERTION, ::core::stringify!($cond));
        }
    };
}

/// Debug: throws `FailedAssertion` when `cond` is false. Release: returns
/// `retval` from the enclosing function instead.
#[macro_export]
macro_rules! except_validate {
    ($cond:expr, $retval:expr) => {
        if !($cond) {
            if ::core::cfg!(debug_assertions) {
                $crate::throw!($crate::class::FAILED_ASSERTION, ::core::stringify!($cond));
            } else {
                return $retval;
            }
        }
    };
}

/// Throws `class` when `cond` is false, in every build.
#[macro_export]
macro_rules! except_check {
    ($cond:expr, $class:path) => {
        if !($cond) {
            $crate::throw!($class);
        }
    };
}
