//! The exception-class registry.
//!
//! Classes are statically-constructed records forming a single-parent tree
//! rooted at [`THROWABLE`]. Identity is pointer identity: two classes are the
//! same class iff they are the same `static`. User crates extend the tree
//! with [`define_exception_class!`](crate::define_exception_class), including
//! under classes defined in other crates.

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

/// A node in the exception-class tree.
///
/// The only interesting operation is the ancestry test, [`is_derived`]
/// (`ExceptionClass::is_derived`): a linear walk up the `parent` chain.
/// There is no multiple inheritance.
pub struct ExceptionClass {
    parent: Option<&'static ExceptionClass>,
    name: &'static str,
    /// The signal number most recently translated into this class, recorded
    /// by the adapter so an unhandled trap can be re-raised at teardown.
    /// Zero means no signal has been recorded.
    signal: AtomicI32,
}

impl ExceptionClass {
    /// A root class with no parent.
    pub const fn root(name: &'static str) -> Self {
        ExceptionClass {
            parent: None,
            name,
            signal: AtomicI32::new(0),
        }
    }

    /// A class derived from `parent`.
    pub const fn new(name: &'static str, parent: &'static ExceptionClass) -> Self {
        ExceptionClass {
            parent: Some(parent),
            name,
            signal: AtomicI32::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static ExceptionClass> {
        self.parent
    }

    /// Walks `self → parent → …` and returns true iff `base` is encountered
    /// before the root. A class is derived from itself.
    pub fn is_derived(&'static self, base: &'static ExceptionClass) -> bool {
        let mut class = Some(self);
        while let Some(c) = class {
            if ptr::eq(c, base) {
                return true;
            }
            class = c.parent;
        }
        false
    }

    pub(crate) fn record_signal(&self, signum: i32) {
        self.signal.store(signum, Ordering::SeqCst);
    }

    pub(crate) fn signal(&self) -> Option<i32> {
        match self.signal.load(Ordering::SeqCst) {
            0 => None,
            signum => Some(signum),
        }
    }
}

impl PartialEq for ExceptionClass {
    fn eq(&self, other: &ExceptionClass) -> bool {
        ptr::eq(self, other)
    }
}

impl Eq for ExceptionClass {}

impl fmt::Display for ExceptionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for ExceptionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionClass")
            .field("name", &self.name)
            .field("parent", &self.parent.map(|p| p.name))
            .finish()
    }
}

/// Root of the builtin forest.
pub static THROWABLE: ExceptionClass = ExceptionClass::root("Throwable");

/// Principal branch for recoverable conditions.
pub static EXCEPTION: ExceptionClass = ExceptionClass::new("Exception", &THROWABLE);

/// Principal branch for conditions raised by the runtime itself; every
/// synchronous trap class lives below this.
pub static RUNTIME_EXCEPTION: ExceptionClass = ExceptionClass::new("RuntimeException", &EXCEPTION);

/// Raised by the allocation wrappers when the host allocator fails.
pub static OUT_OF_MEMORY_ERROR: ExceptionClass = ExceptionClass::new("OutOfMemoryError", &THROWABLE);

/// Raised by the assertion macros in debug builds.
pub static FAILED_ASSERTION: ExceptionClass = ExceptionClass::new("FailedAssertion", &THROWABLE);

/// `SIGABRT` as an exception.
pub static ABNORMAL_TERMINATION: ExceptionClass =
    ExceptionClass::new("AbnormalTermination", &RUNTIME_EXCEPTION);

/// `SIGFPE` as an exception.
pub static ARITHMETIC_EXCEPTION: ExceptionClass =
    ExceptionClass::new("ArithmeticException", &RUNTIME_EXCEPTION);

/// `SIGILL` as an exception.
pub static ILLEGAL_INSTRUCTION: ExceptionClass =
    ExceptionClass::new("IllegalInstruction", &RUNTIME_EXCEPTION);

/// `SIGSEGV` as an exception.
pub static SEGMENTATION_FAULT: ExceptionClass =
    ExceptionClass::new("SegmentationFault", &RUNTIME_EXCEPTION);

/// `SIGBUS` as an exception.
pub static BUS_ERROR: ExceptionClass = ExceptionClass::new("BusError", &RUNTIME_EXCEPTION);

/// Internal class that piggy-backs a deferred native return on the exception
/// protocol. Deliberately rooted outside `Throwable` so no user catch clause
/// can match it.
pub(crate) static RETURN_EVENT: ExceptionClass = ExceptionClass::root("ReturnEvent");

/// Defines a new exception class deriving from `PARENT`.
///
/// This is the definition form: exactly one per class per program. The
/// declaration form of the original interface maps onto an ordinary Rust
/// `use` of the defining crate's `static`.
///
/// ```
/// use except_runtime_internals::define_exception_class;
/// use except_runtime_internals::class::EXCEPTION;
///
/// define_exception_class!(ProtocolError extends EXCEPTION);
/// define_exception_class!(HandshakeError extends ProtocolError);
///
/// assert!(HandshakeError.is_derived(&ProtocolError));
/// ```
#[macro_export]
macro_rules! define_exception_class {
    ($vis:vis $name:ident extends $parent:path) => {
        #[allow(non_upper_case_globals)]
        $vis static $name: $crate::class::ExceptionClass =
            $crate::class::ExceptionClass::new(::core::stringify!($name), &$parent);
    };
}
