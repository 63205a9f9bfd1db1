//! Live exception values.
//!
//! An [`Exception`] is what a `catch` clause receives: the class that was
//! thrown, the optional attached data, and the origin of the throw. For a
//! synchronous trap the origin is file `"?"`, line `0` (no source information
//! exists for a hardware fault).

use crate::class::ExceptionClass;
use crate::context;
use crate::machine;
use std::any::Any;
use std::fmt;
use std::io;
use std::sync::Arc;

/// A raised (or catchable) exception instance.
///
/// Cloning is cheap: the attached data is reference-counted. The instance is
/// distinguishable from a class descriptor at the `throw!` boundary by type,
/// which is what makes a precise rethrow possible: `throw!(e)` on a caught
/// instance re-raises the original class, data, and origin unchanged.
#[derive(Clone)]
pub struct Exception {
    class: &'static ExceptionClass,
    data: Option<Arc<dyn Any + Send + Sync>>,
    file: &'static str,
    line: u32,
}

impl Exception {
    pub(crate) fn new(
        class: &'static ExceptionClass,
        data: Option<Arc<dyn Any + Send + Sync>>,
        file: &'static str,
        line: u32,
    ) -> Self {
        Exception {
            class,
            data,
            file,
            line,
        }
    }

    /// The class this exception was thrown as.
    pub fn class(&self) -> &'static ExceptionClass {
        self.class
    }

    /// Data attached at the throw site, if any.
    pub fn data(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.data.as_deref()
    }

    /// Source file of the throw site; `"?"` for a synchronous trap.
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// Source line of the throw site; `0` for a synchronous trap.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// `<name>: file "<file>", line <line>.`
    pub fn message(&self) -> String {
        format!(
            "{}: file \"{}\", line {}.",
            self.class.name(),
            self.file,
            self.line
        )
    }

    /// Writes the current thread's handler stack, innermost `try` first.
    ///
    /// The header names this exception's class; in a multi-threaded build it
    /// also names the thread.
    pub fn print_try_trace(&self, w: &mut dyn io::Write) -> io::Result<()> {
        #[cfg(feature = "threads")]
        writeln!(
            w,
            "{} occurred in thread {}:",
            self.class.name(),
            context::thread_identity()
        )?;
        #[cfg(not(feature = "threads"))]
        writeln!(w, "{} occurred:", self.class.name())?;
        context::with_frames(|frames| {
            for frame in frames.iter().rev() {
                writeln!(w, "        in 'try' at {}:{}", frame.try_file, frame.try_line)?;
            }
            Ok(())
        })
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("class", &self.class.name())
            .field("file", &self.file)
            .field("line", &self.line)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

/// The `throw!` dispatch seam: implemented for class descriptors (a fresh
/// throw) and for exception instances (a precise rethrow).
pub trait Raise {
    /// Raises at the given source position. Rethrows ignore the position and
    /// keep the original.
    fn raise_at(&self, file: &'static str, line: u32) -> !;
}

impl Raise for &'static ExceptionClass {
    fn raise_at(&self, file: &'static str, line: u32) -> ! {
        machine::throw_new(*self, file, line)
    }
}

impl Raise for Exception {
    fn raise_at(&self, _file: &'static str, _line: u32) -> ! {
        machine::rethrow(self.clone())
    }
}
