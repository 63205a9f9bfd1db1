//! The diagnostic channel.
//!
//! A single textual stream carries everything the engine reports to a human:
//! lost-exception notices, catch-list warnings, and assertion output. It
//! defaults to standard error and can be swapped for any `Write` sink (tests
//! capture it with an in-memory buffer).
//!
//! Each line is formatted into the calling thread's context scratch buffer
//! and handed to the sink as one `write_all`, so lines from concurrent
//! threads never interleave mid-line.

use crate::context;
use crate::exception::Exception;
use lazy_static::lazy_static;
use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

lazy_static! {
    static ref SINK: Mutex<Option<Box<dyn Write + Send>>> = Mutex::new(None);
}

/// Replaces the diagnostic sink, returning the previous one. `None` selects
/// the default, standard error.
pub fn set_diagnostic_sink(sink: Option<Box<dyn Write + Send>>) -> Option<Box<dyn Write + Send>> {
    std::mem::replace(&mut *SINK.lock().unwrap(), sink)
}

pub(crate) fn emit(args: fmt::Arguments<'_>) {
    context::with_scratch(|buf| {
        buf.clear();
        let _ = fmt::write(buf, args);
        buf.push('\n');
        write_line(buf.as_bytes());
    });
}

fn write_line(bytes: &[u8]) {
    let mut sink = SINK.lock().unwrap();
    match sink.as_mut() {
        Some(w) => {
            let _ = w.write_all(bytes);
            let _ = w.flush();
        }
        None => {
            let mut err = io::stderr().lock();
            let _ = err.write_all(bytes);
        }
    }
}

/// `<name> lost: <file>:<line>` — an exception reached the outermost scope
/// with no terminal action of its own.
pub(crate) fn lost(exc: &Exception) {
    tracing::warn!(
        class = exc.class().name(),
        file = exc.file(),
        line = exc.line(),
        "exception lost at outermost scope"
    );
    emit(format_args!(
        "{} lost: {}:{}",
        exc.class().name(),
        exc.file(),
        exc.line()
    ));
}
