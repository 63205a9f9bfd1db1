#![allow(dead_code)]

use lazy_static::lazy_static;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref DIAG_LOCK: Mutex<()> = Mutex::new(());
}

/// An in-memory diagnostic sink. Clone the handle before giving the sink to
/// the engine to keep reading what it writes.
#[derive(Clone)]
pub struct BufferSink(Arc<Mutex<Vec<u8>>>);

impl BufferSink {
    pub fn new() -> Self {
        BufferSink(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).expect("diagnostics are UTF-8")
    }
}

impl Write for BufferSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Captures everything the engine writes on the diagnostic channel while
/// `body` runs. Captures are serialized across tests in a binary.
pub fn capture_diagnostics(body: impl FnOnce()) -> String {
    let _guard = DIAG_LOCK.lock().unwrap();
    let sink = BufferSink::new();
    let previous = except_runtime::set_diagnostic_sink(Some(Box::new(sink.clone())));
    body();
    except_runtime::set_diagnostic_sink(previous);
    sink.contents()
}
