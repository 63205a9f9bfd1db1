//! Traps delivered inside a `try` become catchable exceptions; traps on
//! threads outside any `try` go to the host. Signal dispositions are
//! process-global, so these tests serialize on one lock.

use except_runtime::{
    attempt, handlers_installed, ARITHMETIC_EXCEPTION, RUNTIME_EXCEPTION, SEGMENTATION_FAULT,
};
use lazy_static::lazy_static;
use nix::sys::signal::{raise, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

lazy_static! {
    static ref SIGNAL_TEST_LOCK: Mutex<()> = Mutex::new(());
}

#[test]
fn sigfpe_is_caught_as_arithmetic_exception() {
    let _guard = SIGNAL_TEST_LOCK.lock().unwrap();
    let mut message = None;
    attempt! {
        try {
            raise(Signal::SIGFPE).expect("raise succeeds");
            unreachable!("the trap leaves the try block");
        }
        catch (ARITHMETIC_EXCEPTION, e) {
            message = Some(e.message());
        }
        finally {}
    }
    assert_eq!(
        message.as_deref(),
        Some("ArithmeticException: file \"?\", line 0.")
    );
}

#[test]
fn segfault_is_caught_as_a_runtime_exception() {
    let _guard = SIGNAL_TEST_LOCK.lock().unwrap();
    let mut class_name = None;
    attempt! {
        try {
            unsafe {
                std::ptr::write_volatile(std::ptr::null_mut::<u8>(), 1);
            }
        }
        catch (RUNTIME_EXCEPTION, e) {
            class_name = Some(e.class().name());
        }
        finally {}
    }
    assert_eq!(class_name, Some("SegmentationFault"));
}

#[test]
fn segfault_is_caught_by_its_exact_class() {
    let _guard = SIGNAL_TEST_LOCK.lock().unwrap();
    let mut caught = false;
    attempt! {
        try {
            raise(Signal::SIGSEGV).expect("raise succeeds");
        }
        catch (SEGMENTATION_FAULT, _e) {
            caught = true;
        }
        finally {}
    }
    assert!(caught);
}

#[test]
fn handlers_track_try_activity() {
    let _guard = SIGNAL_TEST_LOCK.lock().unwrap();
    assert!(!handlers_installed());
    attempt! {
        try {
            assert!(handlers_installed());
            attempt! {
                try {
                    assert!(handlers_installed());
                }
                finally {}
            }
            assert!(handlers_installed());
        }
        finally {
            assert!(handlers_installed());
        }
    }
    assert!(!handlers_installed());
}

static SAW_HOST_HANDLER: AtomicBool = AtomicBool::new(false);

extern "C" fn host_fpe_handler(_signum: libc::c_int) {
    SAW_HOST_HANDLER.store(true, Ordering::SeqCst);
}

#[test]
fn host_disposition_is_saved_and_restored() {
    let _guard = SIGNAL_TEST_LOCK.lock().unwrap();
    SAW_HOST_HANDLER.store(false, Ordering::SeqCst);
    let sa = SigAction::new(
        SigHandler::Handler(host_fpe_handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let previous = unsafe { sigaction(Signal::SIGFPE, &sa) }.expect("sigaction succeeds");

    let mut caught = false;
    attempt! {
        try {
            raise(Signal::SIGFPE).expect("raise succeeds");
        }
        catch (ARITHMETIC_EXCEPTION, _e) {
            caught = true;
        }
        finally {}
    }
    assert!(caught);
    assert!(
        !SAW_HOST_HANDLER.load(Ordering::SeqCst),
        "the engine owned the disposition inside the try"
    );

    // the host handler is back now
    raise(Signal::SIGFPE).expect("raise succeeds");
    assert!(SAW_HOST_HANDLER.load(Ordering::SeqCst));

    unsafe { sigaction(Signal::SIGFPE, &previous) }.expect("sigaction succeeds");
}

fn recurse(depth: usize, order: &Mutex<Vec<String>>) {
    attempt! {
        try {
            if depth == 0 {
                raise(Signal::SIGFPE).expect("raise succeeds");
            } else {
                recurse(depth - 1, order);
            }
        }
        finally {
            order.lock().unwrap().push(format!("finally {}", depth));
        }
    }
}

#[test]
fn trap_propagates_through_recursive_frames_in_order() {
    let _guard = SIGNAL_TEST_LOCK.lock().unwrap();
    let order = Mutex::new(Vec::new());
    let mut caught_class = None;
    attempt! {
        try {
            recurse(3, &order);
        }
        catch (RUNTIME_EXCEPTION, e) {
            caught_class = Some(e.class().name());
        }
        finally {}
    }
    assert_eq!(caught_class, Some("ArithmeticException"));
    assert_eq!(
        *order.lock().unwrap(),
        vec!["finally 0", "finally 1", "finally 2", "finally 3"]
    );
}
