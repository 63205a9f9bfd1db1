//! Platform glue for the signal-path non-local jump.
//!
//! Panic unwinding cannot leave a signal handler, so the handler re-enters
//! the innermost frame through a `sigsetjmp`/`siglongjmp` pad kept alive in
//! a small C frame (`frame_pad.c`, compiled by the build script). The pad's
//! address is published through the context while the frame's blocks run.
//!
//! A jump taken here skips the destructors of whatever stack lived between
//! the fault and the pad; resources the user wants released on a trap belong
//! in `finally` blocks.

use crate::context;
use libc::{c_int, c_void};
use std::ptr;

extern "C" {
    fn except_rt_pad_enter(
        body: unsafe extern "C" fn(*mut c_void),
        data: *mut c_void,
        slot: *mut *mut c_void,
    ) -> c_int;
    fn except_rt_pad_raise(pad: *mut c_void) -> !;
}

/// Arms a pad and runs `body` under it. Returns true if `body` completed;
/// false if the pad was re-entered by a signal jump.
pub(crate) fn pad_enter<F: FnMut()>(body: &mut F) -> bool {
    struct Env<'a, F> {
        body: &'a mut F,
        slot: *mut *mut c_void,
    }

    unsafe extern "C" fn trampoline<F: FnMut()>(data: *mut c_void) {
        let env = &mut *(data as *mut Env<'_, F>);
        context::set_current_pad(*env.slot);
        (env.body)();
    }

    let mut slot: *mut c_void = ptr::null_mut();
    let slot_ptr: *mut *mut c_void = &mut slot;
    let saved = context::current_pad();
    let mut env = Env {
        body,
        slot: slot_ptr,
    };
    let completed = unsafe {
        except_rt_pad_enter(
            trampoline::<F>,
            &mut env as *mut Env<'_, F> as *mut c_void,
            slot_ptr,
        )
    };
    context::set_current_pad(saved);
    completed == 1
}

/// Jumps to an armed pad. Only called from the signal handler, on the thread
/// that armed the pad.
pub(crate) unsafe fn pad_raise(pad: *mut c_void) -> ! {
    except_rt_pad_raise(pad)
}
