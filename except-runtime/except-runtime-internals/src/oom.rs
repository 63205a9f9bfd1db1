//! Allocation wrappers.
//!
//! Thin call-throughs to the host allocator that surface failure as an
//! `OutOfMemoryError` exception instead of a null pointer or an `Err`, so
//! allocation failure propagates through the same `catch` clauses as
//! everything else.

use crate::class::OUT_OF_MEMORY_ERROR;
use crate::machine;
use std::alloc::{alloc, Layout};

/// Boxes `value`, throwing `OutOfMemoryError` if the allocator fails.
pub fn boxed<T>(value: T) -> Box<T> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        return Box::new(value);
    }
    let p = unsafe { alloc(layout) } as *mut T;
    if p.is_null() {
        machine::throw_new(&OUT_OF_MEMORY_ERROR, file!(), line!());
    }
    unsafe {
        p.write(value);
        Box::from_raw(p)
    }
}

/// Reserves capacity for `additional` more elements, throwing
/// `OutOfMemoryError` on failure.
pub fn reserve<T>(vec: &mut Vec<T>, additional: usize) {
    if vec.try_reserve(additional).is_err() {
        machine::throw_new(&OUT_OF_MEMORY_ERROR, file!(), line!());
    }
}

/// Reserves capacity for `additional` more bytes, throwing
/// `OutOfMemoryError` on failure.
pub fn reserve_bytes(s: &mut String, additional: usize) {
    if s.try_reserve(additional).is_err() {
        machine::throw_new(&OUT_OF_MEMORY_ERROR, file!(), line!());
    }
}
