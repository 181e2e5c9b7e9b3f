//! C ABI for the firstfit arena allocator.
//!
//! Exposes `malloc`/`free`-style entry points over one process-wide
//! [`ArenaHeap`](firstfit_arena::ArenaHeap) guarded by a mutex. This crate
//! is one of two that may contain `unsafe` code (along with
//! `firstfit-arena`).
//!
//! Every entry point runs inside [`ffi_guard!`] (or [`ffi_guard_or!`]) so a
//! Rust panic is reported as [`FirstfitStatus::Panicked`] instead of
//! unwinding into C.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

/// Run an FFI body returning an `i32` status, catching panics.
///
/// `return` inside the body returns from the guard, not the caller.
#[macro_export]
macro_rules! ffi_guard {
    ($body:block) => {
        match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| -> i32 { $body })) {
            Ok(code) => code,
            Err(_) => $crate::status::FirstfitStatus::Panicked as i32,
        }
    };
}

/// Like [`ffi_guard!`] for entry points that return a value instead of a
/// status; `$fallback` is returned if the body panics.
#[macro_export]
macro_rules! ffi_guard_or {
    ($fallback:expr, $body:block) => {
        match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| $body)) {
            Ok(value) => value,
            Err(_) => $fallback,
        }
    };
}

/// Lock a mutex inside a guarded body.
///
/// A poisoned mutex returns `InternalError` from the enclosing guard, or
/// `$fallback` in the two-argument form.
#[macro_export]
macro_rules! ffi_lock {
    ($mutex:expr) => {
        match $mutex.lock() {
            Ok(guard) => guard,
            Err(_) => return $crate::status::FirstfitStatus::InternalError as i32,
        }
    };
    ($mutex:expr, $fallback:expr) => {
        match $mutex.lock() {
            Ok(guard) => guard,
            Err(_) => return $fallback,
        }
    };
}

pub mod heap;
pub mod metrics;
pub mod status;

pub use heap::{
    firstfit_free, firstfit_init, firstfit_init_with, firstfit_malloc, firstfit_try_free,
    firstfit_usable_size, firstfit_validate,
};
pub use metrics::{firstfit_stats, FirstfitStats};
pub use status::FirstfitStatus;
