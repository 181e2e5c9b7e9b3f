//! C-compatible status codes.
//!
//! [`FirstfitStatus`] is a `repr(i32)` enum covering every error the C
//! surface can report. Conversions from [`HeapError`] are provided.

use firstfit_arena::HeapError;

/// C-compatible status code returned by FFI functions that report one.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirstfitStatus {
    /// Success.
    Ok = 0,
    /// `firstfit_init` has not been called.
    NotInitialized = -1,
    /// No free block is large enough for the request.
    OutOfMemory = -2,
    /// Heap size rejected (not a multiple of 8, or too small).
    InvalidConfig = -3,
    /// An argument is null, out of range, or otherwise invalid.
    InvalidArgument = -4,
    /// Pointer does not name the start of any payload.
    UnknownPointer = -5,
    /// Pointer names a block that is already free.
    DoubleRelease = -6,
    /// Pointer names a block that was reallocated since it was issued.
    StaleHandle = -7,
    /// The block list failed validation.
    Corrupted = -8,
    /// Internal error (e.g. poisoned mutex after a prior panic).
    InternalError = -20,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl From<&HeapError> for FirstfitStatus {
    fn from(e: &HeapError) -> Self {
        match e {
            HeapError::OutOfMemory { .. } => FirstfitStatus::OutOfMemory,
            HeapError::InvalidConfig { .. } => FirstfitStatus::InvalidConfig,
            HeapError::UnknownPointer { .. } => FirstfitStatus::UnknownPointer,
            HeapError::DoubleRelease { .. } => FirstfitStatus::DoubleRelease,
            HeapError::StaleHandle { .. } => FirstfitStatus::StaleHandle,
            HeapError::Corrupted { .. } => FirstfitStatus::Corrupted,
        }
    }
}
