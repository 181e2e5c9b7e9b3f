//! Process-wide heap FFI: init, malloc, free, usable_size, validate.
//!
//! One [`ArenaHeap`] lives in a global `Mutex<Option<_>>`. It is `None`
//! until `firstfit_init` (or `firstfit_init_with`) runs; every other entry
//! point reports "not initialised" in its own way until then.
//!
//! C callers hold raw addresses, not [`Payload`] handles. Addresses are
//! translated to arena offsets here, and the live tag is recovered from the
//! heap before releasing, so the C surface always has trusting semantics
//! for stale pointers.

use std::ffi::c_void;
use std::sync::Mutex;

use firstfit_arena::{ArenaHeap, HeapConfig, Payload, ReleaseMode};
use log::warn;

use crate::status::FirstfitStatus;

static HEAP: Mutex<Option<ArenaHeap>> = Mutex::new(None);

pub(crate) fn heap() -> &'static Mutex<Option<ArenaHeap>> {
    &HEAP
}

/// Arena offset of `ptr`, or `None` if it does not point into the arena.
fn offset_of(heap: &mut ArenaHeap, ptr: *mut c_void) -> Option<usize> {
    let base = heap.as_mut_ptr() as usize;
    let offset = (ptr as usize).checked_sub(base)?;
    (offset < heap.config().heap_size).then_some(offset)
}

/// Handle for the payload at `offset`: the live one if the block is
/// allocated, otherwise an untagged handle that the heap will reject or
/// ignore according to its release mode.
fn handle_at(heap: &ArenaHeap, offset: usize) -> Payload {
    heap.payload_at(offset)
        .unwrap_or_else(|| Payload::from_raw_parts(offset, 0))
}

/// Install `config` as the global heap.
///
/// A heap of the same size is re-partitioned in place, so the arena is
/// reserved once and its address never changes. A new arena is reserved
/// only on first use or when the size changes.
fn install(config: HeapConfig) -> i32 {
    let mut guard = ffi_lock!(HEAP);
    if let Some(heap) = guard.as_mut() {
        if heap.config().heap_size == config.heap_size {
            heap.set_release_mode(config.release_mode);
            heap.init();
            return FirstfitStatus::Ok as i32;
        }
    }
    match ArenaHeap::new(config) {
        Ok(heap) => {
            *guard = Some(heap);
            FirstfitStatus::Ok as i32
        }
        Err(e) => FirstfitStatus::from(&e) as i32,
    }
}

/// Initialise (or re-initialise) the global heap with the default size
/// (65536 bytes) in trusting mode.
///
/// Re-initialising discards every outstanding allocation; pointers handed
/// out before the call still point into the arena but no longer name an
/// allocation.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn firstfit_init() -> i32 {
    ffi_guard!({ install(HeapConfig::default()) })
}

/// Initialise (or re-initialise) the global heap with `heap_size` bytes.
///
/// A non-zero `checked` enables checked release mode: double and unknown
/// frees are refused and logged instead of acted on. Returns
/// `InvalidConfig` if `heap_size` is not a multiple of 8 or too small to
/// hold one block, or if the arena cannot be reserved; the previous heap
/// (if any) is kept in that case. Re-initialising with the current size
/// reuses the existing arena.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn firstfit_init_with(heap_size: usize, checked: u8) -> i32 {
    ffi_guard!({
        let mode = if checked != 0 {
            ReleaseMode::Checked
        } else {
            ReleaseMode::Trusting
        };
        install(HeapConfig::new(heap_size).with_release_mode(mode))
    })
}

/// Allocate at least `size` bytes, 8-byte aligned.
///
/// Returns NULL if no free block is large enough or the heap has not been
/// initialised.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn firstfit_malloc(size: usize) -> *mut c_void {
    ffi_guard_or!(std::ptr::null_mut(), {
        let mut guard = ffi_lock!(HEAP, std::ptr::null_mut());
        let Some(heap) = guard.as_mut() else {
            return std::ptr::null_mut();
        };
        match heap.allocate(size) {
            Ok(payload) => heap
                .as_mut_ptr()
                .wrapping_add(payload.offset())
                .cast::<c_void>(),
            Err(_) => std::ptr::null_mut(),
        }
    })
}

/// Release memory returned by [`firstfit_malloc`].
///
/// NULL is a no-op. Pointers outside the arena are ignored. A pointer
/// inside the arena that names no allocation is handled by the heap's
/// release mode: ignored when trusting, refused and logged when checked.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn firstfit_free(ptr: *mut c_void) {
    ffi_guard_or!((), {
        if ptr.is_null() {
            return;
        }
        let mut guard = ffi_lock!(HEAP, ());
        let Some(heap) = guard.as_mut() else {
            return;
        };
        let Some(offset) = offset_of(heap, ptr) else {
            warn!("free of {ptr:p}, which is outside the arena");
            return;
        };
        let payload = handle_at(heap, offset);
        heap.release(payload);
    })
}

/// Release `ptr` and report why it was refused, if it was.
///
/// Validates regardless of release mode. NULL returns `Ok` (as `free`
/// would). Returns `InvalidArgument` for pointers outside the arena,
/// `UnknownPointer` or `DoubleRelease` for pointers that name no live
/// allocation, and `NotInitialized` before `firstfit_init`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn firstfit_try_free(ptr: *mut c_void) -> i32 {
    ffi_guard!({
        if ptr.is_null() {
            return FirstfitStatus::Ok as i32;
        }
        let mut guard = ffi_lock!(HEAP);
        let Some(heap) = guard.as_mut() else {
            return FirstfitStatus::NotInitialized as i32;
        };
        let Some(offset) = offset_of(heap, ptr) else {
            return FirstfitStatus::InvalidArgument as i32;
        };
        let payload = handle_at(heap, offset);
        match heap.try_release(payload) {
            Ok(()) => FirstfitStatus::Ok as i32,
            Err(e) => FirstfitStatus::from(&e) as i32,
        }
    })
}

/// Usable size of the allocation at `ptr` (at least the requested size).
///
/// Returns 0 for NULL, for pointers that name no live allocation, and
/// before `firstfit_init`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn firstfit_usable_size(ptr: *mut c_void) -> usize {
    ffi_guard_or!(0, {
        if ptr.is_null() {
            return 0;
        }
        let mut guard = ffi_lock!(HEAP, 0);
        let Some(heap) = guard.as_mut() else {
            return 0;
        };
        offset_of(heap, ptr)
            .and_then(|offset| heap.payload_at(offset))
            .and_then(|payload| heap.usable_size(payload))
            .unwrap_or(0)
    })
}

/// Check the block list invariants of the global heap.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn firstfit_validate() -> i32 {
    ffi_guard!({
        let guard = ffi_lock!(HEAP);
        let Some(heap) = guard.as_ref() else {
            return FirstfitStatus::NotInitialized as i32;
        };
        match heap.validate() {
            Ok(()) => FirstfitStatus::Ok as i32,
            Err(e) => FirstfitStatus::from(&e) as i32,
        }
    })
}

/// Serialises tests that touch the global heap.
#[cfg(test)]
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());

#[cfg(test)]
pub(crate) fn test_guard() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
