//! Word-aligned backing storage for the arena.
//!
//! The only module in this crate allowed to use `unsafe`. The arena is
//! reserved once as a boxed `[u64]` and immediately turned into a raw
//! pointer; every byte view and every address handed out is derived from
//! that one pointer, so addresses given to C stay valid across later heap
//! operations.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::config::ALIGNMENT;
use crate::error::HeapError;

const WORD: usize = std::mem::size_of::<u64>();

const _: () = assert!(WORD == ALIGNMENT);

/// Zero-initialised byte storage whose base address is 8-byte aligned.
///
/// Every payload offset is a multiple of [`ALIGNMENT`], so every payload
/// address handed across the C boundary is word aligned as well.
pub(crate) struct AlignedBytes {
    /// Start of a leaked `Box<[u64]>` of `len / WORD` words, reclaimed in
    /// `Drop`.
    base: NonNull<u64>,
    len: usize,
}

// SAFETY: AlignedBytes uniquely owns its allocation (like the Box it came
// from) and holds no thread-affine state, so moving it between threads is
// sound.
unsafe impl Send for AlignedBytes {}

// SAFETY: shared access only yields `&[u8]`; mutation and the base address
// require `&mut self`.
unsafe impl Sync for AlignedBytes {}

impl AlignedBytes {
    /// Reserve `len` zeroed bytes. `len` must be a multiple of 8.
    ///
    /// # Errors
    ///
    /// [`HeapError::InvalidConfig`] if the allocator cannot provide the
    /// storage, instead of aborting the process.
    pub(crate) fn zeroed(len: usize) -> Result<Self, HeapError> {
        debug_assert_eq!(len % WORD, 0);
        let words = len / WORD;
        let mut storage: Vec<u64> = Vec::new();
        storage
            .try_reserve_exact(words)
            .map_err(|e| HeapError::InvalidConfig {
                reason: format!("cannot reserve {len} bytes for the arena: {e}"),
            })?;
        storage.resize(words, 0);
        let raw = Box::into_raw(storage.into_boxed_slice());
        // SAFETY: Box::into_raw never returns null. For an empty slice the
        // pointer is dangling but non-null and well aligned.
        let base = unsafe { NonNull::new_unchecked(raw.cast::<u64>()) };
        Ok(Self { base, len })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        // SAFETY: `base` points to `len / 8` initialised u64s owned by self,
        // i.e. exactly `len` initialised bytes. u8 has no alignment or
        // validity requirements, and the slice borrows `self`.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().cast::<u8>(), self.len) }
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_bytes`; `&mut self` guarantees exclusive access
        // for the slice's lifetime. Any byte pattern is a valid u64.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr().cast::<u8>(), self.len) }
    }

    /// Base address of the storage, for boundaries that hand out addresses.
    ///
    /// Always the same pointer for the lifetime of the storage; no
    /// reborrow of an owning container happens in between.
    pub(crate) fn base_ptr(&mut self) -> *mut u8 {
        self.base.as_ptr().cast::<u8>()
    }
}

impl Drop for AlignedBytes {
    fn drop(&mut self) {
        let words = std::ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.len / WORD);
        // SAFETY: `words` is exactly the slice leaked by `Box::into_raw` in
        // `zeroed`, and it is reclaimed only here.
        drop(unsafe { Box::from_raw(words) });
    }
}
