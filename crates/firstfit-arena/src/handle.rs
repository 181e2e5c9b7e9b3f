//! Payload handles.
//!
//! A [`Payload`] is what `allocate` hands back in place of a raw pointer: the
//! payload's byte offset within the arena plus the liveness tag stamped on
//! the allocation. The tag lets checked mode tell a live allocation apart
//! from an earlier one that happened to occupy the same offset.

use std::fmt;

use crate::config::HEADER_SIZE;

/// Handle to an allocated payload range.
///
/// Handles are plain values: copying one does not duplicate ownership of
/// the memory, and the heap does not track outstanding copies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct Payload {
    /// Byte offset of the first payload byte within the arena.
    pub(crate) offset: usize,
    /// Liveness tag of the allocation this handle was issued for.
    pub(crate) tag: u32,
}

impl Payload {
    pub(crate) fn new(offset: usize, tag: u32) -> Self {
        Self { offset, tag }
    }

    /// Rebuild a handle from its raw parts.
    ///
    /// Intended for boundaries that only carry an address (the C surface).
    /// A handle built with the wrong tag is rejected by checked mode.
    pub fn from_raw_parts(offset: usize, tag: u32) -> Self {
        Self { offset, tag }
    }

    /// Byte offset of the payload within the arena.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte offset of the block header that precedes the payload.
    ///
    /// Returns `None` for offsets that cannot follow a header.
    pub fn header_offset(&self) -> Option<usize> {
        self.offset.checked_sub(HEADER_SIZE)
    }

    /// Liveness tag stamped at allocation time.
    pub fn tag(&self) -> u32 {
        self.tag
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload(off={}, tag={})", self.offset, self.tag)
    }
}
