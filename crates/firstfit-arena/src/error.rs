//! Heap error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur during heap operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeapError {
    /// No free block can hold the aligned request (the null-sentinel case).
    OutOfMemory {
        /// Payload bytes the caller asked for.
        requested: usize,
        /// The request rounded up to the alignment, or `usize::MAX` if
        /// rounding overflowed.
        aligned: usize,
        /// Largest free payload in the heap at the time of the request.
        largest_free: usize,
    },
    /// The heap configuration cannot be used to partition an arena.
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// No block's payload starts at this offset.
    UnknownPointer {
        /// Payload offset carried by the handle.
        offset: usize,
    },
    /// The block at this offset is already free.
    DoubleRelease {
        /// Payload offset carried by the handle.
        offset: usize,
    },
    /// The block at this offset has been reallocated since the handle was
    /// issued.
    StaleHandle {
        /// Payload offset carried by the handle.
        offset: usize,
        /// Tag of the live allocation at that offset.
        expected: u32,
        /// Tag carried by the handle.
        found: u32,
    },
    /// A structural invariant of the block list does not hold.
    Corrupted {
        /// Which invariant failed, and where.
        reason: String,
    },
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                aligned,
                largest_free,
            } => {
                write!(
                    f,
                    "out of memory: requested {requested} bytes ({aligned} aligned), largest free block {largest_free} bytes"
                )
            }
            Self::InvalidConfig { reason } => write!(f, "invalid heap config: {reason}"),
            Self::UnknownPointer { offset } => {
                write!(f, "no allocation starts at payload offset {offset}")
            }
            Self::DoubleRelease { offset } => {
                write!(f, "double release of block at payload offset {offset}")
            }
            Self::StaleHandle {
                offset,
                expected,
                found,
            } => {
                write!(
                    f,
                    "stale handle at payload offset {offset}: live tag {expected}, handle tag {found}"
                )
            }
            Self::Corrupted { reason } => write!(f, "heap corrupted: {reason}"),
        }
    }
}

impl Error for HeapError {}

impl HeapError {
    /// Whether this error reports a caller contract violation detected by
    /// checked mode.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::UnknownPointer { .. } | Self::DoubleRelease { .. } | Self::StaleHandle { .. }
        )
    }
}
