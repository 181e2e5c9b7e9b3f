//! Heap configuration parameters and layout constants.

use crate::error::HeapError;

/// Bytes reserved in front of every payload for the block header.
///
/// Block records are kept in a side table, but the arena still sets this
/// many bytes aside per block so that offsets follow the classic
/// `header + payload` layout (a `size_t`, a pointer and a flag on 64-bit).
pub const HEADER_SIZE: usize = 24;

/// Payload sizes are rounded up to a multiple of this.
pub const ALIGNMENT: usize = 8;

/// Smallest payload a split remainder may have.
///
/// A free block is only split when the leftover can hold a header plus at
/// least this many bytes; otherwise the whole block is handed out.
pub const MIN_SPLIT_PAYLOAD: usize = 8;

/// Default arena capacity in bytes (64 KiB).
pub const DEFAULT_HEAP_SIZE: usize = 64 * 1024;

/// How `release` treats caller contract violations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReleaseMode {
    /// No validation. Releasing a stale or foreign handle acts on whatever
    /// block sits at that offset (or is ignored if none does).
    #[default]
    Trusting,
    /// Liveness tags are verified on every release. Rejected calls are
    /// logged and leave the heap untouched.
    Checked,
}

/// Configuration for an [`ArenaHeap`](crate::ArenaHeap).
///
/// Validated at construction; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Total arena capacity in bytes, headers included.
    ///
    /// Must be a multiple of [`ALIGNMENT`] and large enough for one header
    /// plus one aligned payload word.
    pub heap_size: usize,

    /// Release validation policy.
    pub release_mode: ReleaseMode,
}

impl HeapConfig {
    /// Create a config for an arena of `heap_size` bytes in trusting mode.
    pub fn new(heap_size: usize) -> Self {
        Self {
            heap_size,
            release_mode: ReleaseMode::Trusting,
        }
    }

    /// Builder-style setter for the release mode.
    pub fn with_release_mode(mut self, release_mode: ReleaseMode) -> Self {
        self.release_mode = release_mode;
        self
    }

    /// Shorthand for `with_release_mode(ReleaseMode::Checked)`.
    pub fn checked(self) -> Self {
        self.with_release_mode(ReleaseMode::Checked)
    }

    /// Payload capacity of the single block installed by `init`.
    pub fn initial_block_size(&self) -> usize {
        self.heap_size - HEADER_SIZE
    }

    /// Check that the arena can be partitioned.
    pub fn validate(&self) -> Result<(), HeapError> {
        if self.heap_size % ALIGNMENT != 0 {
            return Err(HeapError::InvalidConfig {
                reason: format!(
                    "heap_size ({}) must be a multiple of {ALIGNMENT}",
                    self.heap_size
                ),
            });
        }
        if self.heap_size < HEADER_SIZE + ALIGNMENT {
            return Err(HeapError::InvalidConfig {
                reason: format!(
                    "heap_size ({}) must be at least {} bytes",
                    self.heap_size,
                    HEADER_SIZE + ALIGNMENT
                ),
            });
        }
        Ok(())
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_SIZE)
    }
}

/// Round a requested payload size up to the next multiple of [`ALIGNMENT`].
///
/// Returns `None` if rounding would overflow `usize`. A request of zero
/// stays zero.
pub const fn align_request(size: usize) -> Option<usize> {
    match size.checked_add(ALIGNMENT - 1) {
        Some(padded) => Some(padded & !(ALIGNMENT - 1)),
        None => None,
    }
}
