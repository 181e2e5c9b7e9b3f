//! Heap occupancy and activity statistics.
//!
//! [`HeapStats`] combines a walk of the block list (occupancy) with the
//! cumulative operation counters the heap maintains (activity).

/// Cumulative operation counters, maintained by the heap.
///
/// Reset by `init`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub(crate) allocations: u64,
    pub(crate) releases: u64,
    pub(crate) failed_allocations: u64,
    pub(crate) rejected_releases: u64,
    pub(crate) splits: u64,
    pub(crate) merges: u64,
}

/// Point-in-time statistics for an [`ArenaHeap`](crate::ArenaHeap).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeapStats {
    /// Total arena capacity in bytes.
    pub heap_size: usize,
    /// Number of blocks in the list.
    pub block_count: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Number of allocated blocks.
    pub used_blocks: usize,
    /// Sum of free payload sizes.
    pub free_bytes: usize,
    /// Sum of allocated payload sizes (including internal fragmentation).
    pub used_bytes: usize,
    /// Largest single free payload; the biggest request that can succeed.
    pub largest_free: usize,
    /// Bytes consumed by block headers.
    pub header_bytes: usize,
    /// Successful allocations since the last `init`.
    pub allocations: u64,
    /// Releases that freed a block since the last `init`.
    pub releases: u64,
    /// Allocations that failed with out-of-memory.
    pub failed_allocations: u64,
    /// Releases refused by checked mode.
    pub rejected_releases: u64,
    /// Blocks split during allocation.
    pub splits: u64,
    /// Block pairs merged by coalescing.
    pub merges: u64,
}

impl HeapStats {
    /// External fragmentation: `1 - largest_free / free_bytes`.
    ///
    /// 0.0 when all free space is one block (or nothing is free), approaching
    /// 1.0 as free space splinters into many small blocks.
    pub fn fragmentation(&self) -> f64 {
        if self.free_bytes == 0 {
            return 0.0;
        }
        1.0 - self.largest_free as f64 / self.free_bytes as f64
    }

    pub(crate) fn with_counters(mut self, counters: &Counters) -> Self {
        self.allocations = counters.allocations;
        self.releases = counters.releases;
        self.failed_allocations = counters.failed_allocations;
        self.rejected_releases = counters.rejected_releases;
        self.splits = counters.splits;
        self.merges = counters.merges;
        self
    }
}
