//! C-compatible heap statistics.

use firstfit_arena::HeapStats;

use crate::heap::heap;
use crate::status::FirstfitStatus;

/// C-compatible heap statistics returned from `firstfit_stats`.
///
/// Every field is a fixed-width `u64` for ABI portability (not `usize`).
#[repr(C)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FirstfitStats {
    /// Total arena capacity in bytes.
    pub heap_size: u64,
    /// Number of blocks in the list.
    pub block_count: u64,
    /// Number of free blocks.
    pub free_blocks: u64,
    /// Number of allocated blocks.
    pub used_blocks: u64,
    /// Sum of free payload sizes.
    pub free_bytes: u64,
    /// Sum of allocated payload sizes.
    pub used_bytes: u64,
    /// Largest single free payload.
    pub largest_free: u64,
    /// Bytes consumed by block headers.
    pub header_bytes: u64,
    /// Successful allocations since the last init.
    pub allocations: u64,
    /// Releases that freed a block since the last init.
    pub releases: u64,
    /// Allocations that returned NULL.
    pub failed_allocations: u64,
    /// Releases refused by checked mode.
    pub rejected_releases: u64,
    /// Blocks split during allocation.
    pub splits: u64,
    /// Block pairs merged by coalescing.
    pub merges: u64,
}

// Compile-time layout assertions for ABI stability.
// 14×u64 = 112 bytes, align 8.
const _: () = assert!(std::mem::size_of::<FirstfitStats>() == 112);
const _: () = assert!(std::mem::align_of::<FirstfitStats>() == 8);

impl FirstfitStats {
    pub(crate) fn from_rust(s: &HeapStats) -> Self {
        Self {
            heap_size: s.heap_size as u64,
            block_count: s.block_count as u64,
            free_blocks: s.free_blocks as u64,
            used_blocks: s.used_blocks as u64,
            free_bytes: s.free_bytes as u64,
            used_bytes: s.used_bytes as u64,
            largest_free: s.largest_free as u64,
            header_bytes: s.header_bytes as u64,
            allocations: s.allocations,
            releases: s.releases,
            failed_allocations: s.failed_allocations,
            rejected_releases: s.rejected_releases,
            splits: s.splits,
            merges: s.merges,
        }
    }
}

/// Snapshot statistics for the global heap into `*out`.
///
/// Returns `InvalidArgument` if `out` is NULL and `NotInitialized` before
/// `firstfit_init`; `out` is not written in either case.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn firstfit_stats(out: *mut FirstfitStats) -> i32 {
    ffi_guard!({
        if out.is_null() {
            return FirstfitStatus::InvalidArgument as i32;
        }
        let guard = ffi_lock!(heap());
        let Some(h) = guard.as_ref() else {
            return FirstfitStatus::NotInitialized as i32;
        };
        let stats = FirstfitStats::from_rust(&h.stats());
        // SAFETY: out is non-null and valid per caller contract.
        unsafe { *out = stats };
        FirstfitStatus::Ok as i32
    })
}
