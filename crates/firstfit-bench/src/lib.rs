//! Benchmark profiles and utilities for the firstfit allocator.
//!
//! Provides pre-built workloads and heap states for benchmarking and
//! examples:
//!
//! - [`reference_workload`]: mixed small/medium churn on the default 64 KiB heap
//! - [`stress_workload`]: 10x the ops with a higher live-slot ceiling
//! - [`fragmented_heap`]: a heap whose block list alternates used and free

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use firstfit_arena::{ArenaHeap, HeapConfig, Payload, HEADER_SIZE};
use firstfit_test_utils::{Workload, WorkloadConfig};

/// Build the reference workload: 5 000 ops, requests of 8..=256 bytes,
/// at most 96 live allocations. Fits comfortably in the default heap.
pub fn reference_workload(seed: u64) -> Workload {
    Workload::generate(
        seed,
        WorkloadConfig {
            ops: 5_000,
            min_size: 8,
            max_size: 256,
            release_ratio: 0.45,
            max_live: 96,
        },
    )
}

/// Build a stress workload: 50 000 ops, requests up to 1 KiB, up to 512
/// live allocations. Runs the default heap into exhaustion regularly.
pub fn stress_workload(seed: u64) -> Workload {
    Workload::generate(
        seed,
        WorkloadConfig {
            ops: 50_000,
            min_size: 1,
            max_size: 1024,
            release_ratio: 0.4,
            max_live: 512,
        },
    )
}

/// Build a heap with `n` free holes of 16 bytes, each pinned between two
/// live 8-byte allocations, followed by the remaining free tail.
///
/// Any request above 16 bytes has to walk past every hole before the tail
/// satisfies it, so this measures the worst case of the first-fit scan.
/// Returns the heap and the handles of the pinning allocations.
pub fn fragmented_heap(n: usize) -> (ArenaHeap, Vec<Payload>) {
    // Each pair costs two headers plus 8 + 16 payload bytes; leave a tail.
    let per_pair = 2 * HEADER_SIZE + 8 + 16;
    let heap_size = (n * per_pair + 4096).next_multiple_of(8);
    let mut heap =
        ArenaHeap::new(HeapConfig::new(heap_size)).expect("heap size is a multiple of 8");

    let mut holes = Vec::with_capacity(n);
    let mut pins = Vec::with_capacity(n + 1);
    for _ in 0..n {
        pins.push(heap.allocate(8).expect("pin fits by construction"));
        holes.push(heap.allocate(16).expect("hole fits by construction"));
    }
    pins.push(heap.allocate(8).expect("final pin fits by construction"));
    for hole in holes {
        heap.release(hole);
    }
    (heap, pins)
}
