//! Fragmentation report for the stress workload.
//!
//! Demonstrates: build a workload → replay it on the default heap → print
//! occupancy and fragmentation at intervals → drain and confirm the heap
//! collapses back to one block.

use firstfit_arena::{ArenaHeap, Payload};
use firstfit_bench::stress_workload;
use firstfit_test_utils::Op;

fn main() {
    println!("=== firstfit fragmentation report ===\n");

    let workload = stress_workload(42);
    let mut heap = ArenaHeap::default();
    let mut slots: Vec<Option<Payload>> = Vec::with_capacity(workload.slot_count());

    println!(
        "{:>8} {:>7} {:>7} {:>9} {:>9} {:>9} {:>6}",
        "op", "blocks", "free", "used_b", "free_b", "largest", "frag"
    );
    for (i, op) in workload.ops().iter().enumerate() {
        match *op {
            Op::Alloc { size } => slots.push(heap.allocate(size).ok()),
            Op::Release { slot } => heap.release(slots[slot].take()),
        }
        if i % 5_000 == 0 {
            let s = heap.stats();
            println!(
                "{:>8} {:>7} {:>7} {:>9} {:>9} {:>9} {:>6.3}",
                i,
                s.block_count,
                s.free_blocks,
                s.used_bytes,
                s.free_bytes,
                s.largest_free,
                s.fragmentation()
            );
        }
    }

    let s = heap.stats();
    println!(
        "\nallocations={} failed={} releases={} splits={} merges={}",
        s.allocations, s.failed_allocations, s.releases, s.splits, s.merges
    );

    for p in slots.into_iter().flatten() {
        heap.release(p);
    }
    heap.validate().unwrap();
    println!(
        "after drain: {} block(s), {} free bytes",
        heap.block_count(),
        heap.stats().free_bytes
    );
}
