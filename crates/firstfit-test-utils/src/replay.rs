//! Replay a [`Workload`] against a heap with integrity checks.
//!
//! Every successful allocation is filled with a byte derived from its slot
//! number. Before a slot is released its bytes are checked; a mismatch
//! means another allocation overlapped it. The heap is validated after
//! every op, and once the workload ends every remaining slot is released
//! and the heap must have collapsed back to a single free block.

use std::error::Error;
use std::fmt;

use firstfit_arena::{ArenaHeap, HeapError, HeapStats, Payload};

use crate::workload::{Op, Workload};

/// Summary of a successful replay.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplayReport {
    /// Ops executed, including the final drain.
    pub ops: usize,
    /// Allocations that succeeded.
    pub allocations: usize,
    /// Allocations that returned out-of-memory.
    pub failed_allocations: usize,
    /// Releases issued (failed slots are skipped and not counted).
    pub releases: usize,
    /// Highest block count observed.
    pub peak_blocks: usize,
    /// Highest sum of allocated payload bytes observed.
    pub peak_used_bytes: usize,
    /// Highest fragmentation ratio observed.
    pub peak_fragmentation: f64,
    /// Heap statistics before the final drain.
    pub before_drain: HeapStats,
}

/// Why a replay failed.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplayError {
    /// `validate()` failed after op `step`.
    Invalid { step: usize, source: HeapError },
    /// A slot's payload was overwritten before release.
    Overlap {
        step: usize,
        slot: usize,
        offset: usize,
    },
    /// A release named a slot that was never allocated or already released.
    BadSlot { step: usize, slot: usize },
    /// The heap did not collapse to one free block after the drain.
    Residual { blocks: usize, free_bytes: usize },
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { step, source } => {
                write!(f, "heap invalid after step {step}: {source}")
            }
            Self::Overlap { step, slot, offset } => {
                write!(
                    f,
                    "slot {slot} at offset {offset} corrupted before release at step {step}"
                )
            }
            Self::BadSlot { step, slot } => {
                write!(f, "step {step} releases slot {slot}, which is not live")
            }
            Self::Residual { blocks, free_bytes } => {
                write!(
                    f,
                    "heap left with {blocks} blocks ({free_bytes} free bytes) after drain"
                )
            }
        }
    }
}

impl Error for ReplayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invalid { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Fill byte for a slot. Never zero, so a fresh zeroed block never passes
/// for a filled one.
pub fn pattern(slot: usize) -> u8 {
    (slot % 255) as u8 + 1
}

/// Run `workload` against `heap`, which should be freshly initialised.
///
/// Allocations that fail leave their slot empty; later releases of that
/// slot are skipped, matching how a caller would never free a null result.
pub fn replay(heap: &mut ArenaHeap, workload: &Workload) -> Result<ReplayReport, ReplayError> {
    let mut slots: Vec<Option<Payload>> = Vec::with_capacity(workload.slot_count());
    let mut released: Vec<bool> = Vec::with_capacity(workload.slot_count());
    let mut report = ReplayReport::default();

    for (step, op) in workload.ops().iter().enumerate() {
        match *op {
            Op::Alloc { size } => {
                let slot = slots.len();
                match heap.allocate(size) {
                    Ok(payload) => {
                        if let Some(bytes) = heap.bytes_mut(payload) {
                            bytes.fill(pattern(slot));
                        }
                        slots.push(Some(payload));
                        report.allocations += 1;
                    }
                    Err(_) => {
                        slots.push(None);
                        report.failed_allocations += 1;
                    }
                }
                released.push(false);
            }
            Op::Release { slot } => {
                if slot >= slots.len() || released[slot] {
                    return Err(ReplayError::BadSlot { step, slot });
                }
                released[slot] = true;
                if let Some(payload) = slots[slot].take() {
                    check_pattern(heap, payload, slot, step)?;
                    heap.release(payload);
                    report.releases += 1;
                }
            }
        }

        heap.validate()
            .map_err(|source| ReplayError::Invalid { step, source })?;
        let stats = heap.stats();
        report.peak_blocks = report.peak_blocks.max(stats.block_count);
        report.peak_used_bytes = report.peak_used_bytes.max(stats.used_bytes);
        report.peak_fragmentation = report.peak_fragmentation.max(stats.fragmentation());
        report.ops += 1;
    }

    report.before_drain = heap.stats();

    let drain_start = report.ops;
    for (slot, payload) in slots.iter_mut().enumerate() {
        if let Some(payload) = payload.take() {
            let step = drain_start + slot;
            check_pattern(heap, payload, slot, step)?;
            heap.release(payload);
            report.releases += 1;
            report.ops += 1;
            heap.validate()
                .map_err(|source| ReplayError::Invalid { step, source })?;
        }
    }

    let stats = heap.stats();
    if stats.block_count != 1 || stats.free_blocks != 1 {
        return Err(ReplayError::Residual {
            blocks: stats.block_count,
            free_bytes: stats.free_bytes,
        });
    }
    Ok(report)
}

fn check_pattern(
    heap: &ArenaHeap,
    payload: Payload,
    slot: usize,
    step: usize,
) -> Result<(), ReplayError> {
    let expected = pattern(slot);
    let intact = heap
        .bytes(payload)
        .is_some_and(|bytes| bytes.iter().all(|&b| b == expected));
    if intact {
        Ok(())
    } else {
        Err(ReplayError::Overlap {
            step,
            slot,
            offset: payload.offset(),
        })
    }
}
