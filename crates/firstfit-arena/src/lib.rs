//! First-fit heap allocation over a fixed byte arena.
//!
//! An [`ArenaHeap`] owns one contiguous, zero-initialised arena and
//! partitions it into blocks. Each block is a header region followed by
//! payload bytes; together the blocks tile the arena exactly.
//!
//! # Architecture
//!
//! ```text
//! ArenaHeap
//! ├── AlignedBytes        (the arena, 8-byte aligned base)
//! ├── BlockTable          (block records, index-linked in address order)
//! │   ├── slots[]         (recycled through a free-slot list)
//! │   └── by_payload      (payload offset → slot, for release)
//! └── Counters            (cumulative activity, surfaced via HeapStats)
//! ```
//!
//! # Operations
//!
//! - **allocate:** round the request up to 8, take the lowest-address free
//!   block that fits, split off the remainder if it can hold a header plus
//!   8 bytes.
//! - **release:** mark the block free, then sweep the whole list merging
//!   every pair of adjacent free blocks.
//!
//! Allocations are named by [`Payload`] handles (offset + liveness tag)
//! rather than references, so the heap can be mutated while handles are
//! held. [`ReleaseMode::Checked`] uses the tag to reject double and stale
//! releases.
//!
//! This crate is one of two that may contain `unsafe` code (along with
//! `firstfit-ffi`), and only inside `raw.rs`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

mod block;
pub mod config;
pub mod error;
pub mod handle;
pub mod heap;
mod raw;
pub mod stats;

// Public re-exports for the primary API surface.
pub use block::BlockView;
pub use config::{HeapConfig, ReleaseMode, DEFAULT_HEAP_SIZE, HEADER_SIZE};
pub use error::HeapError;
pub use handle::Payload;
pub use heap::ArenaHeap;
pub use stats::HeapStats;
