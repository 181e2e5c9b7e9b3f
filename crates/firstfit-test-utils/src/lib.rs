//! Test utilities for firstfit development.
//!
//! Provides a seeded [`Workload`] generator and a [`replay()`] driver that
//! runs a workload against an [`ArenaHeap`](firstfit_arena::ArenaHeap),
//! stamping every payload with a per-slot byte pattern and checking it
//! survives until release.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod replay;
pub mod workload;

pub use replay::{replay, ReplayError, ReplayReport};
pub use workload::{Op, Workload, WorkloadConfig};
