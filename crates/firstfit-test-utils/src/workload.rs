//! Seeded allocate/release workloads.
//!
//! A [`Workload`] is a flat list of [`Op`]s. Releases name a *slot*: the
//! index of an earlier `Alloc` in the sequence. The generator only emits a
//! release for a slot that is currently live, so every workload is a valid
//! caller sequence regardless of whether individual allocations succeed.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// One step of a workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    /// Request `size` bytes. The resulting allocation occupies the next slot.
    Alloc { size: usize },
    /// Release the allocation made by the `slot`-th `Alloc`.
    Release { slot: usize },
}

/// Shape parameters for [`Workload::generate`].
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadConfig {
    /// Total number of ops to emit.
    pub ops: usize,
    /// Smallest request size (inclusive).
    pub min_size: usize,
    /// Largest request size (inclusive).
    pub max_size: usize,
    /// Probability that a step releases a live slot instead of allocating.
    pub release_ratio: f64,
    /// Upper bound on simultaneously live slots; once reached the generator
    /// only releases.
    pub max_live: usize,
}

impl WorkloadConfig {
    /// Default number of ops.
    pub const DEFAULT_OPS: usize = 1_000;
    /// Default smallest request.
    pub const DEFAULT_MIN_SIZE: usize = 1;
    /// Default largest request.
    pub const DEFAULT_MAX_SIZE: usize = 512;
    /// Default release probability.
    pub const DEFAULT_RELEASE_RATIO: f64 = 0.45;
    /// Default live-slot cap.
    pub const DEFAULT_MAX_LIVE: usize = 64;
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            ops: Self::DEFAULT_OPS,
            min_size: Self::DEFAULT_MIN_SIZE,
            max_size: Self::DEFAULT_MAX_SIZE,
            release_ratio: Self::DEFAULT_RELEASE_RATIO,
            max_live: Self::DEFAULT_MAX_LIVE,
        }
    }
}

/// A deterministic sequence of allocator calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workload {
    seed: u64,
    ops: Vec<Op>,
}

impl Workload {
    /// Generate a workload from `seed`. The same seed and config always
    /// produce the same ops.
    ///
    /// # Panics
    ///
    /// If `min_size > max_size`.
    pub fn generate(seed: u64, config: WorkloadConfig) -> Self {
        assert!(
            config.min_size <= config.max_size,
            "min_size {} exceeds max_size {}",
            config.min_size,
            config.max_size
        );
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut ops = Vec::with_capacity(config.ops);
        let mut live: Vec<usize> = Vec::new();
        let mut next_slot = 0usize;

        for _ in 0..config.ops {
            let must_release = live.len() >= config.max_live.max(1);
            let release = !live.is_empty()
                && (must_release || rng.random_bool(config.release_ratio.clamp(0.0, 1.0)));
            if release {
                let idx = rng.random_range(0..live.len());
                let slot = live.swap_remove(idx);
                ops.push(Op::Release { slot });
            } else {
                let size = rng.random_range(config.min_size..=config.max_size);
                ops.push(Op::Alloc { size });
                live.push(next_slot);
                next_slot += 1;
            }
        }

        Self { seed, ops }
    }

    /// Build a workload from an explicit op list.
    pub fn from_ops(ops: Vec<Op>) -> Self {
        Self { seed: 0, ops }
    }

    /// Seed used to generate the workload (0 for hand-built ones).
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Number of `Alloc` ops, i.e. the number of slots.
    pub fn slot_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::Alloc { .. }))
            .count()
    }
}
