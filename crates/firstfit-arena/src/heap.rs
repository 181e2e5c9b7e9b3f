//! The first-fit arena heap.
//!
//! [`ArenaHeap`] owns a fixed byte arena and the block list that partitions
//! it. `allocate` walks the list for the first free block large enough for
//! the aligned request and splits off any usable remainder; `release` frees
//! a block and then sweeps the whole list merging neighbouring free blocks.
//!
//! # Layout
//!
//! Every block occupies `HEADER_SIZE + size` bytes of the arena. The list
//! always partitions the arena exactly:
//!
//! ```text
//! block.offset + HEADER_SIZE + block.size == next.offset   (or heap_size)
//! ```
//!
//! # Checked mode
//!
//! Each allocation is stamped with a non-zero tag carried by its
//! [`Payload`]. [`ArenaHeap::try_release`] compares tags and refuses
//! double releases, stale handles and offsets that name no block. With
//! [`ReleaseMode::Checked`] plain [`ArenaHeap::release`] does the same and
//! logs what it refused.

use log::{debug, error, trace, warn};
use smallvec::SmallVec;

use crate::block::{BlockId, BlockTable, BlockView};
use crate::config::{align_request, HeapConfig, ReleaseMode, HEADER_SIZE, MIN_SPLIT_PAYLOAD};
use crate::error::HeapError;
use crate::handle::Payload;
use crate::raw::AlignedBytes;
use crate::stats::{Counters, HeapStats};

/// A first-fit allocator over one fixed-size arena.
///
/// Operations take `&mut self`; the heap does no internal locking. Wrap it
/// in a `Mutex` to share it between threads.
pub struct ArenaHeap {
    config: HeapConfig,
    arena: AlignedBytes,
    blocks: BlockTable,
    /// Next liveness tag to stamp. Never zero.
    next_tag: u32,
    counters: Counters,
}

impl ArenaHeap {
    /// Create a heap over a zeroed arena of `config.heap_size` bytes and
    /// partition it into one free block.
    pub fn new(config: HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;
        let mut heap = Self {
            arena: AlignedBytes::zeroed(config.heap_size)?,
            blocks: BlockTable::new(),
            next_tag: 1,
            counters: Counters::default(),
            config,
        };
        heap.init();
        Ok(heap)
    }

    /// Re-partition the arena into a single free block.
    ///
    /// Every outstanding allocation is discarded without warning. The tag
    /// counter keeps running, so handles issued before `init` are rejected
    /// by checked mode afterwards.
    pub fn init(&mut self) {
        self.blocks.reset(self.config.heap_size);
        self.counters = Counters::default();
        debug!(
            "heap init: {} bytes, initial block {} bytes",
            self.config.heap_size,
            self.config.initial_block_size()
        );
    }

    /// The configuration this heap was built with.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Switch the release policy without touching the arena or the blocks.
    pub fn set_release_mode(&mut self, release_mode: ReleaseMode) {
        self.config.release_mode = release_mode;
    }

    /// Allocate at least `size` payload bytes.
    ///
    /// The request is rounded up to a multiple of 8 and served from the
    /// lowest-address free block that fits. A block with enough room left
    /// over for a header and 8 more bytes is split; otherwise the whole
    /// block is handed out and the slack becomes internal fragmentation.
    ///
    /// # Errors
    ///
    /// [`HeapError::OutOfMemory`] if no free block is large enough.
    pub fn allocate(&mut self, size: usize) -> Result<Payload, HeapError> {
        let Some(aligned) = align_request(size) else {
            return Err(self.out_of_memory(size, usize::MAX));
        };

        let Some(id) = self.first_fit(aligned) else {
            return Err(self.out_of_memory(size, aligned));
        };

        let split_threshold = aligned
            .checked_add(HEADER_SIZE + MIN_SPLIT_PAYLOAD)
            .unwrap_or(usize::MAX);
        let block = self.blocks.get(id);
        if block.size >= split_threshold {
            let old_size = block.size;
            let remainder_offset = block.offset + HEADER_SIZE + aligned;
            let remainder_size = old_size - aligned - HEADER_SIZE;
            self.blocks.get_mut(id).size = aligned;
            self.blocks.insert_after(id, remainder_offset, remainder_size);
            self.counters.splits += 1;
            trace!(
                "split block {}: {} -> {} + free {} at {}",
                self.blocks.get(id).offset,
                old_size,
                aligned,
                remainder_size,
                remainder_offset
            );
        }

        let tag = self.stamp_tag();
        let block = self.blocks.get_mut(id);
        block.free = false;
        block.tag = tag;
        self.counters.allocations += 1;
        Ok(Payload::new(block.payload_offset(), tag))
    }

    /// Release an allocation and coalesce the free list.
    ///
    /// `None` is accepted and ignored, mirroring `free(NULL)`.
    ///
    /// In [`ReleaseMode::Trusting`] no validation is done: the handle's tag
    /// is ignored and an offset with no block is skipped. In
    /// [`ReleaseMode::Checked`] the call is validated as in
    /// [`try_release`](Self::try_release) and refused calls are logged.
    pub fn release(&mut self, payload: impl Into<Option<Payload>>) {
        let Some(payload) = payload.into() else {
            return;
        };

        match self.config.release_mode {
            ReleaseMode::Trusting => {
                let Some(id) = self.blocks.find_by_payload(payload.offset) else {
                    warn!("release of offset {} which starts no block", payload.offset);
                    return;
                };
                self.free_and_coalesce(id);
            }
            ReleaseMode::Checked => {
                if let Err(e) = self.try_release(payload) {
                    error!("release refused: {e}");
                }
            }
        }
    }

    /// Release an allocation after verifying the handle is live.
    ///
    /// Works regardless of the configured [`ReleaseMode`]. On error the heap
    /// is left untouched.
    ///
    /// # Errors
    ///
    /// - [`HeapError::UnknownPointer`] if no block's payload starts at the
    ///   handle's offset.
    /// - [`HeapError::DoubleRelease`] if that block is already free.
    /// - [`HeapError::StaleHandle`] if that block was reallocated after the
    ///   handle was issued.
    pub fn try_release(&mut self, payload: Payload) -> Result<(), HeapError> {
        match self.live_block(payload) {
            Ok(id) => {
                self.free_and_coalesce(id);
                Ok(())
            }
            Err(e) => {
                self.counters.rejected_releases += 1;
                Err(e)
            }
        }
    }

    /// Payload bytes of a live allocation.
    ///
    /// The slice covers the whole block, which may be longer than the
    /// original request. Returns `None` if the handle names no allocated
    /// block (or, in checked mode, a stale one).
    pub fn bytes(&self, payload: Payload) -> Option<&[u8]> {
        let id = self.resolve(payload)?;
        let block = self.blocks.get(id);
        let start = block.payload_offset();
        Some(&self.arena.as_bytes()[start..start + block.size])
    }

    /// Mutable payload bytes of a live allocation. See [`bytes`](Self::bytes).
    pub fn bytes_mut(&mut self, payload: Payload) -> Option<&mut [u8]> {
        let id = self.resolve(payload)?;
        let block = self.blocks.get(id);
        let start = block.payload_offset();
        let end = start + block.size;
        Some(&mut self.arena.as_bytes_mut()[start..end])
    }

    /// Usable payload size of a live allocation (`malloc_usable_size`).
    pub fn usable_size(&self, payload: Payload) -> Option<usize> {
        self.resolve(payload).map(|id| self.blocks.get(id).size)
    }

    /// Iterate all blocks in address order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockView> + '_ {
        self.blocks.iter().map(|(_, record)| BlockView::from(record))
    }

    /// Number of blocks in the list.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Current occupancy plus cumulative counters.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            heap_size: self.config.heap_size,
            ..Default::default()
        };
        for (_, block) in self.blocks.iter() {
            stats.block_count += 1;
            stats.header_bytes += HEADER_SIZE;
            if block.free {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
                stats.largest_free = stats.largest_free.max(block.size);
            } else {
                stats.used_blocks += 1;
                stats.used_bytes += block.size;
            }
        }
        stats.with_counters(&self.counters)
    }

    /// Verify the structural invariants of the block list.
    ///
    /// Checks that blocks start at offset 0, tile the arena with no gaps
    /// or overlaps, end exactly at `heap_size`, that the payload index
    /// agrees with the list, and that no two neighbouring blocks are both
    /// free (which `release` guarantees after every sweep).
    ///
    /// # Errors
    ///
    /// [`HeapError::Corrupted`] describing the first violation found.
    pub fn validate(&self) -> Result<(), HeapError> {
        if self.arena.len() != self.config.heap_size {
            return Err(corrupted(format!(
                "arena holds {} bytes, configured for {}",
                self.arena.len(),
                self.config.heap_size
            )));
        }
        let mut expected_offset = 0usize;
        let mut prev_free = false;
        let mut count = 0usize;

        for (id, block) in self.blocks.iter() {
            if block.offset != expected_offset {
                return Err(corrupted(format!(
                    "block {count} starts at {} but previous block ends at {expected_offset}",
                    block.offset
                )));
            }
            if block.end() > self.config.heap_size {
                return Err(corrupted(format!(
                    "block at {} ends at {} beyond heap size {}",
                    block.offset,
                    block.end(),
                    self.config.heap_size
                )));
            }
            if self.blocks.find_by_payload(block.payload_offset()) != Some(id) {
                return Err(corrupted(format!(
                    "payload index disagrees with list for block at {}",
                    block.offset
                )));
            }
            if prev_free && block.free {
                return Err(corrupted(format!(
                    "adjacent free blocks left uncoalesced at {}",
                    block.offset
                )));
            }
            prev_free = block.free;
            expected_offset = block.end();
            count += 1;
        }

        if expected_offset != self.config.heap_size {
            return Err(corrupted(format!(
                "block list ends at {expected_offset}, heap size is {}",
                self.config.heap_size
            )));
        }
        if count != self.blocks.len() {
            return Err(corrupted(format!(
                "list holds {count} blocks, payload index holds {}",
                self.blocks.len()
            )));
        }
        Ok(())
    }

    /// Base address of the arena.
    ///
    /// For boundaries that trade in addresses rather than [`Payload`]
    /// handles: the address of a payload is `as_mut_ptr() + offset`. The
    /// pointer stays valid for as long as the heap is alive and not moved
    /// out of its owner.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.arena.base_ptr()
    }

    /// Handle for the allocated block whose payload starts at `offset`.
    ///
    /// Recovers the live tag for callers that only kept an address. Returns
    /// `None` if no block starts there or the block is free.
    pub fn payload_at(&self, offset: usize) -> Option<Payload> {
        let id = self.blocks.find_by_payload(offset)?;
        let block = self.blocks.get(id);
        (!block.free).then(|| Payload::new(offset, block.tag))
    }

    fn first_fit(&self, aligned: usize) -> Option<BlockId> {
        self.blocks
            .iter()
            .find(|(_, block)| block.free && block.size >= aligned)
            .map(|(id, _)| id)
    }

    fn free_and_coalesce(&mut self, id: BlockId) {
        self.blocks.get_mut(id).free = true;
        self.counters.releases += 1;
        let absorbed = self.coalesce();
        self.counters.merges += absorbed.len() as u64;
        if !absorbed.is_empty() {
            trace!(
                "release of block {} absorbed blocks at {:?}",
                self.blocks.get(id).offset,
                absorbed.as_slice()
            );
        }
    }

    /// Sweep the whole list once, merging every run of free neighbours.
    ///
    /// After a merge the same block is checked against its new successor
    /// before moving on, so runs of three or more collapse in one pass.
    /// Returns the header offsets of the absorbed blocks.
    fn coalesce(&mut self) -> SmallVec<[usize; 4]> {
        let mut absorbed = SmallVec::new();
        let mut cursor = self.blocks.head();
        while let Some(id) = cursor {
            let block = self.blocks.get(id);
            let next_free = block
                .next
                .is_some_and(|next| self.blocks.get(next).free);
            if block.free && next_free {
                if let Some(victim) = self.blocks.absorb_next(id) {
                    absorbed.push(victim);
                }
            } else {
                cursor = block.next;
            }
        }
        absorbed
    }

    /// Look up the block for `payload`, applying checked-mode rules when
    /// configured. Used by the read paths.
    fn resolve(&self, payload: Payload) -> Option<BlockId> {
        match self.config.release_mode {
            ReleaseMode::Checked => self.live_block(payload).ok(),
            ReleaseMode::Trusting => {
                let id = self.blocks.find_by_payload(payload.offset)?;
                (!self.blocks.get(id).free).then_some(id)
            }
        }
    }

    fn live_block(&self, payload: Payload) -> Result<BlockId, HeapError> {
        let offset = payload.offset;
        let id = self
            .blocks
            .find_by_payload(offset)
            .ok_or(HeapError::UnknownPointer { offset })?;
        let block = self.blocks.get(id);
        if block.free {
            return Err(HeapError::DoubleRelease { offset });
        }
        if block.tag != payload.tag {
            return Err(HeapError::StaleHandle {
                offset,
                expected: block.tag,
                found: payload.tag,
            });
        }
        Ok(id)
    }

    fn stamp_tag(&mut self) -> u32 {
        let tag = self.next_tag;
        self.next_tag = match self.next_tag.wrapping_add(1) {
            0 => 1,
            t => t,
        };
        tag
    }

    fn out_of_memory(&mut self, requested: usize, aligned: usize) -> HeapError {
        self.counters.failed_allocations += 1;
        let largest_free = self
            .blocks
            .iter()
            .filter(|(_, b)| b.free)
            .map(|(_, b)| b.size)
            .max()
            .unwrap_or(0);
        debug!(
            "allocation of {requested} bytes ({aligned} aligned) failed, largest free block {largest_free}"
        );
        HeapError::OutOfMemory {
            requested,
            aligned,
            largest_free,
        }
    }
}

impl Default for ArenaHeap {
    fn default() -> Self {
        match Self::new(HeapConfig::default()) {
            Ok(heap) => heap,
            Err(e) => unreachable!("default heap config is valid: {e}"),
        }
    }
}

impl std::fmt::Debug for ArenaHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaHeap")
            .field("config", &self.config)
            .field("blocks", &self.blocks().collect::<Vec<_>>())
            .field("record_slots", &self.blocks.slot_capacity())
            .field("recycled_slots", &self.blocks.recycled_slots())
            .finish()
    }
}

fn corrupted(reason: String) -> HeapError {
    HeapError::Corrupted { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap(size: usize) -> ArenaHeap {
        ArenaHeap::new(HeapConfig::new(size)).unwrap()
    }

    fn checked_heap(size: usize) -> ArenaHeap {
        ArenaHeap::new(HeapConfig::new(size).checked()).unwrap()
    }

    fn layout(heap: &ArenaHeap) -> Vec<(usize, usize, bool)> {
        heap.blocks().map(|b| (b.offset, b.size, b.free)).collect()
    }

    // ── init ────────────────────────────────────────────────────

    #[test]
    fn new_heap_is_one_free_block() {
        let h = heap(1024);
        assert_eq!(layout(&h), vec![(0, 1000, true)]);
        h.validate().unwrap();
    }

    #[test]
    fn invalid_config_rejected() {
        let result = ArenaHeap::new(HeapConfig::new(12));
        assert!(matches!(result, Err(HeapError::InvalidConfig { .. })));
    }

    #[test]
    fn init_discards_allocations() {
        let mut h = heap(1024);
        h.allocate(100).unwrap();
        h.allocate(200).unwrap();
        assert_eq!(h.block_count(), 3);

        h.init();
        assert_eq!(layout(&h), vec![(0, 1000, true)]);
        assert_eq!(h.stats().allocations, 0);
    }

    #[test]
    fn default_heap_is_64k() {
        let h = ArenaHeap::default();
        assert_eq!(layout(&h), vec![(0, 65_536 - HEADER_SIZE, true)]);
    }

    // ── allocate ────────────────────────────────────────────────

    #[test]
    fn allocate_splits_and_aligns() {
        let mut h = heap(1024);
        let p = h.allocate(100).unwrap();
        assert_eq!(p.offset(), HEADER_SIZE);
        assert_eq!(layout(&h), vec![(0, 104, false), (128, 872, true)]);
        h.validate().unwrap();
    }

    #[test]
    fn zero_byte_allocation_is_valid() {
        let mut h = heap(1024);
        let p = h.allocate(0).unwrap();
        assert_eq!(h.usable_size(p), Some(0));
        assert_eq!(layout(&h), vec![(0, 0, false), (24, 976, true)]);
        assert_eq!(h.bytes(p).unwrap().len(), 0);
    }

    #[test]
    fn small_remainder_is_not_split() {
        let mut h = heap(1024);
        // 1000 - 976 = 24: leftover holds a header but no payload word.
        let p = h.allocate(976).unwrap();
        assert_eq!(layout(&h), vec![(0, 1000, false)]);
        assert_eq!(h.usable_size(p), Some(1000));
    }

    #[test]
    fn remainder_of_exactly_header_plus_eight_is_split() {
        let mut h = heap(1024);
        h.allocate(968).unwrap();
        assert_eq!(layout(&h), vec![(0, 968, false), (992, 8, true)]);
        h.validate().unwrap();
    }

    #[test]
    fn whole_heap_allocation_succeeds() {
        let mut h = heap(1024);
        assert!(h.allocate(1000).is_ok());
        assert_eq!(h.stats().free_bytes, 0);
    }

    #[test]
    fn exhaustion_returns_out_of_memory() {
        let mut h = heap(1024);
        let err = h.allocate(1001).unwrap_err();
        assert_eq!(
            err,
            HeapError::OutOfMemory {
                requested: 1001,
                aligned: 1008,
                largest_free: 1000,
            }
        );
        assert_eq!(h.stats().failed_allocations, 1);
        assert_eq!(layout(&h), vec![(0, 1000, true)]);
    }

    #[test]
    fn overflowing_request_is_out_of_memory() {
        let mut h = heap(1024);
        let err = h.allocate(usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            HeapError::OutOfMemory {
                aligned: usize::MAX,
                ..
            }
        ));
    }

    #[test]
    fn first_fit_picks_lowest_address() {
        let mut h = heap(1024);
        let a = h.allocate(64).unwrap();
        let _b = h.allocate(64).unwrap();
        let c = h.allocate(64).unwrap();
        let _d = h.allocate(64).unwrap();
        h.release(a);
        h.release(c);

        // Both holes fit 32; the lower one wins.
        let e = h.allocate(32).unwrap();
        assert_eq!(e.offset(), a.offset());
    }

    #[test]
    fn first_fit_skips_holes_too_small() {
        let mut h = heap(1024);
        let a = h.allocate(16).unwrap();
        let _b = h.allocate(16).unwrap();
        let c = h.allocate(128).unwrap();
        let _d = h.allocate(16).unwrap();
        h.release(a);
        h.release(c);

        let e = h.allocate(100).unwrap();
        assert_eq!(e.offset(), c.offset());
    }

    // ── release ─────────────────────────────────────────────────

    #[test]
    fn release_restores_single_block() {
        let mut h = heap(1024);
        let p = h.allocate(100).unwrap();
        h.release(p);
        assert_eq!(layout(&h), vec![(0, 1000, true)]);
    }

    #[test]
    fn release_none_is_noop() {
        let mut h = heap(1024);
        h.allocate(100).unwrap();
        let before = layout(&h);
        h.release(None);
        assert_eq!(layout(&h), before);
        assert_eq!(h.stats().releases, 0);
    }

    #[test]
    fn middle_release_does_not_merge_with_allocated_neighbours() {
        let mut h = heap(1024);
        let a = h.allocate(50).unwrap();
        let b = h.allocate(50).unwrap();
        let c = h.allocate(50).unwrap();
        assert_eq!(h.block_count(), 4);

        h.release(b);
        assert_eq!(h.block_count(), 4);
        assert!(h.blocks().nth(1).unwrap().free);

        h.release(a);
        assert_eq!(
            layout(&h),
            vec![(0, 56 + HEADER_SIZE + 56, true), (160, 56, false), (240, 760, true)]
        );

        h.release(c);
        assert_eq!(layout(&h), vec![(0, 1000, true)]);
    }

    #[test]
    fn three_blocks_filling_the_heap_exactly() {
        // 3 * (24 + 56): the third request consumes the last block whole.
        let mut h = heap(240);
        let a = h.allocate(50).unwrap();
        let b = h.allocate(50).unwrap();
        let _c = h.allocate(50).unwrap();
        assert_eq!(h.block_count(), 3);
        assert_eq!(h.stats().free_bytes, 0);

        h.release(b);
        assert_eq!(layout(&h), vec![(0, 56, false), (80, 56, true), (160, 56, false)]);

        h.release(a);
        assert_eq!(layout(&h), vec![(0, 136, true), (160, 56, false)]);
    }

    #[test]
    fn coalesce_reports_absorbed_header_offsets() {
        let mut h = heap(1024);
        let a = h.allocate(8).unwrap();
        let b = h.allocate(8).unwrap();
        let c = h.allocate(8).unwrap();
        let _d = h.allocate(8).unwrap();
        // Free a, b, c behind the sweep's back, then run it once.
        for p in [a, b, c] {
            let id = h.blocks.find_by_payload(p.offset()).unwrap();
            h.blocks.get_mut(id).free = true;
        }
        let absorbed = h.coalesce();
        assert_eq!(
            absorbed.as_slice(),
            &[b.header_offset().unwrap(), c.header_offset().unwrap()]
        );
        assert_eq!(h.block_count(), 3);
        h.validate().unwrap();
    }

    #[test]
    fn unreservable_arena_is_invalid_config() {
        let result = ArenaHeap::new(HeapConfig::new(usize::MAX & !7));
        assert!(matches!(result, Err(HeapError::InvalidConfig { .. })));
    }

    #[test]
    fn set_release_mode_keeps_arena_and_blocks() {
        let mut h = heap(1024);
        let base = h.as_mut_ptr();
        let a = h.allocate(16).unwrap();
        h.set_release_mode(ReleaseMode::Checked);
        assert_eq!(h.config().release_mode, ReleaseMode::Checked);
        assert_eq!(h.as_mut_ptr(), base);
        assert_eq!(h.usable_size(a), Some(16));
        h.release(a);
        assert!(matches!(h.try_release(a), Err(HeapError::DoubleRelease { .. })));
    }

    #[test]
    fn chain_of_three_free_blocks_collapses_in_one_release() {
        let mut h = heap(1024);
        let a = h.allocate(8).unwrap();
        let b = h.allocate(8).unwrap();
        let c = h.allocate(8).unwrap();
        let _d = h.allocate(8).unwrap();
        h.release(a);
        h.release(c);
        assert_eq!(h.block_count(), 5);

        h.release(b);
        let blocks: Vec<_> = h.blocks().collect();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].free);
        assert_eq!(blocks[0].size, 3 * 8 + 2 * HEADER_SIZE);
        h.validate().unwrap();
    }

    #[test]
    fn trusting_release_of_unknown_offset_is_ignored() {
        let mut h = heap(1024);
        h.allocate(100).unwrap();
        let before = layout(&h);
        h.release(Payload::from_raw_parts(7, 1));
        assert_eq!(layout(&h), before);
    }

    #[test]
    fn trusting_release_ignores_tag() {
        let mut h = heap(1024);
        let p = h.allocate(100).unwrap();
        h.release(Payload::from_raw_parts(p.offset(), p.tag() + 99));
        assert_eq!(layout(&h), vec![(0, 1000, true)]);
    }

    #[test]
    fn merges_and_splits_counted() {
        let mut h = heap(1024);
        let a = h.allocate(8).unwrap();
        let b = h.allocate(8).unwrap();
        h.release(a);
        h.release(b);
        let s = h.stats();
        assert_eq!(s.splits, 2);
        assert_eq!(s.merges, 2);
        assert_eq!(s.allocations, 2);
        assert_eq!(s.releases, 2);
    }

    // ── checked mode ────────────────────────────────────────────

    #[test]
    fn try_release_detects_double_release() {
        let mut h = heap(1024);
        let a = h.allocate(8).unwrap();
        let _b = h.allocate(8).unwrap();
        h.try_release(a).unwrap();
        assert_eq!(
            h.try_release(a),
            Err(HeapError::DoubleRelease { offset: a.offset() })
        );
        assert_eq!(h.stats().rejected_releases, 1);
    }

    #[test]
    fn try_release_detects_unknown_pointer() {
        let mut h = heap(1024);
        let bogus = Payload::from_raw_parts(500, 1);
        assert_eq!(
            h.try_release(bogus),
            Err(HeapError::UnknownPointer { offset: 500 })
        );
    }

    #[test]
    fn try_release_detects_stale_handle() {
        let mut h = heap(1024);
        let old = h.allocate(64).unwrap();
        h.release(old);
        let new = h.allocate(64).unwrap();
        assert_eq!(old.offset(), new.offset());

        assert_eq!(
            h.try_release(old),
            Err(HeapError::StaleHandle {
                offset: old.offset(),
                expected: new.tag(),
                found: old.tag(),
            })
        );
        assert!(h.bytes(new).is_some());
    }

    #[test]
    fn checked_release_refuses_without_mutating() {
        let mut h = checked_heap(1024);
        let a = h.allocate(8).unwrap();
        let _b = h.allocate(8).unwrap();
        h.release(a);
        let before = layout(&h);

        h.release(a);
        assert_eq!(layout(&h), before);
        assert_eq!(h.stats().releases, 1);
        assert_eq!(h.stats().rejected_releases, 1);
    }

    #[test]
    fn checked_bytes_reject_stale_handles() {
        let mut h = checked_heap(1024);
        let old = h.allocate(32).unwrap();
        h.release(old);
        let _new = h.allocate(32).unwrap();
        assert!(h.bytes(old).is_none());
        assert!(h.usable_size(old).is_none());
    }

    #[test]
    fn handles_from_before_init_are_stale_in_checked_mode() {
        let mut h = checked_heap(1024);
        let old = h.allocate(32).unwrap();
        h.init();
        let new = h.allocate(32).unwrap();
        assert_eq!(old.offset(), new.offset());
        assert_ne!(old.tag(), new.tag());
        assert!(matches!(
            h.try_release(old),
            Err(HeapError::StaleHandle { .. })
        ));
    }

    #[test]
    fn tag_counter_skips_zero_on_wrap() {
        let mut h = heap(1024);
        h.next_tag = u32::MAX;
        let a = h.allocate(8).unwrap();
        let b = h.allocate(8).unwrap();
        assert_eq!(a.tag(), u32::MAX);
        assert_eq!(b.tag(), 1);
    }

    // ── payload access ──────────────────────────────────────────

    #[test]
    fn payload_bytes_round_trip() {
        let mut h = heap(1024);
        let a = h.allocate(16).unwrap();
        let b = h.allocate(16).unwrap();
        h.bytes_mut(a).unwrap().fill(0xAA);
        h.bytes_mut(b).unwrap().fill(0xBB);
        assert!(h.bytes(a).unwrap().iter().all(|&x| x == 0xAA));
        assert!(h.bytes(b).unwrap().iter().all(|&x| x == 0xBB));
    }

    #[test]
    fn freed_payload_is_not_accessible() {
        let mut h = heap(1024);
        let a = h.allocate(16).unwrap();
        let _b = h.allocate(16).unwrap();
        h.release(a);
        assert!(h.bytes(a).is_none());
        assert!(h.bytes_mut(a).is_none());
    }

    #[test]
    fn payload_offsets_are_aligned() {
        let mut h = heap(4096);
        for size in [1, 3, 7, 13, 100, 0, 5] {
            let p = h.allocate(size).unwrap();
            assert_eq!(p.offset() % 8, 0);
        }
        let base = h.as_mut_ptr() as usize;
        assert_eq!(base % 8, 0);
    }

    #[test]
    fn payload_at_recovers_live_handle() {
        let mut h = heap(1024);
        let p = h.allocate(8).unwrap();
        let _q = h.allocate(8).unwrap();
        assert_eq!(h.payload_at(p.offset()), Some(p));
        assert_eq!(h.payload_at(3), None);

        h.release(p);
        assert_eq!(h.payload_at(p.offset()), None);
    }

    // ── stats / validate ────────────────────────────────────────

    #[test]
    fn stats_account_for_every_byte() {
        let mut h = heap(1024);
        h.allocate(100).unwrap();
        h.allocate(40).unwrap();
        let s = h.stats();
        assert_eq!(s.block_count, 3);
        assert_eq!(s.used_blocks, 2);
        assert_eq!(s.free_blocks, 1);
        assert_eq!(s.used_bytes + s.free_bytes + s.header_bytes, 1024);
        assert_eq!(s.largest_free, s.free_bytes);
    }

    #[test]
    fn validate_detects_broken_partition() {
        let mut h = heap(1024);
        let head = h.blocks.head().unwrap();
        h.blocks.get_mut(head).size = 992;
        assert!(matches!(h.validate(), Err(HeapError::Corrupted { .. })));
    }

    #[test]
    fn validate_detects_uncoalesced_neighbours() {
        let mut h = heap(1024);
        let a = h.allocate(8).unwrap();
        let b = h.allocate(8).unwrap();
        let _c = h.allocate(8).unwrap();
        // Mark both free behind the sweep's back.
        let ia = h.blocks.find_by_payload(a.offset()).unwrap();
        let ib = h.blocks.find_by_payload(b.offset()).unwrap();
        h.blocks.get_mut(ia).free = true;
        h.blocks.get_mut(ib).free = true;
        assert!(matches!(h.validate(), Err(HeapError::Corrupted { .. })));
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Step {
            Alloc(usize),
            Release(usize),
        }

        fn arb_step() -> impl Strategy<Value = Step> {
            prop_oneof![
                3 => (0usize..300).prop_map(Step::Alloc),
                2 => (0usize..64).prop_map(Step::Release),
            ]
        }

        proptest! {
            #[test]
            fn partition_holds_after_every_step(
                steps in prop::collection::vec(arb_step(), 1..120),
            ) {
                let mut h = heap(4096);
                let mut live: Vec<Payload> = Vec::new();
                for step in steps {
                    match step {
                        Step::Alloc(n) => {
                            if let Ok(p) = h.allocate(n) {
                                prop_assert!(h.usable_size(p).unwrap() >= n);
                                live.push(p);
                            }
                        }
                        Step::Release(i) => {
                            if !live.is_empty() {
                                let p = live.swap_remove(i % live.len());
                                h.release(p);
                            }
                        }
                    }
                    prop_assert!(h.validate().is_ok(), "{:?}", h.validate());
                }
                for p in live.drain(..) {
                    h.release(p);
                }
                prop_assert_eq!(layout(&h), vec![(0, 4096 - HEADER_SIZE, true)]);
            }

            #[test]
            fn allocation_never_fails_while_a_free_block_fits(
                sizes in prop::collection::vec(0usize..512, 1..40),
            ) {
                let mut h = heap(4096);
                for n in sizes {
                    let aligned = align_request(n).unwrap();
                    let fits = h.blocks().any(|b| b.free && b.size >= aligned);
                    let first = h.blocks().find(|b| b.free && b.size >= aligned);
                    match h.allocate(n) {
                        Ok(p) => {
                            prop_assert!(fits);
                            prop_assert_eq!(Some(p.offset()), first.map(|b| b.payload_offset()));
                        }
                        Err(HeapError::OutOfMemory { .. }) => prop_assert!(!fits),
                        Err(e) => prop_assert!(false, "unexpected error {e}"),
                    }
                }
            }

            #[test]
            fn round_trip_without_split_restores_topology(
                prefix in prop::collection::vec(8usize..200, 0..10),
            ) {
                let mut h = heap(4096);
                for n in &prefix {
                    let _ = h.allocate(*n);
                }
                let before = layout(&h);
                // Request the whole tail block so no split can happen.
                let Some(tail) = h.blocks().filter(|b| b.free).last() else {
                    return Ok(());
                };
                let p = h.allocate(tail.size).unwrap();
                h.release(p);
                prop_assert_eq!(layout(&h), before);
            }
        }
    }
}
