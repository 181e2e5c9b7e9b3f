//! Block records and the index-linked block list.
//!
//! Block metadata is not overlaid on the arena bytes. Each block is a
//! [`BlockRecord`] in a slot vector, linked to its address-order successor
//! by slot index. A side index maps payload offsets back to slots, which is
//! how `release` recovers the owning block from a handle.
//!
//! ```text
//! arena:  | hdr | payload A | hdr | payload B        | hdr | payload C |
//!         0     24          24+a  48+a               ...
//!
//! table:  slots[0] A ──next──▶ slots[2] B ──next──▶ slots[1] C ──▶ None
//!         by_payload: {24 → 0, 48+a → 2, ... → 1}
//! ```
//!
//! Slots freed by coalescing go on a free list and are reused by later
//! splits, so the slot vector never grows past the peak block count.

use indexmap::IndexMap;

use crate::config::HEADER_SIZE;

/// Index of a block record in the [`BlockTable`] slot vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BlockId(usize);

/// Metadata for one block: a header region followed by `size` payload bytes.
#[derive(Clone, Debug)]
pub(crate) struct BlockRecord {
    /// Arena offset of the header region.
    pub(crate) offset: usize,
    /// Usable payload bytes following the header.
    pub(crate) size: usize,
    /// Address-order successor.
    pub(crate) next: Option<BlockId>,
    /// Whether the payload is currently unallocated.
    pub(crate) free: bool,
    /// Liveness tag of the current (or most recent) allocation. Zero until
    /// the block is first handed out.
    pub(crate) tag: u32,
}

impl BlockRecord {
    pub(crate) fn payload_offset(&self) -> usize {
        self.offset + HEADER_SIZE
    }

    /// One past the last payload byte; the next block's header starts here.
    pub(crate) fn end(&self) -> usize {
        self.offset + HEADER_SIZE + self.size
    }
}

/// Read-only snapshot of one block, in list order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockView {
    /// Arena offset of the block header.
    pub offset: usize,
    /// Usable payload bytes.
    pub size: usize,
    /// Whether the block is free.
    pub free: bool,
}

impl BlockView {
    /// Arena offset of the first payload byte.
    pub fn payload_offset(&self) -> usize {
        self.offset + HEADER_SIZE
    }

    /// Arena offset one past the last payload byte.
    pub fn end(&self) -> usize {
        self.offset + HEADER_SIZE + self.size
    }
}

impl From<&BlockRecord> for BlockView {
    fn from(record: &BlockRecord) -> Self {
        Self {
            offset: record.offset,
            size: record.size,
            free: record.free,
        }
    }
}

/// Slot table holding every block record, plus the list head.
pub(crate) struct BlockTable {
    /// All record slots, linked and recycled.
    slots: Vec<BlockRecord>,
    /// Slots whose block was absorbed by coalescing, available for reuse.
    free_slots: Vec<BlockId>,
    /// Payload offset → slot of the block whose payload starts there.
    by_payload: IndexMap<usize, BlockId>,
    head: Option<BlockId>,
}

impl BlockTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            by_payload: IndexMap::new(),
            head: None,
        }
    }

    /// Drop every record and install a single free block spanning
    /// `[0, heap_size)`.
    pub(crate) fn reset(&mut self, heap_size: usize) {
        self.slots.clear();
        self.free_slots.clear();
        self.by_payload.clear();
        let root = BlockRecord {
            offset: 0,
            size: heap_size - HEADER_SIZE,
            next: None,
            free: true,
            tag: 0,
        };
        let id = self.store(root);
        self.head = Some(id);
    }

    pub(crate) fn head(&self) -> Option<BlockId> {
        self.head
    }

    pub(crate) fn get(&self, id: BlockId) -> &BlockRecord {
        &self.slots[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: BlockId) -> &mut BlockRecord {
        &mut self.slots[id.0]
    }

    /// Slot of the block whose payload starts at `payload_offset`.
    pub(crate) fn find_by_payload(&self, payload_offset: usize) -> Option<BlockId> {
        self.by_payload.get(&payload_offset).copied()
    }

    /// Carve a new free block of `size` payload bytes at `offset` and splice
    /// it in directly after `prev`.
    ///
    /// The caller is responsible for shrinking `prev` so the new block's
    /// header starts exactly at `prev`'s end.
    pub(crate) fn insert_after(&mut self, prev: BlockId, offset: usize, size: usize) -> BlockId {
        let next = self.slots[prev.0].next;
        let record = BlockRecord {
            offset,
            size,
            next,
            free: true,
            tag: 0,
        };
        let id = self.store(record);
        self.slots[prev.0].next = Some(id);
        id
    }

    /// Merge `id`'s successor into `id`.
    ///
    /// The survivor grows by the successor's header and payload, takes over
    /// its `next` link, and the successor's slot is recycled. Returns the
    /// absorbed block's header offset, or `None` if `id` is the last block.
    pub(crate) fn absorb_next(&mut self, id: BlockId) -> Option<usize> {
        let victim_id = self.slots[id.0].next?;
        let (victim_offset, victim_size, victim_next) = {
            let victim = &self.slots[victim_id.0];
            (victim.offset, victim.size, victim.next)
        };
        let survivor = &mut self.slots[id.0];
        survivor.size += HEADER_SIZE + victim_size;
        survivor.next = victim_next;

        self.by_payload.swap_remove(&(victim_offset + HEADER_SIZE));
        self.free_slots.push(victim_id);
        Some(victim_offset)
    }

    /// Iterate `(id, record)` pairs in list (address) order.
    pub(crate) fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            table: self,
            cursor: self.head,
        }
    }

    /// Number of blocks currently in the list.
    pub(crate) fn len(&self) -> usize {
        self.by_payload.len()
    }

    /// Number of record slots ever allocated (live + recycled).
    pub(crate) fn slot_capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of recycled slots waiting for reuse.
    pub(crate) fn recycled_slots(&self) -> usize {
        self.free_slots.len()
    }

    fn store(&mut self, record: BlockRecord) -> BlockId {
        let payload = record.payload_offset();
        let id = if let Some(reuse) = self.free_slots.pop() {
            self.slots[reuse.0] = record;
            reuse
        } else {
            let id = BlockId(self.slots.len());
            self.slots.push(record);
            id
        };
        self.by_payload.insert(payload, id);
        id
    }
}

/// Iterator over the block list in address order.
pub(crate) struct BlockIter<'a> {
    table: &'a BlockTable,
    cursor: Option<BlockId>,
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = (BlockId, &'a BlockRecord);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let record = self.table.get(id);
        self.cursor = record.next;
        Some((id, record))
    }
}
