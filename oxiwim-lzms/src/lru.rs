//! LZMS recent-offset (LRU) queues.
//!
//! LZMS lets a match reuse one of the three most recent offsets. Updates to
//! the queue are delayed by one item: the offset used by the current item is
//! staged in `upcoming_offset`, moves to `prev_offset` when the item
//! completes, and is only inserted at the front of the queue when the *next*
//! item completes. Because of this delay the queue holds
//! `NUM_RECENT_OFFSETS + 1` entries although only the first
//! `NUM_RECENT_OFFSETS` can be referenced.
//!
//! Delta matches keep a second pair of queues, offsets and powers, updated
//! in lock-step.
//!
//! A queue belongs to exactly one compression or decompression operation.

use crate::NUM_RECENT_OFFSETS;

/// Length of each queue array.
pub const LRU_QUEUE_LEN: usize = NUM_RECENT_OFFSETS + 1;

/// Recent offsets of LZ matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LzLruQueue {
    /// Most recent first.
    pub recent_offsets: [u32; LRU_QUEUE_LEN],
    /// Offset of the previous item, or 0 if it was not an LZ match.
    pub prev_offset: u32,
    /// Offset of the item being coded, or 0 if it is not an LZ match.
    pub upcoming_offset: u32,
}

impl LzLruQueue {
    /// Create a queue in its initial state: offsets `1..=4`, no pending
    /// offsets.
    pub fn new() -> Self {
        let mut recent_offsets = [0u32; LRU_QUEUE_LEN];
        for (i, offset) in recent_offsets.iter_mut().enumerate() {
            *offset = i as u32 + 1;
        }
        Self {
            recent_offsets,
            prev_offset: 0,
            upcoming_offset: 0,
        }
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Complete one item.
    ///
    /// If the previous item was an LZ match, its offset is pushed to the
    /// front (dropping the oldest entry). The current item's offset then
    /// becomes the previous one.
    pub fn advance(&mut self) {
        if self.prev_offset != 0 {
            self.recent_offsets.copy_within(0..NUM_RECENT_OFFSETS, 1);
            self.recent_offsets[0] = self.prev_offset;
        }
        self.prev_offset = self.upcoming_offset;
    }

    /// Take the `index`-th recent offset for a repeat match.
    ///
    /// The entry is removed and the entries behind it move up one place.
    /// Returns `None` if `index` is not a referenceable position.
    pub fn take_recent(&mut self, index: usize) -> Option<u32> {
        if index >= NUM_RECENT_OFFSETS {
            return None;
        }
        let offset = self.recent_offsets[index];
        self.recent_offsets.copy_within(index + 1..LRU_QUEUE_LEN, index);
        Some(offset)
    }
}

impl Default for LzLruQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Recent (offset, power) pairs of delta matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaLruQueue {
    /// Most recent first.
    pub recent_offsets: [u32; LRU_QUEUE_LEN],
    /// Powers paired with `recent_offsets`.
    pub recent_powers: [u8; LRU_QUEUE_LEN],
    /// Raw offset of the previous item, or 0 if it was not a delta match.
    pub prev_offset: u32,
    /// Power of the previous item.
    pub prev_power: u8,
    /// Raw offset of the item being coded, or 0 if it is not a delta match.
    pub upcoming_offset: u32,
    /// Power of the item being coded.
    pub upcoming_power: u8,
}

impl DeltaLruQueue {
    /// Create a queue in its initial state: offsets `1..=4`, powers all
    /// zero, no pending pair.
    pub fn new() -> Self {
        let mut recent_offsets = [0u32; LRU_QUEUE_LEN];
        for (i, offset) in recent_offsets.iter_mut().enumerate() {
            *offset = i as u32 + 1;
        }
        Self {
            recent_offsets,
            recent_powers: [0; LRU_QUEUE_LEN],
            prev_offset: 0,
            prev_power: 0,
            upcoming_offset: 0,
            upcoming_power: 0,
        }
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Complete one item; same discipline as [`LzLruQueue::advance`],
    /// applied to offsets and powers together.
    pub fn advance(&mut self) {
        if self.prev_offset != 0 {
            self.recent_offsets.copy_within(0..NUM_RECENT_OFFSETS, 1);
            self.recent_powers.copy_within(0..NUM_RECENT_OFFSETS, 1);
            self.recent_offsets[0] = self.prev_offset;
            self.recent_powers[0] = self.prev_power;
        }
        self.prev_offset = self.upcoming_offset;
        self.prev_power = self.upcoming_power;
    }

    /// Take the `index`-th recent `(offset, power)` pair for a repeat delta
    /// match, removing it from the queue.
    pub fn take_recent(&mut self, index: usize) -> Option<(u32, u8)> {
        if index >= NUM_RECENT_OFFSETS {
            return None;
        }
        let pair = (self.recent_offsets[index], self.recent_powers[index]);
        self.recent_offsets.copy_within(index + 1..LRU_QUEUE_LEN, index);
        self.recent_powers.copy_within(index + 1..LRU_QUEUE_LEN, index);
        Some(pair)
    }
}

impl Default for DeltaLruQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Both LRU queues of one LZMS coder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LruQueues {
    /// LZ match offsets.
    pub lz: LzLruQueue,
    /// Delta match offsets and powers.
    pub delta: DeltaLruQueue,
}

impl LruQueues {
    /// Create both queues in their initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset both queues.
    pub fn reset(&mut self) {
        self.lz.reset();
        self.delta.reset();
    }

    /// Clear the staged values before coding a new item. An item that turns
    /// out to be a literal therefore stages nothing.
    pub fn begin_item(&mut self) {
        self.lz.upcoming_offset = 0;
        self.delta.upcoming_offset = 0;
        self.delta.upcoming_power = 0;
    }

    /// Complete one item in both queues.
    pub fn advance(&mut self) {
        self.lz.advance();
        self.delta.advance();
    }
}
