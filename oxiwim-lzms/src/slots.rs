//! LZMS position and length slot tables.
//!
//! LZMS codes match offsets and lengths as a *slot* (a Huffman symbol) plus
//! a number of verbatim extra bits. Slot `i` covers the values
//! `[base[i], base[i + 1])`, and the gap between consecutive bases is always
//! a power of two, so `extra_bits[i] = log2(base[i + 1] - base[i])`.
//!
//! No closed formula for the bases is known. They are rebuilt from a
//! run-length encoding of how many consecutive slots share each gap size:
//! the gap starts at 1 and doubles after every run.
//!
//! The tables are computed once per process on first use and are immutable
//! afterwards, so any number of encoders and decoders may share them.

use crate::{MAX_NUM_OFFSET_SYMS, NUM_FAST_LENGTHS, NUM_LEN_SYMS};
use oxiwim_core::error::{Result, WimError};
use std::sync::OnceLock;

/// Number of slots per gap size (log2 of the gap is the run index) for
/// position slots.
const POSITION_SLOT_DELTA_RUN_LENS: [u8; 21] = [
    9, 0, 9, 7, 10, 15, 15, 20, 20, 30, 33, 40, 42, 45, 60, 73, 80, 85, 95, 105, 6,
];

/// Number of slots per gap size for length slots.
const LENGTH_SLOT_DELTA_RUN_LENS: [u8; 17] = [27, 4, 6, 4, 5, 2, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 1];

/// Terminal sentinel base of the position slot table.
pub const POSITION_SLOT_FINAL_BASE: u32 = 0x7fff_ffff;

/// Terminal sentinel base of the length slot table.
pub const LENGTH_SLOT_FINAL_BASE: u32 = 0x4001_08ab;

/// Number of power-of-two orders covered by the order-to-slot bounds table.
pub const NUM_POSITION_ORDERS: usize = 30;

/// The process-wide LZMS slot tables.
#[derive(Debug, Clone)]
pub struct SlotTables {
    /// Position slot => position slot base value (plus terminal sentinel).
    position_slot_base: [u32; MAX_NUM_OFFSET_SYMS + 1],
    /// Position slot => number of extra position bits.
    extra_position_bits: [u8; MAX_NUM_OFFSET_SYMS],
    /// log2(position) => inclusive [lower, upper] bound on position slot.
    order_to_position_slot_bounds: [[u16; 2]; NUM_POSITION_ORDERS],
    /// Length slot => length slot base value (plus terminal sentinel).
    length_slot_base: [u32; NUM_LEN_SYMS + 1],
    /// Length slot => number of extra length bits.
    extra_length_bits: [u8; NUM_LEN_SYMS],
    /// Length (< NUM_FAST_LENGTHS) => length slot.
    length_slot_fast: [u8; NUM_FAST_LENGTHS],
}

impl SlotTables {
    /// Get the shared tables, computing them on first use.
    ///
    /// Concurrent first calls block until one thread has finished building
    /// the tables; the build runs exactly once per process.
    pub fn get() -> &'static SlotTables {
        static TABLES: OnceLock<SlotTables> = OnceLock::new();
        TABLES.get_or_init(SlotTables::compute)
    }

    fn compute() -> Self {
        let mut tables = Self {
            position_slot_base: [0; MAX_NUM_OFFSET_SYMS + 1],
            extra_position_bits: [0; MAX_NUM_OFFSET_SYMS],
            order_to_position_slot_bounds: [[0; 2]; NUM_POSITION_ORDERS],
            length_slot_base: [0; NUM_LEN_SYMS + 1],
            extra_length_bits: [0; NUM_LEN_SYMS],
            length_slot_fast: [0; NUM_FAST_LENGTHS],
        };

        decode_delta_rle_slot_bases(
            &mut tables.position_slot_base,
            &mut tables.extra_position_bits,
            &POSITION_SLOT_DELTA_RUN_LENS,
            POSITION_SLOT_FINAL_BASE,
        );

        for order in 0..NUM_POSITION_ORDERS {
            let low = get_slot(1u32 << order, &tables.position_slot_base);
            let high = get_slot((1u32 << (order + 1)) - 1, &tables.position_slot_base);
            tables.order_to_position_slot_bounds[order] = [low as u16, high as u16];
        }

        decode_delta_rle_slot_bases(
            &mut tables.length_slot_base,
            &mut tables.extra_length_bits,
            &LENGTH_SLOT_DELTA_RUN_LENS,
            LENGTH_SLOT_FINAL_BASE,
        );

        let mut slot = 0usize;
        for (len, entry) in tables.length_slot_fast.iter_mut().enumerate() {
            if len as u32 >= tables.length_slot_base[slot + 1] {
                slot += 1;
            }
            *entry = slot as u8;
        }

        tables
    }

    /// Position slot bases, including the terminal sentinel.
    pub fn position_slot_bases(&self) -> &[u32] {
        &self.position_slot_base
    }

    /// Extra bit counts for each position slot.
    pub fn extra_position_bits(&self) -> &[u8] {
        &self.extra_position_bits
    }

    /// Length slot bases, including the terminal sentinel.
    pub fn length_slot_bases(&self) -> &[u32] {
        &self.length_slot_base
    }

    /// Extra bit counts for each length slot.
    pub fn extra_length_bits(&self) -> &[u8] {
        &self.extra_length_bits
    }

    /// Position slot of a match offset.
    ///
    /// `offset` must be in `1..POSITION_SLOT_FINAL_BASE`.
    pub fn position_slot(&self, offset: u32) -> usize {
        get_slot(offset, &self.position_slot_base)
    }

    /// Length slot of a match length.
    ///
    /// Lengths below [`NUM_FAST_LENGTHS`] are answered from a direct lookup
    /// table; longer lengths use binary search. `length` must be below
    /// [`LENGTH_SLOT_FINAL_BASE`].
    pub fn length_slot(&self, length: u32) -> usize {
        match self.length_slot_fast.get(length as usize) {
            Some(&slot) => slot as usize,
            None => get_slot(length, &self.length_slot_base),
        }
    }

    /// Inclusive range of position slots whose base lies in
    /// `[2^order, 2^(order + 1) - 1]`.
    pub fn position_slot_bounds(&self, order: usize) -> Option<(usize, usize)> {
        self.order_to_position_slot_bounds
            .get(order)
            .map(|&[low, high]| (low as usize, high as usize))
    }

    /// Number of position slots needed to code every offset in a block of
    /// `window_size` bytes.
    pub fn num_position_slots(&self, window_size: u32) -> Result<usize> {
        if window_size == 0 || window_size >= i32::MAX as u32 {
            return Err(WimError::invalid_parameter(format!(
                "LZMS window size {} out of range",
                window_size
            )));
        }
        // The largest offset in the window is window_size - 1, but offsets
        // are never below 1.
        Ok(self.position_slot((window_size - 1).max(1)) + 1)
    }

    /// Reconstitute a match offset from its slot and extra bits.
    pub fn decode_position(&self, slot: usize, extra: u32) -> Result<u32> {
        decode_slot_value(slot, extra, &self.position_slot_base, &self.extra_position_bits)
    }

    /// Reconstitute a match length from its slot and extra bits.
    pub fn decode_length(&self, slot: usize, extra: u32) -> Result<u32> {
        decode_slot_value(slot, extra, &self.length_slot_base, &self.extra_length_bits)
    }
}

/// Find the slot of `value` in a slot base table.
///
/// `slot_bases` holds one base per slot followed by the terminal sentinel.
/// Returns the largest slot whose base is `<= value`. The value must lie
/// in `[slot_bases[0], sentinel)`; see [`try_get_slot`] for a checked
/// variant.
pub fn get_slot(value: u32, slot_bases: &[u32]) -> usize {
    debug_assert!(slot_bases.len() >= 2);
    debug_assert!(value >= slot_bases[0] && value < slot_bases[slot_bases.len() - 1]);

    let num_slots = slot_bases.len() - 1;
    slot_bases[..num_slots]
        .partition_point(|&base| base <= value)
        .saturating_sub(1)
}

/// Checked variant of [`get_slot`]: `None` if `value` is outside the range
/// covered by the table.
pub fn try_get_slot(value: u32, slot_bases: &[u32]) -> Option<usize> {
    let (&first, &last) = (slot_bases.first()?, slot_bases.last()?);
    if slot_bases.len() < 2 || value < first || value >= last {
        return None;
    }
    Some(get_slot(value, slot_bases))
}

fn decode_slot_value(slot: usize, extra: u32, slot_bases: &[u32], extra_bits: &[u8]) -> Result<u32> {
    let num_bits = *extra_bits
        .get(slot)
        .ok_or_else(|| WimError::invalid_parameter(format!("slot {} out of range", slot)))?;
    if num_bits < 32 && extra >> num_bits != 0 {
        return Err(WimError::invalid_parameter(format!(
            "extra bits {:#x} exceed {} bits for slot {}",
            extra, num_bits, slot
        )));
    }
    Ok(slot_bases[slot] + extra)
}

/// Expand a run-length encoded table of gap exponents into slot bases.
///
/// `delta_run_lens[k]` is the number of consecutive slots whose gap to the
/// previous base is `2^k`. The terminal sentinel `final_base` is written
/// after the last slot, and the last slot's extra bits are the floor of
/// log2 of the gap to it.
fn decode_delta_rle_slot_bases(
    slot_bases: &mut [u32],
    extra_bits: &mut [u8],
    delta_run_lens: &[u8],
    final_base: u32,
) {
    let mut order = 0u8;
    let mut delta = 1u32;
    let mut base = 0u32;
    let mut slot = 0usize;

    for &run_len in delta_run_lens {
        for _ in 0..run_len {
            base += delta;
            if slot > 0 {
                extra_bits[slot - 1] = order;
            }
            slot_bases[slot] = base;
            slot += 1;
        }
        delta <<= 1;
        order += 1;
    }
    debug_assert_eq!(slot, extra_bits.len());

    slot_bases[slot] = final_base;
    extra_bits[slot - 1] = (31 - (final_base - slot_bases[slot - 1]).leading_zeros()) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lengths_cover_all_slots() {
        let positions: usize = POSITION_SLOT_DELTA_RUN_LENS.iter().map(|&n| n as usize).sum();
        let lengths: usize = LENGTH_SLOT_DELTA_RUN_LENS.iter().map(|&n| n as usize).sum();
        assert_eq!(positions, MAX_NUM_OFFSET_SYMS);
        assert_eq!(lengths, NUM_LEN_SYMS);
    }

    #[test]
    fn test_position_slot_bases() {
        let tables = SlotTables::get();
        let bases = tables.position_slot_bases();
        assert_eq!(&bases[..10], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 13]);
        assert_eq!(bases[MAX_NUM_OFFSET_SYMS - 1], 106685605);
        assert_eq!(bases[MAX_NUM_OFFSET_SYMS], POSITION_SLOT_FINAL_BASE);
        // Gap to the sentinel is not a power of two; log2 is floored.
        assert_eq!(tables.extra_position_bits()[MAX_NUM_OFFSET_SYMS - 1], 30);
    }

    #[test]
    fn test_length_slot_bases() {
        let tables = SlotTables::get();
        let bases = tables.length_slot_bases();
        assert_eq!(bases[0], 1);
        assert_eq!(bases[26], 27);
        assert_eq!(bases[27], 29);
        assert_eq!(bases[52], 2219);
        assert_eq!(bases[53], 67755);
        assert_eq!(bases[NUM_LEN_SYMS], LENGTH_SLOT_FINAL_BASE);
        assert_eq!(tables.extra_length_bits()[52], 16);
        assert_eq!(tables.extra_length_bits()[53], 30);
    }

    #[test]
    fn test_gaps_are_powers_of_two() {
        let tables = SlotTables::get();
        let check = |bases: &[u32], extra: &[u8], skip_last: bool| {
            let n = if skip_last { extra.len() - 1 } else { extra.len() };
            for i in 0..n {
                let gap = bases[i + 1] - bases[i];
                assert!(gap.is_power_of_two(), "slot {} gap {}", i, gap);
                assert_eq!(gap, 1u32 << extra[i], "slot {}", i);
            }
        };
        check(tables.position_slot_bases(), tables.extra_position_bits(), true);
        check(tables.length_slot_bases(), tables.extra_length_bits(), false);
    }

    #[test]
    fn test_get_slot_boundaries() {
        let tables = SlotTables::get();
        assert_eq!(tables.position_slot(1), 0);
        assert_eq!(tables.position_slot(9), 8);
        assert_eq!(tables.position_slot(12), 8);
        assert_eq!(tables.position_slot(13), 9);
        assert_eq!(
            tables.position_slot(POSITION_SLOT_FINAL_BASE - 1),
            MAX_NUM_OFFSET_SYMS - 1
        );
    }

    #[test]
    fn test_try_get_slot_range() {
        let bases = SlotTables::get().position_slot_bases();
        assert_eq!(try_get_slot(0, bases), None);
        assert_eq!(try_get_slot(POSITION_SLOT_FINAL_BASE, bases), None);
        assert_eq!(try_get_slot(1, bases), Some(0));
        assert_eq!(try_get_slot(1, &[]), None);
    }

    #[test]
    fn test_length_fast_table_matches_search() {
        let tables = SlotTables::get();
        for len in 1..NUM_FAST_LENGTHS as u32 {
            assert_eq!(
                tables.length_slot(len),
                get_slot(len, tables.length_slot_bases()),
                "length {}",
                len
            );
        }
        assert_eq!(tables.length_slot(1), 0);
        assert_eq!(tables.length_slot(28), 26);
        assert_eq!(tables.length_slot(29), 27);
        assert_eq!(tables.length_slot(5000), 52);
        assert_eq!(tables.length_slot(LENGTH_SLOT_FINAL_BASE - 1), 53);
    }

    #[test]
    fn test_order_bounds() {
        let tables = SlotTables::get();
        assert_eq!(tables.position_slot_bounds(0), Some((0, 0)));
        assert_eq!(tables.position_slot_bounds(1), Some((1, 2)));
        assert_eq!(tables.position_slot_bounds(3), Some((7, 9)));
        assert_eq!(tables.position_slot_bounds(29), Some((798, 798)));
        assert_eq!(tables.position_slot_bounds(30), None);

        for order in 0..NUM_POSITION_ORDERS {
            let (low, high) = tables.position_slot_bounds(order).unwrap();
            assert_eq!(low, tables.position_slot(1 << order));
            assert_eq!(high, tables.position_slot((1u32 << (order + 1)) - 1));
        }
    }

    #[test]
    fn test_num_position_slots() {
        let tables = SlotTables::get();
        assert_eq!(tables.num_position_slots(1).unwrap(), 1);
        assert_eq!(tables.num_position_slots(2).unwrap(), 1);
        assert_eq!(tables.num_position_slots(10).unwrap(), 9);
        assert_eq!(tables.num_position_slots(32768).unwrap(), tables.position_slot(32767) + 1);
        assert!(tables.num_position_slots(0).is_err());
        assert!(tables.num_position_slots(i32::MAX as u32).is_err());
    }

    #[test]
    fn test_decode_values() {
        let tables = SlotTables::get();
        assert_eq!(tables.decode_position(9, 3).unwrap(), 16);
        assert!(tables.decode_position(9, 4).is_err());
        assert!(tables.decode_position(MAX_NUM_OFFSET_SYMS, 0).is_err());
        assert_eq!(tables.decode_length(0, 0).unwrap(), 1);
        assert_eq!(tables.decode_length(52, 0xFFFF).unwrap(), 67754);
    }

    #[test]
    fn test_tables_shared_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| SlotTables::get() as *const SlotTables as usize))
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }
}
