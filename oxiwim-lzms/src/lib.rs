//! # OxiWim LZMS
//!
//! State and tables shared by LZMS encoders and decoders.
//!
//! LZMS is the entropy-coded LZ77 variant used for solid (packed) WIM
//! resources. This crate does not contain a match finder or the range and
//! Huffman coders; it provides the substrate they are built on:
//!
//! - [`slots`]: position and length slot tables, computed once per process
//! - [`lru`]: the delayed-update recent-offset queues for LZ and delta
//!   matches
//! - [`x86`]: the reversible x86 address translation filter applied around
//!   every LZMS block
//!
//! ## Usage
//!
//! ```rust
//! use oxiwim_lzms::{LruQueues, SlotTables, X86Filter};
//!
//! // Slot lookup
//! let tables = SlotTables::get();
//! let slot = tables.position_slot(13);
//! assert_eq!(tables.position_slot_bases()[slot], 13);
//!
//! // Offset history
//! let mut lru = LruQueues::new();
//! lru.begin_item();
//! lru.lz.upcoming_offset = 13;
//! lru.advance();
//!
//! // x86 filter
//! let mut code = vec![0x90u8; 256];
//! let original = code.clone();
//! let mut filter = X86Filter::new();
//! filter.encode(&mut code).unwrap();
//! filter.decode(&mut code).unwrap();
//! assert_eq!(code, original);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lru;
pub mod slots;
pub mod x86;

// Re-exports
pub use lru::{DeltaLruQueue, LruQueues, LzLruQueue};
pub use slots::{SlotTables, get_slot, try_get_slot};
pub use x86::{X86_SCRATCH_LEN, X86Filter, x86_filter};

/// Number of recent offsets a repeat match may reference.
pub const NUM_RECENT_OFFSETS: usize = 3;

/// Largest supported block (window) size.
pub const MAX_WINDOW_SIZE: u32 = 1 << 30;

/// Number of position slots needed for the largest window.
pub const MAX_NUM_OFFSET_SYMS: usize = 799;

/// Number of length slots.
pub const NUM_LEN_SYMS: usize = 54;

/// Lengths below this value map to their slot through a direct table.
pub const NUM_FAST_LENGTHS: usize = 1024;

/// Number of literal symbols.
pub const NUM_LITERAL_SYMS: usize = 256;

/// Number of delta power symbols.
pub const NUM_DELTA_POWER_SYMS: usize = 8;

/// Window after a likely x86 instruction in which operands are translated.
pub const X86_MAX_TRANSLATION_OFFSET: i32 = 1023;

/// Maximum distance between two references to the same target for the
/// second to count as a likely x86 instruction.
pub const X86_MAX_GOOD_TARGET_OFFSET: i32 = 65535;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_largest_window_fits_slot_table() {
        let tables = SlotTables::get();
        assert_eq!(
            tables.num_position_slots(MAX_WINDOW_SIZE).unwrap(),
            MAX_NUM_OFFSET_SYMS
        );
    }

    #[test]
    fn test_translation_windows() {
        assert_eq!(X86_MAX_TRANSLATION_OFFSET / 2, 511);
        assert_eq!(X86_MAX_GOOD_TARGET_OFFSET + 1, X86_SCRATCH_LEN as i32);
    }
}
