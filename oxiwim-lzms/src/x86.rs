//! LZMS x86 address translation filter.
//!
//! Relative branch and load targets in x86 machine code change with every
//! instruction position, which hides repetition from the LZ stage. Before
//! compression this filter rewrites the 32-bit operand of recognized
//! relative-addressing instructions to an absolute value (operand plus
//! position); after decompression it subtracts the position again.
//!
//! The filter runs over every buffer, code or not, and guesses which
//! regions are code. It remembers, for the low 16 bits of each relative
//! target, the last position that referenced it. A second reference to the
//! same target within [`X86_MAX_GOOD_TARGET_OFFSET`] bytes marks a likely
//! instruction, and translation is enabled for the next
//! [`X86_MAX_TRANSLATION_OFFSET`] bytes (half that for `call rel32`, never
//! for `jmp rel32`). Regions that stop producing likely instructions fall
//! out of the window and are left alone.
//!
//! The tracking state only depends on the untranslated operands, so running
//! the filter forward and then with `undo` restores the input exactly.
//! These window sizes are part of the compressed format and must not be
//! tuned.

use crate::{X86_MAX_GOOD_TARGET_OFFSET, X86_MAX_TRANSLATION_OFFSET};
use log::trace;
use oxiwim_core::error::{Result, WimError};

/// Required length of the target-usage scratch table (one entry per
/// possible low-16-bit target).
pub const X86_SCRATCH_LEN: usize = 65536;

/// Bytes at the end of the buffer that are never inspected as opcodes.
const X86_TAIL_GUARD: i32 = 16;

/// Recognize an instruction with a relative 32-bit operand.
///
/// Returns `(num_op_bytes, max_trans_offset)`. A zero `max_trans_offset`
/// means "not a candidate; skip `num_op_bytes` bytes".
#[inline]
fn recognize_opcode(p: &[u8]) -> (i32, i32) {
    match p[0] {
        0x48 => {
            // mov reg, [rip + rel32]
            if p[1] == 0x8b && (p[2] == 0x05 || p[2] == 0x0d) {
                return (3, X86_MAX_TRANSLATION_OFFSET);
            }
            // lea reg, [rip + rel32]
            if p[1] == 0x8d && (p[2] & 0x7) == 0x5 {
                return (3, X86_MAX_TRANSLATION_OFFSET);
            }
        }
        0x4c => {
            // lea r8-r15, [rip + rel32]
            if p[1] == 0x8d && (p[2] & 0x7) == 0x5 {
                return (3, X86_MAX_TRANSLATION_OFFSET);
            }
        }
        // call rel32
        0xe8 => return (1, X86_MAX_TRANSLATION_OFFSET / 2),
        // jmp rel32
        0xe9 => return (5, 0),
        0xf0 => {
            // lock add [rip + rel32], imm8
            if p[1] == 0x83 && p[2] == 0x05 {
                return (3, X86_MAX_TRANSLATION_OFFSET);
            }
        }
        0xff => {
            // call [rip + rel32]
            if p[1] == 0x15 {
                return (2, X86_MAX_TRANSLATION_OFFSET);
            }
        }
        _ => {}
    }
    (1, 0)
}

/// Tracking state of one filter pass.
struct FilterState<'a> {
    closest_target_usage: i32,
    last_target_usages: &'a mut [i32],
    undo: bool,
}

impl FilterState<'_> {
    /// Translate (if in window) the operand of the instruction at `i` and
    /// update the tracking state. Returns the position after the operand.
    fn process(&mut self, data: &mut [u8], i: i32, num_op_bytes: i32, max_trans_offset: i32) -> i32 {
        let op = (i + num_op_bytes) as usize;
        let in_window = i - self.closest_target_usage <= max_trans_offset;

        if !self.undo {
            // Target is taken from the relative operand before translating.
            let pos = target_low16(data, op, i);
            if in_window {
                let n = read_le32(data, op);
                write_le32(data, op, n.wrapping_add(i as u32));
                trace!("x86 translation at position {} (opcode {:#04x})", i, data[i as usize]);
            }
            self.track(i + num_op_bytes + 3, pos)
        } else {
            if in_window {
                let n = read_le32(data, op);
                write_le32(data, op, n.wrapping_sub(i as u32));
                trace!("undid x86 translation at position {} (opcode {:#04x})", i, data[i as usize]);
            }
            let pos = target_low16(data, op, i);
            self.track(i + num_op_bytes + 3, pos)
        }
    }

    /// Record a reference to `pos` from the instruction ending at `end`.
    fn track(&mut self, end: i32, pos: u16) -> i32 {
        let slot = &mut self.last_target_usages[pos as usize];
        if end - *slot <= X86_MAX_GOOD_TARGET_OFFSET {
            self.closest_target_usage = end;
        }
        *slot = end;
        end + 1
    }
}

#[inline]
fn target_low16(data: &[u8], op: usize, i: i32) -> u16 {
    (i as u16).wrapping_add(u16::from_le_bytes([data[op], data[op + 1]]))
}

#[inline]
fn read_le32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

#[inline]
fn write_le32(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Translate relative x86 addresses to absolute (`undo == false`), or undo
/// that translation (`undo == true`), in place.
///
/// `last_target_usages` is caller-provided scratch of at least
/// [`X86_SCRATCH_LEN`] entries; it is reinitialized on every call.
///
/// # Errors
///
/// Fails if the scratch table is too small or `data` is `i32::MAX` bytes
/// or longer (positions must fit in a signed 32-bit integer).
pub fn x86_filter(data: &mut [u8], last_target_usages: &mut [i32], undo: bool) -> Result<()> {
    if last_target_usages.len() < X86_SCRATCH_LEN {
        return Err(WimError::invalid_parameter(format!(
            "x86 filter scratch has {} entries, need {}",
            last_target_usages.len(),
            X86_SCRATCH_LEN
        )));
    }
    let size = match i32::try_from(data.len()) {
        Ok(size) if size < i32::MAX => size,
        _ => {
            return Err(WimError::invalid_parameter(format!(
                "x86 filter input of {} bytes is too large",
                data.len()
            )));
        }
    };

    last_target_usages[..X86_SCRATCH_LEN].fill(-X86_MAX_GOOD_TARGET_OFFSET - 1);

    let mut state = FilterState {
        closest_target_usage: -X86_MAX_TRANSLATION_OFFSET - 1,
        last_target_usages,
        undo,
    };

    let mut i = 1i32;
    while i < size - X86_TAIL_GUARD {
        let at = i as usize;
        let (num_op_bytes, max_trans_offset) = recognize_opcode(&data[at..at + 3]);
        i = if max_trans_offset != 0 {
            state.process(data, i, num_op_bytes, max_trans_offset)
        } else {
            i + num_op_bytes
        };
    }

    Ok(())
}

/// An x86 filter owning its scratch table.
///
/// One instance belongs to one compression or decompression operation.
pub struct X86Filter {
    last_target_usages: Vec<i32>,
}

impl X86Filter {
    /// Allocate a filter and its scratch table.
    pub fn new() -> Self {
        Self {
            last_target_usages: vec![0; X86_SCRATCH_LEN],
        }
    }

    /// Translate relative addresses to absolute, before compression.
    pub fn encode(&mut self, data: &mut [u8]) -> Result<()> {
        x86_filter(data, &mut self.last_target_usages, false)
    }

    /// Restore relative addresses, after decompression.
    pub fn decode(&mut self, data: &mut [u8]) -> Result<()> {
        x86_filter(data, &mut self.last_target_usages, true)
    }
}

impl Default for X86Filter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for X86Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X86Filter").finish_non_exhaustive()
    }
}
