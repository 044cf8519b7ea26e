//! Chunk tables of compressed resources.
//!
//! Compressed data is split into chunks of `chunk_size` uncompressed bytes
//! (the last may be shorter), each compressed independently. Two layouts
//! locate the stored chunks:
//!
//! ```text
//! Original (COMPRESSED flag)
//! +0                      (num_chunks - 1) entries: start of chunks 1..n,
//!                         relative to the end of the table; 4 bytes each,
//!                         8 if the resource expands past 4 GiB
//! +table_size             chunk data
//!
//! Alternate (PACKED_STREAMS flag)
//! +0   res_usize          u64 LE
//! +8   chunk_size         u32 LE
//! +12  compression_format u32 LE (0 none, 1 XPRESS, 2 LZX, 3 LZMS)
//! +16                     num_chunks entries: stored size of each chunk,
//!                         4 bytes each
//! +16 + table_size        chunk data
//! ```
//!
//! A chunk whose stored size equals its uncompressed size is stored raw.

use crate::resource::ResourceSpec;
use oxiwim_core::codec::CompressionType;
use oxiwim_core::error::{Result, WimError};
use std::io::{Read, Seek, SeekFrom, Write};

/// Size of the alternate chunk table header.
pub const ALT_CHUNK_TABLE_HEADER_SIZE: usize = 16;

/// Width of one chunk table entry.
///
/// The alternate layout always uses 4-byte entries; the original layout
/// widens to 8 bytes when `res_size` does not fit in 32 bits.
pub fn chunk_entry_size(res_size: u64, is_alt: bool) -> usize {
    if res_size <= u64::from(u32::MAX) || is_alt {
        4
    } else {
        8
    }
}

/// Number of chunks needed for `uncompressed_size` bytes.
pub fn num_chunks(uncompressed_size: u64, chunk_size: u32) -> u64 {
    uncompressed_size.div_ceil(u64::from(chunk_size))
}

/// Header of an alternate-layout chunk table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AltChunkTableHeader {
    /// Uncompressed size of the whole resource.
    pub res_usize: u64,
    /// Chunk size.
    pub chunk_size: u32,
    /// Compression format code.
    pub compression_format: u32,
}

impl AltChunkTableHeader {
    /// Decode from the 16-byte on-disk form.
    pub fn from_bytes(buf: &[u8; ALT_CHUNK_TABLE_HEADER_SIZE]) -> Self {
        Self {
            res_usize: u64::from_le_bytes([
                buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
            ]),
            chunk_size: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            compression_format: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        }
    }

    /// Encode to the 16-byte on-disk form.
    pub fn to_bytes(&self) -> [u8; ALT_CHUNK_TABLE_HEADER_SIZE] {
        let mut buf = [0u8; ALT_CHUNK_TABLE_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.res_usize.to_le_bytes());
        buf[8..12].copy_from_slice(&self.chunk_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.compression_format.to_le_bytes());
        buf
    }

    /// Read the header from the input.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; ALT_CHUNK_TABLE_HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self::from_bytes(&buf))
    }

    /// Write the header to the output.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// The compression type named by the format code.
    pub fn compression_type(&self) -> Result<CompressionType> {
        CompressionType::from_format_code(self.compression_format).ok_or_else(|| {
            WimError::invalid_header(format!(
                "unknown compression format {}",
                self.compression_format
            ))
        })
    }
}

/// Chunk table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkTableLayout {
    /// Start offsets of chunks 1..n; used by COMPRESSED resources.
    Original,
    /// Header plus stored sizes of all chunks; used by packed resources.
    Alternate,
}

/// Decoded chunk table of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTable {
    layout: ChunkTableLayout,
    chunk_size: u32,
    uncompressed_size: u64,
    /// Start of each chunk's stored data relative to the resource start,
    /// plus the end of the last chunk.
    offsets: Vec<u64>,
}

impl ChunkTable {
    /// Read and validate the chunk table of a compressed or packed resource.
    ///
    /// Leaves the reader positioned at the first chunk.
    pub fn read<R: Read + Seek>(reader: &mut R, rspec: &ResourceSpec) -> Result<Self> {
        let base = rspec.offset_in_wim;
        reader.seek(SeekFrom::Start(base))?;

        let (layout, chunk_size, header_size) = if rspec.is_packed() {
            let alt = AltChunkTableHeader::read(reader)?;
            if alt.res_usize != rspec.uncompressed_size || alt.chunk_size != rspec.chunk_size {
                return Err(WimError::invalid_chunk_table(
                    base,
                    "chunk table header disagrees with the resource",
                ));
            }
            (
                ChunkTableLayout::Alternate,
                alt.chunk_size,
                ALT_CHUNK_TABLE_HEADER_SIZE as u64,
            )
        } else {
            (ChunkTableLayout::Original, rspec.chunk_size, 0)
        };

        let is_alt = layout == ChunkTableLayout::Alternate;
        let count = num_chunks(rspec.uncompressed_size, chunk_size);
        let num_entries = if is_alt { count } else { count.saturating_sub(1) };
        let entry_size = chunk_entry_size(rspec.uncompressed_size, is_alt);
        let table_size = num_entries
            .checked_mul(entry_size as u64)
            .filter(|size| {
                size.checked_add(header_size)
                    .is_some_and(|end| end <= rspec.size_in_wim)
            })
            .ok_or_else(|| WimError::invalid_chunk_table(base, "chunk table exceeds the resource"))?;

        // The table size comes from the header; only buffer what the input
        // actually holds.
        let mut raw = Vec::new();
        reader.by_ref().take(table_size).read_to_end(&mut raw)?;
        if (raw.len() as u64) < table_size {
            return Err(WimError::unexpected_eof(
                usize::try_from(table_size - raw.len() as u64).unwrap_or(usize::MAX),
            ));
        }

        let entries: Vec<u64> = raw
            .chunks_exact(entry_size)
            .map(|e| match e {
                [a, b, c, d] => u64::from(u32::from_le_bytes([*a, *b, *c, *d])),
                _ => u64::from_le_bytes([e[0], e[1], e[2], e[3], e[4], e[5], e[6], e[7]]),
            })
            .collect();

        let data_start = header_size + table_size;
        let mut offsets = Vec::with_capacity(entries.len() + 2);
        offsets.push(data_start);
        match layout {
            ChunkTableLayout::Original => {
                offsets.extend(entries.iter().map(|&e| data_start.saturating_add(e)));
                if count > 0 {
                    offsets.push(rspec.size_in_wim);
                }
            }
            ChunkTableLayout::Alternate => {
                let mut pos = data_start;
                for &stored in &entries {
                    pos = pos.saturating_add(stored);
                    offsets.push(pos);
                }
            }
        }

        let table = Self {
            layout,
            chunk_size,
            uncompressed_size: rspec.uncompressed_size,
            offsets,
        };
        table.validate(base, rspec.size_in_wim)?;
        Ok(table)
    }

    fn validate(&self, base: u64, size_in_wim: u64) -> Result<()> {
        for index in 0..self.num_chunks() {
            let (start, end) = (self.offsets[index], self.offsets[index + 1]);
            if end < start {
                return Err(WimError::invalid_chunk_table(
                    base,
                    format!("chunk {} starts after its successor", index),
                ));
            }
            let stored = end - start;
            if stored == 0 || stored > u64::from(self.chunk_usize(index)) {
                return Err(WimError::invalid_chunk_table(
                    base,
                    format!("chunk {} has invalid stored size {}", index, stored),
                ));
            }
        }
        if self.offsets.last().is_some_and(|&end| end > size_in_wim) {
            return Err(WimError::invalid_chunk_table(base, "chunks extend past the resource"));
        }
        Ok(())
    }

    /// Table layout.
    pub fn layout(&self) -> ChunkTableLayout {
        self.layout
    }

    /// Chunk size.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Number of chunks.
    pub fn num_chunks(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Uncompressed size of chunk `index`; only the last chunk is short.
    pub fn chunk_usize(&self, index: usize) -> u32 {
        let start = index as u64 * u64::from(self.chunk_size);
        self.uncompressed_size
            .saturating_sub(start)
            .min(u64::from(self.chunk_size)) as u32
    }

    /// Offset of chunk `index`'s stored data relative to the resource start,
    /// and its stored size.
    pub fn stored_range(&self, index: usize) -> (u64, u64) {
        let start = self.offsets[index];
        (start, self.offsets[index + 1] - start)
    }

    /// Offset of chunk `index` in the uncompressed data.
    pub fn chunk_offset(&self, index: usize) -> u64 {
        index as u64 * u64::from(self.chunk_size)
    }

    /// First and last chunk covering `size` bytes at uncompressed `offset`.
    ///
    /// Returns `None` for an empty range.
    pub fn chunk_range(&self, offset: u64, size: u64) -> Option<(usize, usize)> {
        if size == 0 {
            return None;
        }
        let chunk_size = u64::from(self.chunk_size);
        let first = offset / chunk_size;
        let last = (offset + size - 1) / chunk_size;
        Some((first as usize, last as usize))
    }
}

/// Encode chunk table entries for chunks with the given stored sizes.
///
/// For the original layout the entries are the start offsets of chunks
/// 1..n; for the alternate layout they are the stored sizes themselves.
pub fn encode_chunk_entries(
    layout: ChunkTableLayout,
    stored_sizes: &[u64],
    uncompressed_size: u64,
) -> Vec<u8> {
    let is_alt = layout == ChunkTableLayout::Alternate;
    let entry_size = chunk_entry_size(uncompressed_size, is_alt);
    let mut table = Vec::with_capacity(stored_sizes.len() * entry_size);

    let mut push = |value: u64| {
        if entry_size == 4 {
            table.extend_from_slice(&(value as u32).to_le_bytes());
        } else {
            table.extend_from_slice(&value.to_le_bytes());
        }
    };

    match layout {
        ChunkTableLayout::Original => {
            let mut offset = 0u64;
            for &stored in stored_sizes.iter().take(stored_sizes.len().saturating_sub(1)) {
                offset += stored;
                push(offset);
            }
        }
        ChunkTableLayout::Alternate => {
            for &stored in stored_sizes {
                push(stored);
            }
        }
    }

    table
}
