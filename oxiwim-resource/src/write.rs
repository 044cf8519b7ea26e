//! Resource writer.

use crate::chunk_table::{AltChunkTableHeader, ChunkTableLayout, encode_chunk_entries};
use crate::config::{DEFAULT_CHUNK_SIZE, validate_chunk_size};
use crate::header::{PACK_MAGIC_NUMBER, ResourceFlags, ResourceHeader};
use log::debug;
use oxiwim_core::codec::CompressionType;
use oxiwim_core::error::{Result, WimError};
use oxiwim_core::traits::ChunkCompressor;
use std::borrow::Cow;
use std::io::{Seek, Write};

/// On-disk layout of a written resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLayout {
    /// Raw data, no chunk table.
    Uncompressed,
    /// Chunked with the original chunk table (COMPRESSED flag).
    Compressed,
    /// Chunked with the alternate chunk table (PACKED_STREAMS flag).
    Packed,
}

/// How [`write_resource`] stores data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Layout.
    pub layout: ResourceLayout,
    /// Compression type recorded for chunked layouts.
    pub compression_type: CompressionType,
    /// Chunk size for chunked layouts.
    pub chunk_size: u32,
    /// Additional header flags, such as [`ResourceFlags::METADATA`].
    pub flags: ResourceFlags,
}

impl WriteOptions {
    /// Raw data.
    pub fn uncompressed() -> Self {
        Self {
            layout: ResourceLayout::Uncompressed,
            compression_type: CompressionType::None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            flags: ResourceFlags::empty(),
        }
    }

    /// Original chunk table layout.
    pub fn compressed(compression_type: CompressionType, chunk_size: u32) -> Self {
        Self {
            layout: ResourceLayout::Compressed,
            compression_type,
            chunk_size,
            flags: ResourceFlags::empty(),
        }
    }

    /// Alternate chunk table layout.
    pub fn packed(compression_type: CompressionType, chunk_size: u32) -> Self {
        Self {
            layout: ResourceLayout::Packed,
            compression_type,
            chunk_size,
            flags: ResourceFlags::empty(),
        }
    }

    /// Add header flags.
    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = self.flags | flags;
        self
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::uncompressed()
    }
}

/// Write `data` as one resource at the writer's current position and return
/// its header.
///
/// Chunks are compressed with `compressor` when given; a chunk that does not
/// shrink is stored raw. For [`ResourceLayout::Packed`] the returned header
/// is the main entry of the packed resource.
pub fn write_resource<W: Write + Seek>(
    writer: &mut W,
    data: &[u8],
    options: &WriteOptions,
    mut compressor: Option<&mut dyn ChunkCompressor>,
) -> Result<ResourceHeader> {
    let offset = writer.stream_position()?;
    let data_len = data.len() as u64;
    let flags = ResourceFlags::from_bits(
        options.flags.bits() & !(ResourceFlags::COMPRESSED.bits() | ResourceFlags::PACKED_STREAMS.bits()),
    );

    if options.layout == ResourceLayout::Uncompressed {
        writer.write_all(data)?;
        return Ok(ResourceHeader::new(data_len, flags, offset, data_len));
    }

    validate_chunk_size(options.chunk_size)?;
    if options.layout == ResourceLayout::Compressed && options.compression_type.is_none() {
        return Err(WimError::invalid_parameter(
            "compressed layout needs a compression type",
        ));
    }

    let stored: Vec<Cow<'_, [u8]>> = data
        .chunks(options.chunk_size as usize)
        .map(|chunk| {
            let compressed = match compressor.as_mut() {
                Some(c) => c.compress(chunk),
                None => None,
            };
            match compressed {
                Some(c) if c.len() < chunk.len() => Cow::Owned(c),
                _ => Cow::Borrowed(chunk),
            }
        })
        .collect();
    let sizes: Vec<u64> = stored.iter().map(|c| c.len() as u64).collect();

    let (layout, flags, header_usize) = match options.layout {
        ResourceLayout::Packed => {
            AltChunkTableHeader {
                res_usize: data_len,
                chunk_size: options.chunk_size,
                compression_format: options.compression_type.format_code(),
            }
            .write(writer)?;
            (
                ChunkTableLayout::Alternate,
                flags | ResourceFlags::PACKED_STREAMS,
                PACK_MAGIC_NUMBER,
            )
        }
        _ => (ChunkTableLayout::Original, flags | ResourceFlags::COMPRESSED, data_len),
    };

    let table = encode_chunk_entries(layout, &sizes, data_len);
    writer.write_all(&table)?;
    for chunk in &stored {
        writer.write_all(chunk)?;
    }

    let size_in_wim = writer.stream_position()? - offset;
    debug!(
        "wrote {:?} resource at {:#x}: {} chunks, {} -> {} bytes",
        layout,
        offset,
        stored.len(),
        data_len,
        size_in_wim
    );
    Ok(ResourceHeader::new(size_in_wim, flags, offset, header_usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Halves every chunk by dropping odd bytes; lossy, only for layout
    /// checks.
    struct Halve;

    impl ChunkCompressor for Halve {
        fn compress(&mut self, data: &[u8]) -> Option<Vec<u8>> {
            Some(data.iter().step_by(2).copied().collect())
        }
    }

    #[test]
    fn test_uncompressed() {
        let mut out = Cursor::new(vec![0u8; 8]);
        out.set_position(8);
        let header = write_resource(
            &mut out,
            b"plain",
            &WriteOptions::uncompressed().with_flags(ResourceFlags::METADATA),
            None,
        )
        .unwrap();
        assert_eq!(header, ResourceHeader::new(5, ResourceFlags::METADATA, 8, 5));
        assert_eq!(&out.get_ref()[8..], b"plain");
    }

    #[test]
    fn test_original_layout() {
        let data = vec![1u8; 300];
        let mut out = Cursor::new(Vec::new());
        let mut halve = Halve;
        let header = write_resource(
            &mut out,
            &data,
            &WriteOptions::compressed(CompressionType::Xpress, 128),
            Some(&mut halve),
        )
        .unwrap();

        // Chunks 128, 128, 44 stored as 64, 64, 22 behind a two-entry table.
        let bytes = out.into_inner();
        assert_eq!(&bytes[0..4], &64u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &128u32.to_le_bytes());
        assert_eq!(bytes.len(), 8 + 64 + 64 + 22);
        assert_eq!(header.size_in_wim, bytes.len() as u64);
        assert_eq!(header.uncompressed_size, 300);
        assert!(header.flags.contains(ResourceFlags::COMPRESSED));
    }

    #[test]
    fn test_packed_layout() {
        let data = vec![9u8; 200];
        let mut out = Cursor::new(Vec::new());
        let header = write_resource(
            &mut out,
            &data,
            &WriteOptions::packed(CompressionType::Lzms, 128),
            None,
        )
        .unwrap();
        assert!(header.is_packed_main_entry());

        let bytes = out.into_inner();
        let mut alt = [0u8; 16];
        alt.copy_from_slice(&bytes[..16]);
        let alt = AltChunkTableHeader::from_bytes(&alt);
        assert_eq!(alt.res_usize, 200);
        assert_eq!(alt.chunk_size, 128);
        assert_eq!(alt.compression_type().unwrap(), CompressionType::Lzms);
        assert_eq!(&bytes[16..20], &128u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &72u32.to_le_bytes());
        assert_eq!(header.size_in_wim, 24 + 200);
    }

    #[test]
    fn test_rejects_bad_options() {
        let mut out = Cursor::new(Vec::new());
        let bad_size = WriteOptions::compressed(CompressionType::Lzx, 1000);
        assert!(write_resource(&mut out, b"x", &bad_size, None).is_err());

        let no_type = WriteOptions::compressed(CompressionType::None, 4096);
        assert!(write_resource(&mut out, b"x", &no_type, None).is_err());
    }
}
