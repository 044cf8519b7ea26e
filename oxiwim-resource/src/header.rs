//! Resource headers.
//!
//! Every resource (file contents, image metadata, lookup table, XML data)
//! is located by a 24-byte on-disk header:
//!
//! ```text
//! +0   size_in_wim        7 bytes LE (56 bits)
//! +7   flags              1 byte
//! +8   offset_in_wim      8 bytes LE
//! +16  uncompressed_size  8 bytes LE
//! ```

use oxiwim_core::error::{Result, WimError};
use std::io::{Read, Write};
use std::ops::BitOr;

/// Size of an on-disk resource header.
pub const RESHDR_DISK_SIZE: usize = 24;

/// Largest value representable in the 56-bit size field.
pub const MAX_SIZE_IN_WIM: u64 = (1 << 56) - 1;

/// Value of `uncompressed_size` that marks the main entry of a packed
/// resource. Never a real size.
pub const PACK_MAGIC_NUMBER: u64 = 0x1_0000_0000;

/// Resource header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ResourceFlags(u8);

impl ResourceFlags {
    /// Free-space hint. Ignored.
    pub const FREE: Self = Self(0x01);
    /// Metadata resource, lookup table, or XML data.
    pub const METADATA: Self = Self(0x02);
    /// Compressed with the archive's compression type, original chunk
    /// table layout.
    pub const COMPRESSED: Self = Self(0x04);
    /// Spanned. Ignored.
    pub const SPANNED: Self = Self(0x08);
    /// Packed streams, alternate chunk table layout.
    pub const PACKED_STREAMS: Self = Self(0x10);

    /// No flags.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Flags from raw bits. Unknown bits are preserved.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw flag bits.
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Check whether all flags in `other` are set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether any flag in `other` is set.
    pub const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether the resource data is compressed, with either chunk table
    /// layout.
    pub const fn is_compressed(&self) -> bool {
        self.intersects(Self(Self::COMPRESSED.0 | Self::PACKED_STREAMS.0))
    }
}

impl BitOr for ResourceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// In-memory resource header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceHeader {
    /// Stored size, including chunk table overhead (56 bits).
    pub size_in_wim: u64,
    /// Resource flags.
    pub flags: ResourceFlags,
    /// Byte offset of the resource from the start of the archive.
    pub offset_in_wim: u64,
    /// Uncompressed size, or [`PACK_MAGIC_NUMBER`] for a packed main entry.
    pub uncompressed_size: u64,
}

impl ResourceHeader {
    /// Create a header.
    pub fn new(size_in_wim: u64, flags: ResourceFlags, offset_in_wim: u64, uncompressed_size: u64) -> Self {
        Self {
            size_in_wim,
            flags,
            offset_in_wim,
            uncompressed_size,
        }
    }

    /// Decode a header from its 24-byte on-disk form.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < RESHDR_DISK_SIZE {
            return Err(WimError::unexpected_eof(RESHDR_DISK_SIZE - buf.len()));
        }

        let mut size = [0u8; 8];
        size[..7].copy_from_slice(&buf[0..7]);

        Ok(Self {
            size_in_wim: u64::from_le_bytes(size),
            flags: ResourceFlags::from_bits(buf[7]),
            offset_in_wim: read_u64_le(&buf[8..16]),
            uncompressed_size: read_u64_le(&buf[16..24]),
        })
    }

    /// Encode the header to its 24-byte on-disk form.
    ///
    /// Bits of `size_in_wim` above bit 55 do not fit and are dropped.
    pub fn to_bytes(&self) -> [u8; RESHDR_DISK_SIZE] {
        debug_assert!(self.size_in_wim <= MAX_SIZE_IN_WIM);

        let mut buf = [0u8; RESHDR_DISK_SIZE];
        buf[0..7].copy_from_slice(&self.size_in_wim.to_le_bytes()[..7]);
        buf[7] = self.flags.bits();
        buf[8..16].copy_from_slice(&self.offset_in_wim.to_le_bytes());
        buf[16..24].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf
    }

    /// Read a header from the input.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; RESHDR_DISK_SIZE];
        reader.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }

    /// Write the header to the output.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Whether the resource data is compressed.
    pub fn is_compressed(&self) -> bool {
        self.flags.is_compressed()
    }

    /// Whether this is a metadata resource.
    pub fn is_metadata(&self) -> bool {
        self.flags.contains(ResourceFlags::METADATA)
    }

    /// Whether this is the main entry of a packed resource rather than a
    /// stream inside one.
    pub fn is_packed_main_entry(&self) -> bool {
        self.flags.contains(ResourceFlags::PACKED_STREAMS) && self.uncompressed_size == PACK_MAGIC_NUMBER
    }
}

fn read_u64_le(buf: &[u8]) -> u64 {
    u64::from_le_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_bytes() -> [u8; RESHDR_DISK_SIZE] {
        let mut buf = [0u8; RESHDR_DISK_SIZE];
        buf[0] = 100;
        buf[7] = 0x04;
        buf[8..16].copy_from_slice(&0x1000u64.to_le_bytes());
        buf[16..24].copy_from_slice(&200u64.to_le_bytes());
        buf
    }

    #[test]
    fn test_parse_compressed_header() {
        let header = ResourceHeader::from_bytes(&sample_bytes()).unwrap();
        assert_eq!(header.size_in_wim, 100);
        assert!(header.is_compressed());
        assert!(!header.is_metadata());
        assert_eq!(header.offset_in_wim, 4096);
        assert_eq!(header.uncompressed_size, 200);
        assert_eq!(header.to_bytes(), sample_bytes());
    }

    #[test]
    fn test_56_bit_size() {
        let header = ResourceHeader::new(
            MAX_SIZE_IN_WIM,
            ResourceFlags::METADATA,
            u64::MAX,
            0x0123_4567_89AB_CDEF,
        );
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..7], &[0xFF; 7]);
        assert_eq!(bytes[7], 0x02);
        assert_eq!(ResourceHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_roundtrip_preserves_unknown_flag_bits() {
        let mut bytes = sample_bytes();
        bytes[7] = 0xE1;
        let header = ResourceHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.to_bytes(), bytes);
    }

    #[test]
    fn test_truncated_header() {
        let err = ResourceHeader::from_bytes(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, WimError::UnexpectedEof { expected: 14 }));
    }

    #[test]
    fn test_read_write() {
        let header = ResourceHeader::new(5, ResourceFlags::COMPRESSED, 77, 9);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), RESHDR_DISK_SIZE);
        let decoded = ResourceHeader::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_flags() {
        assert!(ResourceFlags::PACKED_STREAMS.is_compressed());
        assert!(ResourceFlags::COMPRESSED.is_compressed());
        assert!(!(ResourceFlags::METADATA | ResourceFlags::FREE | ResourceFlags::SPANNED).is_compressed());

        let flags = ResourceFlags::METADATA | ResourceFlags::COMPRESSED;
        assert!(flags.contains(ResourceFlags::METADATA));
        assert!(!flags.contains(ResourceFlags::METADATA | ResourceFlags::SPANNED));
        assert_eq!(flags.bits(), 0x06);
    }

    #[test]
    fn test_packed_main_entry() {
        let main = ResourceHeader::new(500, ResourceFlags::PACKED_STREAMS, 0, PACK_MAGIC_NUMBER);
        assert!(main.is_packed_main_entry());

        let member = ResourceHeader::new(500, ResourceFlags::PACKED_STREAMS, 0, 1234);
        assert!(!member.is_packed_main_entry());

        let plain = ResourceHeader::new(500, ResourceFlags::empty(), 0, PACK_MAGIC_NUMBER);
        assert!(!plain.is_packed_main_entry());
    }
}
