//! Archive-wide settings and read flags.

use oxiwim_core::codec::CompressionType;
use oxiwim_core::error::{Result, WimError};
use std::ops::{BitOr, BitOrAssign};

/// Default chunk size of compressed resources.
pub const DEFAULT_CHUNK_SIZE: u32 = 32768;

/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: u32 = 1 << 30;

/// Format version of ordinary archives.
pub const WIM_VERSION_DEFAULT: u32 = 0x10d00;

/// Format version of archives that may contain packed-stream resources.
pub const WIM_VERSION_PACKED_STREAMS: u32 = 0xe00;

/// Check that a chunk size is a non-zero power of two no larger than
/// [`MAX_CHUNK_SIZE`].
pub fn validate_chunk_size(chunk_size: u32) -> Result<()> {
    if !chunk_size.is_power_of_two() || chunk_size > MAX_CHUNK_SIZE {
        return Err(WimError::invalid_header(format!(
            "invalid chunk size {}",
            chunk_size
        )));
    }
    Ok(())
}

/// Settings taken from the archive header that resources inherit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Compression type of resources with the COMPRESSED flag.
    pub compression_type: CompressionType,
    /// Chunk size of resources with the COMPRESSED flag.
    pub chunk_size: u32,
    /// Whether resources use the pipable (forward-only) framing.
    pub pipable: bool,
    /// Archive format version.
    pub version: u32,
}

impl ArchiveConfig {
    /// An archive with no compression.
    pub const UNCOMPRESSED: Self = Self {
        compression_type: CompressionType::None,
        chunk_size: DEFAULT_CHUNK_SIZE,
        pipable: false,
        version: WIM_VERSION_DEFAULT,
    };

    /// An archive using `compression_type` with `chunk_size` chunks.
    pub fn new(compression_type: CompressionType, chunk_size: u32) -> Self {
        Self {
            compression_type,
            chunk_size,
            ..Self::UNCOMPRESSED
        }
    }

    /// Set whether the archive is pipable.
    pub fn with_pipable(mut self, pipable: bool) -> Self {
        self.pipable = pipable;
        self
    }

    /// Set the archive format version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Whether resources may use the packed-streams layout.
    pub fn supports_packed_streams(&self) -> bool {
        self.version == WIM_VERSION_PACKED_STREAMS
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        validate_chunk_size(self.chunk_size)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self::UNCOMPRESSED
    }
}

/// Flags for [`WimReader::read_stream_list`](crate::WimReader::read_stream_list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ReadFlags(u32);

impl ReadFlags {
    /// Verify each stream's SHA-1 digest against the recorded one.
    pub const VERIFY_STREAM_HASHES: Self = Self(0x1);
    /// Compute and store the digest of streams that have none recorded.
    pub const COMPUTE_MISSING_STREAM_HASHES: Self = Self(0x2);
    /// The caller's stream order is already optimal; do not sort.
    pub const STREAM_LIST_ALREADY_SORTED: Self = Self(0x4);

    /// No flags.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw flag bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check whether all flags in `other` are set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ReadFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ReadFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
