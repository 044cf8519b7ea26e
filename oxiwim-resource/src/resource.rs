//! Resources and the streams stored in them.

use crate::chunk_table::AltChunkTableHeader;
use crate::config::{ArchiveConfig, validate_chunk_size};
use crate::header::{PACK_MAGIC_NUMBER, ResourceFlags, ResourceHeader};
use oxiwim_core::codec::CompressionType;
use oxiwim_core::error::{Result, WimError};
use oxiwim_core::sha1::Sha1Hash;

/// Index of a resource registered with a [`WimReader`](crate::WimReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) usize);

impl ResourceId {
    /// Position in the reader's resource list.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Index of a stream registered with a [`WimReader`](crate::WimReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub(crate) usize);

impl StreamId {
    /// Position in the reader's stream list.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Location and format of one stored resource.
///
/// An ordinary resource holds exactly one stream. A packed resource holds
/// any number of streams laid out back to back in its uncompressed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    /// Byte offset of the resource in the archive. For pipable resources this
    /// is the offset of the stream header preceding the data.
    pub offset_in_wim: u64,
    /// Stored size, including chunk tables and framing.
    pub size_in_wim: u64,
    /// Size of the uncompressed data.
    pub uncompressed_size: u64,
    /// Resource flags.
    pub flags: ResourceFlags,
    /// Compression type; [`CompressionType::None`] for uncompressed data.
    pub compression_type: CompressionType,
    /// Chunk size of compressed data.
    pub chunk_size: u32,
    /// Whether the resource uses pipable framing.
    pub is_pipable: bool,
    /// Streams stored in this resource, in registration order.
    pub streams: Vec<StreamId>,
}

impl ResourceSpec {
    /// Build a resource from an ordinary (non packed-main) header.
    ///
    /// Compressed resources inherit the archive's compression type and
    /// chunk size.
    pub fn from_header(header: &ResourceHeader, config: &ArchiveConfig) -> Result<Self> {
        if header.flags.contains(ResourceFlags::PACKED_STREAMS) && !config.supports_packed_streams() {
            return Err(WimError::invalid_header(format!(
                "packed resource in an archive of version {:#x}",
                config.version
            )));
        }
        if header.is_packed_main_entry() {
            return Err(WimError::invalid_header(
                "packed resource needs its chunk table header",
            ));
        }
        if header.flags.contains(ResourceFlags::PACKED_STREAMS) {
            return Err(WimError::invalid_header(
                "stream entry of a packed resource is not a resource",
            ));
        }

        let compression_type = if header.is_compressed() {
            if config.compression_type.is_none() {
                return Err(WimError::invalid_header(
                    "compressed resource in an archive without compression",
                ));
            }
            validate_chunk_size(config.chunk_size)?;
            config.compression_type
        } else {
            CompressionType::None
        };

        if !header.is_compressed() && !config.pipable && header.size_in_wim < header.uncompressed_size {
            return Err(WimError::invalid_header(format!(
                "uncompressed resource stores {} bytes but expands to {}",
                header.size_in_wim, header.uncompressed_size
            )));
        }

        Ok(Self {
            offset_in_wim: header.offset_in_wim,
            size_in_wim: header.size_in_wim,
            uncompressed_size: header.uncompressed_size,
            flags: header.flags,
            compression_type,
            chunk_size: config.chunk_size,
            is_pipable: config.pipable,
            streams: Vec::new(),
        })
    }

    /// Build a packed resource from its main entry and the alternate chunk
    /// table header found at its offset.
    pub fn from_packed_header(
        header: &ResourceHeader,
        alt: &AltChunkTableHeader,
        config: &ArchiveConfig,
    ) -> Result<Self> {
        if !config.supports_packed_streams() {
            return Err(WimError::invalid_header(format!(
                "packed resource in an archive of version {:#x}",
                config.version
            )));
        }
        if !header.is_packed_main_entry() {
            return Err(WimError::invalid_header("not a packed resource entry"));
        }
        if config.pipable {
            return Err(WimError::invalid_header(
                "packed resources cannot be pipable",
            ));
        }
        validate_chunk_size(alt.chunk_size)?;

        Ok(Self {
            offset_in_wim: header.offset_in_wim,
            size_in_wim: header.size_in_wim,
            uncompressed_size: alt.res_usize,
            flags: header.flags,
            compression_type: alt.compression_type()?,
            chunk_size: alt.chunk_size,
            is_pipable: false,
            streams: Vec::new(),
        })
    }

    /// Encode the resource's location as an on-disk header.
    pub fn to_header(&self) -> ResourceHeader {
        let uncompressed_size = if self.is_packed() {
            PACK_MAGIC_NUMBER
        } else {
            self.uncompressed_size
        };
        ResourceHeader::new(self.size_in_wim, self.flags, self.offset_in_wim, uncompressed_size)
    }

    /// Whether the resource data is compressed.
    pub fn is_compressed(&self) -> bool {
        self.flags.is_compressed() && !self.compression_type.is_none()
    }

    /// Whether the resource uses the packed-streams layout.
    pub fn is_packed(&self) -> bool {
        self.flags.contains(ResourceFlags::PACKED_STREAMS)
    }
}

/// One stream: a byte range of a resource's uncompressed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Resource holding the data.
    pub resource: ResourceId,
    /// Offset of the stream within the resource's uncompressed data.
    pub offset_in_res: u64,
    /// Uncompressed size of the stream.
    pub size: u64,
    /// SHA-1 digest of the stream, if recorded.
    pub hash: Option<Sha1Hash>,
}

impl StreamEntry {
    /// Offset one past the end of the stream within its resource.
    pub fn end_in_res(&self) -> u64 {
        self.offset_in_res + self.size
    }
}
