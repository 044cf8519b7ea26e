//! Error types for OxiWim operations.
//!
//! This module provides a single error type covering I/O failures, on-disk
//! format violations, integrity (hash) failures, and codec failures. Errors
//! are also classified as *fatal* or *stream-local*, which the stream
//! reading pipeline uses to decide whether to continue with the next stream.

use crate::sha1::Sha1Hash;
use std::io;
use thiserror::Error;

/// The main error type for OxiWim operations.
#[derive(Debug, Error)]
pub enum WimError {
    /// I/O error from the underlying archive handle.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid magic number (pipable stream framing).
    #[error("Invalid magic number: expected {expected:#018x}, found {found:#018x}")]
    InvalidMagic {
        /// Expected magic value.
        expected: u64,
        /// Magic value found in the data.
        found: u64,
    },

    /// Malformed resource header or lookup table entry.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Chunk table inconsistent with the resource it describes.
    #[error("Invalid chunk table at offset {offset}: {message}")]
    InvalidChunkTable {
        /// Archive offset of the resource owning the table.
        offset: u64,
        /// Description of the inconsistency.
        message: String,
    },

    /// No codec is available for the requested compression type.
    #[error("Unsupported compression: {name}")]
    UnsupportedCompression {
        /// Name of the compression type.
        name: String,
    },

    /// Computed SHA-1 digest differs from the recorded one.
    #[error("Checksum mismatch: expected {}, computed {}", hex(expected), hex(computed))]
    ChecksumMismatch {
        /// Digest recorded in the archive.
        expected: Sha1Hash,
        /// Digest computed from the decoded data.
        computed: Sha1Hash,
    },

    /// A chunk failed to decompress.
    #[error("Decompression failed for chunk {chunk}: {message}")]
    Decompression {
        /// Index of the chunk within its resource.
        chunk: u64,
        /// Description of the failure.
        message: String,
    },

    /// Unexpected end of data.
    #[error("Unexpected end of data: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// A parameter was outside its valid range.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the invalid parameter.
        message: String,
    },

    /// A resource or stream identifier does not exist.
    #[error("Not found: {name}")]
    NotFound {
        /// Description of the missing item.
        name: String,
    },

    /// A caller-supplied callback reported a failure.
    #[error("Callback failed: {message}")]
    Callback {
        /// Description of the callback failure.
        message: String,
    },
}

/// Result type alias for OxiWim operations.
pub type Result<T> = std::result::Result<T, WimError>;

fn hex(hash: &Sha1Hash) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

impl WimError {
    /// Create an invalid magic error.
    pub fn invalid_magic(expected: u64, found: u64) -> Self {
        Self::InvalidMagic { expected, found }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an invalid chunk table error.
    pub fn invalid_chunk_table(offset: u64, message: impl Into<String>) -> Self {
        Self::InvalidChunkTable {
            offset,
            message: message.into(),
        }
    }

    /// Create an unsupported compression error.
    pub fn unsupported_compression(name: impl Into<String>) -> Self {
        Self::UnsupportedCompression { name: name.into() }
    }

    /// Create a checksum mismatch error.
    pub fn checksum_mismatch(expected: Sha1Hash, computed: Sha1Hash) -> Self {
        Self::ChecksumMismatch { expected, computed }
    }

    /// Create a decompression error.
    pub fn decompression(chunk: u64, message: impl Into<String>) -> Self {
        Self::Decompression {
            chunk,
            message: message.into(),
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a callback error.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Whether this error means the archive handle or its structure can no
    /// longer be trusted.
    ///
    /// Fatal errors abort a whole stream-list read. Everything else (hash
    /// mismatches, chunk decompression failures, callback failures, missing
    /// codecs) only fails the stream being read.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::UnexpectedEof { .. }
                | Self::InvalidHeader { .. }
                | Self::InvalidChunkTable { .. }
                | Self::InvalidMagic { .. }
        )
    }
}
