//! # OxiWim Core
//!
//! Core components for the OxiWim storage layer.
//!
//! This crate provides the building blocks shared by the codec and
//! container crates:
//!
//! - [`sha1`]: SHA-1 content hashing used to identify and verify streams
//! - [`codec`]: Compression types and the chunk decompressor registry
//! - [`traits`]: Chunk compression/decompression traits
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! OxiWim is designed as a layered stack:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L3: Container (oxiwim-resource)                         │
//! │     resource headers, chunk tables, pipable framing,    │
//! │     stream reading pipeline                             │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec (oxiwim-lzms)                                 │
//! │     slot tables, LRU queues, x86 filter                 │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Core (this crate)                                   │
//! │     errors, SHA-1, codec traits and registry            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxiwim_core::codec::CompressionType;
//! use oxiwim_core::sha1::Sha1;
//!
//! let ctype = CompressionType::from_format_code(3).unwrap();
//! assert_eq!(ctype, CompressionType::Lzms);
//!
//! let digest = Sha1::compute(b"abc");
//! assert_eq!(digest[0], 0xa9);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod error;
pub mod sha1;
pub mod traits;

// Re-exports for convenience
pub use codec::{CodecRegistry, CompressionType, DecompressorCache, DecompressorFactory};
pub use error::{Result, WimError};
pub use sha1::{SHA1_HASH_SIZE, Sha1, Sha1Hash, ZERO_HASH, is_zero_hash};
pub use traits::{ChunkCompressor, ChunkDecompressor};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::codec::{CodecRegistry, CompressionType};
    pub use crate::error::{Result, WimError};
    pub use crate::sha1::{Sha1, Sha1Hash};
    pub use crate::traits::{ChunkCompressor, ChunkDecompressor};
}
