//! # OxiWim Resource
//!
//! Resource and stream storage of WIM archives.
//!
//! Every piece of data in a WIM archive lives in a *resource*, located by a
//! 24-byte [`ResourceHeader`]. A resource is stored raw, split into
//! independently compressed chunks behind a chunk table, or (in pipable
//! archives) framed for strictly forward reading. A *stream* is a byte range
//! of a resource's uncompressed data; ordinary resources hold one stream,
//! packed resources hold many.
//!
//! - [`header`]: resource headers and flags
//! - [`chunk_table`]: original and alternate chunk tables
//! - [`resource`]: resolved resources and streams
//! - [`read`]: [`WimReader`] and the stream reading pipeline
//! - [`callbacks`]: the pipeline's consumer interface
//! - [`pipable`]: pipable stream framing
//! - [`write`]: writing resources
//! - [`config`]: archive settings and read flags
//!
//! ## Example
//!
//! ```rust
//! use oxiwim_resource::{ArchiveConfig, WimReader, WriteOptions, write_resource};
//! use std::io::Cursor;
//!
//! let mut archive = Cursor::new(Vec::new());
//! let header = write_resource(&mut archive, b"hello", &WriteOptions::uncompressed(), None).unwrap();
//!
//! let mut reader = WimReader::new(archive, ArchiveConfig::UNCOMPRESSED).unwrap();
//! let stream = reader.add_resource_stream(&header, None).unwrap();
//! assert_eq!(reader.read_full_stream(stream).unwrap(), b"hello");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callbacks;
pub mod chunk_table;
pub mod config;
pub mod header;
pub mod pipable;
pub mod read;
pub mod resource;
pub mod write;

// Re-exports
pub use callbacks::{BeginStatus, ReadReport, StreamCallbacks, StreamFailure};
pub use chunk_table::{AltChunkTableHeader, ChunkTable, ChunkTableLayout, chunk_entry_size};
pub use config::{ArchiveConfig, DEFAULT_CHUNK_SIZE, ReadFlags};
pub use header::{PACK_MAGIC_NUMBER, RESHDR_DISK_SIZE, ResourceFlags, ResourceHeader};
pub use pipable::{PipableChunkHeader, PipableStreamHeader, PipableStreamReader, PipableStreamWriter};
pub use read::WimReader;
pub use resource::{ResourceId, ResourceSpec, StreamEntry, StreamId};
pub use write::{ResourceLayout, WriteOptions, write_resource};

pub use oxiwim_core::{CodecRegistry, CompressionType, Result, WimError};
