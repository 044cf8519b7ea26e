//! Pipable stream framing.
//!
//! Pipable archives can be written to and read from a pipe, so nothing may
//! require seeking. Each stream is preceded by its own header and each
//! compressed chunk by its stored size:
//!
//! ```text
//! +0   magic              u64 LE (0x2b9b9ba2443db9d8)
//! +8   uncompressed_size  u64 LE
//! +16  hash               20 bytes SHA-1
//! +36  flags              u32 LE (resource flags, 0x100 = unhashed)
//! +40  body               raw data, or per chunk:
//!                           u32 LE stored size, stored bytes
//! ```

use crate::config::{ArchiveConfig, validate_chunk_size};
use crate::header::{ResourceFlags, ResourceHeader};
use crate::read::{decode_chunk, read_raw};
use log::{debug, warn};
use oxiwim_core::codec::{CodecRegistry, CompressionType, DecompressorCache};
use oxiwim_core::error::{Result, WimError};
use oxiwim_core::sha1::{SHA1_HASH_SIZE, Sha1, Sha1Hash, ZERO_HASH};
use oxiwim_core::traits::ChunkCompressor;
use std::io::{self, Read, Write};

/// Magic number opening every pipable stream header.
pub const PWM_STREAM_MAGIC: u64 = 0x2b9b9ba2443db9d8;

/// Size of a pipable stream header.
pub const PWM_STREAM_HEADER_SIZE: usize = 40;

/// Size of the per-chunk header.
pub const PWM_CHUNK_HEADER_SIZE: usize = 4;

/// The hash field is a placeholder; the stream's digest was not known when
/// the header was written.
pub const PWM_FLAG_UNHASHED: u32 = 0x100;

/// Header preceding each stream in a pipable archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipableStreamHeader {
    /// Uncompressed size of the stream.
    pub uncompressed_size: u64,
    /// SHA-1 digest, or zeros when unhashed.
    pub hash: Sha1Hash,
    /// Resource flags in the low byte, plus [`PWM_FLAG_UNHASHED`].
    pub flags: u32,
}

impl PipableStreamHeader {
    /// Create a header for a stream with known digest.
    pub fn new(uncompressed_size: u64, hash: Sha1Hash, flags: ResourceFlags) -> Self {
        Self {
            uncompressed_size,
            hash,
            flags: u32::from(flags.bits()),
        }
    }

    /// Create a header whose digest will not be recorded.
    pub fn unhashed(uncompressed_size: u64, flags: ResourceFlags) -> Self {
        Self {
            uncompressed_size,
            hash: ZERO_HASH,
            flags: u32::from(flags.bits()) | PWM_FLAG_UNHASHED,
        }
    }

    /// Decode from the 40-byte on-wire form.
    pub fn from_bytes(buf: &[u8; PWM_STREAM_HEADER_SIZE]) -> Result<Self> {
        let magic = u64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);
        if magic != PWM_STREAM_MAGIC {
            return Err(WimError::invalid_magic(PWM_STREAM_MAGIC, magic));
        }

        let mut hash = ZERO_HASH;
        hash.copy_from_slice(&buf[16..16 + SHA1_HASH_SIZE]);

        Ok(Self {
            uncompressed_size: u64::from_le_bytes([
                buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
            ]),
            hash,
            flags: u32::from_le_bytes([buf[36], buf[37], buf[38], buf[39]]),
        })
    }

    /// Encode to the 40-byte on-wire form.
    pub fn to_bytes(&self) -> [u8; PWM_STREAM_HEADER_SIZE] {
        let mut buf = [0u8; PWM_STREAM_HEADER_SIZE];
        buf[0..8].copy_from_slice(&PWM_STREAM_MAGIC.to_le_bytes());
        buf[8..16].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[16..36].copy_from_slice(&self.hash);
        buf[36..40].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    /// Read a header from the input.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; PWM_STREAM_HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }

    /// Write the header to the output.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Whether the hash field is a placeholder.
    pub fn is_unhashed(&self) -> bool {
        self.flags & PWM_FLAG_UNHASHED != 0
    }

    /// Resource flags carried in the low byte.
    pub fn resource_flags(&self) -> ResourceFlags {
        ResourceFlags::from_bits(self.flags as u8)
    }

    /// Whether the body is chunked and compressed.
    pub fn is_compressed(&self) -> bool {
        self.resource_flags().is_compressed()
    }
}

/// Stored size prefix of one chunk in a pipable body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipableChunkHeader {
    /// Stored (possibly compressed) size of the chunk that follows.
    pub compressed_size: u32,
}

impl PipableChunkHeader {
    /// Read a chunk header from the input.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; PWM_CHUNK_HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self {
            compressed_size: u32::from_le_bytes(buf),
        })
    }

    /// Write the chunk header to the output.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        Ok(())
    }
}

/// Codec parameters of a pipable body.
pub(crate) struct PipableBody<'a> {
    pub compression_type: CompressionType,
    pub chunk_size: u32,
    pub codecs: &'a CodecRegistry,
}

/// Read the body following `header`, delivering bytes `[offset, offset +
/// size)` of the stream to `consume` as `(stream offset, data)` pieces.
///
/// Chunks wholly before `offset` are skipped without decompression; reading
/// stops after the chunk containing the last requested byte.
pub(crate) fn read_pipable_body<R: Read>(
    reader: &mut R,
    header: &PipableStreamHeader,
    body: &PipableBody<'_>,
    cache: &mut DecompressorCache,
    offset: u64,
    size: u64,
    consume: &mut dyn FnMut(u64, &[u8]) -> Result<()>,
) -> Result<()> {
    let end = offset + size;
    if size == 0 {
        return Ok(());
    }

    if !header.is_compressed() {
        skip_bytes(reader, offset)?;
        return read_raw(reader, offset, size, consume);
    }

    let chunk_size = u64::from(body.chunk_size);
    let mut stored = Vec::new();
    let mut ubuf = Vec::new();
    let mut chunk_start = 0u64;
    let mut index = 0u64;

    while chunk_start < end {
        let chunk_usize = (header.uncompressed_size - chunk_start).min(chunk_size);
        let chunk_end = chunk_start + chunk_usize;
        let chunk = PipableChunkHeader::read(reader)?;
        let csize = u64::from(chunk.compressed_size);
        if csize == 0 || csize > chunk_usize {
            return Err(WimError::invalid_chunk_table(
                chunk_start,
                format!("pipable chunk {} has invalid stored size {}", index, csize),
            ));
        }

        if chunk_end <= offset {
            skip_bytes(reader, csize)?;
        } else {
            stored.resize(csize as usize, 0);
            reader.read_exact(&mut stored)?;
            let data = decode_chunk(
                cache,
                body.codecs,
                body.compression_type,
                body.chunk_size,
                index,
                &stored,
                chunk_usize as usize,
                &mut ubuf,
            )?;
            let lo = offset.max(chunk_start);
            let hi = end.min(chunk_end);
            consume(lo, &data[(lo - chunk_start) as usize..(hi - chunk_start) as usize])?;
        }

        chunk_start = chunk_end;
        index += 1;
    }

    Ok(())
}

fn skip_bytes<R: Read>(reader: &mut R, count: u64) -> Result<()> {
    let skipped = io::copy(&mut reader.by_ref().take(count), &mut io::sink())?;
    if skipped != count {
        return Err(WimError::unexpected_eof((count - skipped) as usize));
    }
    Ok(())
}

/// Reads pipable streams strictly forward.
pub struct PipableStreamReader<R> {
    reader: R,
    compression_type: CompressionType,
    chunk_size: u32,
    codecs: CodecRegistry,
    cache: DecompressorCache,
}

impl<R: Read> PipableStreamReader<R> {
    /// Create a reader for an archive with the given settings.
    pub fn new(reader: R, config: &ArchiveConfig, codecs: CodecRegistry) -> Result<Self> {
        validate_chunk_size(config.chunk_size)?;
        Ok(Self {
            reader,
            compression_type: config.compression_type,
            chunk_size: config.chunk_size,
            codecs,
            cache: DecompressorCache::new(),
        })
    }

    /// Read the next stream header.
    pub fn read_header(&mut self) -> Result<PipableStreamHeader> {
        PipableStreamHeader::read(&mut self.reader)
    }

    /// Read the body following `header`, passing each chunk to `consume`.
    ///
    /// Returns the computed SHA-1 digest. Unless the header is unhashed,
    /// the digest must match the embedded one.
    pub fn read_body<F>(&mut self, header: &PipableStreamHeader, mut consume: F) -> Result<Sha1Hash>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let body = PipableBody {
            compression_type: self.compression_type,
            chunk_size: self.chunk_size,
            codecs: &self.codecs,
        };
        let mut sha1 = Sha1::new();
        read_pipable_body(
            &mut self.reader,
            header,
            &body,
            &mut self.cache,
            0,
            header.uncompressed_size,
            &mut |_, data| {
                sha1.update(data);
                consume(data)
            },
        )?;

        let computed = sha1.finalize();
        if !header.is_unhashed() && computed != header.hash {
            warn!("pipable stream of {} bytes failed its checksum", header.uncompressed_size);
            return Err(WimError::checksum_mismatch(header.hash, computed));
        }
        Ok(computed)
    }

    /// Read the next stream, header and body.
    pub fn read_stream<F>(&mut self, consume: F) -> Result<(PipableStreamHeader, Sha1Hash)>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let header = self.read_header()?;
        debug!(
            "pipable stream: {} bytes, flags {:#x}",
            header.uncompressed_size, header.flags
        );
        let hash = self.read_body(&header, consume)?;
        Ok((header, hash))
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes pipable streams strictly forward.
pub struct PipableStreamWriter<'a, W> {
    writer: W,
    position: u64,
    chunk_size: u32,
    compressor: Option<&'a mut dyn ChunkCompressor>,
}

impl<'a, W: Write> PipableStreamWriter<'a, W> {
    /// Create a writer whose output begins at archive offset `position`.
    pub fn new(writer: W, position: u64, chunk_size: u32) -> Result<Self> {
        validate_chunk_size(chunk_size)?;
        Ok(Self {
            writer,
            position,
            chunk_size,
            compressor: None,
        })
    }

    /// Compress chunks with `compressor`.
    pub fn with_compressor(mut self, compressor: &'a mut dyn ChunkCompressor) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Current archive offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write one stream with its SHA-1 digest in the header.
    ///
    /// Returns the header locating the stream in the archive.
    pub fn write_stream(&mut self, data: &[u8], flags: ResourceFlags) -> Result<ResourceHeader> {
        let flags = self.body_flags(flags);
        let header = PipableStreamHeader::new(data.len() as u64, Sha1::compute(data), flags);
        self.write_with_header(&header, data)
    }

    /// Write one stream whose digest is left out of the header.
    pub fn write_unhashed_stream(&mut self, data: &[u8], flags: ResourceFlags) -> Result<ResourceHeader> {
        let flags = self.body_flags(flags);
        let header = PipableStreamHeader::unhashed(data.len() as u64, flags);
        self.write_with_header(&header, data)
    }

    fn body_flags(&self, flags: ResourceFlags) -> ResourceFlags {
        if self.compressor.is_some() {
            flags | ResourceFlags::COMPRESSED
        } else {
            flags
        }
    }

    fn write_with_header(&mut self, header: &PipableStreamHeader, data: &[u8]) -> Result<ResourceHeader> {
        let start = self.position;
        header.write(&mut self.writer)?;
        let mut written = PWM_STREAM_HEADER_SIZE as u64;

        match self.compressor.as_deref_mut() {
            Some(compressor) => {
                for chunk in data.chunks(self.chunk_size as usize) {
                    let compressed = compressor.compress(chunk).filter(|c| c.len() < chunk.len());
                    let stored = compressed.as_deref().unwrap_or(chunk);
                    PipableChunkHeader {
                        compressed_size: stored.len() as u32,
                    }
                    .write(&mut self.writer)?;
                    self.writer.write_all(stored)?;
                    written += (PWM_CHUNK_HEADER_SIZE + stored.len()) as u64;
                }
            }
            None => {
                self.writer.write_all(data)?;
                written += data.len() as u64;
            }
        }

        self.position += written;
        Ok(ResourceHeader::new(
            written,
            header.resource_flags(),
            start,
            header.uncompressed_size,
        ))
    }

    /// Flush and unwrap the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
