//! Stream reading pipeline.
//!
//! [`WimReader`] owns the archive input and the resources and streams parsed
//! from its lookup table. [`WimReader::read_stream_list`] reads a list of
//! streams in one pass:
//!
//! 1. Unless the caller's order is declared optimal, streams are sorted by
//!    resource offset, then by offset within the resource.
//! 2. Consecutive non-overlapping streams of one resource form a group. A
//!    group is read with one forward pass over its byte range, so chunks
//!    shared by neighboring streams of a packed resource are decompressed
//!    once.
//! 3. Decoded pieces are routed to the stream they belong to and passed to
//!    [`StreamCallbacks`], hashing along the way when requested.
//!
//! Errors are split by [`WimError::is_fatal`]: fatal errors abort the call.
//! Any other error fails only the stream being delivered; the rest of its
//! group is read again in a new pass starting at the next stream.

use crate::callbacks::{BeginStatus, ReadReport, StreamCallbacks};
use crate::chunk_table::{AltChunkTableHeader, ChunkTable};
use crate::config::{ArchiveConfig, ReadFlags};
use crate::header::ResourceHeader;
use crate::pipable::{PipableBody, PipableStreamHeader, read_pipable_body};
use crate::resource::{ResourceId, ResourceSpec, StreamEntry, StreamId};
use log::{debug, trace, warn};
use oxiwim_core::codec::{CodecRegistry, CompressionType, DecompressorCache};
use oxiwim_core::error::{Result, WimError};
use oxiwim_core::sha1::{Sha1, Sha1Hash};
use std::io::{Read, Seek, SeekFrom};

/// Produce the uncompressed bytes of one chunk.
///
/// Chunks stored at their full uncompressed size are raw and returned as
/// is; others are decompressed into `out`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_chunk<'a>(
    cache: &mut DecompressorCache,
    codecs: &CodecRegistry,
    ctype: CompressionType,
    chunk_size: u32,
    index: u64,
    stored: &'a [u8],
    chunk_usize: usize,
    out: &'a mut Vec<u8>,
) -> Result<&'a [u8]> {
    if stored.len() == chunk_usize {
        return Ok(stored);
    }

    trace!("decompressing chunk {} ({} -> {} bytes)", index, stored.len(), chunk_usize);
    out.resize(chunk_usize, 0);
    cache
        .get(codecs, ctype, chunk_size)?
        .decompress(stored, &mut out[..chunk_usize])
        .map_err(|e| match e {
            WimError::Decompression { .. } => e,
            other => WimError::decompression(index, other.to_string()),
        })?;
    Ok(&out[..chunk_usize])
}

/// Largest piece of raw data handed to a consumer at once.
pub(crate) const RAW_PIECE_SIZE: usize = 32 * 1024;

/// Pass the next `size` bytes of the input to `consume` in pieces of at most
/// [`RAW_PIECE_SIZE`], labeling the first one `offset`.
pub(crate) fn read_raw<R: Read>(
    reader: &mut R,
    offset: u64,
    size: u64,
    consume: &mut dyn FnMut(u64, &[u8]) -> Result<()>,
) -> Result<()> {
    let mut buf = vec![0u8; usize::try_from(size).map_or(RAW_PIECE_SIZE, |s| s.min(RAW_PIECE_SIZE))];
    let mut done = 0u64;
    while done < size {
        let len = (size - done).min(buf.len() as u64) as usize;
        reader.read_exact(&mut buf[..len])?;
        consume(offset + done, &buf[..len])?;
        done += len as u64;
    }
    Ok(())
}

/// Read bytes `[offset, offset + size)` of a resource's uncompressed data,
/// passing `(offset, data)` pieces to `consume` in ascending order.
fn read_resource_range<R: Read + Seek>(
    reader: &mut R,
    rspec: &ResourceSpec,
    codecs: &CodecRegistry,
    cache: &mut DecompressorCache,
    offset: u64,
    size: u64,
    consume: &mut dyn FnMut(u64, &[u8]) -> Result<()>,
) -> Result<()> {
    if size == 0 {
        return Ok(());
    }
    let end = offset
        .checked_add(size)
        .filter(|&end| end <= rspec.uncompressed_size)
        .ok_or_else(|| {
            WimError::invalid_parameter(format!(
                "range {}+{} exceeds resource of {} bytes",
                offset, size, rspec.uncompressed_size
            ))
        })?;

    if rspec.is_pipable {
        if rspec.is_packed() {
            return Err(WimError::unsupported_compression("packed pipable resource"));
        }
        reader.seek(SeekFrom::Start(rspec.offset_in_wim))?;
        let header = PipableStreamHeader::read(reader)?;
        if header.uncompressed_size != rspec.uncompressed_size {
            return Err(WimError::invalid_header(format!(
                "pipable stream header gives {} bytes, lookup table {}",
                header.uncompressed_size, rspec.uncompressed_size
            )));
        }
        let body = PipableBody {
            compression_type: rspec.compression_type,
            chunk_size: rspec.chunk_size,
            codecs,
        };
        return read_pipable_body(reader, &header, &body, cache, offset, size, consume);
    }

    if !rspec.is_packed() && !rspec.is_compressed() {
        reader.seek(SeekFrom::Start(rspec.offset_in_wim.saturating_add(offset)))?;
        return read_raw(reader, offset, size, consume);
    }

    let table = ChunkTable::read(reader, rspec)?;
    let Some((first, last)) = table.chunk_range(offset, size) else {
        return Ok(());
    };
    debug!(
        "resource at {:#x}: {} chunks of {} bytes, reading {}..={}",
        rspec.offset_in_wim,
        table.num_chunks(),
        table.chunk_size(),
        first,
        last
    );

    let (first_start, _) = table.stored_range(first);
    reader.seek(SeekFrom::Start(rspec.offset_in_wim + first_start))?;

    let mut stored = Vec::new();
    let mut ubuf = Vec::new();
    for index in first..=last {
        let (_, stored_size) = table.stored_range(index);
        stored.resize(stored_size as usize, 0);
        reader.read_exact(&mut stored)?;

        let chunk_usize = table.chunk_usize(index) as usize;
        let data = decode_chunk(
            cache,
            codecs,
            rspec.compression_type,
            table.chunk_size(),
            index as u64,
            &stored,
            chunk_usize,
            &mut ubuf,
        )?;

        let chunk_start = table.chunk_offset(index);
        let lo = offset.max(chunk_start);
        let hi = end.min(chunk_start + chunk_usize as u64);
        consume(lo, &data[(lo - chunk_start) as usize..(hi - chunk_start) as usize])?;
    }

    Ok(())
}

/// State of the stream a group is currently delivering.
enum Current {
    /// Data goes to the consumer.
    Active { index: usize, sha1: Option<Sha1> },
    /// Data is passed over: the stream was skipped or already failed.
    Passive { index: usize },
}

impl Current {
    fn index(&self) -> usize {
        match self {
            Self::Active { index, .. } | Self::Passive { index } => *index,
        }
    }
}

/// Routes the decoded data of one group to its streams.
struct GroupDispatch<'a, C: ?Sized> {
    streams: &'a mut [StreamEntry],
    group: &'a [StreamId],
    next: usize,
    current: Option<Current>,
    callbacks: &'a mut C,
    flags: ReadFlags,
    report: &'a mut ReadReport,
}

impl<C: StreamCallbacks + ?Sized> GroupDispatch<'_, C> {
    fn wants_hash(&self, stream: &StreamEntry) -> bool {
        match stream.hash {
            Some(_) => self.flags.contains(ReadFlags::VERIFY_STREAM_HASHES),
            None => self.flags.contains(ReadFlags::COMPUTE_MISSING_STREAM_HASHES),
        }
    }

    /// Route `data`, which starts at `chunk_offset` of the resource.
    ///
    /// Only fatal errors are returned; everything else is charged to the
    /// stream that caused it.
    fn feed(&mut self, chunk_offset: u64, data: &[u8]) -> Result<()> {
        let chunk_end = chunk_offset + data.len() as u64;
        loop {
            let index = match self.current.as_ref().map(Current::index) {
                Some(index) => index,
                None => {
                    let starts_here = self
                        .group
                        .get(self.next)
                        .is_some_and(|id| self.streams[id.0].offset_in_res < chunk_end);
                    if !starts_here {
                        return Ok(());
                    }
                    self.open()?;
                    continue;
                }
            };

            let stream = &self.streams[self.group[index].0];
            let (start, end) = (stream.offset_in_res, stream.end_in_res());
            let lo = start.max(chunk_offset);
            let hi = end.min(chunk_end);
            if lo < hi {
                self.deliver(&data[(lo - chunk_offset) as usize..(hi - chunk_offset) as usize])?;
            }
            if end > chunk_end {
                return Ok(());
            }
            self.close()?;
        }
    }

    /// Begin streams until one wants its data, before any data is read, so
    /// that a failure reading its first chunk is reported through
    /// `end_stream`. Returns where that stream starts in the resource, or
    /// `None` when the rest of the group was skipped or refused.
    fn start(&mut self) -> Result<Option<u64>> {
        while self.next < self.group.len() {
            self.open()?;
            if let Some(Current::Active { index, .. }) = &self.current {
                return Ok(Some(self.streams[self.group[*index].0].offset_in_res));
            }
            self.current = None;
        }
        Ok(None)
    }

    /// Begin the next stream of the group.
    fn open(&mut self) -> Result<()> {
        let index = self.next;
        let id = self.group[index];
        self.next += 1;

        let stream = &self.streams[id.0];
        match self.callbacks.begin_stream(id, stream) {
            Ok(BeginStatus::Proceed) => {
                let sha1 = self.wants_hash(stream).then(Sha1::new);
                self.current = Some(Current::Active { index, sha1 });
                Ok(())
            }
            Ok(BeginStatus::Skip) => {
                debug!("stream {} skipped by consumer", id.0);
                self.report.streams_skipped += 1;
                self.current = Some(Current::Passive { index });
                Ok(())
            }
            Err(e) => {
                debug!("stream {} refused: {}", id.0, e);
                self.current = Some(Current::Passive { index });
                self.report.fail(id, e)
            }
        }
    }

    fn deliver(&mut self, piece: &[u8]) -> Result<()> {
        let Some(Current::Active { index, sha1 }) = &mut self.current else {
            return Ok(());
        };
        let index = *index;
        if let Some(sha1) = sha1 {
            sha1.update(piece);
        }

        let id = self.group[index];
        let stream = &self.streams[id.0];
        if let Err(e) = self.callbacks.consume_chunk(id, stream, piece) {
            self.callbacks.end_stream(id, stream, Err(&e));
            self.current = Some(Current::Passive { index });
            return self.report.fail(id, e);
        }
        Ok(())
    }

    /// Finish the current stream: verify or record its digest and end it.
    fn close(&mut self) -> Result<()> {
        let Some(Current::Active { index, sha1 }) = self.current.take() else {
            return Ok(());
        };
        let id = self.group[index];
        let stream = &mut self.streams[id.0];

        let mut status = Ok(());
        if let Some(sha1) = sha1 {
            let computed = sha1.finalize();
            match stream.hash {
                Some(expected) if expected != computed => {
                    warn!("stream {} failed its checksum", id.0);
                    status = Err(WimError::checksum_mismatch(expected, computed));
                }
                Some(_) => {}
                None => stream.hash = Some(computed),
            }
        }

        match status {
            Ok(()) => {
                self.callbacks.end_stream(id, stream, Ok(()));
                self.report.streams_read += 1;
                Ok(())
            }
            Err(e) => {
                self.callbacks.end_stream(id, stream, Err(&e));
                self.report.fail(id, e)
            }
        }
    }

    /// The group's data was read completely. Zero-length streams at the end
    /// of the range have not been seen yet.
    fn finish(&mut self) -> Result<()> {
        let open_with_data = self
            .current
            .as_ref()
            .is_some_and(|c| self.streams[self.group[c.index()].0].size != 0);
        let pending_data = open_with_data
            || self.group[self.next..]
                .iter()
                .any(|id| self.streams[id.0].size != 0);
        if pending_data {
            return self.abort(WimError::invalid_header(
                "resource data ended before its streams",
            ));
        }
        self.close()?;
        while self.next < self.group.len() {
            self.open()?;
            self.close()?;
        }
        Ok(())
    }

    /// Reading the group's data failed. Only the stream being delivered
    /// fails; streams not yet begun are left to the next pass.
    fn abort(&mut self, error: WimError) -> Result<()> {
        let Some(Current::Active { index, .. }) = self.current.take() else {
            if error.is_fatal() {
                return Err(error);
            }
            debug!("read error between streams: {}", error);
            return Ok(());
        };
        let id = self.group[index];
        self.callbacks.end_stream(id, &self.streams[id.0], Err(&error));
        if !error.is_fatal() {
            warn!("stream {} failed: {}", id.0, error);
        }
        self.report.fail(id, error)
    }
}

/// Reads resources and streams of one archive.
pub struct WimReader<R> {
    reader: R,
    config: ArchiveConfig,
    codecs: CodecRegistry,
    resources: Vec<ResourceSpec>,
    streams: Vec<StreamEntry>,
}

impl<R: Read + Seek> WimReader<R> {
    /// Create a reader over an archive with the given settings and no
    /// codecs.
    pub fn new(reader: R, config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reader,
            config,
            codecs: CodecRegistry::new(),
            resources: Vec::new(),
            streams: Vec::new(),
        })
    }

    /// Use `codecs` to decompress chunks.
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Archive settings.
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Registered codecs.
    pub fn codecs_mut(&mut self) -> &mut CodecRegistry {
        &mut self.codecs
    }

    /// All registered streams, indexed by [`StreamId::index`].
    pub fn streams(&self) -> &[StreamEntry] {
        &self.streams
    }

    /// Look up a resource.
    pub fn resource(&self, id: ResourceId) -> Result<&ResourceSpec> {
        self.resources
            .get(id.0)
            .ok_or_else(|| WimError::not_found(format!("resource {}", id.0)))
    }

    /// Look up a stream.
    pub fn stream(&self, id: StreamId) -> Result<&StreamEntry> {
        self.streams
            .get(id.0)
            .ok_or_else(|| WimError::not_found(format!("stream {}", id.0)))
    }

    fn spec_for_header(&mut self, header: &ResourceHeader) -> Result<ResourceSpec> {
        if header.is_packed_main_entry() {
            if !self.config.supports_packed_streams() {
                return ResourceSpec::from_header(header, &self.config);
            }
            self.reader.seek(SeekFrom::Start(header.offset_in_wim))?;
            let alt = AltChunkTableHeader::read(&mut self.reader)?;
            ResourceSpec::from_packed_header(header, &alt, &self.config)
        } else {
            ResourceSpec::from_header(header, &self.config)
        }
    }

    /// Register a resource from its header.
    ///
    /// The main entry of a packed resource is completed from the chunk table
    /// header at its offset.
    pub fn add_resource(&mut self, header: &ResourceHeader) -> Result<ResourceId> {
        let rspec = self.spec_for_header(header)?;
        let id = ResourceId(self.resources.len());
        debug!(
            "resource {}: {} bytes at {:#x}, {} uncompressed, {}",
            id.0, rspec.size_in_wim, rspec.offset_in_wim, rspec.uncompressed_size, rspec.compression_type
        );
        self.resources.push(rspec);
        Ok(id)
    }

    /// Register a stream stored at `offset_in_res` of `resource`.
    pub fn add_stream(
        &mut self,
        resource: ResourceId,
        offset_in_res: u64,
        size: u64,
        hash: Option<Sha1Hash>,
    ) -> Result<StreamId> {
        let rspec = self
            .resources
            .get_mut(resource.0)
            .ok_or_else(|| WimError::not_found(format!("resource {}", resource.0)))?;
        if offset_in_res
            .checked_add(size)
            .is_none_or(|end| end > rspec.uncompressed_size)
        {
            return Err(WimError::invalid_header(format!(
                "stream {}+{} lies outside resource of {} bytes",
                offset_in_res, size, rspec.uncompressed_size
            )));
        }

        let id = StreamId(self.streams.len());
        rspec.streams.push(id);
        self.streams.push(StreamEntry {
            resource,
            offset_in_res,
            size,
            hash,
        });
        Ok(id)
    }

    /// Register an ordinary resource and the single stream it holds.
    pub fn add_resource_stream(&mut self, header: &ResourceHeader, hash: Option<Sha1Hash>) -> Result<StreamId> {
        let resource = self.add_resource(header)?;
        let size = self.resources[resource.0].uncompressed_size;
        self.add_stream(resource, 0, size, hash)
    }

    /// Read the given streams, passing their data to `callbacks`.
    ///
    /// Returns a report of delivered, skipped and failed streams, or the
    /// first fatal error.
    pub fn read_stream_list<C>(&mut self, ids: &[StreamId], callbacks: &mut C, flags: ReadFlags) -> Result<ReadReport>
    where
        C: StreamCallbacks + ?Sized,
    {
        for &id in ids {
            self.stream(id)?;
        }

        let mut order = ids.to_vec();
        if !flags.contains(ReadFlags::STREAM_LIST_ALREADY_SORTED) {
            let (resources, streams) = (&self.resources, &self.streams);
            order.sort_by_key(|id| {
                let stream = &streams[id.0];
                (
                    resources[stream.resource.0].offset_in_wim,
                    stream.resource,
                    stream.offset_in_res,
                )
            });
        }

        let mut report = ReadReport::default();
        let mut cache = DecompressorCache::new();
        let mut start = 0;
        let mut groups = 0;
        while start < order.len() {
            let end = self.group_end(&order, start);
            self.read_group(&order[start..end], callbacks, flags, &mut cache, &mut report)?;
            start = end;
            groups += 1;
        }

        debug!(
            "read {} streams in {} groups: {} delivered, {} skipped, {} failed",
            order.len(),
            groups,
            report.streams_read,
            report.streams_skipped,
            report.failures.len()
        );
        Ok(report)
    }

    /// End of the group starting at `order[start]`: following streams of the
    /// same resource that begin at or after the previous one's end.
    fn group_end(&self, order: &[StreamId], start: usize) -> usize {
        let first = &self.streams[order[start].0];
        let mut last_end = first.end_in_res();
        let mut end = start + 1;
        while let Some(id) = order.get(end) {
            let stream = &self.streams[id.0];
            if stream.resource != first.resource || stream.offset_in_res < last_end {
                break;
            }
            last_end = stream.end_in_res();
            end += 1;
        }
        end
    }

    fn read_group<C>(
        &mut self,
        group: &[StreamId],
        callbacks: &mut C,
        flags: ReadFlags,
        cache: &mut DecompressorCache,
        report: &mut ReadReport,
    ) -> Result<()>
    where
        C: StreamCallbacks + ?Sized,
    {
        let mut rest = group;
        while !rest.is_empty() {
            let begun = self.read_group_pass(rest, callbacks, flags, cache, report)?;
            if begun < rest.len() {
                debug!("resuming group at stream {}", rest[begun].0);
            }
            rest = &rest[begun..];
        }
        Ok(())
    }

    /// One forward pass over `group`, from its first wanted stream. Returns
    /// how many streams were begun; a non-fatal read error ends the pass
    /// early. At least one stream is always begun.
    fn read_group_pass<C>(
        &mut self,
        group: &[StreamId],
        callbacks: &mut C,
        flags: ReadFlags,
        cache: &mut DecompressorCache,
        report: &mut ReadReport,
    ) -> Result<usize>
    where
        C: StreamCallbacks + ?Sized,
    {
        let resource = self.streams[group[0].0].resource;
        let end = group
            .iter()
            .map(|id| self.streams[id.0].end_in_res())
            .max()
            .unwrap_or(0);

        let rspec = &self.resources[resource.0];
        let mut dispatch = GroupDispatch {
            streams: &mut self.streams,
            group,
            next: 0,
            current: None,
            callbacks,
            flags,
            report,
        };
        let Some(start) = dispatch.start()? else {
            return Ok(group.len());
        };

        let result = read_resource_range(
            &mut self.reader,
            rspec,
            &self.codecs,
            cache,
            start,
            end - start,
            &mut |offset, data| dispatch.feed(offset, data),
        );
        match result {
            Ok(()) => dispatch.finish()?,
            Err(e) => dispatch.abort(e)?,
        }
        Ok(dispatch.next)
    }

    fn read_stream_range(
        &mut self,
        id: StreamId,
        offset: u64,
        size: u64,
        consume: &mut dyn FnMut(u64, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let stream = self.stream(id)?;
        if offset.checked_add(size).is_none_or(|end| end > stream.size) {
            return Err(WimError::invalid_parameter(format!(
                "range {}+{} exceeds stream of {} bytes",
                offset, size, stream.size
            )));
        }
        let base = stream.offset_in_res;
        let rspec = &self.resources[stream.resource.0];
        let mut cache = DecompressorCache::new();
        read_resource_range(
            &mut self.reader,
            rspec,
            &self.codecs,
            &mut cache,
            base + offset,
            size,
            &mut |at, data| consume(at - base, data),
        )
    }

    /// Read `size` bytes at `offset` of a stream.
    pub fn read_partial_stream(&mut self, id: StreamId, offset: u64, size: u64) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.read_stream_range(id, offset, size, &mut |_, piece| {
            data.extend_from_slice(piece);
            Ok(())
        })?;
        Ok(data)
    }

    /// Read a whole stream.
    pub fn read_full_stream(&mut self, id: StreamId) -> Result<Vec<u8>> {
        let size = self.stream(id)?.size;
        self.read_partial_stream(id, 0, size)
    }

    /// Pass the first `size` bytes of a stream to `consume`, one chunk at a
    /// time.
    pub fn extract_stream<F>(&mut self, id: StreamId, size: u64, mut consume: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        self.read_stream_range(id, 0, size, &mut |_, piece| consume(piece))
    }

    /// Compute a stream's SHA-1 digest and record it.
    pub fn hash_stream(&mut self, id: StreamId) -> Result<Sha1Hash> {
        let size = self.stream(id)?.size;
        let mut sha1 = Sha1::new();
        self.read_stream_range(id, 0, size, &mut |_, piece| {
            sha1.update(piece);
            Ok(())
        })?;
        let hash = sha1.finalize();
        self.streams[id.0].hash = Some(hash);
        Ok(hash)
    }

    fn read_resource_by_header(
        &mut self,
        header: &ResourceHeader,
        consume: &mut dyn FnMut(u64, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let rspec = self.spec_for_header(header)?;
        let mut cache = DecompressorCache::new();
        read_resource_range(
            &mut self.reader,
            &rspec,
            &self.codecs,
            &mut cache,
            0,
            rspec.uncompressed_size,
            consume,
        )
    }

    /// Read a whole resource addressed directly by its header, such as a
    /// metadata resource.
    pub fn resource_to_data(&mut self, header: &ResourceHeader) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.read_resource_by_header(header, &mut |_, piece| {
            data.extend_from_slice(piece);
            Ok(())
        })?;
        Ok(data)
    }

    /// SHA-1 digest of a whole resource addressed by its header.
    pub fn resource_to_hash(&mut self, header: &ResourceHeader) -> Result<Sha1Hash> {
        let mut sha1 = Sha1::new();
        self.read_resource_by_header(header, &mut |_, piece| {
            sha1.update(piece);
            Ok(())
        })?;
        Ok(sha1.finalize())
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> std::fmt::Debug for WimReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WimReader")
            .field("config", &self.config)
            .field("codecs", &self.codecs)
            .field("resources", &self.resources.len())
            .field("streams", &self.streams.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::ResourceFlags;
    use std::io::Cursor;

    #[derive(Default)]
    struct Collect {
        data: Vec<(StreamId, Vec<u8>)>,
        ended: Vec<StreamId>,
    }

    impl StreamCallbacks for Collect {
        fn begin_stream(&mut self, id: StreamId, _stream: &StreamEntry) -> Result<BeginStatus> {
            self.data.push((id, Vec::new()));
            Ok(BeginStatus::Proceed)
        }

        fn consume_chunk(&mut self, _id: StreamId, _stream: &StreamEntry, chunk: &[u8]) -> Result<()> {
            if let Some((_, buf)) = self.data.last_mut() {
                buf.extend_from_slice(chunk);
            }
            Ok(())
        }

        fn end_stream(&mut self, id: StreamId, _stream: &StreamEntry, status: std::result::Result<(), &WimError>) {
            assert!(status.is_ok());
            self.ended.push(id);
        }
    }

    fn uncompressed_archive(parts: &[&[u8]]) -> (WimReader<Cursor<Vec<u8>>>, Vec<StreamId>) {
        let mut bytes = Vec::new();
        let mut headers = Vec::new();
        for part in parts {
            let offset = bytes.len() as u64;
            bytes.extend_from_slice(part);
            headers.push(ResourceHeader::new(
                part.len() as u64,
                ResourceFlags::empty(),
                offset,
                part.len() as u64,
            ));
        }
        let mut reader = WimReader::new(Cursor::new(bytes), ArchiveConfig::UNCOMPRESSED).unwrap();
        let ids = headers
            .iter()
            .map(|h| reader.add_resource_stream(h, None).unwrap())
            .collect();
        (reader, ids)
    }

    #[test]
    fn test_sorted_by_offset() {
        let (mut reader, ids) = uncompressed_archive(&[b"first", b"second", b"third"]);
        let mut sink = Collect::default();
        let report = reader
            .read_stream_list(&[ids[2], ids[0], ids[1]], &mut sink, ReadFlags::empty())
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.streams_read, 3);
        assert_eq!(sink.ended, ids);
        assert_eq!(sink.data[0].1, b"first");
    }

    #[test]
    fn test_already_sorted_keeps_order() {
        let (mut reader, ids) = uncompressed_archive(&[b"a", b"b"]);
        let mut sink = Collect::default();
        reader
            .read_stream_list(&[ids[1], ids[0]], &mut sink, ReadFlags::STREAM_LIST_ALREADY_SORTED)
            .unwrap();
        assert_eq!(sink.ended, vec![ids[1], ids[0]]);
    }

    #[test]
    fn test_compute_missing_hash() {
        let (mut reader, ids) = uncompressed_archive(&[b"hash me"]);
        let mut sink = Collect::default();
        reader
            .read_stream_list(&ids, &mut sink, ReadFlags::COMPUTE_MISSING_STREAM_HASHES)
            .unwrap();
        assert_eq!(reader.stream(ids[0]).unwrap().hash, Some(Sha1::compute(b"hash me")));
    }

    #[test]
    fn test_unknown_stream() {
        let (mut reader, _) = uncompressed_archive(&[b"x"]);
        let err = reader
            .read_stream_list(&[StreamId(9)], &mut Collect::default(), ReadFlags::empty())
            .unwrap_err();
        assert!(matches!(err, WimError::NotFound { .. }));
    }

    #[test]
    fn test_partial_reads() {
        let (mut reader, ids) = uncompressed_archive(&[b"0123456789"]);
        assert_eq!(reader.read_partial_stream(ids[0], 3, 4).unwrap(), b"3456");
        assert_eq!(reader.read_full_stream(ids[0]).unwrap(), b"0123456789");
        assert!(reader.read_partial_stream(ids[0], 8, 3).is_err());
        assert!(reader.read_partial_stream(ids[0], 10, 0).unwrap().is_empty());

        let mut out = Vec::new();
        reader
            .extract_stream(ids[0], 5, |piece| {
                out.extend_from_slice(piece);
                Ok(())
            })
            .unwrap();
        assert_eq!(out, b"01234");
    }

    #[test]
    fn test_hash_stream_records_digest() {
        let (mut reader, ids) = uncompressed_archive(&[b"abc"]);
        let hash = reader.hash_stream(ids[0]).unwrap();
        assert_eq!(hash, Sha1::compute(b"abc"));
        assert_eq!(reader.stream(ids[0]).unwrap().hash, Some(hash));
    }

    struct SkipAll;

    impl StreamCallbacks for SkipAll {
        fn begin_stream(&mut self, _id: StreamId, _stream: &StreamEntry) -> Result<BeginStatus> {
            Ok(BeginStatus::Skip)
        }

        fn consume_chunk(&mut self, _id: StreamId, _stream: &StreamEntry, _chunk: &[u8]) -> Result<()> {
            panic!("skipped stream received data");
        }
    }

    #[test]
    fn test_skipped_stream_is_not_read() {
        // The resource lies past the end of the input.
        let mut reader = WimReader::new(Cursor::new(vec![0u8; 10]), ArchiveConfig::UNCOMPRESSED).unwrap();
        let header = ResourceHeader::new(100, ResourceFlags::empty(), 1000, 100);
        let id = reader.add_resource_stream(&header, None).unwrap();

        let report = reader
            .read_stream_list(&[id], &mut SkipAll, ReadFlags::empty())
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.streams_skipped, 1);
        assert!(reader.read_full_stream(id).unwrap_err().is_fatal());
    }

    #[test]
    fn test_large_uncompressed_read_in_pieces() {
        let part: Vec<u8> = (0..RAW_PIECE_SIZE * 2 + 100).map(|i| (i % 251) as u8).collect();
        let (mut reader, ids) = uncompressed_archive(&[part.as_slice()]);
        let mut pieces = Vec::new();
        reader
            .extract_stream(ids[0], part.len() as u64, |piece| {
                pieces.push(piece.len());
                Ok(())
            })
            .unwrap();
        assert_eq!(pieces, vec![RAW_PIECE_SIZE, RAW_PIECE_SIZE, 100]);
    }

    #[test]
    fn test_huge_size_over_short_input() {
        let mut reader = WimReader::new(Cursor::new(vec![0u8; 64]), ArchiveConfig::UNCOMPRESSED).unwrap();
        let header = ResourceHeader::new(1 << 46, ResourceFlags::empty(), 0, 1 << 46);
        let err = reader.resource_to_data(&header).unwrap_err();
        assert!(matches!(err, WimError::Io(_)));

        let config = ArchiveConfig::new(CompressionType::Xpress, 32768);
        let mut reader = WimReader::new(Cursor::new(vec![0u8; 64]), config).unwrap();
        let header = ResourceHeader::new(1 << 46, ResourceFlags::COMPRESSED, 0, 1 << 46);
        let err = reader.resource_to_data(&header).unwrap_err();
        assert!(matches!(err, WimError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_add_stream_bounds() {
        let (mut reader, ids) = uncompressed_archive(&[b"tiny"]);
        let resource = reader.stream(ids[0]).unwrap().resource;
        assert!(reader.add_stream(resource, 2, 3, None).is_err());
        assert!(reader.add_stream(resource, 4, 0, None).is_ok());
        assert!(reader.add_stream(ResourceId(5), 0, 0, None).is_err());
        assert_eq!(reader.resource(resource).unwrap().streams.len(), 2);
    }
}
