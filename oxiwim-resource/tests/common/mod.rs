//! Shared fixtures: a run-length toy codec and a recording consumer.

#![allow(dead_code)]

use oxiwim_core::traits::{ChunkCompressor, ChunkDecompressor};
use oxiwim_resource::{BeginStatus, CodecRegistry, CompressionType, Result, StreamCallbacks, StreamEntry, StreamId, WimError};
use std::collections::{HashMap, HashSet};

/// Stores runs of one byte as (byte, count) pairs.
pub struct RunLength;

impl ChunkCompressor for RunLength {
    fn compress(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        for run in data.chunk_by(|a, b| a == b) {
            for part in run.chunks(255) {
                out.push(part[0]);
                out.push(part.len() as u8);
            }
        }
        Some(out)
    }
}

pub fn run_length_decode(input: &[u8], output: &mut [u8]) -> Result<()> {
    if input.len() % 2 != 0 {
        return Err(WimError::decompression(0, "odd run-length input"));
    }
    let mut pos = 0;
    for pair in input.chunks_exact(2) {
        let count = pair[1] as usize;
        output
            .get_mut(pos..pos + count)
            .ok_or_else(|| WimError::decompression(0, "run overflows chunk"))?
            .fill(pair[0]);
        pos += count;
    }
    if pos != output.len() {
        return Err(WimError::decompression(0, "runs do not fill chunk"));
    }
    Ok(())
}

pub fn run_length_factory(_chunk_size: u32) -> Result<Box<dyn ChunkDecompressor>> {
    Ok(Box::new(run_length_decode))
}

/// Registry decoding XPRESS-tagged resources with the toy codec.
pub fn codecs() -> CodecRegistry {
    CodecRegistry::new().with(CompressionType::Xpress, run_length_factory)
}

/// Data in runs of 50 equal bytes; compresses well.
pub fn compressible(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| ((i / 50) as u8).wrapping_add(seed)).collect()
}

/// Data without runs; never compresses.
pub fn incompressible(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            (state >> 16) as u8
        })
        .collect()
}

pub fn error_kind(e: &WimError) -> &'static str {
    match e {
        WimError::ChecksumMismatch { .. } => "checksum",
        WimError::Decompression { .. } => "decompression",
        WimError::UnsupportedCompression { .. } => "unsupported",
        WimError::Io(_) => "io",
        WimError::Callback { .. } => "callback",
        _ => "other",
    }
}

/// Consumer recording every callback.
#[derive(Default)]
pub struct Recorder {
    pub begun: Vec<StreamId>,
    pub data: HashMap<StreamId, Vec<u8>>,
    pub chunk_calls: HashMap<StreamId, usize>,
    pub ended: Vec<(StreamId, std::result::Result<(), &'static str>)>,
    pub skip: HashSet<StreamId>,
    pub fail_on_consume: HashMap<StreamId, fn() -> WimError>,
}

impl Recorder {
    pub fn end_status(&self, id: StreamId) -> Option<std::result::Result<(), &'static str>> {
        self.ended.iter().find(|(s, _)| *s == id).map(|(_, status)| *status)
    }

    pub fn ended_count(&self, id: StreamId) -> usize {
        self.ended.iter().filter(|(s, _)| *s == id).count()
    }
}

impl StreamCallbacks for Recorder {
    fn begin_stream(&mut self, id: StreamId, _stream: &StreamEntry) -> Result<BeginStatus> {
        self.begun.push(id);
        if self.skip.contains(&id) {
            Ok(BeginStatus::Skip)
        } else {
            Ok(BeginStatus::Proceed)
        }
    }

    fn consume_chunk(&mut self, id: StreamId, _stream: &StreamEntry, chunk: &[u8]) -> Result<()> {
        if let Some(make_error) = self.fail_on_consume.get(&id) {
            return Err(make_error());
        }
        self.data.entry(id).or_default().extend_from_slice(chunk);
        *self.chunk_calls.entry(id).or_default() += 1;
        Ok(())
    }

    fn end_stream(&mut self, id: StreamId, _stream: &StreamEntry, status: std::result::Result<(), &WimError>) {
        self.ended.push((id, status.map_err(error_kind)));
    }
}
