//! Consumer interface of the stream reading pipeline.

use crate::resource::{StreamEntry, StreamId};
use oxiwim_core::error::{Result, WimError};
use std::sync::Arc;

/// Answer of [`StreamCallbacks::begin_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginStatus {
    /// Deliver the stream's data.
    Proceed,
    /// Do not deliver this stream; move on to the next one.
    Skip,
}

/// Receives streams from [`WimReader::read_stream_list`](crate::WimReader::read_stream_list).
///
/// For every stream whose `begin_stream` returned [`BeginStatus::Proceed`],
/// `end_stream` is called exactly once, whether the stream succeeded or
/// not. Streams that were skipped, or whose `begin_stream` failed, see no
/// further calls.
pub trait StreamCallbacks {
    /// A stream is about to be read.
    fn begin_stream(&mut self, _id: StreamId, _stream: &StreamEntry) -> Result<BeginStatus> {
        Ok(BeginStatus::Proceed)
    }

    /// The next piece of the stream's data, in order. Compressed resources
    /// deliver one call per chunk; uncompressed resources deliver pieces of
    /// at most 32 KiB.
    fn consume_chunk(&mut self, id: StreamId, stream: &StreamEntry, chunk: &[u8]) -> Result<()>;

    /// The stream is complete, successfully or with `status`'s error.
    fn end_stream(&mut self, _id: StreamId, _stream: &StreamEntry, _status: std::result::Result<(), &WimError>) {}
}

/// A stream that could not be delivered.
#[derive(Debug, Clone)]
pub struct StreamFailure {
    /// The failed stream.
    pub stream: StreamId,
    /// Why it failed.
    pub error: Arc<WimError>,
}

/// Outcome of one pipeline call that did not abort.
#[derive(Debug, Clone, Default)]
pub struct ReadReport {
    /// Streams delivered completely.
    pub streams_read: usize,
    /// Streams declined by `begin_stream`.
    pub streams_skipped: usize,
    /// Streams that failed without aborting the call.
    pub failures: Vec<StreamFailure>,
}

impl ReadReport {
    /// Whether every stream was either delivered or skipped.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The failure recorded for `stream`, if any.
    pub fn failure(&self, stream: StreamId) -> Option<&WimError> {
        self.failures
            .iter()
            .find(|f| f.stream == stream)
            .map(|f| f.error.as_ref())
    }

    /// Record a stream failure. Fatal errors are returned instead.
    pub(crate) fn fail(&mut self, stream: StreamId, error: WimError) -> Result<()> {
        if error.is_fatal() {
            return Err(error);
        }
        self.failures.push(StreamFailure {
            stream,
            error: Arc::new(error),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_classifies_errors() {
        let mut report = ReadReport::default();
        assert!(report.is_success());

        report
            .fail(StreamId(3), WimError::decompression(0, "bad chunk"))
            .unwrap();
        assert!(!report.is_success());
        assert!(matches!(
            report.failure(StreamId(3)),
            Some(WimError::Decompression { .. })
        ));
        assert!(report.failure(StreamId(4)).is_none());

        let fatal = report.fail(StreamId(4), WimError::invalid_header("corrupt"));
        assert!(fatal.is_err());
        assert_eq!(report.failures.len(), 1);
    }
}
