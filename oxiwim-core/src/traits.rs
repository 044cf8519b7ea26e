//! Core traits for chunk compression and decompression.
//!
//! WIM resources are compressed in independent fixed-size chunks. The
//! resource layer never decodes bytes itself; it hands each stored chunk to
//! a [`ChunkDecompressor`] selected by compression type and chunk size, and
//! when writing it offers each chunk to a [`ChunkCompressor`].

use crate::error::Result;

/// A decompressor for independently compressed chunks.
///
/// Implementations may keep internal scratch state between calls, which is
/// why `decompress` takes `&mut self`. One instance is never shared between
/// concurrent operations.
pub trait ChunkDecompressor {
    /// Decompress one chunk.
    ///
    /// # Arguments
    ///
    /// * `compressed` - The stored bytes of the chunk
    /// * `output` - Buffer whose length is exactly the uncompressed chunk size
    fn decompress(&mut self, compressed: &[u8], output: &mut [u8]) -> Result<()>;
}

/// A compressor for independently compressed chunks.
pub trait ChunkCompressor {
    /// Compress one chunk.
    ///
    /// Returns `None` when the chunk does not get smaller; the caller then
    /// stores it uncompressed.
    fn compress(&mut self, data: &[u8]) -> Option<Vec<u8>>;
}

impl<F> ChunkDecompressor for F
where
    F: FnMut(&[u8], &mut [u8]) -> Result<()>,
{
    fn decompress(&mut self, compressed: &[u8], output: &mut [u8]) -> Result<()> {
        self(compressed, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WimError;

    #[test]
    fn test_closure_as_decompressor() {
        let mut copy = |input: &[u8], output: &mut [u8]| -> Result<()> {
            if input.len() != output.len() {
                return Err(WimError::decompression(0, "size mismatch"));
            }
            output.copy_from_slice(input);
            Ok(())
        };

        let mut out = [0u8; 3];
        copy.decompress(b"abc", &mut out).unwrap();
        assert_eq!(&out, b"abc");
        assert!(copy.decompress(b"ab", &mut out).is_err());
    }
}
