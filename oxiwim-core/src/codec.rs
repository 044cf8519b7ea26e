//! Compression types and the chunk codec registry.
//!
//! The archive header names one archive-wide compression type, and packed
//! resources override it with a format code stored in their own chunk table
//! header. [`CodecRegistry`] maps a [`CompressionType`] to a factory that
//! builds a [`ChunkDecompressor`] for a given chunk size.

use crate::error::{Result, WimError};
use crate::traits::ChunkDecompressor;
use log::debug;
use std::collections::HashMap;
use std::fmt;

/// Compression type of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionType {
    /// No compression.
    #[default]
    None,
    /// XPRESS (LZ77 + Huffman).
    Xpress,
    /// LZX.
    Lzx,
    /// LZMS.
    Lzms,
}

impl CompressionType {
    /// Parse the compression format code used in alternate chunk table
    /// headers (`0` = none, `1` = XPRESS, `2` = LZX, `3` = LZMS).
    pub fn from_format_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Xpress),
            2 => Some(Self::Lzx),
            3 => Some(Self::Lzms),
            _ => None,
        }
    }

    /// The compression format code used in alternate chunk table headers.
    pub fn format_code(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Xpress => 1,
            Self::Lzx => 2,
            Self::Lzms => 3,
        }
    }

    /// Check if this is the "no compression" type.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Get the type name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Xpress => "XPRESS",
            Self::Lzx => "LZX",
            Self::Lzms => "LZMS",
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Factory building a decompressor for a chunk size.
pub type DecompressorFactory = fn(chunk_size: u32) -> Result<Box<dyn ChunkDecompressor>>;

/// Registry of chunk decompressors keyed by compression type.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    factories: HashMap<CompressionType, DecompressorFactory>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for a compression type.
    pub fn register(&mut self, ctype: CompressionType, factory: DecompressorFactory) {
        self.factories.insert(ctype, factory);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, ctype: CompressionType, factory: DecompressorFactory) -> Self {
        self.register(ctype, factory);
        self
    }

    /// Check whether a compression type has a registered factory.
    pub fn supports(&self, ctype: CompressionType) -> bool {
        self.factories.contains_key(&ctype)
    }

    /// Create a decompressor for `(ctype, chunk_size)`.
    pub fn create_decompressor(
        &self,
        ctype: CompressionType,
        chunk_size: u32,
    ) -> Result<Box<dyn ChunkDecompressor>> {
        let factory = self
            .factories
            .get(&ctype)
            .ok_or_else(|| WimError::unsupported_compression(ctype.name()))?;
        debug!("creating {} decompressor (chunk size {})", ctype, chunk_size);
        factory(chunk_size)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.factories.keys().map(|t| t.name()).collect();
        types.sort_unstable();
        f.debug_struct("CodecRegistry").field("types", &types).finish()
    }
}

/// Cache of decompressors keyed by `(compression type, chunk size)`.
///
/// Lives for the duration of one read operation so that consecutive
/// resources using the same codec parameters reuse one instance.
#[derive(Default)]
pub struct DecompressorCache {
    entries: HashMap<(CompressionType, u32), Box<dyn ChunkDecompressor>>,
}

impl DecompressorCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the decompressor for `(ctype, chunk_size)`, creating it on first
    /// use.
    pub fn get(
        &mut self,
        registry: &CodecRegistry,
        ctype: CompressionType,
        chunk_size: u32,
    ) -> Result<&mut dyn ChunkDecompressor> {
        use std::collections::hash_map::Entry;

        let decompressor = match self.entries.entry((ctype, chunk_size)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(registry.create_decompressor(ctype, chunk_size)?)
            }
        };
        Ok(decompressor.as_mut())
    }

    /// Number of cached decompressors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_factory(_chunk_size: u32) -> Result<Box<dyn ChunkDecompressor>> {
        Ok(Box::new(|input: &[u8], output: &mut [u8]| -> Result<()> {
            output.copy_from_slice(&input[..output.len()]);
            Ok(())
        }))
    }

    #[test]
    fn test_format_codes() {
        for code in 0..4 {
            let ctype = CompressionType::from_format_code(code).unwrap();
            assert_eq!(ctype.format_code(), code);
        }
        assert_eq!(CompressionType::from_format_code(4), None);
        assert_eq!(CompressionType::from_format_code(3), Some(CompressionType::Lzms));
    }

    #[test]
    fn test_display() {
        assert_eq!(CompressionType::Lzx.to_string(), "LZX");
        assert!(CompressionType::None.is_none());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = CodecRegistry::new().with(CompressionType::Xpress, copy_factory);
        assert!(registry.supports(CompressionType::Xpress));
        assert!(!registry.supports(CompressionType::Lzms));

        let err = registry
            .create_decompressor(CompressionType::Lzms, 32768)
            .err()
            .unwrap();
        assert!(matches!(err, WimError::UnsupportedCompression { .. }));
    }

    #[test]
    fn test_cache_reuses_instances() {
        let registry = CodecRegistry::new().with(CompressionType::Lzx, copy_factory);
        let mut cache = DecompressorCache::new();

        let mut out = [0u8; 2];
        cache
            .get(&registry, CompressionType::Lzx, 32768)
            .unwrap()
            .decompress(b"hi", &mut out)
            .unwrap();
        assert_eq!(&out, b"hi");

        cache.get(&registry, CompressionType::Lzx, 32768).unwrap();
        assert_eq!(cache.len(), 1);
        cache.get(&registry, CompressionType::Lzx, 65536).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&registry, CompressionType::Xpress, 32768).is_err());
    }
}
