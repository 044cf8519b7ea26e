//! SHA-1 content hash (RFC 3174).
//!
//! WIM archives identify every stream by the SHA-1 digest of its
//! uncompressed contents. The stream reading pipeline uses [`Sha1`]
//! incrementally, one chunk at a time, to verify or backfill those digests.
//!
//! ## Example
//!
//! ```rust
//! use oxiwim_core::sha1::Sha1;
//!
//! let mut hasher = Sha1::new();
//! hasher.update(b"ab");
//! hasher.update(b"c");
//! assert_eq!(hasher.finalize(), Sha1::compute(b"abc"));
//! ```

/// Size of a SHA-1 digest in bytes.
pub const SHA1_HASH_SIZE: usize = 20;

/// A SHA-1 digest.
pub type Sha1Hash = [u8; SHA1_HASH_SIZE];

/// The all-zero digest, used on disk to mean "no hash recorded".
pub const ZERO_HASH: Sha1Hash = [0u8; SHA1_HASH_SIZE];

/// Check whether a digest is the all-zero placeholder.
pub fn is_zero_hash(hash: &Sha1Hash) -> bool {
    hash.iter().all(|&b| b == 0)
}

/// Incremental SHA-1 hasher.
#[derive(Debug, Clone)]
pub struct Sha1 {
    state: [u32; 5],
    /// Total message length in bytes.
    length: u64,
    buffer: [u8; 64],
    buffer_len: usize,
}

impl Sha1 {
    /// Initial hash values for SHA-1.
    const INIT_STATE: [u32; 5] = [0x67452301, 0xEFCDAB89, 0x98BADCFE, 0x10325476, 0xC3D2E1F0];

    /// Create a new SHA-1 hasher.
    pub fn new() -> Self {
        Self {
            state: Self::INIT_STATE,
            length: 0,
            buffer: [0u8; 64],
            buffer_len: 0,
        }
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Update the hash with new data.
    pub fn update(&mut self, data: &[u8]) {
        self.length = self.length.wrapping_add(data.len() as u64);
        self.absorb(data);
    }

    /// Finalize and return the digest.
    pub fn finalize(mut self) -> Sha1Hash {
        let bit_length = self.length.wrapping_mul(8);

        let mut padding = [0u8; 72];
        padding[0] = 0x80;
        let padding_len = if self.buffer_len < 56 {
            56 - self.buffer_len
        } else {
            120 - self.buffer_len
        };

        self.absorb(&padding[..padding_len]);
        self.absorb(&bit_length.to_be_bytes());
        debug_assert_eq!(self.buffer_len, 0);

        let mut result = [0u8; SHA1_HASH_SIZE];
        for (i, word) in self.state.iter().enumerate() {
            result[i * 4..(i + 1) * 4].copy_from_slice(&word.to_be_bytes());
        }
        result
    }

    /// Compute the SHA-1 digest of a buffer in one call.
    pub fn compute(data: &[u8]) -> Sha1Hash {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Feed bytes through the block function without counting them.
    fn absorb(&mut self, data: &[u8]) {
        let mut offset = 0;

        if self.buffer_len > 0 {
            let to_copy = data.len().min(64 - self.buffer_len);
            self.buffer[self.buffer_len..self.buffer_len + to_copy]
                .copy_from_slice(&data[..to_copy]);
            self.buffer_len += to_copy;
            offset += to_copy;

            if self.buffer_len == 64 {
                let block = self.buffer;
                self.compress(&block);
                self.buffer_len = 0;
            }
        }

        while offset + 64 <= data.len() {
            self.compress(&data[offset..offset + 64]);
            offset += 64;
        }

        if offset < data.len() {
            let remaining = data.len() - offset;
            self.buffer[..remaining].copy_from_slice(&data[offset..]);
            self.buffer_len = remaining;
        }
    }

    /// Compress a single 64-byte block.
    fn compress(&mut self, block: &[u8]) {
        let mut w = [0u32; 80];
        for (i, word) in block.chunks_exact(4).enumerate() {
            w[i] = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }

        let [mut a, mut b, mut c, mut d, mut e] = self.state;

        for (i, &w_i) in w.iter().enumerate() {
            let (f, k) = match i {
                0..=19 => ((b & c) | ((!b) & d), 0x5A827999u32),
                20..=39 => (b ^ c ^ d, 0x6ED9EBA1u32),
                40..=59 => ((b & c) | (b & d) | (c & d), 0x8F1BBCDCu32),
                _ => (b ^ c ^ d, 0xCA62C1D6u32),
            };

            let temp = a
                .rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(k)
                .wrapping_add(w_i);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = temp;
        }

        self.state[0] = self.state[0].wrapping_add(a);
        self.state[1] = self.state[1].wrapping_add(b);
        self.state[2] = self.state[2].wrapping_add(c);
        self.state[3] = self.state[3].wrapping_add(d);
        self.state[4] = self.state[4].wrapping_add(e);
    }
}

impl Default for Sha1 {
    fn default() -> Self {
        Self::new()
    }
}
