pub mod builder;

use xxhash_rust::xxh3::xxh3_128;

use crate::error::{Error, Result};

/// Probabilistic data structure: "is this key in the set?"
///
/// - If any bit is 0 → key is DEFINITELY NOT in the set
/// - If all bits are 1 → key is PROBABLY in the set (false positive possible)
///
/// Written once per column family into every partition file, so a point
/// read against staged files can skip files that can't hold the row.
///
/// Sizing:
///   bits_per_key = -1.44 * log2(false_positive_rate)
///   num_hashes = bits_per_key * ln(2)
///
/// Double hashing: h_i(key) = h1(key) + i * h2(key) (mod m), where h1, h2
/// are the two 64-bit halves of one xxh3-128 hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_hashes: u32,
    num_bits: u32,
}

impl BloomFilter {
    /// Create a new bloom filter sized for expected_items at the given FPR.
    ///
    /// # Panics
    /// Panics if expected_items is 0 or FPR is not in (0, 1).
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "FPR must be in (0, 1)"
        );

        let bits_per_key = -1.44 * false_positive_rate.log2();
        let num_bits = ((expected_items as f64) * bits_per_key).ceil() as u32;
        let num_bits = num_bits.max(64);

        let num_hashes = (bits_per_key * 2.0f64.ln()).ceil() as u32;
        let num_hashes = num_hashes.max(1);

        let num_u64s = (num_bits as usize).div_ceil(64);
        Self {
            bits: vec![0u64; num_u64s],
            num_hashes,
            num_bits,
        }
    }

    /// Add a key to the bloom filter.
    pub fn insert(&mut self, key: &[u8]) {
        self.insert_hash(xxh3_128(key));
    }

    pub(crate) fn insert_hash(&mut self, hash128: u128) {
        let (h1, h2) = split_hash(hash128);
        for i in 0..self.num_hashes {
            let pos = self.get_position(h1, h2, i);
            self.set_bit(pos);
        }
    }

    /// Check if a key MIGHT be in the set.
    /// false → definitely not here. true → probably here.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = split_hash(xxh3_128(key));
        (0..self.num_hashes).all(|i| self.check_bit(self.get_position(h1, h2, i)))
    }

    /// Serialize for a bloom block.
    /// Format: [num_hashes(4B)][num_bits(4B)][words(8B each)]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.bits.len() * 8);
        buf.extend_from_slice(&self.num_hashes.to_le_bytes());
        buf.extend_from_slice(&self.num_bits.to_le_bytes());
        for word in &self.bits {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::Corruption("bloom block too short".into()));
        }
        let num_hashes = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let num_bits = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let num_u64s = (num_bits as usize).div_ceil(64);
        if num_hashes == 0 || num_bits == 0 || data.len() != 8 + num_u64s * 8 {
            return Err(Error::Corruption(format!(
                "bloom block size mismatch: {} bits, {} bytes",
                num_bits,
                data.len()
            )));
        }
        let bits = data[8..]
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().expect("chunk of 8")))
            .collect();
        Ok(Self {
            bits,
            num_hashes,
            num_bits,
        })
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    fn get_position(&self, h1: u64, h2: u64, i: u32) -> u32 {
        let i = i as u64;
        (h1.wrapping_add(i.wrapping_mul(h2)) % (self.num_bits as u64)) as u32
    }

    fn set_bit(&mut self, pos: u32) {
        self.bits[(pos / 64) as usize] |= 1 << (pos % 64);
    }

    fn check_bit(&self, pos: u32) -> bool {
        (self.bits[(pos / 64) as usize] >> (pos % 64)) & 1 == 1
    }
}

fn split_hash(hash128: u128) -> (u64, u64) {
    (hash128 as u64, (hash128 >> 64) as u64)
}
