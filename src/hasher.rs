use std::sync::Arc;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Maps a key string to a non-negative integer.
///
/// Implementations must be deterministic for the lifetime of a build: the
/// same key always produces the same value. A negative result is treated as
/// a defect in the implementation and surfaces as
/// [`Error::HashFunction`](crate::Error::HashFunction).
pub trait KeyHasher: Send + Sync {
    fn hash(&self, key: &str) -> i64;

    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> KeyHasher for F
where
    F: Fn(&str) -> i64 + Send + Sync,
{
    fn hash(&self, key: &str) -> i64 {
        self(key)
    }
}

/// Position-weighted sum of UTF-16 code units.
///
/// Each unit is shifted left by its index (mod 32) in 32-bit signed
/// arithmetic before summing, so anagrams hash differently. Collision-prone
/// and poorly distributed for short keys; prefer [`Murmur3Hash`] or
/// [`Xxh3Hash`] for real traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdditiveHash;

impl KeyHasher for AdditiveHash {
    fn hash(&self, key: &str) -> i64 {
        let sum = key
            .encode_utf16()
            .enumerate()
            .map(|(i, unit)| i64::from((u32::from(unit) << (i % 32)) as i32))
            .fold(0i64, i64::wrapping_add);
        sum.checked_abs().unwrap_or(i64::MAX)
    }

    fn name(&self) -> &str {
        "additive"
    }
}

/// MurmurHash3 (x86, 32-bit) over the UTF-8 bytes of the key.
///
/// For ASCII keys this matches the browser `murmurhash3_32_gc`, which feeds
/// the low byte of each UTF-16 unit. Keys with non-ASCII characters hash
/// differently.
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur3Hash {
    pub seed: u32,
}

impl Murmur3Hash {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }
}

impl KeyHasher for Murmur3Hash {
    fn hash(&self, key: &str) -> i64 {
        i64::from(murmur3_32(key.as_bytes(), self.seed))
    }

    fn name(&self) -> &str {
        "murmur3"
    }
}

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h ^= mix_k(k);
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let k = tail
            .iter()
            .enumerate()
            .fold(0u32, |k, (i, &b)| k ^ (u32::from(b) << (8 * i)));
        h ^= mix_k(k);
    }

    // Length is mixed in as a 32-bit value, matching the reference.
    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

/// xxh3-64 of the UTF-8 bytes, shifted right once to stay within `i64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3Hash;

impl KeyHasher for Xxh3Hash {
    fn hash(&self, key: &str) -> i64 {
        (xxh3_64(key.as_bytes()) >> 1) as i64
    }

    fn name(&self) -> &str {
        "xxh3"
    }
}

/// Configuration name of a built-in hasher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HashKind {
    #[default]
    Additive,
    Murmur3 {
        #[serde(default)]
        seed: u32,
    },
    Xxh3,
}

impl HashKind {
    pub fn build(self) -> Arc<dyn KeyHasher> {
        match self {
            HashKind::Additive => Arc::new(AdditiveHash),
            HashKind::Murmur3 { seed } => Arc::new(Murmur3Hash::new(seed)),
            HashKind::Xxh3 => Arc::new(Xxh3Hash),
        }
    }
}
