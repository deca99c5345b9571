//! Hash functions for hush
//!
//! Murmur3 32-bit with two seeds gives a 64-bit key for domain buckets and
//! list cache file names. Keyword buckets use a single 32-bit pass.
//!
//! # Sentinel Handling
//!
//! Keyword hash `0` is reserved for the "no keyword" bucket, so
//! [`hash_token`] never returns it.

/// 64-bit hash represented as two 32-bit parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash64 {
    pub lo: u32,
    pub hi: u32,
}

impl Hash64 {
    /// Convert to a single u64 for use as a map key.
    #[inline]
    pub const fn to_u64(&self) -> u64 {
        ((self.hi as u64) << 32) | (self.lo as u64)
    }
}

const SEED_LO: u32 = 0x9e3779b9; // Golden ratio
const SEED_HI: u32 = 0x85ebca6b; // Murmur3 constant
const SEED_TOKEN: u32 = 0x811c9dc5;

/// Keyword bucket for filters without a usable keyword.
pub const NO_KEYWORD: u32 = 0;

/// Murmur3 32-bit hash.
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let k = k.wrapping_mul(0xcc9e2d51).rotate_left(15).wrapping_mul(0x1b873593);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k: u32 = 0;
        for (i, &b) in tail.iter().enumerate() {
            k ^= (b as u32) << (8 * i);
        }
        let k = k.wrapping_mul(0xcc9e2d51).rotate_left(15).wrapping_mul(0x1b873593);
        h ^= k;
    }

    // Finalization
    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

/// Compute a 64-bit hash as (lo, hi) using two Murmur3 passes.
#[inline]
pub fn hash64(data: &[u8]) -> Hash64 {
    Hash64 {
        lo: murmur3_32(data, SEED_LO),
        hi: murmur3_32(data, SEED_HI),
    }
}

/// Hash a domain for bucket lookup.
/// Lowercases and drops trailing dots so `Example.COM.` and `example.com` collide.
#[inline]
pub fn hash_domain(domain: &str) -> Hash64 {
    let trimmed = domain.trim_end_matches('.');
    if trimmed.bytes().any(|b| b.is_ascii_uppercase()) {
        hash64(trimmed.to_ascii_lowercase().as_bytes())
    } else {
        hash64(trimmed.as_bytes())
    }
}

/// Compute a 32-bit hash for a (lowercase) keyword token.
/// Never returns [`NO_KEYWORD`].
#[inline]
pub fn hash_token(token: &str) -> u32 {
    match murmur3_32(token.as_bytes(), SEED_TOKEN) {
        NO_KEYWORD => 1,
        h => h,
    }
}

/// Stable file-name key for a subscription URL.
pub fn cache_key(url: &str) -> String {
    format!("{:016x}", hash64(url.as_bytes()).to_u64())
}

/// CRC32 (IEEE 802.3) used to detect corrupted list cache files.
pub fn crc32(data: &[u8]) -> u32 {
    static CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut c = i as u32;
            let mut j = 0;
            while j < 8 {
                c = if c & 1 != 0 {
                    0xedb88320 ^ (c >> 1)
                } else {
                    c >> 1
                };
                j += 1;
            }
            table[i] = c;
            i += 1;
        }
        table
    };

    let mut crc = 0xffffffff_u32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    crc ^ 0xffffffff
}
