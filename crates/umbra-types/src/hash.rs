//! 256-bit content hashes.

use blake2::{digest::consts::U32, Blake2b, Digest};
use std::fmt;
use std::str::FromStr;

type Blake2b256 = Blake2b<U32>;

/// A 256-bit hash. Used for transaction ids, block hashes and key images.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero hash.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Whether this is the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build from a byte slice; returns `None` unless exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Hash256(arr))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", hex::encode(self.0))
    }
}

impl FromStr for Hash256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Hash256::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Blake2b-256 of the given bytes.
pub fn blake2b_256(data: &[u8]) -> Hash256 {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    Hash256(hasher.finalize().into())
}

/// Blake2b-256 over the concatenation of two byte slices.
pub(crate) fn blake2b_256_pair(a: &[u8], b: &[u8]) -> Hash256 {
    let mut hasher = Blake2b256::new();
    hasher.update(a);
    hasher.update(b);
    Hash256(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_roundtrip_hex() {
        let h = blake2b_256(b"umbra");
        let parsed: Hash256 = h.to_string().parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn test_zero_hash() {
        assert!(Hash256::ZERO.is_zero());
        assert!(!blake2b_256(b"x").is_zero());
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(blake2b_256(b"a"), blake2b_256(b"a"));
        assert_ne!(blake2b_256(b"a"), blake2b_256(b"b"));
    }
}
