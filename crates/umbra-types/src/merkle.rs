//! Merkle trees over content hashes.

use crate::hash::blake2b_256_pair;
use crate::Hash256;

/// Root of the pairwise Merkle tree over `leaves`.
///
/// An odd node at any level is paired with itself. An empty leaf set
/// hashes to the zero root.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }
    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            next.push(blake2b_256_pair(left.as_bytes(), right.as_bytes()));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blake2b_256;

    #[test]
    fn test_empty_root_is_zero() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn test_single_leaf() {
        let leaf = blake2b_256(b"only");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn test_order_sensitive() {
        let a = blake2b_256(b"a");
        let b = blake2b_256(b"b");
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let a = blake2b_256(b"a");
        let b = blake2b_256(b"b");
        let c = blake2b_256(b"c");
        // [a, b, c] pairs as (a,b), (c,c)
        let ab = blake2b_256_pair(a.as_bytes(), b.as_bytes());
        let cc = blake2b_256_pair(c.as_bytes(), c.as_bytes());
        let expected = blake2b_256_pair(ab.as_bytes(), cc.as_bytes());
        assert_eq!(merkle_root(&[a, b, c]), expected);
    }
}
