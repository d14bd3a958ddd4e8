//! Keccak-256 binary merkle tree over validator addresses.
//!
//! Pairs are hashed in sorted order, so proofs carry no position bits; an
//! odd node at any level is promoted unchanged to the level above.

use crate::utils::keccak256;
use crate::{RelayError, RelayResult, H256};

fn combine(a: H256, b: H256) -> H256 {
    let mut buf = [0u8; 64];
    if a.as_bytes() <= b.as_bytes() {
        buf[..32].copy_from_slice(a.as_bytes());
        buf[32..].copy_from_slice(b.as_bytes());
    } else {
        buf[..32].copy_from_slice(b.as_bytes());
        buf[32..].copy_from_slice(a.as_bytes());
    }
    keccak256(&buf)
}

fn leaf_hashes<L: AsRef<[u8]>>(leaves: &[L]) -> RelayResult<Vec<H256>> {
    if leaves.is_empty() {
        return Err(RelayError::InvalidState(
            "cannot build a merkle tree with no leaves",
        ));
    }
    Ok(leaves.iter().map(|leaf| keccak256(leaf.as_ref())).collect())
}

fn next_level(level: &[H256]) -> Vec<H256> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => combine(*left, *right),
            [single] => *single,
            _ => unreachable!(),
        })
        .collect()
}

/// Root over the given leaves.
pub fn merkle_root<L: AsRef<[u8]>>(leaves: &[L]) -> RelayResult<H256> {
    let mut level = leaf_hashes(leaves)?;
    while level.len() > 1 {
        level = next_level(&level);
    }
    Ok(level[0])
}

/// Membership proof for the leaf at `index`: the sibling digests from the
/// leaf level up, skipping levels where the node stood alone.
pub fn merkle_proof<L: AsRef<[u8]>>(leaves: &[L], index: usize) -> RelayResult<Vec<H256>> {
    let mut level = leaf_hashes(leaves)?;
    if index >= level.len() {
        return Err(RelayError::IndexOutOfRange {
            index: index as u32,
            length: level.len() as u32,
        });
    }

    let mut proof = vec![];
    let mut position = index;
    while level.len() > 1 {
        let sibling = position ^ 1;
        if sibling < level.len() {
            proof.push(level[sibling]);
        }
        position /= 2;
        level = next_level(&level);
    }
    Ok(proof)
}

/// Check a proof produced by [`merkle_proof`] against a root.
pub fn verify_proof(root: H256, leaf: &[u8], proof: &[H256]) -> bool {
    let computed = proof
        .iter()
        .fold(keccak256(leaf), |acc, sibling| combine(acc, *sibling));
    computed == root
}

#[cfg(test)]
mod test {
    use super::*;

    fn addresses(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i as u8 + 1; 20]).collect()
    }

    #[test]
    fn empty_tree_is_an_error() {
        assert!(merkle_root(&Vec::<Vec<u8>>::new()).is_err());
    }

    #[test]
    fn single_leaf_root_is_the_leaf_hash() {
        let leaves = addresses(1);
        assert_eq!(merkle_root(&leaves).unwrap(), keccak256(&leaves[0]));
        assert!(merkle_proof(&leaves, 0).unwrap().is_empty());
    }

    #[test]
    fn proof_index_is_range_checked() {
        let leaves = addresses(4);
        assert!(matches!(
            merkle_proof(&leaves, 4),
            Err(RelayError::IndexOutOfRange { index: 4, length: 4 })
        ));
    }

    #[test]
    fn every_leaf_proves_against_the_root() {
        for n in 1..=8 {
            let leaves = addresses(n);
            let root = merkle_root(&leaves).unwrap();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = merkle_proof(&leaves, i).unwrap();
                assert!(verify_proof(root, leaf, &proof), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn foreign_leaf_does_not_verify() {
        let leaves = addresses(5);
        let root = merkle_root(&leaves).unwrap();
        let proof = merkle_proof(&leaves, 2).unwrap();
        assert!(!verify_proof(root, &[0xff; 20], &proof));
    }
}
