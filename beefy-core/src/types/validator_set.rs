use crate::H256;

/// Descriptor of a BEEFY validator set as mirrored from the light client:
/// its id, its size, and the merkle root of its validator addresses.
///
/// Immutable once attached to a commitment's proof context; replaced
/// wholesale when the contract confirms a rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    /// Monotonically increasing set id.
    pub id: u64,
    /// Number of validators in the set.
    pub length: u32,
    /// Merkle root over the validators' Ethereum addresses.
    pub root: H256,
}
