use crate::{H160, H256};

use super::Signature;

/// Proof that one validator signed a commitment: the signature itself plus
/// the validator's position and membership proof in the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorProof {
    /// The validator's signature over the commitment.
    pub signature: Signature,
    /// The validator's index within the set.
    pub index: u64,
    /// The validator's Ethereum address.
    pub account: H160,
    /// Merkle proof of the address against the set root.
    pub merkle_proof: Vec<H256>,
}

/// The MMR leaf a finalized commitment proves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MmrLeaf {
    /// Leaf format version.
    pub version: u8,
    /// Parent block number.
    pub parent_number: u32,
    /// Parent block hash.
    pub parent_hash: H256,
    /// Root over the parachain head commitments.
    pub parachain_heads_root: H256,
    /// Id of the next authority set.
    pub next_authority_set_id: u64,
    /// Size of the next authority set.
    pub next_authority_set_len: u32,
    /// Merkle root of the next authority set.
    pub next_authority_set_root: H256,
}

/// Proof of an MMR leaf against the committed root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MmrProof {
    /// Sibling digests, bottom up.
    pub items: Vec<H256>,
    /// Bitfield of sibling ordering at each level.
    pub order: u64,
}
