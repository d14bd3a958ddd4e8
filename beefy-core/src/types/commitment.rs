use std::io::{self, Write};

use crate::utils::keccak256;
use crate::{RelayError, RelayResult, H160, H256};

use super::{write_compact_u32, Encode, MmrLeaf, MmrProof, Signature};

/// The payload id under which BEEFY commitments carry the MMR root.
pub const MMR_ROOT_PAYLOAD_ID: [u8; 2] = *b"mh";

/// A single tagged entry in a commitment payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadItem {
    /// Two-byte payload tag.
    pub id: [u8; 2],
    /// Raw payload bytes.
    pub data: Vec<u8>,
}

impl Encode for PayloadItem {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(&self.id)?;
        let prefix = write_compact_u32(writer, self.data.len() as u32)?;
        writer.write_all(&self.data)?;
        Ok(2 + prefix + self.data.len())
    }
}

/// A BEEFY commitment: a block-range summary signed by a validator set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    /// Relay-chain block the commitment finalizes up to.
    pub block_number: u32,
    /// Id of the validator set that signed the commitment.
    pub validator_set_id: u64,
    /// Ordered payload items.
    pub payload: Vec<PayloadItem>,
}

/// The partially pre-encoded payload handed to the final submission: the
/// MMR root plus the raw bytes surrounding it, so the contract can splice
/// the root back in without a full decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSplit {
    /// The MMR root extracted from the payload.
    pub mmr_root: H256,
    /// Encoded payload bytes before the root.
    pub prefix: Vec<u8>,
    /// Encoded payload bytes after the root.
    pub suffix: Vec<u8>,
}

impl Encode for Commitment {
    // SCALE field order: payload, then block number, then set id.
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut written = write_compact_u32(writer, self.payload.len() as u32)?;
        for item in &self.payload {
            written += item.write_to(writer)?;
        }
        writer.write_all(&self.block_number.to_le_bytes())?;
        writer.write_all(&self.validator_set_id.to_le_bytes())?;
        Ok(written + 4 + 8)
    }
}

impl Commitment {
    /// Keccak-256 hash of the canonical encoding; the identifier the
    /// contract keys tickets and gas credits by.
    pub fn hash(&self) -> H256 {
        keccak256(&self.to_vec())
    }

    /// Extract the MMR root payload item.
    pub fn mmr_root(&self) -> RelayResult<H256> {
        let item = self
            .payload
            .iter()
            .find(|item| item.id == MMR_ROOT_PAYLOAD_ID)
            .ok_or(RelayError::InvalidState("commitment payload has no mmr root"))?;
        if item.data.len() != 32 {
            return Err(RelayError::InvalidState("mmr root payload is not 32 bytes"));
        }
        Ok(H256::from_slice(&item.data))
    }

    /// Split the encoded payload around the MMR root.
    ///
    /// Fails if the root bytes occur more than once in the encoding, since
    /// the split would then be ambiguous.
    pub fn split_payload(&self) -> RelayResult<PayloadSplit> {
        let mmr_root = self.mmr_root()?;

        let mut encoded = vec![];
        write_compact_u32(&mut encoded, self.payload.len() as u32).expect("!write");
        for item in &self.payload {
            item.write_to(&mut encoded).expect("!write");
        }

        let needle = mmr_root.as_bytes();
        let mut positions = (0..=encoded.len().saturating_sub(needle.len()))
            .filter(|&i| &encoded[i..i + needle.len()] == needle);
        let at = positions
            .next()
            .ok_or(RelayError::InvalidState("mmr root not present in encoded payload"))?;
        if positions.next().is_some() {
            return Err(RelayError::InvalidState("mmr root occurs twice in payload"));
        }

        Ok(PayloadSplit {
            mmr_root,
            prefix: encoded[..at].to_vec(),
            suffix: encoded[at + needle.len()..].to_vec(),
        })
    }
}

/// A commitment together with the validator signatures gathered for it.
/// Signatures are positional: entry `i` belongs to validator `i`, `None`
/// where the validator did not sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCommitment {
    /// The commitment that was signed.
    pub commitment: Commitment,
    /// Positional signatures.
    pub signatures: Vec<Option<Signature>>,
}

impl SignedCommitment {
    /// Indices of the validators that signed, ascending.
    pub fn signed_indices(&self) -> Vec<u32> {
        self.signatures
            .iter()
            .enumerate()
            .filter_map(|(i, sig)| sig.map(|_| i as u32))
            .collect()
    }
}

/// Everything the consensus source hands over per relayable commitment:
/// the signed commitment, the addresses of the signing validator set, and
/// the MMR leaf/proof anchoring it.
#[derive(Debug, Clone)]
pub struct CommitmentTask {
    /// The signed commitment to relay.
    pub signed_commitment: SignedCommitment,
    /// Ethereum addresses of the validator set, in set order.
    pub validators: Vec<H160>,
    /// The MMR leaf proven by the commitment.
    pub leaf: MmrLeaf,
    /// Proof of the leaf against the committed MMR root.
    pub leaf_proof: MmrProof,
}

impl CommitmentTask {
    /// Hash of the underlying commitment.
    pub fn commitment_hash(&self) -> H256 {
        self.signed_commitment.commitment.hash()
    }
}
