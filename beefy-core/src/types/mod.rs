use std::fmt;
use std::io::{self, Write};

pub use primitive_types::{H160, H256, U256};

pub use bitfield::*;
pub use commitment::*;
pub use events::*;
pub use proof::*;
pub use ticket::*;
pub use validator_set::*;

mod bitfield;
mod commitment;
mod events;
mod proof;
mod ticket;
mod validator_set;

/// Canonical byte serialization for types hashed or shipped to the chain.
pub trait Encode {
    /// Write the canonical encoding to the writer, returning the number of
    /// bytes written.
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize>;

    /// Serialize to an owned byte vector.
    fn to_vec(&self) -> Vec<u8> {
        let mut buf = vec![];
        self.write_to(&mut buf).expect("!write");
        buf
    }
}

/// SCALE compact encoding of a `u32`, used as the length prefix of
/// variable-length sequences in commitment payloads.
pub(crate) fn write_compact_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<usize> {
    match value {
        0..=0x3f => {
            writer.write_all(&[(value as u8) << 2])?;
            Ok(1)
        }
        0x40..=0x3fff => {
            writer.write_all(&(((value as u16) << 2) | 0b01).to_le_bytes())?;
            Ok(2)
        }
        0x4000..=0x3fff_ffff => {
            writer.write_all(&((value << 2) | 0b10).to_le_bytes())?;
            Ok(4)
        }
        _ => {
            writer.write_all(&[0b11])?;
            writer.write_all(&value.to_le_bytes())?;
            Ok(5)
        }
    }
}

/// An ECDSA signature over a commitment, in Ethereum `(v, r, s)` form.
///
/// BEEFY validators sign with recovery ids 0/1; the contract expects the
/// Ethereum convention of 27/28, so construction from raw consensus bytes
/// normalizes `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// R component.
    pub r: H256,
    /// S component.
    pub s: H256,
    /// Recovery id, Ethereum convention (27 or 28).
    pub v: u8,
}

impl Signature {
    /// Build a signature from the 65 raw bytes produced by a BEEFY
    /// validator, adding 27 to the recovery id.
    pub fn from_beefy_bytes(raw: [u8; 65]) -> Self {
        Self {
            r: H256::from_slice(&raw[..32]),
            s: H256::from_slice(&raw[32..64]),
            v: raw[64].wrapping_add(27),
        }
    }
}

impl From<&Signature> for [u8; 65] {
    fn from(src: &Signature) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(src.r.as_bytes());
        out[32..64].copy_from_slice(src.s.as_bytes());
        out[64] = src.v;
        out
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = <[u8; 65]>::from(self);
        write!(f, "{}", hex::encode(raw))
    }
}
