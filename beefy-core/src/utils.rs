//! Small hashing and formatting helpers shared across the workspace.

use tiny_keccak::{Hasher, Keccak};

use crate::H256;

/// Compute the keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    H256(output)
}

/// Shortened hex rendering of a digest for log fields.
pub fn fmt_digest(digest: &H256) -> String {
    let hex = hex::encode(digest.as_bytes());
    format!("0x{}…{}", &hex[..6], &hex[hex.len() - 6..])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keccak_empty_input() {
        // keccak256("") is a well-known constant
        assert_eq!(
            hex::encode(keccak256(&[]).as_bytes()),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn digest_formatting_is_abbreviated() {
        let d = keccak256(b"abc");
        let s = fmt_digest(&d);
        assert!(s.starts_with("0x"));
        assert!(s.contains('…'));
    }
}
