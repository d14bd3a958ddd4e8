//! Construction of the initial and final claim bitfields.

use beefy_core::{Bitfield, RelayError, RelayResult, H256};

/// Build the initial claim bitfield: exactly the candidate indices set.
/// Candidate order is irrelevant; the bitfield is a set.
pub fn build_initial(candidates: &[u32], validator_set_length: u32) -> RelayResult<Bitfield> {
    let mut bitfield = Bitfield::new(validator_set_length);
    for &index in candidates {
        if index >= validator_set_length {
            return Err(RelayError::IndexOutOfRange {
                index,
                length: validator_set_length,
            });
        }
        bitfield.set(index);
    }
    Ok(bitfield)
}

/// Build the final bitfield: the intersection of the initial claim with
/// the signers the contract recorded as confirmed. Never introduces a bit
/// absent from the prior bitfield, so confirmed indices outside it (or
/// beyond its capacity) are ignored rather than claimed.
pub fn build_final(
    commitment_hash: H256,
    prior: &Bitfield,
    confirmed: &[u32],
) -> RelayResult<Bitfield> {
    let mut confirmed_bits = Bitfield::new(prior.capacity());
    for &index in confirmed {
        if index < prior.capacity() {
            confirmed_bits.set(index);
        }
    }
    let result = prior.intersection(&confirmed_bits);
    if result.is_empty() {
        return Err(RelayError::EmptyFinalSet { commitment_hash });
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn initial_bitfield_is_exactly_the_candidate_set() {
        for length in [1u32, 5, 64, 257, 300] {
            let candidates: Vec<u32> = (0..length).step_by(3).collect();
            let bitfield = build_initial(&candidates, length).unwrap();
            assert_eq!(bitfield.count_set_bits() as usize, candidates.len());
            assert_eq!(bitfield.set_indices(), candidates);
        }
    }

    #[test]
    fn initial_bitfield_is_order_independent() {
        let forward = build_initial(&[1, 3, 4], 5).unwrap();
        let backward = build_initial(&[4, 3, 1], 5).unwrap();
        let duplicated = build_initial(&[3, 1, 4, 1, 3], 5).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward, duplicated);
    }

    #[test]
    fn out_of_range_candidate_is_rejected() {
        assert!(matches!(
            build_initial(&[1, 5], 5),
            Err(RelayError::IndexOutOfRange { index: 5, length: 5 })
        ));
    }

    #[test]
    fn final_bitfield_is_the_intersection() {
        let prior = build_initial(&[1, 3], 5).unwrap();
        let result = build_final(H256::zero(), &prior, &[1, 2, 3]).unwrap();
        assert_eq!(result.set_indices(), vec![1, 3]);
    }

    #[test]
    fn final_bitfield_never_adds_bits() {
        let prior = build_initial(&[0, 2, 4], 300).unwrap();
        let result = build_final(H256::zero(), &prior, &[0, 1, 2, 3, 4, 5, 299, 1000]).unwrap();
        for index in result.set_indices() {
            assert!(prior.is_set(index));
        }
        assert_eq!(result.set_indices(), vec![0, 2, 4]);
    }

    #[test]
    fn empty_intersection_means_no_quorum() {
        let prior = build_initial(&[1, 3], 5).unwrap();
        let hash = H256::repeat_byte(9);
        let err = build_final(hash, &prior, &[0, 2, 4]).unwrap_err();
        assert!(matches!(err, RelayError::EmptyFinalSet { commitment_hash } if commitment_hash == hash));
    }
}
