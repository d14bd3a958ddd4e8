use std::fmt;

use crate::U256;

/// Bits per bitfield word, matching the contract's `uint256[]` layout.
pub const WORD_BITS: u32 = 256;

/// A bit-per-validator claim set. Bit `i` set means validator `i` is
/// claimed as a signer of the commitment in question. Bits are packed
/// little-endian within each 256-bit word: index `i` lives at bit
/// `i % 256` of word `i / 256`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bitfield {
    words: Vec<U256>,
    capacity: u32,
}

impl Bitfield {
    /// An all-zero bitfield able to address `capacity` validator indices.
    pub fn new(capacity: u32) -> Self {
        let words = capacity.div_ceil(WORD_BITS) as usize;
        Self {
            words: vec![U256::zero(); words],
            capacity,
        }
    }

    /// Number of addressable bits.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The raw words, lowest indices first, as sent on the wire.
    pub fn words(&self) -> &[U256] {
        &self.words
    }

    /// Set bit `index`.
    ///
    /// Panics if `index` is beyond the capacity; callers are expected to
    /// range-check against the validator set length first.
    pub fn set(&mut self, index: u32) {
        assert!(index < self.capacity, "bit index beyond bitfield capacity");
        let word = (index / WORD_BITS) as usize;
        self.words[word] = self.words[word] | (U256::one() << (index % WORD_BITS));
    }

    /// Whether bit `index` is set. Out-of-range indices read as unset.
    pub fn is_set(&self, index: u32) -> bool {
        if index >= self.capacity {
            return false;
        }
        self.words[(index / WORD_BITS) as usize].bit((index % WORD_BITS) as usize)
    }

    /// Number of set bits.
    pub fn count_set_bits(&self) -> u32 {
        self.words
            .iter()
            .map(|word| word.0.iter().map(|limb| limb.count_ones()).sum::<u32>())
            .sum()
    }

    /// All set indices, ascending.
    pub fn set_indices(&self) -> Vec<u32> {
        (0..self.capacity).filter(|&i| self.is_set(i)).collect()
    }

    /// True when no bit is set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| word.is_zero())
    }

    /// Bitwise AND of two claim sets. The result keeps `self`'s capacity.
    pub fn intersection(&self, other: &Bitfield) -> Bitfield {
        let words = self
            .words
            .iter()
            .enumerate()
            .map(|(i, word)| *word & other.words.get(i).copied().unwrap_or_default())
            .collect();
        Bitfield {
            words,
            capacity: self.capacity,
        }
    }
}

impl fmt::Debug for Bitfield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bitfield {{ capacity: {}, set: {:?} }}",
            self.capacity,
            self.set_indices()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_and_read_across_word_boundary() {
        let mut bitfield = Bitfield::new(300);
        for index in [0, 1, 255, 256, 299] {
            bitfield.set(index);
        }
        assert_eq!(bitfield.words().len(), 2);
        assert_eq!(bitfield.set_indices(), vec![0, 1, 255, 256, 299]);
        assert_eq!(bitfield.count_set_bits(), 5);
        assert!(!bitfield.is_set(2));
        assert!(!bitfield.is_set(1000));
    }

    #[test]
    #[should_panic(expected = "beyond bitfield capacity")]
    fn setting_out_of_range_panics() {
        Bitfield::new(10).set(10);
    }

    #[test]
    fn intersection_never_adds_bits() {
        let mut a = Bitfield::new(64);
        a.set(1);
        a.set(3);
        let mut b = Bitfield::new(64);
        b.set(1);
        b.set(2);
        b.set(3);
        let both = a.intersection(&b);
        assert_eq!(both.set_indices(), vec![1, 3]);
        assert!(a.intersection(&Bitfield::new(64)).is_empty());
    }

    #[test]
    fn empty_bitfield_reports_empty() {
        assert!(Bitfield::new(0).is_empty());
        assert!(Bitfield::new(512).is_empty());
    }
}
