//! Mirror of the light client's current and next validator sets.

use parking_lot::RwLock;

use beefy_core::{RelayError, RelayResult, ValidatorSet};

/// Which of the two tracked sets an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetSlot {
    /// The set currently signing commitments.
    Current,
    /// The set taking over at the next handoff.
    Next,
}

#[derive(Debug, Clone, Copy, Default)]
struct Sets {
    current: ValidatorSet,
    next: ValidatorSet,
}

/// Read-mostly cache of the contract's validator set descriptors. Set ids
/// must be non-decreasing: a regression means a rotation was missed and
/// the mirror needs a forced resync from the chain.
#[derive(Debug, Default)]
pub struct ValidatorSetTracker {
    sets: RwLock<Sets>,
}

impl ValidatorSetTracker {
    /// Seed the tracker from an authoritative read.
    pub fn new(current: ValidatorSet, next: ValidatorSet) -> Self {
        Self {
            sets: RwLock::new(Sets { current, next }),
        }
    }

    /// Replace one of the stored sets.
    pub fn update(&self, set: ValidatorSet, slot: SetSlot) -> RelayResult<()> {
        let mut sets = self.sets.write();
        let stored = match slot {
            SetSlot::Current => &mut sets.current,
            SetSlot::Next => &mut sets.next,
        };
        if set.id < stored.id {
            return Err(RelayError::StaleState(format!(
                "validator set id regressed from {} to {}, rotation missed",
                stored.id, set.id
            )));
        }
        *stored = set;
        Ok(())
    }

    /// A read-only snapshot of one of the stored sets.
    pub fn get(&self, slot: SetSlot) -> ValidatorSet {
        let sets = self.sets.read();
        match slot {
            SetSlot::Current => sets.current,
            SetSlot::Next => sets.next,
        }
    }

    /// The set a commitment with `validator_set_id` must be proven
    /// against: the current set when the ids match, the next set during a
    /// handoff, stale otherwise.
    pub fn set_for(&self, validator_set_id: u64) -> RelayResult<ValidatorSet> {
        let sets = self.sets.read();
        if validator_set_id == sets.current.id {
            Ok(sets.current)
        } else if validator_set_id == sets.next.id {
            Ok(sets.next)
        } else {
            Err(RelayError::StaleState(format!(
                "no tracked validator set with id {} (current {}, next {})",
                validator_set_id, sets.current.id, sets.next.id
            )))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use beefy_core::H256;

    fn set(id: u64, length: u32) -> ValidatorSet {
        ValidatorSet {
            id,
            length,
            root: H256::repeat_byte(id as u8),
        }
    }

    #[test]
    fn updates_replace_wholesale() {
        let tracker = ValidatorSetTracker::new(set(5, 10), set(6, 10));
        tracker.update(set(6, 12), SetSlot::Current).unwrap();
        tracker.update(set(7, 12), SetSlot::Next).unwrap();
        assert_eq!(tracker.get(SetSlot::Current), set(6, 12));
        assert_eq!(tracker.get(SetSlot::Next), set(7, 12));
    }

    #[test]
    fn id_regression_is_stale_state() {
        let tracker = ValidatorSetTracker::new(set(5, 10), set(6, 10));
        let err = tracker.update(set(4, 10), SetSlot::Current).unwrap_err();
        assert!(matches!(err, RelayError::StaleState(_)));
        // the stored set is untouched
        assert_eq!(tracker.get(SetSlot::Current), set(5, 10));
    }

    #[test]
    fn proof_context_picks_by_id() {
        let tracker = ValidatorSetTracker::new(set(5, 10), set(6, 14));
        assert_eq!(tracker.set_for(5).unwrap(), set(5, 10));
        assert_eq!(tracker.set_for(6).unwrap(), set(6, 14));
        assert!(matches!(tracker.set_for(7), Err(RelayError::StaleState(_))));
    }
}
