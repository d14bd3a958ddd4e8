//! Turn rotation: who is entitled to submit next.

use beefy_core::{RelayError, RelayResult, H160};

/// Mirror of the contract's relayer roster and rotation index.
///
/// Invariant: `current_turn_index < roster.len()` whenever the roster is
/// non-empty; an empty roster has no current relayer and cannot advance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnState {
    /// Index into the roster of the relayer whose turn it is.
    pub current_turn_index: u64,
    /// The relayer roster, in turn order.
    pub roster: Vec<H160>,
}

impl TurnState {
    /// The relayer whose turn it is, if the roster has one at the index.
    pub fn current_relayer(&self) -> Option<H160> {
        self.roster.get(self.current_turn_index as usize).copied()
    }

    /// Overwrite the rotation index from an authoritative observation.
    pub fn set_index(&mut self, index: u64) {
        self.current_turn_index = index;
    }

    /// Fold in a roster addition.
    pub fn apply_added(&mut self, relayer: H160) {
        if !self.roster.contains(&relayer) {
            self.roster.push(relayer);
        }
    }

    /// Fold in a roster removal, re-wrapping the index if it fell off the
    /// end of the shortened roster.
    pub fn apply_removed(&mut self, relayer: H160) {
        self.roster.retain(|entry| *entry != relayer);
        if !self.roster.is_empty() && self.current_turn_index as usize >= self.roster.len() {
            self.current_turn_index %= self.roster.len() as u64;
        }
    }
}

/// One pure rotation step: the same roster with the index advanced by one,
/// wrapping at the roster length.
pub fn advance(state: &TurnState) -> RelayResult<TurnState> {
    if state.roster.is_empty() {
        return Err(RelayError::InvalidState("cannot advance an empty roster"));
    }
    Ok(TurnState {
        current_turn_index: (state.current_turn_index + 1) % state.roster.len() as u64,
        roster: state.roster.clone(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr(byte: u8) -> H160 {
        H160::repeat_byte(byte)
    }

    fn abc() -> TurnState {
        TurnState {
            current_turn_index: 1,
            roster: vec![addr(0xa), addr(0xb), addr(0xc)],
        }
    }

    #[test]
    fn rotation_walks_the_roster_and_wraps() {
        let state = abc();
        assert_eq!(state.current_relayer(), Some(addr(0xb)));

        let state = advance(&state).unwrap();
        assert_eq!(state.current_turn_index, 2);
        assert_eq!(state.current_relayer(), Some(addr(0xc)));

        let state = advance(&state).unwrap();
        assert_eq!(state.current_turn_index, 0);
        assert_eq!(state.current_relayer(), Some(addr(0xa)));
    }

    #[test]
    fn advancing_roster_length_times_returns_to_start() {
        let original = abc();
        let mut state = original.clone();
        for _ in 0..original.roster.len() {
            state = advance(&state).unwrap();
        }
        assert_eq!(state.current_turn_index, original.current_turn_index);
    }

    #[test]
    fn empty_roster_blocks() {
        let state = TurnState::default();
        assert_eq!(state.current_relayer(), None);
        assert!(matches!(
            advance(&state),
            Err(RelayError::InvalidState(_))
        ));
    }

    #[test]
    fn removal_rewraps_the_index() {
        let mut state = TurnState {
            current_turn_index: 2,
            roster: vec![addr(0xa), addr(0xb), addr(0xc)],
        };
        state.apply_removed(addr(0xc));
        assert_eq!(state.roster.len(), 2);
        assert!(state.current_relayer().is_some());

        state.apply_added(addr(0xc));
        state.apply_added(addr(0xc));
        assert_eq!(state.roster.len(), 3);
    }
}
