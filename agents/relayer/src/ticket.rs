//! Per-relayer single-flight tickets.

use std::collections::HashMap;

use parking_lot::RwLock;

use beefy_core::{RelayError, RelayResult, Ticket, H160, H256};

/// Tracks the relayer's exclusivity tokens: at most one live ticket per
/// relayer identity at any time. The ticket is the mutual-exclusion token
/// for a commitment lifecycle, so no two lifecycles for the same relayer
/// can be in flight concurrently.
#[derive(Debug, Default)]
pub struct TicketManager {
    active: RwLock<HashMap<H160, Ticket>>,
}

impl TicketManager {
    /// Open a ticket for `relayer` on `commitment_hash`.
    pub fn acquire(&self, relayer: H160, commitment_hash: H256) -> RelayResult<Ticket> {
        let mut active = self.active.write();
        if let Some(existing) = active.get(&relayer) {
            return Err(RelayError::TicketAlreadyActive(existing.commitment_hash));
        }
        let ticket = Ticket {
            owner: relayer,
            commitment_hash,
        };
        active.insert(relayer, ticket);
        Ok(ticket)
    }

    /// Release `relayer`'s ticket. Idempotent.
    pub fn clear(&self, relayer: H160) {
        self.active.write().remove(&relayer);
    }

    /// The owner of the ticket on `commitment_hash`, if any.
    pub fn owner_of(&self, commitment_hash: H256) -> Option<H160> {
        self.active
            .read()
            .values()
            .find(|ticket| ticket.commitment_hash == commitment_hash)
            .map(|ticket| ticket.owner)
    }

    /// `relayer`'s live ticket, if any.
    pub fn active(&self, relayer: H160) -> Option<Ticket> {
        self.active.read().get(&relayer).copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hash(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn second_acquire_without_clear_fails() {
        let tickets = TicketManager::default();
        let relayer = H160::repeat_byte(1);

        tickets.acquire(relayer, hash(1)).unwrap();
        let err = tickets.acquire(relayer, hash(2)).unwrap_err();
        assert!(matches!(err, RelayError::TicketAlreadyActive(held) if held == hash(1)));

        tickets.clear(relayer);
        tickets.acquire(relayer, hash(2)).unwrap();
    }

    #[test]
    fn clear_is_idempotent() {
        let tickets = TicketManager::default();
        let relayer = H160::repeat_byte(1);
        tickets.clear(relayer);
        tickets.acquire(relayer, hash(1)).unwrap();
        tickets.clear(relayer);
        tickets.clear(relayer);
        assert_eq!(tickets.active(relayer), None);
    }

    #[test]
    fn tickets_are_looked_up_by_commitment() {
        let tickets = TicketManager::default();
        let a = H160::repeat_byte(1);
        let b = H160::repeat_byte(2);
        tickets.acquire(a, hash(1)).unwrap();
        tickets.acquire(b, hash(2)).unwrap();

        assert_eq!(tickets.owner_of(hash(1)), Some(a));
        assert_eq!(tickets.owner_of(hash(2)), Some(b));
        assert_eq!(tickets.owner_of(hash(3)), None);
    }
}
