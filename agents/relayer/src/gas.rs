//! Gas credit and tip accounting.
//!
//! All amounts are 256-bit: the mirrored contract runs full-width EVM
//! arithmetic, and refund caps near the top of the range must not
//! truncate. Accumulation saturates rather than wraps.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use beefy_core::{RelayError, RelayResult, H160, H256, U256};

/// The refund caps mirrored from the contract constructor.
#[derive(Debug, Clone, Copy)]
pub struct GasCaps {
    /// Gas price cap applied per credit.
    pub max_gas_price: U256,
    /// Upper bound on a single relayer claim.
    pub max_refund_amount: U256,
}

#[derive(Debug, Default)]
struct Ledger {
    per_commitment: HashMap<H256, U256>,
    claimable: HashMap<H160, U256>,
    tips: BTreeMap<u64, U256>,
    finalized_up_to: u64,
}

/// Tracks credited gas per commitment hash and claimable refunds and tips
/// per relayer. Reads are concurrent; updates take the single writer lock.
#[derive(Debug)]
pub struct GasAccountant {
    caps: GasCaps,
    ledger: RwLock<Ledger>,
}

impl GasAccountant {
    /// A fresh ledger under the given caps.
    pub fn new(caps: GasCaps) -> Self {
        Self {
            caps,
            ledger: RwLock::new(Ledger::default()),
        }
    }

    /// Credit `relayer` for `gas_used` at `gas_price` against a
    /// commitment: `min(gas_used * min(gas_price, max_gas_price),
    /// max_refund_amount)`. Returns the credited amount.
    pub fn credit(
        &self,
        commitment_hash: H256,
        relayer: H160,
        gas_used: U256,
        gas_price: U256,
    ) -> U256 {
        let effective_price = gas_price.min(self.caps.max_gas_price);
        let credited = gas_used
            .checked_mul(effective_price)
            .unwrap_or_else(U256::max_value)
            .min(self.caps.max_refund_amount);

        let mut ledger = self.ledger.write();
        let commitment_total = ledger.per_commitment.entry(commitment_hash).or_default();
        *commitment_total = commitment_total
            .checked_add(credited)
            .unwrap_or_else(U256::max_value);
        let claimable = ledger.claimable.entry(relayer).or_default();
        *claimable = claimable
            .checked_add(credited)
            .unwrap_or_else(U256::max_value)
            .min(self.caps.max_refund_amount);
        credited
    }

    /// Gas credited so far against a commitment.
    pub fn credited_gas(&self, commitment_hash: H256) -> U256 {
        self.ledger
            .read()
            .per_commitment
            .get(&commitment_hash)
            .copied()
            .unwrap_or_default()
    }

    /// The relayer's claimable total without claiming it.
    pub fn claimable(&self, relayer: H160) -> U256 {
        self.ledger
            .read()
            .claimable
            .get(&relayer)
            .copied()
            .unwrap_or_default()
    }

    /// Return and zero the relayer's claimable total.
    pub fn claim(&self, relayer: H160) -> RelayResult<U256> {
        let mut ledger = self.ledger.write();
        let amount = ledger.claimable.remove(&relayer).unwrap_or_default();
        if amount.is_zero() {
            return Err(RelayError::NothingToClaim);
        }
        Ok(amount)
    }

    /// Fold in a tip attached to a beefy block.
    pub fn record_tip(&self, beefy_block: u64, amount: U256) {
        let mut ledger = self.ledger.write();
        let total = ledger.tips.entry(beefy_block).or_default();
        *total = total.checked_add(amount).unwrap_or_else(U256::max_value);
    }

    /// The tip accumulated for a beefy block.
    pub fn tip(&self, beefy_block: u64) -> U256 {
        self.ledger
            .read()
            .tips
            .get(&beefy_block)
            .copied()
            .unwrap_or_default()
    }

    /// Record that commitments up to `beefy_block` are finalized, which
    /// makes their tips claimable.
    pub fn mark_finalized(&self, beefy_block: u64) {
        let mut ledger = self.ledger.write();
        ledger.finalized_up_to = ledger.finalized_up_to.max(beefy_block);
    }

    /// Tip blocks that can be claimed: tipped, and at or below the
    /// finalized watermark.
    pub fn claimable_tip_blocks(&self) -> Vec<u64> {
        let ledger = self.ledger.read();
        ledger
            .tips
            .range(..=ledger.finalized_up_to)
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(block, _)| *block)
            .collect()
    }

    /// Drop tips that were claimed on chain.
    pub fn settle_tips(&self, blocks: &[u64]) {
        let mut ledger = self.ledger.write();
        for block in blocks {
            ledger.tips.remove(block);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn caps() -> GasCaps {
        GasCaps {
            max_gas_price: U256::from(40u64),
            max_refund_amount: U256::from(3_000_000u64),
        }
    }

    fn hash(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    fn relayer() -> H160 {
        H160::repeat_byte(1)
    }

    #[test]
    fn credit_caps_price_then_amount() {
        let gas = GasAccountant::new(caps());
        // gas price above the cap: 100000 * 40 = 4_000_000, capped to 3_000_000
        let credited = gas.credit(hash(1), relayer(), U256::from(100_000u64), U256::from(50u64));
        assert_eq!(credited, U256::from(3_000_000u64));
        assert_eq!(gas.credited_gas(hash(1)), U256::from(3_000_000u64));
    }

    #[test]
    fn credits_accumulate_monotonically_per_commitment() {
        let gas = GasAccountant::new(caps());
        let mut expected = U256::zero();
        for _ in 0..4 {
            expected = expected + gas.credit(hash(1), relayer(), U256::from(10_000u64), U256::from(30u64));
            assert_eq!(gas.credited_gas(hash(1)), expected);
        }
        assert_eq!(expected, U256::from(4 * 10_000 * 30u64));
        // an untouched commitment stays at zero
        assert!(gas.credited_gas(hash(2)).is_zero());
    }

    #[test]
    fn relayer_claim_never_exceeds_the_refund_cap() {
        let gas = GasAccountant::new(caps());
        for _ in 0..10 {
            gas.credit(hash(1), relayer(), U256::from(100_000u64), U256::from(40u64));
        }
        assert_eq!(gas.claim(relayer()).unwrap(), U256::from(3_000_000u64));
    }

    #[test]
    fn claim_zeroes_and_then_fails() {
        let gas = GasAccountant::new(caps());
        gas.credit(hash(1), relayer(), U256::from(100u64), U256::from(1u64));
        assert_eq!(gas.claim(relayer()).unwrap(), U256::from(100u64));
        assert!(matches!(gas.claim(relayer()), Err(RelayError::NothingToClaim)));
        assert!(gas.claimable(relayer()).is_zero());
    }

    #[test]
    fn multiplication_overflow_saturates_instead_of_wrapping() {
        let gas = GasAccountant::new(GasCaps {
            max_gas_price: U256::max_value(),
            max_refund_amount: U256::max_value(),
        });
        let credited = gas.credit(hash(1), relayer(), U256::max_value(), U256::from(2u64));
        assert_eq!(credited, U256::max_value());
        // a further credit must not wrap the accumulated total
        gas.credit(hash(1), relayer(), U256::from(1u64), U256::from(1u64));
        assert_eq!(gas.credited_gas(hash(1)), U256::max_value());
    }

    #[test]
    fn tips_become_claimable_only_after_finalization() {
        let gas = GasAccountant::new(caps());
        gas.record_tip(100, U256::from(7u64));
        gas.record_tip(200, U256::from(9u64));
        assert!(gas.claimable_tip_blocks().is_empty());

        gas.mark_finalized(150);
        assert_eq!(gas.claimable_tip_blocks(), vec![100]);
        assert_eq!(gas.tip(100), U256::from(7u64));

        gas.settle_tips(&[100]);
        assert!(gas.claimable_tip_blocks().is_empty());
        assert!(gas.tip(100).is_zero());
    }
}
