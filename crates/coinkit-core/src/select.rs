//! Largest-first, capped coin selection for UTXO chains.
//!
//! Candidates are sorted by descending value and the shortest prefix that
//! covers `target + fee` is taken. The prefix may never be longer than the
//! chain's input ceiling; when it would be, selection fails with
//! `TooManyInputs` and reports what the capped set could spend. Change below
//! the dust threshold is folded into the fee, so the returned fee is the
//! effective one and always satisfies
//! `sum(inputs) == target + change + fee`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BuildError;
use crate::fee::{FeeModel, TxShape};
use crate::types::{FeePriority, UnspentOutput};

/// Per-chain limits the selector enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    pub max_inputs: u32,
    pub dust_threshold: u128,
}

/// Result of a successful selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<UnspentOutput>,
    /// `None` when there is no change or it was dropped as dust.
    pub change: Option<u128>,
    /// Effective fee: `sum(inputs) - target - change`.
    pub fee: u128,
}

impl Selection {
    pub fn input_total(&self) -> u128 {
        self.inputs.iter().map(|u| u.amount).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CoinSelector {
    policy: SelectionPolicy,
}

impl CoinSelector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Select inputs paying `target` to `recipients` outputs.
    ///
    /// The fee is re-evaluated for every candidate input count, first
    /// assuming a change output and then without one.
    pub fn select(
        &self,
        utxos: &[UnspentOutput],
        target: u128,
        recipients: usize,
        fee_model: &dyn FeeModel,
        priority: FeePriority,
    ) -> Result<Selection, BuildError> {
        if target == 0 {
            return Err(BuildError::ZeroAmount);
        }

        let mut sorted: Vec<&UnspentOutput> = utxos.iter().collect();
        // Stable tie-break keeps selection deterministic for equal values.
        sorted.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then_with(|| a.outpoint_id.cmp(&b.outpoint_id))
                .then_with(|| a.output_index.cmp(&b.output_index))
        });

        let mut prefix_sum: u128 = 0;
        let mut found = None;
        for (index, utxo) in sorted.iter().enumerate() {
            prefix_sum = prefix_sum
                .checked_add(utxo.amount)
                .ok_or(BuildError::Overflow("summing inputs"))?;
            let count = index + 1;
            if let Some(outcome) =
                self.settle(prefix_sum, target, count, recipients, fee_model, priority)?
            {
                found = Some((count, outcome));
                break;
            }
        }

        let Some((count, (change, fee))) = found else {
            let fee = fee_model.fee_for(TxShape::new(sorted.len(), recipients + 1), priority)?;
            let required = target
                .checked_add(fee)
                .ok_or(BuildError::Overflow("adding fee to target"))?;
            return Err(BuildError::InsufficientFunds {
                shortfall: required.saturating_sub(prefix_sum),
            });
        };

        let max_inputs = self.policy.max_inputs as usize;
        if count > max_inputs {
            let max_spendable = sorted.iter().take(max_inputs).map(|u| u.amount).sum();
            debug!(
                required_inputs = count,
                max_inputs,
                max_spendable,
                "selection exceeds input cap"
            );
            return Err(BuildError::TooManyInputs {
                max_inputs: self.policy.max_inputs,
                max_spendable,
            });
        }

        let inputs: Vec<UnspentOutput> = sorted[..count].iter().map(|u| (*u).clone()).collect();
        debug!(
            inputs = inputs.len(),
            target,
            fee,
            change = change.unwrap_or(0),
            "selected inputs"
        );
        Ok(Selection {
            inputs,
            change,
            fee,
        })
    }

    /// Returns `(change, effective_fee)` if `total` covers the transfer.
    fn settle(
        &self,
        total: u128,
        target: u128,
        inputs: usize,
        recipients: usize,
        fee_model: &dyn FeeModel,
        priority: FeePriority,
    ) -> Result<Option<(Option<u128>, u128)>, BuildError> {
        let fee_with_change = fee_model.fee_for(TxShape::new(inputs, recipients + 1), priority)?;
        if let Some(change) = total
            .checked_sub(target)
            .and_then(|rest| rest.checked_sub(fee_with_change))
        {
            if change >= self.policy.dust_threshold && change > 0 {
                return Ok(Some((Some(change), fee_with_change)));
            }
            return Ok(Some((None, total - target)));
        }

        let fee_without_change = fee_model.fee_for(TxShape::new(inputs, recipients), priority)?;
        match total
            .checked_sub(target)
            .filter(|rest| *rest >= fee_without_change)
        {
            Some(rest) => Ok(Some((None, rest))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::{FeeQuote, MassFee, PerInputFee};
    use crate::test_util::utxo;

    fn selector(max_inputs: u32, dust_threshold: u128) -> CoinSelector {
        CoinSelector::new(SelectionPolicy {
            max_inputs,
            dust_threshold,
        })
    }

    fn scenario_utxos() -> Vec<UnspentOutput> {
        vec![utxo(1, 1000), utxo(2, 5000), utxo(3, 3000)]
    }

    #[test]
    fn selects_largest_first_with_change() {
        let selection = selector(10, 546)
            .select(
                &scenario_utxos(),
                6000,
                1,
                &PerInputFee::flat(500),
                FeePriority::Normal,
            )
            .expect("selection must succeed");

        let amounts: Vec<u128> = selection.inputs.iter().map(|u| u.amount).collect();
        assert_eq!(amounts, vec![5000, 3000]);
        assert_eq!(selection.change, Some(1500));
        assert_eq!(selection.fee, 500);
    }

    #[test]
    fn cap_rejection_reports_max_spendable() {
        let err = selector(1, 546)
            .select(
                &scenario_utxos(),
                6000,
                1,
                &PerInputFee::flat(500),
                FeePriority::Normal,
            )
            .expect_err("two inputs exceed the cap");
        assert_eq!(
            err,
            BuildError::TooManyInputs {
                max_inputs: 1,
                max_spendable: 5000
            }
        );
    }

    #[test]
    fn insufficient_funds_reports_shortfall() {
        let err = selector(10, 546)
            .select(
                &scenario_utxos(),
                9000,
                1,
                &PerInputFee::flat(500),
                FeePriority::Normal,
            )
            .expect_err("9000 + 500 exceeds 9000 available");
        assert_eq!(err, BuildError::InsufficientFunds { shortfall: 500 });
    }

    #[test]
    fn insufficient_funds_wins_over_cap() {
        let err = selector(1, 546)
            .select(
                &scenario_utxos(),
                20_000,
                1,
                &PerInputFee::flat(500),
                FeePriority::Normal,
            )
            .expect_err("not enough funds at all");
        assert!(matches!(err, BuildError::InsufficientFunds { .. }));
    }

    #[test]
    fn dust_change_is_folded_into_fee() {
        let selection = selector(10, 546)
            .select(
                &scenario_utxos(),
                7200,
                1,
                &PerInputFee::flat(500),
                FeePriority::Normal,
            )
            .expect("selection must succeed");
        // 8000 - 7200 - 500 = 300 < dust
        assert_eq!(selection.change, None);
        assert_eq!(selection.fee, 800);
        assert_eq!(selection.input_total(), 7200 + selection.fee);
    }

    #[test]
    fn exact_cover_without_change_output() {
        // With a per-input model, the no-change shape costs the same; 8000
        // covers 7500 + 500 exactly.
        let selection = selector(10, 1)
            .select(
                &scenario_utxos(),
                7500,
                1,
                &PerInputFee::flat(500),
                FeePriority::Normal,
            )
            .expect("selection must succeed");
        assert_eq!(selection.change, None);
        assert_eq!(selection.fee, 500);
    }

    #[test]
    fn no_change_shape_is_cheaper_for_mass_fees() {
        // One 10_000 input, rate 10 sat/vB: with change 141 vB (1410), without
        // change 110 vB (1100). Target 8800 only fits without change.
        let model = MassFee::p2wpkh(FeeQuote::Single(10));
        let selection = selector(10, 546)
            .select(&[utxo(7, 10_000)], 8800, 1, &model, FeePriority::Normal)
            .expect("fits without change output");
        assert_eq!(selection.change, None);
        assert_eq!(selection.fee, 1200);
    }

    #[test]
    fn zero_target_is_rejected() {
        let err = selector(10, 546)
            .select(
                &scenario_utxos(),
                0,
                1,
                &PerInputFee::flat(500),
                FeePriority::Normal,
            )
            .expect_err("zero amount");
        assert_eq!(err, BuildError::ZeroAmount);
    }

    #[test]
    fn empty_set_is_insufficient() {
        let err = selector(10, 546)
            .select(&[], 1, 1, &PerInputFee::flat(500), FeePriority::Normal)
            .expect_err("nothing to spend");
        assert_eq!(err, BuildError::InsufficientFunds { shortfall: 501 });
    }
}
