//! Coin selection, fee calculation, and templating over a partial
//! transaction (spec §4.2). Grounded on the teacher's `transaction_builder`
//! module: `Builder`/`FundedTransaction` here play the role the teacher's
//! `TransactionBuilderState`/`EstimateFeesState` play, generalized from a
//! balance-based confidential-asset model to UTXO coin selection over
//! `Credit`s.

use crate::{
    coin::{Account, Address, Credit, OutPoint},
    config::{DUST_THRESHOLD, MAX_ANCESTORS, MAX_FEE, MAX_TX_SIGOPS, MAX_TX_WEIGHT},
    covenant::Covenant,
    error::CoinError,
    lock_manager::LockManager,
    serializer::Serializer,
};
use rand::seq::SliceRandom;

/// Rough fixed weight contribution of a single input/output, used to
/// estimate transaction weight and fee before signing. A concrete consensus
/// implementation weighs witness data separately; this engine only needs a
/// conservative, deterministic estimate to enforce the spec's budget
/// invariants ahead of the real signer filling in signatures.
const BASE_TX_WEIGHT: u64 = 168;
const INPUT_WEIGHT: u64 = 292;
const OUTPUT_BASE_WEIGHT: u64 = 128;
const SIGOPS_PER_INPUT: usize = 1;

#[derive(Debug, Clone)]
pub struct UnsignedOutput {
    pub value: u64,
    pub covenant: Covenant,
    pub address: Address,
}

impl UnsignedOutput {
    fn weight(&self) -> u64 {
        OUTPUT_BASE_WEIGHT + self.covenant.to_bytes().len() as u64
    }

    fn is_dust(&self) -> bool {
        !self.covenant.is_dust_exempt() && self.value < DUST_THRESHOLD
    }
}

/// An unfunded builder as produced by `NameEngine`: a set of required
/// outputs and, for some actions (REVEAL, REDEEM, UPDATE, RENEW, TRANSFER,
/// FINALIZE, REVOKE), the specific input(s) the action must spend.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    pub pre_added_inputs: Vec<Credit>,
    pub outputs: Vec<UnsignedOutput>,
    /// Set by `NameEngine` for actions that must not acquire a funding
    /// input beyond the pre-added one (spec §4.2, auction-in-advance
    /// REVEAL).
    pub single_input_required: bool,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Oldest coins first (default).
    Age,
    Random,
    /// Every available credit, unconditionally.
    All,
    /// Like `Age`, but unconfirmed credits are only selected if they were
    /// produced by a transaction this wallet created.
    Smart,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::Age
    }
}

#[derive(Debug, Clone)]
pub struct FundingOptions {
    pub account: Account,
    pub policy: SelectionPolicy,
    /// Satoshis-per-weight-unit; ignored if `hard_fee` is set.
    pub fee_rate: Option<u64>,
    /// Bypasses fee estimation entirely.
    pub hard_fee: Option<u64>,
    /// Subtracts the fee from the output at this index instead of adding
    /// funding inputs to cover it.
    pub subtract_fee_from: Option<usize>,
    pub sort: bool,
    pub locktime: u32,
    pub chain_height: u32,
    pub change_address: Address,
}

#[derive(Debug, Clone)]
pub struct FundedTransaction {
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<UnsignedOutput>,
    pub fee: u64,
    pub locktime: u32,
}

pub struct Funder<'a> {
    lock_manager: &'a LockManager,
}

impl<'a> Funder<'a> {
    pub fn new(lock_manager: &'a LockManager) -> Self {
        Self { lock_manager }
    }

    /// Selects inputs, computes the fee, adds a change output if needed,
    /// and templates the transaction per spec §4.2's invariants.
    pub fn fund(
        &self,
        builder: Builder,
        available: Vec<Credit>,
        options: &FundingOptions,
    ) -> Result<FundedTransaction, CoinError> {
        let target: u64 = builder.outputs.iter().map(|o| o.value).sum();
        let pre_added_value: u64 = builder.pre_added_inputs.iter().map(|c| c.value()).sum();

        let mut selected: Vec<Credit> = builder.pre_added_inputs.clone();
        let mut selected_value = pre_added_value;

        let needs_more = |selected_value: u64, fee_estimate: u64| -> bool {
            selected_value < target.saturating_add(fee_estimate)
        };

        let mut fee_estimate = estimate_fee(selected.len().max(1), builder.outputs.len() + 1, options);

        if needs_more(selected_value, fee_estimate) {
            if builder.single_input_required {
                return Err(CoinError::SecondInputForbidden);
            }

            let candidates = Self::filter_candidates(available, options);
            let ordered = Self::order_candidates(candidates, options.policy, options.chain_height);

            for credit in ordered {
                if self.lock_manager.is_soft_locked(&credit.outpoint()) {
                    continue;
                }
                selected_value += credit.value();
                selected.push(credit);
                fee_estimate = estimate_fee(selected.len(), builder.outputs.len() + 1, options);
                if !needs_more(selected_value, fee_estimate) {
                    break;
                }
            }

            if needs_more(selected_value, fee_estimate) {
                return Err(CoinError::InsufficientFunds {
                    need: target.saturating_add(fee_estimate),
                    have: selected_value,
                });
            }
        }

        let fee = options.hard_fee.unwrap_or(fee_estimate);
        if fee > MAX_FEE {
            return Err(CoinError::FeeExceedsMax { fee, max: MAX_FEE });
        }

        let mut outputs = builder.outputs;
        if let Some(idx) = options.subtract_fee_from {
            if let Some(output) = outputs.get_mut(idx) {
                output.value = output.value.saturating_sub(fee);
            }
        } else {
            let change = selected_value.saturating_sub(target).saturating_sub(fee);
            if change > 0 {
                if change < DUST_THRESHOLD {
                    // Dust change is folded into the fee rather than
                    // creating an output that would itself be rejected.
                } else {
                    outputs.push(UnsignedOutput {
                        value: change,
                        covenant: Covenant::none(),
                        address: options.change_address.clone(),
                    });
                }
            }
        }

        for output in &outputs {
            if output.is_dust() {
                return Err(CoinError::DustOutput(output.value));
            }
            if matches!(output.covenant, Covenant::None) && output.address.is_null() {
                return Err(CoinError::NullAddress);
            }
        }

        let sigops = selected.len() * SIGOPS_PER_INPUT;
        if sigops > MAX_TX_SIGOPS {
            return Err(CoinError::SigopsExceeded {
                count: sigops,
                max: MAX_TX_SIGOPS,
            });
        }

        let weight = BASE_TX_WEIGHT
            + selected.len() as u64 * INPUT_WEIGHT
            + outputs.iter().map(|o| o.weight()).sum::<u64>();
        if weight > MAX_TX_WEIGHT {
            return Err(CoinError::WeightExceeded {
                weight,
                max: MAX_TX_WEIGHT,
            });
        }

        let unconfirmed_ancestors = selected.iter().filter(|c| c.coin.block_height == 0).count();
        if unconfirmed_ancestors > MAX_ANCESTORS {
            return Err(CoinError::TooManyAncestors(unconfirmed_ancestors));
        }

        if builder.single_input_required && selected.len() != 1 {
            return Err(CoinError::SecondInputForbidden);
        }

        let mut inputs: Vec<OutPoint> = selected.iter().map(|c| c.outpoint()).collect();
        if options.sort {
            inputs.sort_by(bip69_input_order);
            outputs.sort_by(bip69_output_order);
        }

        Ok(FundedTransaction {
            inputs,
            outputs,
            fee,
            locktime: options.locktime,
        })
    }

    fn filter_candidates(available: Vec<Credit>, options: &FundingOptions) -> Vec<Credit> {
        available
            .into_iter()
            .filter(|c| c.account == options.account)
            .filter(|c| !c.spent)
            .filter(|c| match options.policy {
                SelectionPolicy::Smart => c.coin.block_height != 0 || c.own,
                _ => true,
            })
            .collect()
    }

    fn order_candidates(
        mut candidates: Vec<Credit>,
        policy: SelectionPolicy,
        chain_height: u32,
    ) -> Vec<Credit> {
        match policy {
            SelectionPolicy::Age | SelectionPolicy::Smart => {
                candidates.sort_by(|a, b| b.age(chain_height).cmp(&a.age(chain_height)));
            }
            SelectionPolicy::Random => {
                candidates.shuffle(&mut rand::thread_rng());
            }
            SelectionPolicy::All => {}
        }
        candidates
    }
}

fn estimate_fee(input_count: usize, output_count: usize, options: &FundingOptions) -> u64 {
    if let Some(hard_fee) = options.hard_fee {
        return hard_fee;
    }
    let rate = options.fee_rate.unwrap_or(1);
    let weight = BASE_TX_WEIGHT + input_count as u64 * INPUT_WEIGHT + output_count as u64 * OUTPUT_BASE_WEIGHT;
    weight * rate
}

fn bip69_input_order(a: &OutPoint, b: &OutPoint) -> std::cmp::Ordering {
    a.txid
        .as_bytes()
        .cmp(b.txid.as_bytes())
        .then(a.index.cmp(&b.index))
}

fn bip69_output_order(a: &UnsignedOutput, b: &UnsignedOutput) -> std::cmp::Ordering {
    a.value
        .cmp(&b.value)
        .then_with(|| a.address.hash.cmp(&b.address.hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::Coin;
    use crate::hash::Hash;

    fn credit(index: u32, value: u64, height: u32) -> Credit {
        let coin = Coin {
            outpoint: OutPoint::new(Hash::hash(b"tx"), index),
            value,
            covenant: Covenant::none(),
            address: Address::new(0, vec![index as u8; 20]),
            block_height: height,
        };
        Credit::new(coin, true, Account::DEFAULT)
    }

    fn options() -> FundingOptions {
        FundingOptions {
            account: Account::DEFAULT,
            policy: SelectionPolicy::Age,
            fee_rate: Some(1),
            hard_fee: None,
            subtract_fee_from: None,
            sort: true,
            locktime: 0,
            chain_height: 100,
            change_address: Address::new(0, vec![9; 20]),
        }
    }

    #[test]
    fn selects_enough_inputs_to_cover_target_plus_fee() {
        let manager = LockManager::new();
        let funder = Funder::new(&manager);
        let builder = Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: 1000,
                covenant: Covenant::none(),
                address: Address::new(0, vec![1; 20]),
            }],
            single_input_required: false,
        };
        let available = vec![credit(0, 5000, 10)];
        let funded = funder.fund(builder, available, &options()).unwrap();
        assert_eq!(funded.inputs.len(), 1);
        assert!(funded.fee > 0);
    }

    #[test]
    fn insufficient_funds_is_reported() {
        let manager = LockManager::new();
        let funder = Funder::new(&manager);
        let builder = Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: 10_000,
                covenant: Covenant::none(),
                address: Address::new(0, vec![1; 20]),
            }],
            single_input_required: false,
        };
        let available = vec![credit(0, 500, 10)];
        let err = funder.fund(builder, available, &options()).unwrap_err();
        assert!(matches!(err, CoinError::InsufficientFunds { .. }));
    }

    #[test]
    fn single_input_required_rejects_a_second_input() {
        let manager = LockManager::new();
        let funder = Funder::new(&manager);
        let bid_credit = credit(0, 1000, 10);
        let builder = Builder {
            pre_added_inputs: vec![bid_credit],
            outputs: vec![UnsignedOutput {
                value: 999_000,
                covenant: Covenant::none(),
                address: Address::new(0, vec![1; 20]),
            }],
            single_input_required: true,
        };
        let err = funder.fund(builder, vec![], &options()).unwrap_err();
        assert!(matches!(err, CoinError::SecondInputForbidden));
    }

    #[test]
    fn dust_output_is_rejected() {
        let manager = LockManager::new();
        let funder = Funder::new(&manager);
        let builder = Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: 10,
                covenant: Covenant::none(),
                address: Address::new(0, vec![1; 20]),
            }],
            single_input_required: false,
        };
        let available = vec![credit(0, 5000, 10)];
        let err = funder.fund(builder, available, &options()).unwrap_err();
        assert!(matches!(err, CoinError::DustOutput(_)));
    }
}
