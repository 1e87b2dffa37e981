//! The auction state machine and per-action transaction builders (spec
//! §4.1). This is the largest component (spec §2 budgets it ~35% of the
//! implementation) and is grounded on the teacher's `transaction_builder`
//! module for its overall shape: validate preconditions against state the
//! caller supplies, then emit an unfunded `Builder` the `Funder` completes.
//! NameEngine never signs and never broadcasts, matching spec §4.1 exactly.

use crate::{
    coin::{Address, Coin, Credit, OutPoint},
    config::{MAX_RESOURCE_SIZE, TRANSFER_LOCKUP},
    covenant::{Covenant, FLAG_WEAK},
    error::{StateError, ValidationError},
    funder::{Builder, UnsignedOutput},
    hash::Hash,
    name_state::{AuctionState, NameState},
    rules,
};
use std::collections::HashSet;
use std::sync::Mutex;

/// Tracks names with an OPEN currently unconfirmed in the local mempool
/// view, so a second OPEN for the same name fails fast with
/// `AlreadyOpening` instead of racing the chain (spec §4.1's
/// "double-open" check; spec §8 scenario 1).
#[derive(Default)]
pub struct PendingOpens {
    names: Mutex<HashSet<Hash>>,
}

impl PendingOpens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, name_hash: Hash) -> bool {
        self.names.lock().expect("pending opens poisoned").insert(name_hash)
    }

    pub fn clear(&self, name_hash: &Hash) {
        self.names.lock().expect("pending opens poisoned").remove(name_hash);
    }

    pub fn contains(&self, name_hash: &Hash) -> bool {
        self.names.lock().expect("pending opens poisoned").contains(name_hash)
    }
}

pub struct NameEngine {
    pending_opens: PendingOpens,
}

impl NameEngine {
    pub fn new() -> Self {
        Self {
            pending_opens: PendingOpens::new(),
        }
    }

    pub fn pending_opens(&self) -> &PendingOpens {
        &self.pending_opens
    }

    /// OPEN(name): spec §4.1.
    pub fn open(
        &self,
        name: &str,
        name_status: NameStatusInput,
        existing: Option<&NameState>,
        height: u32,
        receive_address: Address,
    ) -> Result<Builder, EngineNameError> {
        rules::validate_name(name).map_err(EngineNameError::Validation)?;

        if name_status.reserved || name_status.locked_up || !name_status.rolled_out {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "auctionable",
                actual: "reserved/locked-up/not-rolled-out",
            }));
        }

        match existing {
            None => {}
            Some(ns) => {
                let state = ns.state(height);
                let restartable = state == AuctionState::Opening && (ns.height == 0 || ns.height == height);
                if !restartable {
                    return Err(EngineNameError::State(StateError::WrongState {
                        expected: "no prior auction or OPENING at height 0/h",
                        actual: "existing auction in another state",
                    }));
                }
            }
        }

        let name_hash = rules::name_hash(name);
        if !self.pending_opens.mark(name_hash) {
            return Err(EngineNameError::State(StateError::AlreadyOpening));
        }

        Ok(Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: 0,
                covenant: Covenant::Open {
                    name_hash,
                    epoch: 0,
                    raw_name: name.as_bytes().to_vec(),
                },
                address: receive_address,
            }],
            single_input_required: false,
        })
    }

    /// BID(name, value, lockup): spec §4.1 and §3's blind-commitment
    /// formula. `derive_pubkey_at`/`addr_hash` come from the signer
    /// collaborator (out of scope, spec §1).
    pub fn bid<F>(
        &self,
        name: &str,
        ns: &NameState,
        height: u32,
        value: u64,
        lockup: u64,
        address: Address,
        addr_hash: &[u8],
        derive_pubkey_at: F,
    ) -> Result<(Builder, Hash, Hash), EngineNameError>
    where
        F: FnOnce(u32) -> Vec<u8>,
    {
        if ns.state(height) != AuctionState::Bidding {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "BIDDING",
                actual: "other",
            }));
        }
        if value > lockup {
            return Err(EngineNameError::Validation(ValidationError::BadType));
        }

        let (blind, nonce) = rules::blind_commitment(addr_hash, derive_pubkey_at, &ns.name_hash, value);

        let builder = Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: lockup,
                covenant: Covenant::Bid {
                    name_hash: ns.name_hash,
                    epoch: ns.height,
                    raw_name: name.as_bytes().to_vec(),
                    blind,
                },
                address,
            }],
            single_input_required: false,
        };

        Ok((builder, blind, nonce))
    }

    /// REVEAL(name): spec §4.1. `bid_credit` is a BID-covenant credit owned
    /// by this wallet on `ns`; `blind_entry` is what `BlindStore::get`
    /// resolved for that bid's blind.
    pub fn reveal(
        &self,
        ns: &NameState,
        height: u32,
        bid_credit: &Credit,
        value: u64,
        nonce: Hash,
    ) -> Result<Builder, EngineNameError> {
        if ns.state(height) != AuctionState::Reveal {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "REVEAL",
                actual: "other",
            }));
        }

        let (bid_name_hash, bid_epoch) = match &bid_credit.coin.covenant {
            Covenant::Bid { name_hash, epoch, .. } => (*name_hash, *epoch),
            _ => return Err(EngineNameError::Validation(ValidationError::BadType)),
        };
        if bid_name_hash != ns.name_hash {
            return Err(EngineNameError::Validation(ValidationError::BadType));
        }
        if !rules::confirmed_in_epoch(bid_credit.coin.block_height, ns.height) || bid_epoch != ns.height {
            return Err(EngineNameError::State(StateError::LockedBid));
        }
        if !bid_credit.own {
            return Err(EngineNameError::State(StateError::NotOwned));
        }

        Ok(Builder {
            pre_added_inputs: vec![bid_credit.clone()],
            outputs: vec![UnsignedOutput {
                value,
                covenant: Covenant::Reveal {
                    name_hash: ns.name_hash,
                    epoch: ns.height,
                    nonce,
                },
                address: bid_credit.coin.address.clone(),
            }],
            single_input_required: true,
        })
    }

    /// REDEEM(name): spec §4.1. `reveal_credit` is the wallet's losing
    /// REVEAL outpoint on `ns` (must not equal `ns.owner`).
    pub fn redeem(
        &self,
        ns: &NameState,
        height: u32,
        reveal_credit: &Credit,
    ) -> Result<Builder, EngineNameError> {
        if ns.state(height) != AuctionState::Closed {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "CLOSED",
                actual: "other",
            }));
        }
        if Some(reveal_credit.outpoint()) == ns.owner {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "a losing reveal",
                actual: "the winning reveal",
            }));
        }
        if !matches!(reveal_credit.coin.covenant, Covenant::Reveal { .. }) {
            return Err(EngineNameError::Validation(ValidationError::BadType));
        }

        Ok(Builder {
            pre_added_inputs: vec![reveal_credit.clone()],
            outputs: vec![UnsignedOutput {
                value: reveal_credit.value(),
                covenant: Covenant::Redeem {
                    name_hash: ns.name_hash,
                    epoch: ns.height,
                },
                address: reveal_credit.coin.address.clone(),
            }],
            single_input_required: false,
        })
    }

    /// REGISTER(name, resource): spec §4.1. Internal helper invoked
    /// directly or via `update` when the owner outpoint is still a
    /// REVEAL/CLAIM.
    pub fn register(
        &self,
        ns: &NameState,
        height: u32,
        owner_coin: &Coin,
        resource: &[u8],
        renewal_block_hash: Hash,
        coinbase_maturity_elapsed: bool,
    ) -> Result<Builder, EngineNameError> {
        if ns.owner != Some(owner_coin.outpoint) {
            return Err(EngineNameError::State(StateError::NotOwned));
        }
        if owner_coin.block_height < ns.height {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "owner coin confirmed in this epoch",
                actual: "stale owner coin",
            }));
        }
        let matured = match owner_coin.covenant {
            Covenant::Reveal { .. } => true,
            Covenant::None => coinbase_maturity_elapsed,
            _ => return Err(EngineNameError::Validation(ValidationError::BadType)),
        };
        if !matured {
            return Err(EngineNameError::State(StateError::NotYetMature));
        }
        if resource.len() > MAX_RESOURCE_SIZE {
            return Err(EngineNameError::Validation(ValidationError::ResourceTooLarge {
                size: resource.len(),
                max: MAX_RESOURCE_SIZE,
            }));
        }
        let _ = height;

        Ok(Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: ns.value,
                covenant: Covenant::Register {
                    name_hash: ns.name_hash,
                    epoch: ns.height,
                    resource_bytes: resource.to_vec(),
                    renewal_block_hash,
                },
                address: owner_coin.address.clone(),
            }],
            single_input_required: false,
        })
    }

    /// UPDATE(name, resource): spec §4.1. Delegates to `register` when the
    /// owner is still a REVEAL/CLAIM output.
    pub fn update(
        &self,
        ns: &NameState,
        height: u32,
        owner_coin: &Coin,
        resource: &[u8],
        renewal_block_hash: Hash,
        coinbase_maturity_elapsed: bool,
    ) -> Result<Builder, EngineNameError> {
        if ns.owner != Some(owner_coin.outpoint) {
            return Err(EngineNameError::State(StateError::NotOwned));
        }

        if matches!(owner_coin.covenant, Covenant::Reveal { .. } | Covenant::None) {
            return self.register(
                ns,
                height,
                owner_coin,
                resource,
                renewal_block_hash,
                coinbase_maturity_elapsed,
            );
        }

        if !matches!(
            owner_coin.covenant,
            Covenant::Register { .. } | Covenant::Update { .. } | Covenant::Renew { .. } | Covenant::Finalize { .. }
        ) {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "REGISTER/UPDATE/RENEW/FINALIZE",
                actual: "other",
            }));
        }
        if resource.len() > MAX_RESOURCE_SIZE {
            return Err(EngineNameError::Validation(ValidationError::ResourceTooLarge {
                size: resource.len(),
                max: MAX_RESOURCE_SIZE,
            }));
        }

        Ok(Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: owner_coin.value,
                covenant: Covenant::Update {
                    name_hash: ns.name_hash,
                    epoch: ns.height,
                    resource_bytes: resource.to_vec(),
                },
                address: owner_coin.address.clone(),
            }],
            single_input_required: false,
        })
    }

    /// CANCEL(name): spec §4.1, an UPDATE with an empty resource. Legal
    /// only when the owner covenant is TRANSFER, reverting it without
    /// finalizing.
    pub fn cancel(&self, ns: &NameState, owner_coin: &Coin) -> Result<Builder, EngineNameError> {
        if ns.owner != Some(owner_coin.outpoint) {
            return Err(EngineNameError::State(StateError::NotOwned));
        }
        if !matches!(owner_coin.covenant, Covenant::Transfer { .. }) {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "TRANSFER",
                actual: "other",
            }));
        }

        Ok(Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: owner_coin.value,
                covenant: Covenant::cancel(ns.name_hash, ns.height),
                address: owner_coin.address.clone(),
            }],
            single_input_required: false,
        })
    }

    /// RENEW(name): spec §4.1.
    pub fn renew(
        &self,
        ns: &NameState,
        height: u32,
        owner_coin: &Coin,
        renewal_block_hash: Hash,
    ) -> Result<Builder, EngineNameError> {
        if ns.owner != Some(owner_coin.outpoint) {
            return Err(EngineNameError::State(StateError::NotOwned));
        }
        if !ns.renew_matures_at(height) {
            return Err(EngineNameError::State(StateError::NotYetMature));
        }
        if !matches!(
            owner_coin.covenant,
            Covenant::Register { .. } | Covenant::Update { .. } | Covenant::Renew { .. } | Covenant::Finalize { .. }
        ) {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "REGISTER/UPDATE/RENEW/FINALIZE",
                actual: "other",
            }));
        }

        Ok(Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: owner_coin.value,
                covenant: Covenant::Renew {
                    name_hash: ns.name_hash,
                    epoch: ns.height,
                    renewal_block_hash,
                },
                address: owner_coin.address.clone(),
            }],
            single_input_required: false,
        })
    }

    /// TRANSFER(name, address): spec §4.1.
    pub fn transfer(
        &self,
        ns: &NameState,
        owner_coin: &Coin,
        target: Address,
    ) -> Result<Builder, EngineNameError> {
        if ns.owner != Some(owner_coin.outpoint) {
            return Err(EngineNameError::State(StateError::NotOwned));
        }
        if !matches!(
            owner_coin.covenant,
            Covenant::Register { .. } | Covenant::Update { .. } | Covenant::Renew { .. } | Covenant::Finalize { .. }
        ) {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "REGISTER/UPDATE/RENEW/FINALIZE",
                actual: "TRANSFER or other",
            }));
        }

        Ok(Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: owner_coin.value,
                covenant: Covenant::Transfer {
                    name_hash: ns.name_hash,
                    epoch: ns.height,
                    addr_version: target.version,
                    addr_hash: target.hash.clone(),
                },
                address: owner_coin.address.clone(),
            }],
            single_input_required: false,
        })
    }

    /// FINALIZE(name): spec §4.1.
    pub fn finalize(
        &self,
        ns: &NameState,
        height: u32,
        owner_coin: &Coin,
        raw_name: &str,
        target: Address,
        renewal_block_hash: Hash,
    ) -> Result<Builder, EngineNameError> {
        if ns.owner != Some(owner_coin.outpoint) {
            return Err(EngineNameError::State(StateError::NotOwned));
        }
        let (addr_version, addr_hash) = match &owner_coin.covenant {
            Covenant::Transfer { addr_version, addr_hash, .. } => (*addr_version, addr_hash.clone()),
            _ => {
                return Err(EngineNameError::State(StateError::WrongState {
                    expected: "TRANSFER",
                    actual: "other",
                }))
            }
        };
        if height < owner_coin.block_height + TRANSFER_LOCKUP {
            return Err(EngineNameError::State(StateError::NotYetMature));
        }
        let _ = (addr_version, &addr_hash);

        let mut flags = 0u8;
        if ns.weak {
            flags |= FLAG_WEAK;
        }

        Ok(Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: owner_coin.value,
                covenant: Covenant::Finalize {
                    name_hash: ns.name_hash,
                    epoch: ns.height,
                    raw_name: raw_name.as_bytes().to_vec(),
                    flags,
                    claimed: if ns.claimed { 1 } else { 0 },
                    renewals: ns.renewals,
                    renewal_block_hash,
                },
                address: target,
            }],
            single_input_required: false,
        })
    }

    /// REVOKE(name): spec §4.1.
    pub fn revoke(&self, ns: &NameState, height: u32, owner_coin: &Coin) -> Result<Builder, EngineNameError> {
        if ns.owner != Some(owner_coin.outpoint) {
            return Err(EngineNameError::State(StateError::NotOwned));
        }
        if ns.is_expired(height) {
            return Err(EngineNameError::State(StateError::ExpiredName));
        }
        if !matches!(
            owner_coin.covenant,
            Covenant::Register { .. }
                | Covenant::Update { .. }
                | Covenant::Renew { .. }
                | Covenant::Transfer { .. }
                | Covenant::Finalize { .. }
        ) {
            return Err(EngineNameError::State(StateError::WrongState {
                expected: "REGISTER/UPDATE/RENEW/TRANSFER/FINALIZE",
                actual: "other",
            }));
        }

        Ok(Builder {
            pre_added_inputs: vec![],
            outputs: vec![UnsignedOutput {
                value: owner_coin.value,
                covenant: Covenant::Revoke {
                    name_hash: ns.name_hash,
                    epoch: ns.height,
                },
                address: owner_coin.address.clone(),
            }],
            single_input_required: false,
        })
    }
}

impl Default for NameEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain-sourced gate used by `open` (spec §4.1 precondition b). Supplied
/// by the `ChainClient` collaborator.
#[derive(Debug, Clone, Copy)]
pub struct NameStatusInput {
    pub reserved: bool,
    pub locked_up: bool,
    pub rolled_out: bool,
}

impl From<crate::collaborators::NameStatus> for NameStatusInput {
    fn from(value: crate::collaborators::NameStatus) -> Self {
        Self {
            reserved: value.reserved,
            locked_up: value.locked_up,
            rolled_out: value.rolled_out,
        }
    }
}

/// Thin error alias distinguishing validation/state failures from the
/// engine's coin/crypto/transport errors, which `NameEngine` never raises
/// directly (spec §4.1: "never signs and never broadcasts").
#[derive(Debug, thiserror::Error)]
pub enum EngineNameError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] StateError),
}

impl From<EngineNameError> for crate::error::EngineError {
    fn from(value: EngineNameError) -> Self {
        match value {
            EngineNameError::Validation(e) => crate::error::EngineError::Validation(e),
            EngineNameError::State(e) => crate::error::EngineError::State(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::Address;

    fn auctionable_status() -> NameStatusInput {
        NameStatusInput {
            reserved: false,
            locked_up: false,
            rolled_out: true,
        }
    }

    #[test]
    fn open_twice_fails_with_already_opening() {
        let engine = NameEngine::new();
        let addr = Address::new(0, vec![1; 20]);
        engine
            .open("alice", auctionable_status(), None, 100, addr.clone())
            .unwrap();
        let err = engine
            .open("alice", auctionable_status(), None, 100, addr)
            .unwrap_err();
        assert!(matches!(err, EngineNameError::State(StateError::AlreadyOpening)));
    }

    #[test]
    fn bid_rejects_value_above_lockup() {
        let engine = NameEngine::new();
        let mut ns = NameState::new(Hash::hash(b"gamma"), 100);
        ns.height = 100;
        let err = engine
            .bid(
                "gamma",
                &ns,
                101,
                2000,
                1000,
                Address::new(0, vec![1; 20]),
                &[1u8; 20],
                |idx| format!("pk-{idx}").into_bytes(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineNameError::Validation(_)));
    }

    #[test]
    fn register_uses_second_price_value() {
        let engine = NameEngine::new();
        let mut ns = NameState::new(Hash::hash(b"gamma"), 100);
        let owner_outpoint = OutPoint::new(Hash::hash(b"reveal-tx"), 0);
        ns.owner = Some(owner_outpoint);
        ns.value = 500;
        ns.highest = 1000;

        let owner_coin = Coin {
            outpoint: owner_outpoint,
            value: 1000,
            covenant: Covenant::Reveal {
                name_hash: ns.name_hash,
                epoch: ns.height,
                nonce: Hash::hash(b"nonce"),
            },
            address: Address::new(0, vec![2; 20]),
            block_height: 200,
        };

        let builder = engine
            .register(&ns, 300, &owner_coin, b"resource", Hash::hash(b"anchor"), true)
            .unwrap();
        assert_eq!(builder.outputs[0].value, 500);
    }

    #[test]
    fn finalize_waits_for_transfer_lockup() {
        let engine = NameEngine::new();
        let mut ns = NameState::new(Hash::hash(b"gamma"), 0);
        let owner_outpoint = OutPoint::new(Hash::hash(b"transfer-tx"), 0);
        ns.owner = Some(owner_outpoint);

        let owner_coin = Coin {
            outpoint: owner_outpoint,
            value: 1000,
            covenant: Covenant::Transfer {
                name_hash: ns.name_hash,
                epoch: ns.height,
                addr_version: 0,
                addr_hash: vec![9; 20],
            },
            address: Address::new(0, vec![2; 20]),
            block_height: 1000,
        };

        let err = engine
            .finalize(&ns, 1001, &owner_coin, "gamma", Address::new(0, vec![9; 20]), Hash::hash(b"anchor"))
            .unwrap_err();
        assert!(matches!(err, EngineNameError::State(StateError::NotYetMature)));

        let ok = engine.finalize(
            &ns,
            1000 + TRANSFER_LOCKUP,
            &owner_coin,
            "gamma",
            Address::new(0, vec![9; 20]),
            Hash::hash(b"anchor"),
        );
        assert!(ok.is_ok());
    }
}
