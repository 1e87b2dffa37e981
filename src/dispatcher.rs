//! Composes `NameEngine`, `Funder`, `BatchPlanner`, `IdempotencyCache`, and
//! `LockManager` into the caller-facing per-action entry points (spec
//! §4.7). Grounded on the teacher's `stateless_wallet.rs`: a single handle
//! struct holding `Arc`-shared collaborators, with each public method
//! acquiring locks, delegating to the inner components, and releasing them
//! on every exit path via RAII guards, exactly as `StatelessWallet` wraps
//! `EncryptedStorage` behind an async `Mutex`.

use crate::{
    batch_planner::{self, Domain, PackedBatch},
    coin::{Address, Coin, Credit},
    collaborators::{AbortSignal, ChainClient, PersistentStore, Signer},
    coin_index::{CachedBatch, CoinIndex},
    error::{EngineError, EngineResult},
    funder::{Builder, FundedTransaction, Funder, FundingOptions},
    hash::Hash,
    idempotency::{CachedOutput, CachedValue, IdempotencyCache},
    lock_manager::LockManager,
    name_engine::{EngineNameError, NameEngine, NameStatusInput},
    name_state::NameState,
};
use std::sync::Arc;

/// Everything a dispatcher call needs beyond the action's own arguments:
/// the engine's collaborators (spec §6) plus the account and funding
/// preferences to use.
pub struct EngineHandle {
    pub chain: Arc<dyn ChainClient>,
    pub signer: Arc<dyn Signer>,
    pub store: Arc<dyn PersistentStore>,
    pub coin_index: Arc<CoinIndex>,
    pub name_engine: Arc<NameEngine>,
    pub idempotency: Arc<IdempotencyCache>,
    pub locks: Arc<LockManager>,
}

/// A single completed action's result, returned to the caller alongside
/// whether it was served from the idempotency cache (spec §4.5, §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub output: CachedOutput,
    pub from_cache: bool,
}

/// One name's outcome inside a batch call (spec §4.4, §6: "Errors are
/// surfaced as `{ name, error }` per affected name in batch responses").
#[derive(Debug)]
pub struct NamedOutcome {
    pub name: String,
    pub result: EngineResult<ActionResult>,
}

impl EngineHandle {
    /// OPEN(name): acquires `fund_lock` (address derivation + selection),
    /// consults the `open` idempotency cache, asks `NameEngine` for a
    /// builder, funds it, signs, broadcasts, installs the cache entry.
    pub async fn open(
        &self,
        name: &str,
        account: crate::coin::Account,
        idempotency_key: Option<&str>,
        abort: &AbortSignal,
    ) -> EngineResult<ActionResult> {
        let cache = self.idempotency.action("open").expect("open cache registered");
        let key = idempotency_key.unwrap_or(name).to_string();

        let (value, from_cache) = cache
            .with_cache(&key, || async {
                let guard = self.locks.acquire_fund().await;

                let height = self.chain.height().await.map_err(EngineError::Transport)? + 1;
                let name_hash = crate::rules::name_hash(name);
                let status = self
                    .chain
                    .get_name_status(&name_hash)
                    .await
                    .map_err(EngineError::Transport)?;
                let existing = self
                    .chain
                    .get_name_state(&name_hash)
                    .await
                    .map_err(EngineError::Transport)?;
                let receive_address = self.signer.derive_address(account, false);

                let builder = self
                    .name_engine
                    .open(
                        name,
                        NameStatusInput::from(status),
                        existing.as_ref(),
                        height,
                        receive_address,
                    )
                    .map_err(wrap_name_error)?;

                let result = self
                    .fund_sign_broadcast(builder, account, height, &guard, abort)
                    .await;
                if result.is_err() {
                    self.name_engine.pending_opens().clear(&name_hash);
                }
                result.map(CachedValue::Single)
            })
            .await?;

        Ok(single_result(value, from_cache))
    }

    /// Shared fund -> sign -> broadcast tail used by every single-output
    /// action (spec §4.7 steps 3-6).
    async fn fund_sign_broadcast(
        &self,
        builder: Builder,
        account: crate::coin::Account,
        height: u32,
        guard: &crate::lock_manager::FundGuard<'_>,
        abort: &AbortSignal,
    ) -> EngineResult<CachedOutput> {
        let outpoints: Vec<_> = builder.pre_added_inputs.iter().map(|c| c.outpoint()).collect();
        let _soft_lock = guard.lock_outpoints(&outpoints);

        let available = self.coin_index.credits_for(account);
        let change_address = self.signer.derive_address(account, true);
        let fee_rate = self.chain.estimate_fee(1).await.ok();

        let options = FundingOptions {
            account,
            policy: crate::funder::SelectionPolicy::Age,
            fee_rate,
            hard_fee: None,
            subtract_fee_from: None,
            sort: true,
            locktime: 0,
            chain_height: height,
            change_address,
        };

        let funder = Funder::new(&self.locks);
        let funded = funder.fund(builder, available, &options)?;

        abort.check().map_err(EngineError::Transport)?;

        let unsigned_bytes = encode_funded(&funded);
        let signed_bytes = self.signer.sign(account, &unsigned_bytes).await?;

        abort.check().map_err(EngineError::Transport)?;

        let tx_hash = self
            .chain
            .send(&signed_bytes)
            .await
            .map_err(EngineError::Transport)?;

        self.commit_spent_inputs(&funded)?;

        Ok(CachedOutput {
            tx_hash,
            output_index: 0,
        })
    }

    /// Generic single-output dispatch tail shared by every action besides
    /// OPEN: consult the named idempotency cache, build under the fund
    /// lock, fund/sign/broadcast, install the cache entry (spec §4.7).
    async fn dispatch_single<F, Fut>(
        &self,
        action: &str,
        key: &str,
        account: crate::coin::Account,
        abort: &AbortSignal,
        build: F,
    ) -> EngineResult<ActionResult>
    where
        F: FnOnce(u32) -> Fut,
        Fut: std::future::Future<Output = EngineResult<Builder>>,
    {
        let cache = self
            .idempotency
            .action(action)
            .unwrap_or_else(|| panic!("{action} cache registered"));

        let (value, from_cache) = cache
            .with_cache(key, || async {
                let guard = self.locks.acquire_fund().await;
                let height = self.chain.height().await.map_err(EngineError::Transport)? + 1;
                let builder = build(height).await?;
                self.fund_sign_broadcast(builder, account, height, &guard, abort)
                    .await
                    .map(CachedValue::Single)
            })
            .await?;

        Ok(single_result(value, from_cache))
    }

    /// BID(name, value, lockup): spec §4.1. Persists the blind commitment
    /// before broadcast so a crash after signing never loses the ability
    /// to REVEAL (spec §8: "For every REVEAL output ... the corresponding
    /// (value, nonce) exists in BlindStore").
    #[allow(clippy::too_many_arguments)]
    pub async fn bid(
        &self,
        name: &str,
        ns: NameState,
        account: crate::coin::Account,
        value: u64,
        lockup: u64,
        idempotency_key: Option<&str>,
        abort: &AbortSignal,
    ) -> EngineResult<ActionResult> {
        let key = idempotency_key.unwrap_or(name).to_string();
        let address = self.signer.derive_address(account, false);
        let addr_hash = address.hash.clone();
        let signer = Arc::clone(&self.signer);

        self.dispatch_single("bid", &key, account, abort, move |height| async move {
            let (builder, blind, nonce) = self
                .name_engine
                .bid(name, &ns, height, value, lockup, address, &addr_hash, |idx| {
                    signer.derive_pubkey_at(account, idx)
                })
                .map_err(wrap_name_error)?;

            let blind_store = crate::blind_store::BlindStore::new(self.store.as_ref());
            blind_store.put(&blind, value, nonce)?;

            Ok(builder)
        })
        .await
    }

    /// REVEAL(name): spec §4.1. `bid_credit`/`value`/`nonce` are resolved
    /// by the caller via `coin_index` + `BlindStore` before dispatch.
    pub async fn reveal(
        &self,
        name: &str,
        ns: NameState,
        account: crate::coin::Account,
        bid_credit: Credit,
        value: u64,
        nonce: Hash,
        idempotency_key: Option<&str>,
        abort: &AbortSignal,
    ) -> EngineResult<ActionResult> {
        let key = idempotency_key.unwrap_or(name).to_string();
        self.dispatch_single("reveal", &key, account, abort, move |height| async move {
            self.name_engine
                .reveal(&ns, height, &bid_credit, value, nonce)
                .map_err(wrap_name_error)
        })
        .await
    }

    /// REDEEM(name): spec §4.1.
    pub async fn redeem(
        &self,
        name: &str,
        ns: NameState,
        account: crate::coin::Account,
        reveal_credit: Credit,
        idempotency_key: Option<&str>,
        abort: &AbortSignal,
    ) -> EngineResult<ActionResult> {
        let key = idempotency_key.unwrap_or(name).to_string();
        self.dispatch_single("finish", &key, account, abort, move |height| async move {
            self.name_engine
                .redeem(&ns, height, &reveal_credit)
                .map_err(wrap_name_error)
        })
        .await
    }

    /// UPDATE(name, resource): spec §4.1.
    pub async fn update(
        &self,
        name: &str,
        ns: NameState,
        account: crate::coin::Account,
        owner_coin: Coin,
        resource: Vec<u8>,
        idempotency_key: Option<&str>,
        abort: &AbortSignal,
    ) -> EngineResult<ActionResult> {
        let key = idempotency_key.unwrap_or(name).to_string();
        let chain = Arc::clone(&self.chain);
        self.dispatch_single("update", &key, account, abort, move |height| async move {
            let renewal_block_hash = chain.get_renewal_block().await.map_err(EngineError::Transport)?;
            let maturity_elapsed = height >= owner_coin.block_height + crate::config::COINBASE_MATURITY;
            self.name_engine
                .update(&ns, height, &owner_coin, &resource, renewal_block_hash, maturity_elapsed)
                .map_err(wrap_name_error)
        })
        .await
    }

    /// CANCEL(name): spec §4.1.
    pub async fn cancel(
        &self,
        name: &str,
        ns: NameState,
        account: crate::coin::Account,
        owner_coin: Coin,
        idempotency_key: Option<&str>,
        abort: &AbortSignal,
    ) -> EngineResult<ActionResult> {
        let key = idempotency_key.unwrap_or(name).to_string();
        self.dispatch_single("update", &key, account, abort, move |_height| async move {
            self.name_engine.cancel(&ns, &owner_coin).map_err(wrap_name_error)
        })
        .await
    }

    /// RENEW(name): spec §4.1.
    pub async fn renew(
        &self,
        name: &str,
        ns: NameState,
        account: crate::coin::Account,
        owner_coin: Coin,
        idempotency_key: Option<&str>,
        abort: &AbortSignal,
    ) -> EngineResult<ActionResult> {
        let key = idempotency_key.unwrap_or(name).to_string();
        let chain = Arc::clone(&self.chain);
        self.dispatch_single("update", &key, account, abort, move |height| async move {
            let renewal_block_hash = chain.get_renewal_block().await.map_err(EngineError::Transport)?;
            self.name_engine
                .renew(&ns, height, &owner_coin, renewal_block_hash)
                .map_err(wrap_name_error)
        })
        .await
    }

    /// TRANSFER(name, address): spec §4.1.
    pub async fn transfer(
        &self,
        name: &str,
        ns: NameState,
        account: crate::coin::Account,
        owner_coin: Coin,
        target: Address,
        idempotency_key: Option<&str>,
        abort: &AbortSignal,
    ) -> EngineResult<ActionResult> {
        let key = idempotency_key.unwrap_or(name).to_string();
        self.dispatch_single("transfer", &key, account, abort, move |_height| async move {
            self.name_engine
                .transfer(&ns, &owner_coin, target)
                .map_err(wrap_name_error)
        })
        .await
    }

    /// FINALIZE(name): spec §4.1.
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize(
        &self,
        name: &str,
        ns: NameState,
        account: crate::coin::Account,
        owner_coin: Coin,
        raw_name: String,
        target: Address,
        idempotency_key: Option<&str>,
        abort: &AbortSignal,
    ) -> EngineResult<ActionResult> {
        let key = idempotency_key.unwrap_or(name).to_string();
        let chain = Arc::clone(&self.chain);
        self.dispatch_single("finalize", &key, account, abort, move |height| async move {
            let renewal_block_hash = chain.get_renewal_block().await.map_err(EngineError::Transport)?;
            self.name_engine
                .finalize(&ns, height, &owner_coin, &raw_name, target, renewal_block_hash)
                .map_err(wrap_name_error)
        })
        .await
    }

    /// REVOKE(name): spec §4.1.
    pub async fn revoke(
        &self,
        name: &str,
        ns: NameState,
        account: crate::coin::Account,
        owner_coin: Coin,
        idempotency_key: Option<&str>,
        abort: &AbortSignal,
    ) -> EngineResult<ActionResult> {
        let key = idempotency_key.unwrap_or(name).to_string();
        self.dispatch_single("finish", &key, account, abort, move |height| async move {
            self.name_engine.revoke(&ns, height, &owner_coin).map_err(wrap_name_error)
        })
        .await
    }

    /// Marks every selected input as spent in the coin index's deferred
    /// batch (spec §4.3, §5: "Two transactions produced under the same
    /// fund_lock scope never share an input").
    fn commit_spent_inputs(&self, funded: &FundedTransaction) -> EngineResult<()> {
        if funded.inputs.is_empty() {
            return Ok(());
        }
        let mut batch = CachedBatch::new();
        for outpoint in &funded.inputs {
            if let Some(mut credit) = self.coin_index.get_credit(&outpoint.txid, outpoint.index) {
                credit.spent = true;
                batch.put_credit(credit);
            }
        }
        self.coin_index.commit(self.store.as_ref(), batch)
    }

    /// Runs `create_strict_batch` over per-name REVEAL outputs, producing
    /// one transaction out of the domains that fit and reporting the rest
    /// as rejected (spec §4.4, §8 scenario 3). Bid resolution (matching a
    /// wallet-owned BID credit to its `(value, nonce)` pair) is supplied by
    /// the caller via `owned_bids`, since resolving the blind store is a
    /// `write_lock`-scoped read the caller has already performed.
    pub fn plan_reveal_batch(
        &self,
        owned_bids: Vec<(String, Credit, u64, Hash)>,
        budget: usize,
    ) -> PackedBatch<(Credit, u64, Hash)> {
        let grouped: Vec<(String, (Credit, u64, Hash))> = owned_bids
            .into_iter()
            .map(|(name, credit, value, nonce)| (name, (credit, value, nonce)))
            .collect();
        let domains: Vec<Domain<(Credit, u64, Hash)>> = batch_planner::group_by_name(grouped);
        batch_planner::create_strict_batch(domains, budget)
    }

    pub async fn clear_cache(&self, name: &str) {
        self.idempotency.clear_cache(name).await;
    }

    pub async fn clear_cache_key(&self, name: &str, key: &str) {
        self.idempotency.clear_cache_key(name, key).await;
    }
}

fn wrap_name_error(error: EngineNameError) -> EngineError {
    error.into()
}

fn single_result(value: CachedValue, from_cache: bool) -> ActionResult {
    let output = match value {
        CachedValue::Single(output) => output,
        CachedValue::Multiple(mut outputs) => outputs.pop().unwrap_or(CachedOutput {
            tx_hash: Hash::zero(),
            output_index: 0,
        }),
    };
    ActionResult { output, from_cache }
}

/// Placeholder wire encoding of a funded-but-unsigned transaction, handed
/// to the signer collaborator. The real consensus wire format (spec §6:
/// "unchanged from Handshake consensus") is out of scope; this crate only
/// needs a stable byte sequence to pass across the signing boundary.
fn encode_funded(funded: &FundedTransaction) -> Vec<u8> {
    use crate::serializer::{Serializer, Writer};
    let mut writer = Writer::new();
    writer.write_u32(funded.inputs.len() as u32);
    for input in &funded.inputs {
        input.write(&mut writer);
    }
    writer.write_u32(funded.outputs.len() as u32);
    for output in &funded.outputs {
        writer.write_u64(output.value);
        output.covenant.write(&mut writer);
        output.address.write(&mut writer);
    }
    writer.write_u64(funded.fee);
    writer.write_u32(funded.locktime);
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::Account;
    use crate::collaborators::NameStatus;
    use crate::covenant::Covenant;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct FakeChain {
        height: u32,
    }

    #[async_trait]
    impl ChainClient for FakeChain {
        async fn height(&self) -> Result<u32, crate::error::TransportError> {
            Ok(self.height)
        }
        async fn get_name_state(
            &self,
            _name_hash: &Hash,
        ) -> Result<Option<NameState>, crate::error::TransportError> {
            Ok(None)
        }
        async fn get_name_status(
            &self,
            _name_hash: &Hash,
        ) -> Result<NameStatus, crate::error::TransportError> {
            Ok(NameStatus {
                reserved: false,
                locked_up: false,
                rolled_out: true,
            })
        }
        async fn get_renewal_block(&self) -> Result<Hash, crate::error::TransportError> {
            Ok(Hash::hash(b"anchor"))
        }
        async fn is_available(&self, _name_hash: &Hash) -> Result<bool, crate::error::TransportError> {
            Ok(true)
        }
        async fn estimate_fee(&self, _blocks: u32) -> Result<u64, crate::error::TransportError> {
            Ok(1)
        }
        async fn send(&self, _tx_bytes: &[u8]) -> Result<Hash, crate::error::TransportError> {
            Ok(Hash::hash(b"broadcast-tx"))
        }
        async fn add_tx(&self, _tx_bytes: &[u8]) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        async fn send_claim(&self, claim: &[u8]) -> Result<Hash, crate::error::TransportError> {
            Ok(Hash::hash(claim))
        }
    }

    struct FakeSigner;

    #[async_trait]
    impl Signer for FakeSigner {
        async fn sign(&self, _account: Account, unsigned: &[u8]) -> Result<Vec<u8>, EngineError> {
            Ok(unsigned.to_vec())
        }
        fn derive_address(&self, _account: Account, _change: bool) -> Address {
            Address::new(0, vec![1; 20])
        }
        fn derive_pubkey_at(&self, _account: Account, idx: u32) -> Vec<u8> {
            format!("pk-{idx}").into_bytes()
        }
    }

    fn handle(height: u32) -> EngineHandle {
        let store = MemoryStore::new();
        let coin_index = CoinIndex::new();

        // Seed a spendable fee coin; every action under test funds at
        // least a fee-only transaction, and a fresh wallet otherwise has
        // nothing to spend.
        let funding_coin = Coin {
            outpoint: crate::coin::OutPoint::new(Hash::hash(b"funding-tx"), 0),
            value: 1_000_000,
            covenant: Covenant::none(),
            address: Address::new(0, vec![3; 20]),
            block_height: height.saturating_sub(10),
        };
        let mut batch = CachedBatch::new();
        batch.put_credit(Credit::new(funding_coin, true, Account::DEFAULT));
        coin_index.commit(&store, batch).unwrap();

        EngineHandle {
            chain: Arc::new(FakeChain { height }),
            signer: Arc::new(FakeSigner),
            store: Arc::new(store),
            coin_index: Arc::new(coin_index),
            name_engine: Arc::new(NameEngine::new()),
            idempotency: Arc::new(IdempotencyCache::new()),
            locks: Arc::new(LockManager::new()),
        }
    }

    #[tokio::test]
    async fn open_then_replay_is_idempotent() {
        let h = handle(100);
        let abort = AbortSignal::new();
        let first = h
            .open("alice", Account::DEFAULT, Some("k1"), &abort)
            .await
            .unwrap();
        assert!(!first.from_cache);

        let second = h
            .open("alice", Account::DEFAULT, Some("k1"), &abort)
            .await
            .unwrap();
        assert!(second.from_cache);
        assert_eq!(first.output, second.output);
    }

    #[tokio::test]
    async fn open_twice_with_different_keys_fails_already_opening() {
        let h = handle(100);
        let abort = AbortSignal::new();
        h.open("bob", Account::DEFAULT, Some("k1"), &abort)
            .await
            .unwrap();
        let err = h
            .open("bob", Account::DEFAULT, Some("k2"), &abort)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::State(crate::error::StateError::AlreadyOpening)
        ));
    }
}
