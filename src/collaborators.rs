//! External collaborator contracts (spec §1, §6). Everything in this module
//! is a trait the dispatcher depends on but never implements: chain
//! consensus, HD key derivation / signing, and the persistent key-value
//! store all live outside this crate's scope and are wired in by the host
//! application, the way the teacher's `network_handler`/`daemon_api` sit
//! behind `tos_common`'s daemon RPC types rather than owning consensus
//! logic themselves.

use crate::{
    coin::{Account, Address},
    error::{EngineError, TransportError},
    hash::Hash,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Chain-observable facts the engine needs and cannot derive locally.
/// Mirrors the teacher's `daemon_api`/`network_handler` request surface,
/// narrowed to what the naming engine actually calls.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn height(&self) -> Result<u32, TransportError>;
    async fn get_name_state(
        &self,
        name_hash: &Hash,
    ) -> Result<Option<crate::name_state::NameState>, TransportError>;
    async fn get_name_status(&self, name_hash: &Hash) -> Result<NameStatus, TransportError>;
    async fn get_renewal_block(&self) -> Result<Hash, TransportError>;
    async fn is_available(&self, name_hash: &Hash) -> Result<bool, TransportError>;
    async fn estimate_fee(&self, blocks: u32) -> Result<u64, TransportError>;
    async fn send(&self, tx_bytes: &[u8]) -> Result<Hash, TransportError>;
    async fn add_tx(&self, tx_bytes: &[u8]) -> Result<(), TransportError>;
    /// Broadcasts a CLAIM transaction for a pre-reserved/pre-auction name
    /// (spec §6, SPEC_FULL §4.13), distinct from `send` since claims follow
    /// their own mempool acceptance rules rather than the covenant-action
    /// path `send` carries.
    async fn send_claim(&self, claim: &[u8]) -> Result<Hash, TransportError>;
}

/// Coarse availability/rollout status used by OPEN's precondition check,
/// kept separate from `NameState` since an unopened name has no state yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameStatus {
    pub reserved: bool,
    pub locked_up: bool,
    pub rolled_out: bool,
}

/// Derives per-input keyrings and inserts signatures into an unsigned
/// template. Rejects watch-only accounts, matching the teacher's
/// `CannotSignWatchOnly` style guard in `transaction_builder`.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(
        &self,
        account: Account,
        unsigned_tx_bytes: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    /// Derives the next receive or change address for `account`; `change`
    /// selects the change chain over the receive chain.
    fn derive_address(&self, account: Account, change: bool) -> Address;

    /// Derives the account public key at `idx` used by the blind
    /// commitment formula (spec §3); out-of-scope HD derivation lives
    /// behind this one call.
    fn derive_pubkey_at(&self, account: Account, idx: u32) -> Vec<u8>;
}

/// bdb-style atomic batch interface to the persistent key-value store
/// (spec §6). The engine never talks to sled directly outside of
/// `store::SledStore`; every other component depends on this trait so
/// an in-memory double can stand in for tests.
pub trait PersistentStore: Send + Sync {
    fn put(&self, tree: &str, key: &[u8], value: &[u8]) -> Result<(), EngineError>;
    fn del(&self, tree: &str, key: &[u8]) -> Result<(), EngineError>;
    fn get(&self, tree: &str, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError>;
    /// Applies every op in `batch` atomically; on failure no op is applied.
    fn write(&self, batch: StoreBatch) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub enum StoreOp {
    Put {
        tree: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Del {
        tree: String,
        key: Vec<u8>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct StoreBatch {
    pub ops: Vec<StoreOp>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, tree: &str, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(StoreOp::Put {
            tree: tree.to_string(),
            key,
            value,
        });
    }

    pub fn del(&mut self, tree: &str, key: Vec<u8>) {
        self.ops.push(StoreOp::Del {
            tree: tree.to_string(),
            key,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Caller-supplied cancellation flag, checked immediately before broadcast
/// (spec §5: "checked immediately before broadcast; if raised, the call
/// returns ... and neither mutates the chain nor the cache"). Cheaply
/// cloneable so a single signal can be shared across a batch call.
#[derive(Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), TransportError> {
        if self.is_aborted() {
            Err(TransportError::Aborted)
        } else {
            Ok(())
        }
    }
}
