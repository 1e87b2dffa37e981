//! Error taxonomy, grouped by observable behavior (spec §7).
//!
//! Each cluster is its own `thiserror` enum, the way the teacher keeps
//! `NetworkError` next to `WalletError` instead of one flat enum — a batch
//! caller that only wants to know "is this a coin error or a state error"
//! can match on the wrapping variant without digging through string matches.

use crate::hash::Hash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid name")]
    InvalidName,
    #[error("resource exceeds the maximum encoded size ({size} > {max})")]
    ResourceTooLarge { size: usize, max: usize },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unexpected covenant type")]
    BadType,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("name not found")]
    NameNotFound,
    #[error("wrong state: expected {expected}, actual {actual}")]
    WrongState {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("name has expired")]
    ExpiredName,
    #[error("bid is still locked")]
    LockedBid,
    #[error("outpoint is already committed to a pending action: {0:?}")]
    AlreadySpending(crate::coin::OutPoint),
    #[error("coin is not owned by this wallet")]
    NotOwned,
    #[error("an OPEN for this name is already pending")]
    AlreadyOpening,
    #[error("action is already pending for outpoint {0:?}")]
    AlreadyPending(crate::coin::OutPoint),
    #[error("transition is not yet mature")]
    NotYetMature,
    #[error("transfer lockup has not elapsed")]
    TransferStillLocked,
}

#[derive(Debug, Error)]
pub enum CoinError {
    #[error("insufficient funds: need {need}, have {have}")]
    InsufficientFunds { need: u64, have: u64 },
    #[error("output value {0} is below the dust threshold")]
    DustOutput(u64),
    #[error("destination address is null")]
    NullAddress,
    #[error("fee {fee} exceeds the maximum allowed fee {max}")]
    FeeExceedsMax { fee: u64, max: u64 },
    #[error("unconfirmed ancestor chain too long: {0} > max")]
    TooManyAncestors(usize),
    #[error("transaction weight {weight} exceeds the maximum {max}")]
    WeightExceeded { weight: u64, max: u64 },
    #[error("sigop count {count} exceeds the maximum {max}")]
    SigopsExceeded { count: usize, max: usize },
    #[error("funding would require a second input, which the auction-in-advance flow forbids")]
    SecondInputForbidden,
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("blind commitment {0} was not found in the blind store")]
    BlindNotFound(Hash),
    #[error("cannot sign with a watch-only key")]
    CannotSignWatchOnly,
    #[error("bad passphrase")]
    BadPassphrase,
    #[error("cipher error")]
    Cipher,
    #[error("nonce generation failed")]
    NonceGeneration,
    #[error("invalid encrypted value")]
    InvalidEncryptedValue,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request was aborted by the caller")]
    Aborted,
    #[error("upstream collaborator unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// Top-level error returned by the dispatcher and every public engine entry
/// point. Internal invariant violations are represented by `Internal` and
/// are always fatal — they unwind the lock scope that produced them.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Coin(#[from] CoinError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("persistent store failure: {0}")]
    Store(String),
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this error is recoverable at the level of a single entry in a
    /// batch (validation/state/coin errors), as opposed to one that must
    /// abort the whole call (crypto/internal/transport).
    pub fn is_batch_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_) | EngineError::State(_) | EngineError::Coin(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
