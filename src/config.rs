//! Consensus constants and engine/CLI configuration, modeled on the
//! teacher's `wallet::config` module (lazy-static tunables + a `clap`-derived
//! `Config` for the companion binary).

use std::ops::ControlFlow;

#[cfg(feature = "cli")]
use clap::Parser;
use serde::{Deserialize, Serialize};

pub const DIR_PATH: &str = "hns-wallets/";
pub const SALT_SIZE: usize = 32;
pub const KEY_SIZE: usize = 32;

/// Default per-transaction output budget used by the batch planner for
/// REVEAL/OPEN/BID/FINISH packing (spec §4.4).
pub const DEFAULT_BATCH_BUDGET: usize = 200;

/// Block cadence at which name-tree roots are committed (glossary: "tree
/// interval"). RENEW becomes legal `tree_interval` blocks after the last
/// renewal event.
pub const TREE_INTERVAL: u32 = 2016;

/// Minimum number of blocks between a TRANSFER and a valid FINALIZE.
pub const TRANSFER_LOCKUP: u32 = 288;

/// Coinbase maturity required before a CLAIM-backed owner output can be
/// registered.
pub const COINBASE_MATURITY: u32 = 100;

/// Maximum size, in bytes, of an encoded resource record accepted by
/// REGISTER/UPDATE.
pub const MAX_RESOURCE_SIZE: usize = 512;

/// Consensus/mempool ceilings enforced by the Funder (spec §4.2).
pub const MAX_FEE: u64 = 1_000_000_000;
pub const MAX_TX_SIGOPS: usize = 3000;
pub const MAX_TX_WEIGHT: u64 = 400_000;
pub const MAX_ANCESTORS: usize = 25;
pub const DUST_THRESHOLD: u64 = 1000;

/// Height at which name auctions are allowed to begin (rollout complete for
/// every name bucket). A concrete deployment schedules rollout per-name by
/// hash bucket; this engine exposes the single global gate the `rules`
/// module needs and leaves bucket scheduling to the chain collaborator.
pub const ROLLOUT_HEIGHT: u32 = 0;

/// Capacity of each per-action idempotency LRU cache.
pub const IDEMPOTENCY_CACHE_CAPACITY: usize = 10_000;

/// Capacity of the in-memory coin index's defensive-clone buffers; purely a
/// sizing hint for `Vec::with_capacity`, not a hard limit.
pub const COIN_INDEX_HINT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn is_mainnet(&self) -> bool {
        matches!(self, Network::Mainnet)
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        };
        write!(f, "{}", s)
    }
}

fn default_wallet_path() -> String {
    String::from("default")
}

fn default_batch_budget() -> usize {
    DEFAULT_BATCH_BUDGET
}

#[cfg(feature = "cli")]
fn default_logs_path() -> String {
    String::from("logs/")
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct LogConfig {
    /// Disable the log file and log to stdout only.
    #[clap(long)]
    #[serde(default)]
    pub disable_file_logging: bool,
    /// Directory the engine writes its log file into.
    #[clap(long, default_value_t = default_logs_path())]
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
}

/// `clap::ValueEnum`-friendly mirror of `Network`, kept separate so the CLI
/// layer's parsing concerns never leak into `Network` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum NetworkArg {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl From<NetworkArg> for Network {
    fn from(value: NetworkArg) -> Self {
        match value {
            NetworkArg::Mainnet => Network::Mainnet,
            NetworkArg::Testnet => Network::Testnet,
            NetworkArg::Regtest => Network::Regtest,
        }
    }
}

/// Engine-wide configuration. Mirrors the teacher's `Config` shape but
/// trimmed to what a naming auction engine needs — no RPC/XSWD surface, no
/// precomputed ECDLP tables, since those belong to the wallet's HTTP and
/// confidential-balance layers, which are out of this spec's scope.
#[cfg_attr(feature = "cli", derive(Parser))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the wallet's persistent store directory.
    #[cfg_attr(feature = "cli", clap(long, default_value_t = default_wallet_path()))]
    #[serde(default = "default_wallet_path")]
    pub wallet_path: String,
    /// Network to operate on.
    #[cfg_attr(feature = "cli", clap(long, value_enum, default_value_t))]
    #[serde(default)]
    pub network: NetworkArg,
    /// Per-transaction output budget used by the batch planner.
    #[cfg_attr(feature = "cli", clap(long, default_value_t = DEFAULT_BATCH_BUDGET))]
    #[serde(default = "default_batch_budget")]
    pub batch_budget: usize,
    /// Log configuration.
    #[cfg(feature = "cli")]
    #[clap(flatten)]
    pub log: LogConfig,
}

/// Hook used by a long-running precompute/scan step to report progress
/// without pulling in a UI dependency; logged at info level the way the
/// teacher logs ECDLP table generation progress.
pub trait ProgressReport {
    fn report(&self, progress: f64) -> ControlFlow<()>;
}

pub struct LogProgressReport;

impl ProgressReport for LogProgressReport {
    fn report(&self, progress: f64) -> ControlFlow<()> {
        if log::log_enabled!(log::Level::Info) {
            log::info!("progress: {:.2}%", progress * 100.0);
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_mainnet_flag() {
        assert!(Network::Mainnet.is_mainnet());
        assert!(!Network::Testnet.is_mainnet());
    }
}
