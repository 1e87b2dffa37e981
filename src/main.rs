//! Thin CLI entry point. Parses `Config`, sets up logging the way the
//! teacher's binary does (`fern`, one file-per-directory when file logging
//! is enabled), opens the persistent store, and rebuilds the coin index
//! from it. `ChainClient`/`Signer` have no concrete implementation in this
//! crate (spec §1/§6) — wiring one up, and driving `EngineHandle`'s actions
//! from a prompt or RPC surface, is left to the binary that embeds this
//! engine.

use clap::Parser;
use hns_engine::cipher::Cipher;
use hns_engine::coin_index::CoinIndex;
use hns_engine::config::Config;
use hns_engine::store::SledStore;
use log::info;
use std::path::Path;

fn setup_logger(config: &Config) -> Result<(), fern::InitError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout());

    #[cfg(feature = "cli")]
    if !config.log.disable_file_logging {
        std::fs::create_dir_all(&config.log.logs_path)?;
        let log_path = Path::new(&config.log.logs_path).join("hns-engine.log");
        dispatch = dispatch.chain(fern::log_file(log_path)?);
    }

    dispatch.apply()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    setup_logger(&config)?;

    let network: hns_engine::config::Network = config.network.into();
    info!("starting hns-engine on {} network", network);

    std::fs::create_dir_all(&config.wallet_path)?;
    let db_path = Path::new(&config.wallet_path).join("store");
    let cipher = Cipher::new(&[0u8; 32], None)?;
    let store = SledStore::open(db_path.to_str().expect("valid utf-8 path"), cipher)?;

    let coin_index = CoinIndex::new();
    coin_index.load_from_store(&store, std::iter::empty())?;

    info!("store opened at {}, coin index ready", config.wallet_path);
    info!("no chain/signer collaborator wired in this binary; see EngineHandle for the wiring seam");
    Ok(())
}
