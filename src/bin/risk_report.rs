use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser as _, Subcommand};
use serde_json::json;
use swap_watcher::config::Config;
use swap_watcher::swap::store::SqliteStore;
use swap_watcher::zeroconf::ledger::recover_pending_lockups;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Risk per configured chain, as it would be recovered on startup.
    Risk,
    PendingLockups {
        #[arg(long)]
        symbol: Option<String>,
    },
}

fn main() -> Result<()> {
    swap_watcher::logging::init().ok();
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    let store = SqliteStore::open(config.store_path.clone()).context("open swap store")?;
    let recovery = recover_pending_lockups(&store).context("recover pending lockups")?;

    let out = match args.command {
        Command::Risk => {
            let chains: Vec<_> = config
                .chains
                .iter()
                .map(|chain| {
                    json!({
                      "symbol": chain.symbol,
                      "current_risk": recovery.current_risk(&chain.symbol),
                      "max_risk": chain.max_zero_conf_risk,
                      "pending": recovery
                          .lockups
                          .iter()
                          .filter(|lockup| lockup.chain_symbol == chain.symbol)
                          .count(),
                    })
                })
                .collect();

            json!({
              "chains": chains,
              "stale": recovery.stale,
            })
        }
        Command::PendingLockups { symbol } => {
            let lockups: Vec<_> = recovery
                .lockups
                .iter()
                .filter(|lockup| symbol.as_ref().is_none_or(|s| *s == lockup.chain_symbol))
                .map(|lockup| {
                    json!({
                      "swap_id": lockup.swap_id,
                      "symbol": lockup.chain_symbol,
                      "transaction_id": lockup.transaction_id.to_string(),
                      "amount": lockup.amount,
                    })
                })
                .collect();

            json!({ "pending_lockups": lockups })
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
