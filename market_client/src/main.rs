//! Prediction market command line client
//!
//! Reads its configuration from the environment (or `MARKET_CLIENT_CONFIG`
//! pointing at a TOML file) and prints JSON on stdout.

use std::env;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use ethereum_types::{Address, H256};
use serde::Serialize;
use tracing::info;

use prediction_market_client::poller::Poller;
use prediction_market_client::tracing_logger::init_subscriber;
use prediction_market_client::{ClientConfig, MarketClient};

const USAGE: &str = "usage: market_client <command>

commands:
  markets [offset] [limit]     list markets with details
  market <address>             show one market
  position <market> <user>     show a user's position in a market
  portfolio <user> [offset] [limit]
                               a user's positions across the directory
  stats                        factory statistics
  resolution <market_id>       oracle resolution status
  watch                        poll balance and statistics until interrupted";

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn address_arg(args: &[String], index: usize, name: &str) -> Result<Address> {
    let raw = args.get(index).ok_or_else(|| anyhow!("missing <{}>\n\n{}", name, USAGE))?;
    raw.parse()
        .map_err(|e| anyhow!("invalid {} '{}': {:?}", name, raw, e))
}

fn u64_arg(args: &[String], index: usize, default: u64) -> Result<u64> {
    match args.get(index) {
        Some(raw) => raw.parse().with_context(|| format!("invalid number '{}'", raw)),
        None => Ok(default),
    }
}

fn load_config() -> Result<ClientConfig> {
    match env::var("MARKET_CLIENT_CONFIG") {
        Ok(path) => ClientConfig::from_toml_file(&path),
        Err(_) => Ok(ClientConfig::from_env()?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_subscriber(&config.log_level);

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        bail!("{}", USAGE);
    };

    let page_size = config.directory.page_size;
    let client = MarketClient::connect(config)?;

    match command {
        "markets" => {
            let offset = u64_arg(&args, 1, 0)?;
            let limit = u64_arg(&args, 2, page_size)?;
            let markets = client.directory().list_markets_with_details(offset, limit).await;
            print_json(&markets)?;
        }
        "market" => {
            let market = address_arg(&args, 1, "address")?;
            let info = client
                .markets()
                .fetch_info(market)
                .await
                .with_context(|| format!("failed to read market {:?}", market))?;
            print_json(&info)?;
        }
        "position" => {
            let market = address_arg(&args, 1, "market")?;
            let user = address_arg(&args, 2, "user")?;
            let position = client
                .positions()
                .fetch_stake(market, user)
                .await
                .with_context(|| format!("failed to read position in {:?}", market))?;
            print_json(&position)?;
        }
        "portfolio" => {
            let user = address_arg(&args, 1, "user")?;
            let offset = u64_arg(&args, 2, 0)?;
            let limit = u64_arg(&args, 3, page_size)?;
            let portfolio = client.portfolio().portfolio(user, offset, limit).await;
            print_json(&portfolio)?;
        }
        "stats" => {
            let stats = client
                .directory()
                .statistics()
                .await
                .ok_or_else(|| anyhow!("factory statistics unavailable"))?;
            print_json(&stats)?;
        }
        "resolution" => {
            let raw = args.get(1).ok_or_else(|| anyhow!("missing <market_id>\n\n{}", USAGE))?;
            let market_id: H256 = raw
                .parse()
                .map_err(|e| anyhow!("invalid market id '{}': {:?}", raw, e))?;
            let status = client
                .oracle()
                .fetch_resolution_status(market_id, Utc::now())
                .await
                .context("failed to read resolution status")?;
            print_json(&status)?;
        }
        "watch" => watch(&client).await?,
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }

    Ok(())
}

async fn watch(client: &MarketClient) -> Result<()> {
    let mut poller = Poller::new();
    let snapshots = client.start_polling(&mut poller);
    let mut balance = snapshots.balance.subscribe();
    let mut statistics = snapshots.statistics.subscribe();

    info!("Watching balance and statistics, press Ctrl-C to stop");
    loop {
        tokio::select! {
            Ok(()) = balance.changed() => {
                let value = *balance.borrow_and_update();
                if let Some(value) = value {
                    print_json(&serde_json::json!({ "balance": value }))?;
                }
            }
            Ok(()) = statistics.changed() => {
                let value = statistics.borrow_and_update().clone();
                if let Some(value) = value {
                    print_json(&serde_json::json!({ "statistics": value }))?;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.shutdown().await;
    info!("Stopped watching");
    Ok(())
}
