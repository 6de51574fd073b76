//! Spread arbitrage bot entry point
//!
//! 1. Loads `.env` and the YAML configuration
//! 2. Builds paper gateways and Binance public feeds per venue
//! 3. Builds the spread engine and runs the runtime tasks
//! 4. Shuts down on Ctrl+C

use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use spread_arb::adapters::binance::{BinanceFeed, BinanceMarket};
use spread_arb::adapters::{MarketDataFeed, PaperGateway};
use spread_arb::config::{self, constants, logging, AppConfig, FeedKind, VenueConfig};
use spread_arb::core::{build_engine, Runtime, Venue};

/// Paper gateway seeded with the venue's balances and the markets traded on it
fn paper_gateway(venue: &VenueConfig, config: &AppConfig) -> PaperGateway {
    let mut gateway = PaperGateway::new(venue.id.clone()).with_min_notional(venue.min_notional);
    for (asset, amount) in &venue.paper_balances {
        gateway = gateway.with_balance(asset, *amount);
    }
    for spread in &config.spreads {
        for leg in [&spread.spot, &spread.futures] {
            if leg.venue == venue.id {
                gateway = gateway.with_market(&leg.symbol_for(&spread.base), &spread.base, &leg.quote);
            }
        }
    }
    gateway
}

fn market_feed(venue: &VenueConfig) -> Option<Arc<dyn MarketDataFeed>> {
    let market = match venue.feed {
        FeedKind::BinanceSpot => BinanceMarket::Spot,
        FeedKind::BinanceFutures => BinanceMarket::UsdMFutures,
        FeedKind::None => return None,
    };
    Some(Arc::new(BinanceFeed::new(venue.id.clone(), market)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenvy::dotenv().ok();
    logging::init_logging();

    info!("Spread arbitrage bot starting");
    constants::log_configuration();

    let path = config::config_path();
    let config = match config::load_config(&path) {
        Ok(cfg) => {
            let bases: Vec<&str> = cfg.spreads.iter().map(|s| s.base.as_str()).collect();
            info!(path = %path.display(), spreads = ?bases, venues = cfg.venues.len(), "[CONFIG] Loaded");
            cfg
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "[CONFIG] Configuration failed");
            return Err(e).context("loading configuration");
        }
    };

    let mut venues = HashMap::new();
    let mut paper = Vec::new();
    for venue in &config.venues {
        let gateway = Arc::new(paper_gateway(venue, &config));
        let mut entry = Venue::new(gateway.clone());
        if let Some(feed) = market_feed(venue) {
            entry = entry.with_feed(feed);
        }
        info!(venue = %venue.id, feed = %venue.feed, "[CONFIG] Venue ready (paper orders)");
        venues.insert(venue.id.clone(), entry);
        paper.push((venue.id.clone(), gateway));
    }

    let engine = Arc::new(build_engine(&config, venues).context("building engine")?);
    let mut runtime = Runtime::new(
        engine,
        Duration::from_secs(config.engine.warmup_secs),
        Duration::from_secs(config.engine.status_interval_secs),
    );
    for (id, gateway) in paper {
        runtime = runtime.with_paper_venue(id, gateway);
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Spawn SIGINT handler task
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("[SHUTDOWN] Graceful shutdown initiated");
                let _ = shutdown_signal.send(());
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for Ctrl+C signal");
            }
        }
    });

    runtime.run(shutdown_tx).await;

    info!("[SHUTDOWN] Clean exit");
    Ok(())
}
