//! Runtime tasks
//!
//! Wires venue feeds to the spread engine and runs the background loops:
//! - one feed task per spread leg (book tickers → engine)
//! - the warm-up task (ends `CollectInformation` once the warm-up elapses)
//! - the status task (periodic status lines and realized profit)
//!
//! Every task listens on a `broadcast` shutdown channel.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::adapters::paper::PaperGateway;
use crate::adapters::types::BookTicker;
use crate::config::{AppConfig, ExecutionMode};
use crate::core::engine::{EngineSettings, SpreadEngine, Venue};
use crate::core::events::{log_event, TradingEvent};
use crate::core::order::Leg;
use crate::core::spread::{Spread, SpreadParams};
use crate::core::symbol::SymbolInfo;
use crate::error::EngineError;

/// Build the engine from configuration and the connected venues
pub fn build_engine(config: &AppConfig, venues: HashMap<String, Venue>) -> Result<SpreadEngine, EngineError> {
    let engine = &config.engine;
    let params = SpreadParams {
        rich_delta: engine.rich_delta,
        loss_delta: engine.loss_delta,
        reference_capacity: engine.reference_capacity,
        by_price: engine.has_mode(ExecutionMode::ByPrice),
        by_trade: engine.has_mode(ExecutionMode::ByTrade),
    };

    let spreads = config
        .spreads
        .iter()
        .map(|s| {
            let leg = |leg: &crate::config::LegConfig| {
                SymbolInfo::new(
                    leg.venue.clone(),
                    leg.symbol_for(&s.base),
                    leg.quote.clone(),
                    leg.price_step,
                    leg.quantity_step,
                )
                .with_min_notional(leg.min_notional)
                .with_fee(leg.fee)
            };
            Spread::new(s.base.clone(), leg(&s.spot), leg(&s.futures), params)
        })
        .collect();

    let settings = EngineSettings {
        spread_params: params,
        order_notional: engine.order_notional,
        max_open_positions: engine.max_open_positions,
    };
    SpreadEngine::new(settings, venues, spreads)
}

/// Feed task for one leg of one spread
///
/// Forwards every book ticker to the engine. When a paper venue backs the
/// leg, resting paper orders are matched against the ticker first. The
/// spread is parked if the stream ends outside shutdown.
pub async fn feed_task(
    engine: Arc<SpreadEngine>,
    base: String,
    leg: Leg,
    mut tickers: mpsc::Receiver<BookTicker>,
    paper: Option<(Arc<PaperGateway>, String)>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!(base = %base, leg = %leg, "Feed task started");
    let mut updates: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!(base = %base, leg = %leg, updates, "Feed task shutting down");
                break;
            }
            ticker = tickers.recv() => match ticker {
                Some(ticker) => {
                    updates += 1;
                    if let Some((gateway, symbol)) = &paper {
                        gateway.match_book(symbol, &ticker);
                    }
                    match leg {
                        Leg::Spot => engine.handle_spot_ticker(&base, ticker),
                        Leg::Futures => engine.handle_futures_ticker(&base, ticker),
                    }
                }
                None => {
                    error!(base = %base, leg = %leg, updates, "[FEED] Stream ended, parking spread");
                    if let Err(e) = engine.park(&base, &format!("{} feed ended", leg)).await {
                        warn!(base = %base, error = %e, "Park failed");
                    }
                    break;
                }
            }
        }
    }
}

/// Ends the warm-up of every spread after `warmup`
pub async fn warmup_task(engine: Arc<SpreadEngine>, warmup: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    tokio::select! {
        _ = shutdown_rx.recv() => return,
        _ = tokio::time::sleep(warmup) => {}
    }
    let outcomes = engine.finish_warmup().await;
    info!(spreads = outcomes.len(), warmup_secs = warmup.as_secs(), "Warm-up complete");
}

/// Logs every spread's status line each `period`
pub async fn status_task(engine: Arc<SpreadEngine>, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = interval(period);
    // first tick fires immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => log_status(&engine),
        }
    }
}

fn log_status(engine: &SpreadEngine) {
    for line in engine.status_lines() {
        info!(status = %line, "[STATUS]");
    }
    let profit: Decimal = engine.profit_total();
    info!(profit_total = %profit, "[STATUS] Realized profit");
}

/// Owns the engine and its background tasks
pub struct Runtime {
    engine: Arc<SpreadEngine>,
    paper: HashMap<String, Arc<PaperGateway>>,
    warmup: Duration,
    status_interval: Duration,
}

impl Runtime {
    pub fn new(engine: Arc<SpreadEngine>, warmup: Duration, status_interval: Duration) -> Self {
        Self {
            engine,
            paper: HashMap::new(),
            warmup,
            status_interval,
        }
    }

    /// Match resting orders of a paper venue against its feed
    pub fn with_paper_venue(mut self, id: impl Into<String>, gateway: Arc<PaperGateway>) -> Self {
        self.paper.insert(id.into(), gateway);
        self
    }

    pub fn engine(&self) -> &Arc<SpreadEngine> {
        &self.engine
    }

    /// Subscribe every leg and spawn all tasks
    ///
    /// A leg whose subscription fails parks its spread; the others keep running.
    pub async fn start(&self, shutdown_tx: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        log_event(&TradingEvent::engine_started());
        let mut handles = Vec::new();

        for base in self.engine.bases() {
            let Some(snapshot) = self.engine.snapshot(&base) else {
                continue;
            };
            for (leg, info) in [(Leg::Spot, &snapshot.spot), (Leg::Futures, &snapshot.futures)] {
                let feed = self
                    .engine
                    .venue(&info.exchange_id)
                    .and_then(|v| v.feed.clone());
                let Some(feed) = feed else {
                    warn!(base = %base, leg = %leg, venue = %info.exchange_id, "No market data feed for leg");
                    continue;
                };
                match feed.subscribe_book_ticker(&info.symbol).await {
                    Ok(rx) => {
                        let paper = self
                            .paper
                            .get(&info.exchange_id)
                            .map(|g| (Arc::clone(g), info.symbol.clone()));
                        handles.push(tokio::spawn(feed_task(
                            Arc::clone(&self.engine),
                            base.clone(),
                            leg,
                            rx,
                            paper,
                            shutdown_tx.subscribe(),
                        )));
                    }
                    Err(e) => {
                        error!(base = %base, leg = %leg, error = %e, "[FEED] Subscription failed");
                        if let Err(e) = self.engine.park(&base, &format!("{} subscription failed", leg)).await {
                            warn!(base = %base, error = %e, "Park failed");
                        }
                    }
                }
            }
        }

        handles.push(tokio::spawn(warmup_task(
            Arc::clone(&self.engine),
            self.warmup,
            shutdown_tx.subscribe(),
        )));
        handles.push(tokio::spawn(status_task(
            Arc::clone(&self.engine),
            self.status_interval,
            shutdown_tx.subscribe(),
        )));
        info!(tasks = handles.len(), "Runtime started");
        handles
    }

    /// Run until the shutdown channel fires, then wait for the tasks to stop
    pub async fn run(self, shutdown_tx: broadcast::Sender<()>) {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handles = self.start(&shutdown_tx).await;

        let _ = shutdown_rx.recv().await;
        info!("[SHUTDOWN] Stopping runtime tasks");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Task ended abnormally");
            }
        }
        log_status(&self.engine);
        log_event(&TradingEvent::engine_shutdown());
    }
}
