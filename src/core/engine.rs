//! Spread engine: guarded transitions and order lifecycle
//!
//! The engine owns every `Spread` and the venues they trade on. Feed
//! handlers update a spread and get back an optional `SignalEvent`; the
//! engine then runs the matching transition through `apply`.
//!
//! # Concurrency
//!
//! Each spread lives in a slot with two locks:
//! - a short `parking_lot::Mutex<Spread>` for market data, never held across `.await`
//! - a `tokio::sync::Mutex<SlotControl>` transition guard, held for the whole
//!   transition including venue calls
//!
//! `apply` takes the guard, checks the event's cursor against the spread's
//! current cursor and only then performs the side effect and commits. Any
//! event raised against an older cursor is rejected without side effects, so
//! concurrent fill signals from price-cross and trade-match produce exactly
//! one transition.
//!
//! Fills inferred from the book or the trade tape only raise signals. Every
//! settle and cancel asks the venue for the order's status and acts on the
//! reported quantity alone.
//!
//! Cross-asset capital limits are an optional admission semaphore: a permit
//! is taken when an entering spot order is placed and returned when the
//! cycle closes or the entry is abandoned.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::traits::{MarketDataFeed, OrderGateway};
use crate::adapters::types::{
    BookTicker, LimitOrderRequest, OrderReport, OrderSide, OrderStatus, TradeStream, TradeTick,
};
use crate::config::constants;
use crate::core::events::{log_event, TradingEvent};
use crate::core::order::{Leg, Order};
use crate::core::spread::{Spread, SpreadParams};
use crate::core::state::{transition_for, Action, Signal, SignalEvent, SpreadState};
use crate::core::symbol::SymbolInfo;
use crate::error::EngineError;

// =============================================================================
// Public types
// =============================================================================

/// Engine-wide parameters
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub spread_params: SpreadParams,
    /// Quote amount committed to one entering spot order
    pub order_notional: Decimal,
    /// Limit on concurrently open positions across all spreads
    pub max_open_positions: Option<usize>,
}

/// Gateway and optional market data of one venue
#[derive(Clone)]
pub struct Venue {
    pub gateway: Arc<dyn OrderGateway>,
    pub feed: Option<Arc<dyn MarketDataFeed>>,
}

impl Venue {
    pub fn new(gateway: Arc<dyn OrderGateway>) -> Self {
        Self { gateway, feed: None }
    }

    pub fn with_feed(mut self, feed: Arc<dyn MarketDataFeed>) -> Self {
        self.feed = Some(feed);
        self
    }
}

/// Result of a guarded transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The edge ran and the spread moved to `to`
    Committed { from: SpreadState, to: SpreadState },
    /// The event's cursor is outdated or the signal has no edge from the current state
    Stale,
    /// The side effect could not be performed; the spread stays in its waiting state
    Aborted { reason: String },
    /// Unrecoverable failure; the spread no longer trades
    Parked { reason: String },
}

impl TransitionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TransitionOutcome::Committed { .. })
    }
}

// =============================================================================
// Slots
// =============================================================================

#[derive(Default)]
struct SlotControl {
    permit: Option<OwnedSemaphorePermit>,
    trade_watch: Option<CancellationToken>,
}

impl SlotControl {
    fn stop_trade_watch(&mut self) {
        if let Some(token) = self.trade_watch.take() {
            token.cancel();
        }
    }
}

struct SpreadSlot {
    spread: Mutex<Spread>,
    control: tokio::sync::Mutex<SlotControl>,
}

/// Percentage gap between two leg prices: `(a - b) / b * 100`
fn leg_spread(a: Decimal, b: Decimal) -> Decimal {
    if b.is_zero() {
        return Decimal::ZERO;
    }
    (a - b) / b * Decimal::ONE_HUNDRED
}

async fn venue_call<T>(fut: impl Future<Output = ExchangeResult<T>>) -> ExchangeResult<T> {
    let timeout = constants::venue_call_timeout();
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ExchangeError::NetworkTimeout(timeout.as_millis() as u64)),
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Orchestrates every tracked spread
pub struct SpreadEngine {
    slots: BTreeMap<String, Arc<SpreadSlot>>,
    venues: HashMap<String, Venue>,
    admission: Option<Arc<Semaphore>>,
    profit_total: Mutex<Decimal>,
    settings: EngineSettings,
}

impl SpreadEngine {
    /// Build the engine; every leg must reference a known venue
    pub fn new(
        settings: EngineSettings,
        venues: HashMap<String, Venue>,
        spreads: Vec<Spread>,
    ) -> Result<Self, EngineError> {
        let mut slots = BTreeMap::new();
        for spread in spreads {
            for venue in [&spread.spot.exchange_id, &spread.futures.exchange_id] {
                if !venues.contains_key(venue) {
                    return Err(EngineError::VenueMissing(venue.clone()));
                }
            }
            let slot = SpreadSlot {
                spread: Mutex::new(spread),
                control: tokio::sync::Mutex::new(SlotControl::default()),
            };
            let key = slot.spread.lock().base_asset().to_string();
            slots.insert(key, Arc::new(slot));
        }

        Ok(Self {
            slots,
            venues,
            admission: settings
                .max_open_positions
                .map(|n| Arc::new(Semaphore::new(n))),
            profit_total: Mutex::new(Decimal::ZERO),
            settings,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn bases(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn venue(&self, id: &str) -> Option<&Venue> {
        self.venues.get(id)
    }

    /// Realized profit of all closed cycles, in quote units
    pub fn profit_total(&self) -> Decimal {
        *self.profit_total.lock()
    }

    /// Free admission permits, `None` when unlimited
    pub fn available_permits(&self) -> Option<usize> {
        self.admission.as_ref().map(|s| s.available_permits())
    }

    /// Copy of a spread's current data
    pub fn snapshot(&self, base: &str) -> Option<Spread> {
        self.slots.get(base).map(|slot| slot.spread.lock().clone())
    }

    pub fn state_of(&self, base: &str) -> Option<SpreadState> {
        self.slots.get(base).map(|slot| slot.spread.lock().state())
    }

    /// Status line of every spread, ordered by base asset
    pub fn status_lines(&self) -> Vec<String> {
        self.slots
            .values()
            .map(|slot| slot.spread.lock().status_line())
            .collect()
    }

    fn slot(&self, base: &str) -> Result<Arc<SpreadSlot>, EngineError> {
        self.slots
            .get(base)
            .cloned()
            .ok_or_else(|| EngineError::UnknownAsset(base.to_string()))
    }

    fn gateway(&self, venue: &str) -> Result<Arc<dyn OrderGateway>, EngineError> {
        self.venues
            .get(venue)
            .map(|v| Arc::clone(&v.gateway))
            .ok_or_else(|| EngineError::VenueMissing(venue.to_string()))
    }

    // =========================================================================
    // Feed entry points
    // =========================================================================

    /// Apply a spot book update and return the raised signal without dispatching it
    pub fn on_spot_price_update(
        &self,
        base: &str,
        best_ask: Decimal,
        best_bid: Decimal,
    ) -> Result<Option<SignalEvent>, EngineError> {
        let slot = self.slot(base)?;
        let event = slot.spread.lock().on_spot_price_update(best_ask, best_bid);
        Ok(event)
    }

    /// Apply a futures book update and return the raised signal without dispatching it
    pub fn on_futures_price_update(
        &self,
        base: &str,
        best_ask: Decimal,
        best_bid: Decimal,
    ) -> Result<Option<SignalEvent>, EngineError> {
        let slot = self.slot(base)?;
        let event = slot.spread.lock().on_futures_price_update(best_ask, best_bid);
        Ok(event)
    }

    /// Apply a public trade print and return the raised signal without dispatching it
    pub fn on_trade(&self, base: &str, leg: Leg, trade: &TradeTick) -> Result<Option<SignalEvent>, EngineError> {
        let slot = self.slot(base)?;
        let event = slot.spread.lock().on_trade(leg, trade);
        Ok(event)
    }

    /// Feed handler: spot book update, transition runs in the background
    pub fn handle_spot_ticker(self: &Arc<Self>, base: &str, ticker: BookTicker) {
        if let Ok(Some(event)) = self.on_spot_price_update(base, ticker.best_ask, ticker.best_bid) {
            self.dispatch(base, event);
        }
    }

    /// Feed handler: futures book update, transition runs in the background
    pub fn handle_futures_ticker(self: &Arc<Self>, base: &str, ticker: BookTicker) {
        if let Ok(Some(event)) = self.on_futures_price_update(base, ticker.best_ask, ticker.best_bid) {
            self.dispatch(base, event);
        }
    }

    /// Feed handler: trade print, transition runs in the background
    pub fn handle_trade(self: &Arc<Self>, base: &str, leg: Leg, trade: TradeTick) {
        if let Ok(Some(event)) = self.on_trade(base, leg, &trade) {
            self.dispatch(base, event);
        }
    }

    fn dispatch(self: &Arc<Self>, base: &str, event: SignalEvent) {
        let market = self
            .slots
            .get(base)
            .map(|slot| {
                let spread = slot.spread.lock();
                (spread.curr_spread(), spread.reference_average())
            })
            .unwrap_or((None, None));
        log_event(
            &TradingEvent::signal_raised(base, event.signal, event.cursor.state)
                .with_market(market.0, market.1),
        );

        let engine = Arc::clone(self);
        let base = base.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.apply(&base, event).await {
                warn!(base = %base, error = %e, "Transition failed");
            }
        });
    }

    /// End the warm-up of every spread still collecting information
    pub async fn finish_warmup(self: &Arc<Self>) -> Vec<(String, TransitionOutcome)> {
        let mut outcomes = Vec::new();
        for (base, slot) in &self.slots {
            let cursor = slot.spread.lock().cursor();
            if cursor.state != SpreadState::CollectInformation {
                continue;
            }
            let event = SignalEvent {
                signal: Signal::WarmupElapsed,
                cursor,
            };
            if let Ok(outcome) = self.apply(base, event).await {
                outcomes.push((base.clone(), outcome));
            }
        }
        outcomes
    }

    // =========================================================================
    // Guarded transition
    // =========================================================================

    /// Run the transition for `event` if its cursor is still current
    pub async fn apply(self: &Arc<Self>, base: &str, event: SignalEvent) -> Result<TransitionOutcome, EngineError> {
        let slot = self.slot(base)?;
        let mut control = slot.control.lock().await;

        let (transition, spread_now, reference) = {
            let spread = slot.spread.lock();
            let market = (spread.curr_spread(), spread.reference_average());
            if spread.cursor() != event.cursor {
                log_event(
                    &TradingEvent::transition_rejected(base, event.signal, spread.state(), "stale cursor")
                        .with_market(market.0, market.1),
                );
                return Ok(TransitionOutcome::Stale);
            }
            match transition_for(spread.state(), event.signal) {
                Some(t) => (t, market.0, market.1),
                None => {
                    log_event(
                        &TradingEvent::transition_rejected(base, event.signal, spread.state(), "no edge")
                            .with_market(market.0, market.1),
                    );
                    return Ok(TransitionOutcome::Stale);
                }
            }
        };

        debug!(
            base = %base,
            signal = %event.signal,
            action = ?transition.action,
            spread = ?spread_now,
            reference = ?reference,
            "Applying transition"
        );

        let signal = event.signal;
        let outcome = match transition.action {
            Action::FinishWarmup => self.commit(&slot, signal, transition.next, |_| {}),
            Action::PlaceSpotEnter => self.place_spot_enter(&slot, &mut control, signal).await,
            Action::CancelSpotEnter => self.cancel_spot_enter(&slot, &mut control, signal).await,
            Action::SettleSpotEnter => self.settle_spot_enter(&slot, &mut control, signal).await,
            Action::RepriceFuturesEnter => self.reprice(&slot, &mut control, signal).await,
            Action::SettleFuturesEnter => self.settle_futures_enter(&slot, &mut control, signal).await,
            Action::PlaceFuturesExit => self.place_futures_exit(&slot, &mut control, signal).await,
            Action::CancelFuturesExit => self.cancel_futures_exit(&slot, &mut control, signal).await,
            Action::SettleFuturesExit => self.settle_futures_exit(&slot, &mut control, signal).await,
            Action::RepriceSpotExit => self.reprice(&slot, &mut control, signal).await,
            Action::SettleSpotExit => self.settle_spot_exit(&slot, &mut control, signal).await,
        };
        Ok(outcome)
    }

    /// Park a spread after a fatal error outside a transition (e.g. its feed died)
    pub async fn park(self: &Arc<Self>, base: &str, reason: &str) -> Result<TransitionOutcome, EngineError> {
        let slot = self.slot(base)?;
        let mut control = slot.control.lock().await;
        if slot.spread.lock().state() == SpreadState::Parked {
            return Ok(TransitionOutcome::Stale);
        }
        Ok(self.park_locked(&slot, &mut control, reason).await)
    }

    // =========================================================================
    // Commit helpers
    // =========================================================================

    fn commit(
        &self,
        slot: &SpreadSlot,
        signal: Signal,
        to: SpreadState,
        update: impl FnOnce(&mut Spread),
    ) -> TransitionOutcome {
        let mut spread = slot.spread.lock();
        let from = spread.state();
        update(&mut *spread);
        spread.commit(to);
        log_event(
            &TradingEvent::transition_committed(spread.base_asset(), signal, from, to)
                .with_market(spread.curr_spread(), spread.reference_average()),
        );
        TransitionOutcome::Committed { from, to }
    }

    /// Stay in the current state with a fresh cursor so the trigger can re-arm
    fn abort(&self, slot: &SpreadSlot, signal: Signal, reason: &str) -> TransitionOutcome {
        let mut spread = slot.spread.lock();
        let state = spread.state();
        spread.commit(state);
        warn!(
            base = %spread.base_asset(),
            signal = %signal,
            state = %state,
            reason = %reason,
            spread = ?spread.curr_spread(),
            reference = ?spread.reference_average(),
            "[TRADE] Transition aborted"
        );
        TransitionOutcome::Aborted {
            reason: reason.to_string(),
        }
    }

    async fn park_locked(&self, slot: &SpreadSlot, control: &mut SlotControl, reason: &str) -> TransitionOutcome {
        control.stop_trade_watch();

        let (base, state, pending) = {
            let spread = slot.spread.lock();
            (
                spread.base_asset().to_string(),
                spread.state(),
                spread.pending_order().cloned(),
            )
        };

        if let Some(order) = &pending {
            if let Ok(gateway) = self.gateway(&order.handle.venue) {
                match venue_call(gateway.cancel_order(&order.handle)).await {
                    Ok(()) => log_event(&TradingEvent::order_cancelled(
                        &base,
                        &order.handle.venue,
                        &order.handle.order_id,
                    )),
                    Err(e) => warn!(base = %base, order = %order.handle, error = %e, "Cancel on park failed"),
                }
            }
        }

        // capital stays reserved while inventory is held
        let flat = match state {
            SpreadState::CollectInformation | SpreadState::WaitingForNarrowSpread => true,
            SpreadState::SpotEnterOrderCreated => pending.as_ref().map_or(true, |o| !o.has_fill()),
            _ => false,
        };
        if flat {
            control.permit = None;
        }

        let market = {
            let mut spread = slot.spread.lock();
            spread.commit(SpreadState::Parked);
            (spread.curr_spread(), spread.reference_average())
        };
        log_event(&TradingEvent::spread_parked(&base, state, reason).with_market(market.0, market.1));
        TransitionOutcome::Parked {
            reason: reason.to_string(),
        }
    }

    // =========================================================================
    // Trade watch
    // =========================================================================

    async fn start_trade_watch(self: &Arc<Self>, base: &str, control: &mut SlotControl, leg: Leg, info: &SymbolInfo) {
        control.stop_trade_watch();
        if !self.settings.spread_params.by_trade {
            return;
        }
        let Some(feed) = self.venues.get(&info.exchange_id).and_then(|v| v.feed.clone()) else {
            return;
        };
        match feed.subscribe_trades(&info.symbol).await {
            Ok(stream) => {
                control.trade_watch = Some(stream.cancel.clone());
                tokio::spawn(watch_trades(Arc::clone(self), base.to_string(), leg, stream));
            }
            Err(e) => {
                warn!(base = %base, leg = %leg, error = %e, "Trade subscription failed, relying on price cross");
            }
        }
    }

    // =========================================================================
    // Actions
    // =========================================================================

    async fn entry_quantity(&self, gateway: &dyn OrderGateway, spot: &SymbolInfo, price: Decimal) -> Result<Decimal, EngineError> {
        if price <= Decimal::ZERO {
            return Err(EngineError::Sizing("no valid spot price".to_string()));
        }
        let balance = venue_call(gateway.available_balance(&spot.quote_asset)).await?;
        let budget = self.settings.order_notional.min(balance);
        let quantity = spot.floor_quantity(budget / price);
        let notional = quantity * price;
        if quantity <= Decimal::ZERO || notional < spot.min_notional {
            return Err(EngineError::Sizing(format!(
                "notional {} below minimum {} (available {} {})",
                notional, spot.min_notional, balance, spot.quote_asset
            )));
        }
        Ok(quantity)
    }

    async fn place_spot_enter(self: &Arc<Self>, slot: &SpreadSlot, control: &mut SlotControl, signal: Signal) -> TransitionOutcome {
        let (base, spot) = {
            let spread = slot.spread.lock();
            (spread.base_asset().to_string(), spread.spot.clone())
        };

        let permit = match &self.admission {
            Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => return self.abort(slot, signal, "admission limit reached"),
            },
            None => None,
        };

        let gateway = match self.gateway(&spot.exchange_id) {
            Ok(g) => g,
            Err(e) => return self.abort(slot, signal, &e.to_string()),
        };
        let price = spot.maker_buy_price();
        let quantity = match self.entry_quantity(gateway.as_ref(), &spot, price).await {
            Ok(q) => q,
            Err(e) => return self.abort(slot, signal, &e.to_string()),
        };

        let request = LimitOrderRequest::new(spot.symbol.clone(), OrderSide::Buy, quantity, price);
        let handle = match venue_call(gateway.place_limit_order(request)).await {
            Ok(h) => h,
            Err(e) => return self.abort(slot, signal, &e.to_string()),
        };
        log_event(&TradingEvent::order_placed(
            &base,
            &handle.venue,
            &handle.order_id,
            OrderSide::Buy,
            price,
            quantity,
        ));

        control.permit = permit;
        let order = Order::new(handle, Leg::Spot, OrderSide::Buy, price, quantity);
        let outcome = self.commit(slot, signal, SpreadState::SpotEnterOrderCreated, |s| {
            s.set_pending_order(order)
        });
        self.start_trade_watch(&base, control, Leg::Spot, &spot).await;
        outcome
    }

    async fn cancel_spot_enter(self: &Arc<Self>, slot: &SpreadSlot, control: &mut SlotControl, signal: Signal) -> TransitionOutcome {
        let (base, pending) = {
            let spread = slot.spread.lock();
            (spread.base_asset().to_string(), spread.pending_order().cloned())
        };
        let Some(order) = pending else {
            return self.abort(slot, signal, "no pending spot order");
        };
        let gateway = match self.gateway(&order.handle.venue) {
            Ok(g) => g,
            Err(e) => return self.park_locked(slot, control, &e.to_string()).await,
        };

        match venue_call(gateway.cancel_order(&order.handle)).await {
            Ok(()) => log_event(&TradingEvent::order_cancelled(&base, &order.handle.venue, &order.handle.order_id)),
            // filled or cancelled on the venue before our cancel landed
            Err(e) if e.is_order_terminated() => {}
            Err(e) => return self.park_locked(slot, control, &format!("spot cancel failed: {}", e)).await,
        }

        // only the venue's figure is hedged, never a fill inferred from the book
        match venue_call(gateway.query_order(&order.handle)).await {
            Ok(report) => self.hedge_spot_fill(slot, control, signal, &report).await,
            Err(e) => self.park_locked(slot, control, &format!("spot order status unknown: {}", e)).await,
        }
    }

    /// Apply a venue report to the pending order; returns the updated order
    fn confirm_pending(&self, slot: &SpreadSlot, report: &OrderReport) -> Option<Order> {
        let mut spread = slot.spread.lock();
        let order = spread.pending_order_mut()?;
        order.confirm(report);
        Some(order.clone())
    }

    /// Check a fill inferred from the market against the venue before acting on it
    ///
    /// `Ok` carries the order once the venue reports it filled. An order that
    /// is still resting keeps being tracked with its confirmed fill; an order
    /// the venue cancelled parks the spread.
    async fn confirm_complete(
        &self,
        slot: &SpreadSlot,
        control: &mut SlotControl,
        signal: Signal,
        order: &Order,
    ) -> Result<Order, TransitionOutcome> {
        if order.confirmed_filled >= order.amount {
            return Ok(order.clone());
        }
        let gateway = match self.gateway(&order.handle.venue) {
            Ok(g) => g,
            Err(e) => return Err(self.park_locked(slot, control, &e.to_string()).await),
        };
        let report = match venue_call(gateway.query_order(&order.handle)).await {
            Ok(report) => report,
            Err(e) => return Err(self.abort(slot, signal, &format!("fill unconfirmed: {}", e))),
        };
        let confirmed = self.confirm_pending(slot, &report).unwrap_or_else(|| order.clone());

        match report.status {
            OrderStatus::Filled => Ok(confirmed),
            OrderStatus::Open => Err(self.abort(
                slot,
                signal,
                &format!(
                    "venue reports {} of {} filled, order still resting",
                    confirmed.confirmed_filled, confirmed.amount
                ),
            )),
            OrderStatus::Cancelled => Err(self
                .park_locked(
                    slot,
                    control,
                    &format!("order {} cancelled by venue with {} filled", order.handle, confirmed.confirmed_filled),
                )
                .await),
        }
    }

    /// Spot entry seen executed: hedge whatever the venue confirms
    async fn settle_spot_enter(self: &Arc<Self>, slot: &SpreadSlot, control: &mut SlotControl, signal: Signal) -> TransitionOutcome {
        let (base, pending) = {
            let spread = slot.spread.lock();
            (spread.base_asset().to_string(), spread.pending_order().cloned())
        };
        let Some(order) = pending else {
            return self.abort(slot, signal, "no pending spot order");
        };
        let gateway = match self.gateway(&order.handle.venue) {
            Ok(g) => g,
            Err(e) => return self.park_locked(slot, control, &e.to_string()).await,
        };

        let report = match venue_call(gateway.query_order(&order.handle)).await {
            Ok(report) => report,
            Err(e) => return self.abort(slot, signal, &format!("spot fill unconfirmed: {}", e)),
        };
        if report.status != OrderStatus::Open {
            return self.hedge_spot_fill(slot, control, signal, &report).await;
        }
        if report.filled_quantity.is_zero() {
            self.confirm_pending(slot, &report);
            return self.abort(slot, signal, "venue reports no spot fill, order still resting");
        }

        // partially executed: pull the remainder before hedging
        match venue_call(gateway.cancel_order(&order.handle)).await {
            Ok(()) => log_event(&TradingEvent::order_cancelled(&base, &order.handle.venue, &order.handle.order_id)),
            Err(e) if e.is_order_terminated() => {}
            Err(e) => return self.abort(slot, signal, &format!("cancel of spot remainder failed: {}", e)),
        }
        match venue_call(gateway.query_order(&order.handle)).await {
            Ok(report) => self.hedge_spot_fill(slot, control, signal, &report).await,
            Err(e) => self.park_locked(slot, control, &format!("spot order status unknown: {}", e)).await,
        }
    }

    /// Hedge the confirmed spot fill on futures, or stand down when nothing executed
    async fn hedge_spot_fill(
        self: &Arc<Self>,
        slot: &SpreadSlot,
        control: &mut SlotControl,
        signal: Signal,
        report: &OrderReport,
    ) -> TransitionOutcome {
        let Some(order) = self.confirm_pending(slot, report) else {
            return self.abort(slot, signal, "no pending spot order");
        };
        let base = slot.spread.lock().base_asset().to_string();
        let filled = order.confirmed_filled;
        if filled.is_zero() {
            control.stop_trade_watch();
            control.permit = None;
            return self.commit(slot, signal, SpreadState::WaitingForNarrowSpread, |_| {});
        }
        log_event(&TradingEvent::order_filled(&base, &order.handle.venue, &order.handle.order_id, order.price, filled));

        let futures = slot.spread.lock().futures.clone();
        let quantity = futures.floor_quantity(filled);
        if quantity <= Decimal::ZERO {
            return self
                .park_locked(slot, control, &format!("spot fill {} below futures lot size", filled))
                .await;
        }
        let gateway = match self.gateway(&futures.exchange_id) {
            Ok(g) => g,
            Err(e) => return self.park_locked(slot, control, &e.to_string()).await,
        };
        let price = futures.maker_sell_price();
        let request = LimitOrderRequest::new(futures.symbol.clone(), OrderSide::Sell, quantity, price);
        let handle = match venue_call(gateway.place_limit_order(request)).await {
            Ok(h) => h,
            Err(e) => return self.park_locked(slot, control, &format!("futures hedge failed: {}", e)).await,
        };
        log_event(&TradingEvent::order_placed(&base, &handle.venue, &handle.order_id, OrderSide::Sell, price, quantity));

        let hedge = Order::new(handle, Leg::Futures, OrderSide::Sell, price, quantity);
        let outcome = self.commit(slot, signal, SpreadState::FuturesEnterOrderCreated, |s| {
            s.spot.enter_price = order.price;
            s.set_spot_order_amount(filled);
            s.set_pending_order(hedge);
        });
        self.start_trade_watch(&base, control, Leg::Futures, &futures).await;
        outcome
    }

    /// Replace a resting hedge order at the current passive price
    async fn reprice(self: &Arc<Self>, slot: &SpreadSlot, control: &mut SlotControl, signal: Signal) -> TransitionOutcome {
        let (base, state, pending, info) = {
            let spread = slot.spread.lock();
            let pending = spread.pending_order().cloned();
            let info = match pending.as_ref().map(|o| o.leg) {
                Some(Leg::Futures) => spread.futures.clone(),
                _ => spread.spot.clone(),
            };
            (spread.base_asset().to_string(), spread.state(), pending, info)
        };
        let Some(order) = pending else {
            return self.abort(slot, signal, "no pending order to reprice");
        };

        let price = if order.is_buyer() {
            info.maker_buy_price()
        } else {
            info.maker_sell_price()
        };
        if price == order.price {
            return self.commit(slot, signal, state, |_| {});
        }

        let gateway = match self.gateway(&order.handle.venue) {
            Ok(g) => g,
            Err(e) => return self.park_locked(slot, control, &e.to_string()).await,
        };
        let remaining = order.remaining();

        match venue_call(gateway.replace_order(&order.handle, remaining, price)).await {
            Ok(handle) => {
                log_event(&TradingEvent::order_replaced(&base, &handle.venue, &handle.order_id, price, remaining));
                self.commit(slot, signal, state, |s| {
                    if let Some(o) = s.pending_order_mut() {
                        o.handle = handle;
                        o.price = price;
                    }
                })
            }
            Err(e) if e.is_order_terminated() => {
                // the order left the book before we could move it: ask once what happened
                let report = venue_call(gateway.query_order(&order.handle)).await;
                match report {
                    Ok(report) if report.status == OrderStatus::Filled => {
                        self.confirm_pending(slot, &report);
                        match state {
                            SpreadState::FuturesEnterOrderCreated => self.settle_futures_enter(slot, control, signal).await,
                            _ => self.settle_spot_exit(slot, control, signal).await,
                        }
                    }
                    Ok(report) => {
                        self.park_locked(
                            slot,
                            control,
                            &format!("order {} terminated as {:?}", order.handle, report.status),
                        )
                        .await
                    }
                    Err(query_err) => {
                        self.park_locked(slot, control, &format!("replace failed ({}), status unknown: {}", e, query_err))
                            .await
                    }
                }
            }
            Err(e) => self.abort(slot, signal, &format!("replace failed: {}", e)),
        }
    }

    async fn settle_futures_enter(&self, slot: &SpreadSlot, control: &mut SlotControl, signal: Signal) -> TransitionOutcome {
        let (base, pending, spot_enter, amount) = {
            let spread = slot.spread.lock();
            (
                spread.base_asset().to_string(),
                spread.pending_order().cloned(),
                spread.spot.enter_price,
                spread.spot_order_amount(),
            )
        };
        let Some(order) = pending else {
            return self.abort(slot, signal, "no pending futures order");
        };
        let order = match self.confirm_complete(slot, control, signal, &order).await {
            Ok(order) => order,
            Err(outcome) => return outcome,
        };
        let enter_spread = leg_spread(spot_enter, order.price);

        log_event(&TradingEvent::order_filled(&base, &order.handle.venue, &order.handle.order_id, order.price, order.amount));
        control.stop_trade_watch();
        let outcome = self.commit(slot, signal, SpreadState::WaitingForWideSpread, |s| {
            s.futures.enter_price = order.price;
            s.record_enter_spread(enter_spread);
            s.reset_statistics();
        });
        log_event(&TradingEvent::position_opened(&base, enter_spread, amount));
        outcome
    }

    async fn place_futures_exit(self: &Arc<Self>, slot: &SpreadSlot, control: &mut SlotControl, signal: Signal) -> TransitionOutcome {
        let (base, futures, amount) = {
            let spread = slot.spread.lock();
            (
                spread.base_asset().to_string(),
                spread.futures.clone(),
                spread.spot_order_amount(),
            )
        };
        let quantity = futures.floor_quantity(amount);
        if quantity <= Decimal::ZERO {
            return self.abort(slot, signal, "no position to cover");
        }
        let gateway = match self.gateway(&futures.exchange_id) {
            Ok(g) => g,
            Err(e) => return self.abort(slot, signal, &e.to_string()),
        };
        let price = futures.maker_buy_price();
        let request = LimitOrderRequest::new(futures.symbol.clone(), OrderSide::Buy, quantity, price);
        let handle = match venue_call(gateway.place_limit_order(request)).await {
            Ok(h) => h,
            Err(e) => return self.abort(slot, signal, &format!("futures cover failed: {}", e)),
        };
        log_event(&TradingEvent::order_placed(&base, &handle.venue, &handle.order_id, OrderSide::Buy, price, quantity));

        let order = Order::new(handle, Leg::Futures, OrderSide::Buy, price, quantity);
        let outcome = self.commit(slot, signal, SpreadState::FuturesExitOrderCreated, |s| {
            s.set_pending_order(order)
        });
        self.start_trade_watch(&base, control, Leg::Futures, &futures).await;
        outcome
    }

    async fn cancel_futures_exit(self: &Arc<Self>, slot: &SpreadSlot, control: &mut SlotControl, signal: Signal) -> TransitionOutcome {
        let (base, pending) = {
            let spread = slot.spread.lock();
            (spread.base_asset().to_string(), spread.pending_order().cloned())
        };
        let Some(order) = pending else {
            return self.abort(slot, signal, "no pending futures order");
        };
        if order.has_fill() {
            return self.abort(slot, signal, "cover partially filled, keeping it");
        }
        let gateway = match self.gateway(&order.handle.venue) {
            Ok(g) => g,
            Err(e) => return self.park_locked(slot, control, &e.to_string()).await,
        };

        match venue_call(gateway.cancel_order(&order.handle)).await {
            Ok(()) => log_event(&TradingEvent::order_cancelled(&base, &order.handle.venue, &order.handle.order_id)),
            Err(e) if e.is_order_terminated() => {}
            Err(e) => return self.park_locked(slot, control, &format!("futures cancel failed: {}", e)).await,
        }

        let report = match venue_call(gateway.query_order(&order.handle)).await {
            Ok(report) => report,
            Err(e) => return self.park_locked(slot, control, &format!("cover status unknown: {}", e)).await,
        };
        let confirmed = self
            .confirm_pending(slot, &report)
            .map_or(Decimal::ZERO, |o| o.confirmed_filled);
        if report.status == OrderStatus::Filled {
            return self.settle_futures_exit(slot, control, signal).await;
        }
        if confirmed.is_zero() {
            control.stop_trade_watch();
            return self.commit(slot, signal, SpreadState::WaitingForWideSpread, |_| {});
        }
        self.park_locked(slot, control, &format!("cover cancelled after partial fill {}", confirmed))
            .await
    }

    async fn settle_futures_exit(self: &Arc<Self>, slot: &SpreadSlot, control: &mut SlotControl, signal: Signal) -> TransitionOutcome {
        let (base, pending, spot, amount) = {
            let spread = slot.spread.lock();
            (
                spread.base_asset().to_string(),
                spread.pending_order().cloned(),
                spread.spot.clone(),
                spread.spot_order_amount(),
            )
        };
        let Some(cover) = pending else {
            return self.abort(slot, signal, "no pending futures order");
        };
        let cover = match self.confirm_complete(slot, control, signal, &cover).await {
            Ok(order) => order,
            Err(outcome) => return outcome,
        };
        log_event(&TradingEvent::order_filled(&base, &cover.handle.venue, &cover.handle.order_id, cover.price, cover.amount));

        let quantity = spot.floor_quantity(amount);
        let gateway = match self.gateway(&spot.exchange_id) {
            Ok(g) => g,
            Err(e) => return self.park_locked(slot, control, &e.to_string()).await,
        };
        let price = spot.maker_sell_price();
        let request = LimitOrderRequest::new(spot.symbol.clone(), OrderSide::Sell, quantity, price);
        let handle = match venue_call(gateway.place_limit_order(request)).await {
            Ok(h) => h,
            Err(e) => return self.park_locked(slot, control, &format!("spot exit failed: {}", e)).await,
        };
        log_event(&TradingEvent::order_placed(&base, &handle.venue, &handle.order_id, OrderSide::Sell, price, quantity));

        let order = Order::new(handle, Leg::Spot, OrderSide::Sell, price, quantity);
        let outcome = self.commit(slot, signal, SpreadState::SpotExitOrderCreated, |s| {
            s.futures.exit_price = cover.price;
            s.set_pending_order(order);
        });
        self.start_trade_watch(&base, control, Leg::Spot, &spot).await;
        outcome
    }

    async fn settle_spot_exit(&self, slot: &SpreadSlot, control: &mut SlotControl, signal: Signal) -> TransitionOutcome {
        let (base, pending, futures_exit, enter_spread, amount) = {
            let spread = slot.spread.lock();
            (
                spread.base_asset().to_string(),
                spread.pending_order().cloned(),
                spread.futures.exit_price,
                spread.enter_spread().unwrap_or(Decimal::ZERO),
                spread.spot_order_amount(),
            )
        };
        let Some(order) = pending else {
            return self.abort(slot, signal, "no pending spot order");
        };
        let order = match self.confirm_complete(slot, control, signal, &order).await {
            Ok(order) => order,
            Err(outcome) => return outcome,
        };
        log_event(&TradingEvent::order_filled(&base, &order.handle.venue, &order.handle.order_id, order.price, order.amount));

        let exit_spread = leg_spread(order.price, futures_exit);
        let profit = amount * (exit_spread - enter_spread) / Decimal::ONE_HUNDRED;
        let total = {
            let mut total = self.profit_total.lock();
            *total += profit;
            *total
        };

        control.stop_trade_watch();
        control.permit = None;
        let outcome = self.commit(slot, signal, SpreadState::WaitingForNarrowSpread, |s| {
            s.spot.exit_price = order.price;
            s.record_exit_spread(exit_spread);
            s.close_position();
            s.reset_statistics();
        });
        log_event(&TradingEvent::position_closed(&base, enter_spread, exit_spread, amount, profit));
        info!(base = %base, profit = %profit, profit_total = %total, "[TRADE] Cycle closed");
        outcome
    }
}

async fn watch_trades(engine: Arc<SpreadEngine>, base: String, leg: Leg, stream: TradeStream) {
    let TradeStream { mut receiver, cancel } = stream;
    loop {
        let trade = tokio::select! {
            _ = cancel.cancelled() => break,
            trade = receiver.recv() => trade,
        };
        match trade {
            Some(trade) => engine.handle_trade(&base, leg, trade),
            None => break,
        }
    }
    debug!(base = %base, leg = %leg, "Trade watch ended");
}
