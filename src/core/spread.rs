//! Spread entity: per-asset spread tracking and signal detection
//!
//! A `Spread` couples the spot and futures legs of one base asset. Price and
//! trade handlers update the legs, recompute the spread and its statistics,
//! and return the signal (if any) the engine should act on. Handlers never
//! talk to a venue.
//!
//! # Spread formula
//!
//! Entering half: `(spot.bid - futures.ask) / spot.bid * 100`
//! Exiting half:  `(spot.ask - futures.bid) / spot.ask * 100`
//!
//! Each is the spread a passive spot order plus passive futures order would
//! lock in for that half of the cycle.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::adapters::types::TradeTick;
use crate::core::order::{Leg, Order};
use crate::core::reference::{ReferenceQueue, DEFAULT_REFERENCE_CAPACITY};
use crate::core::state::{Signal, SignalEvent, SpreadState, StateCursor};
use crate::core::symbol::SymbolInfo;

/// Thresholds and fill-detection modes of a spread
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadParams {
    /// Required distance from the reference average to enter/exit (percent)
    pub rich_delta: Decimal,
    /// Distance at which a resting entry/exit order is abandoned (percent)
    pub loss_delta: Decimal,
    pub reference_capacity: usize,
    /// Optimistic fill when the book trades through our price
    pub by_price: bool,
    /// Fill from public trade prints at our price
    pub by_trade: bool,
}

impl Default for SpreadParams {
    fn default() -> Self {
        Self {
            rich_delta: dec!(0.02),
            loss_delta: dec!(0.01),
            reference_capacity: DEFAULT_REFERENCE_CAPACITY,
            by_price: true,
            by_trade: false,
        }
    }
}

/// Spot/futures pair of one base asset
#[derive(Debug, Clone)]
pub struct Spread {
    base_asset: String,
    pub spot: SymbolInfo,
    pub futures: SymbolInfo,
    cursor: StateCursor,
    min_spread: Option<Decimal>,
    max_spread: Option<Decimal>,
    curr_spread: Option<Decimal>,
    funding_rate: Decimal,
    /// Base quantity actually bought on the spot leg; sizes every later leg
    spot_order_amount: Decimal,
    enter_spread: Option<Decimal>,
    exit_spread: Option<Decimal>,
    reference: ReferenceQueue,
    pending_order: Option<Order>,
    params: SpreadParams,
    last_raised: Option<SignalEvent>,
}

impl Spread {
    pub fn new(base_asset: impl Into<String>, spot: SymbolInfo, futures: SymbolInfo, params: SpreadParams) -> Self {
        Self {
            base_asset: base_asset.into(),
            spot,
            futures,
            cursor: StateCursor::new(SpreadState::CollectInformation),
            min_spread: None,
            max_spread: None,
            curr_spread: None,
            funding_rate: Decimal::ZERO,
            spot_order_amount: Decimal::ZERO,
            enter_spread: None,
            exit_spread: None,
            reference: ReferenceQueue::new(params.reference_capacity),
            pending_order: None,
            params,
            last_raised: None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn base_asset(&self) -> &str {
        &self.base_asset
    }

    pub fn state(&self) -> SpreadState {
        self.cursor.state
    }

    pub fn cursor(&self) -> StateCursor {
        self.cursor
    }

    pub fn curr_spread(&self) -> Option<Decimal> {
        self.curr_spread
    }

    pub fn min_spread(&self) -> Option<Decimal> {
        self.min_spread
    }

    pub fn max_spread(&self) -> Option<Decimal> {
        self.max_spread
    }

    pub fn reference_average(&self) -> Option<Decimal> {
        self.reference.average()
    }

    pub fn reference_len(&self) -> usize {
        self.reference.len()
    }

    pub fn pending_order(&self) -> Option<&Order> {
        self.pending_order.as_ref()
    }

    pub fn spot_order_amount(&self) -> Decimal {
        self.spot_order_amount
    }

    pub fn enter_spread(&self) -> Option<Decimal> {
        self.enter_spread
    }

    pub fn exit_spread(&self) -> Option<Decimal> {
        self.exit_spread
    }

    pub fn funding_rate(&self) -> Decimal {
        self.funding_rate
    }

    pub fn set_funding_rate(&mut self, rate: Decimal) {
        self.funding_rate = rate;
    }

    pub fn params(&self) -> &SpreadParams {
        &self.params
    }

    // =========================================================================
    // Feed handlers
    // =========================================================================

    /// Spot book update; returns the signal to deliver, if any
    pub fn on_spot_price_update(&mut self, best_ask: Decimal, best_bid: Decimal) -> Option<SignalEvent> {
        if best_ask <= Decimal::ZERO || best_bid <= Decimal::ZERO {
            return None;
        }
        self.spot.update(best_ask, best_bid);
        self.evaluate()
    }

    /// Futures book update; returns the signal to deliver, if any
    pub fn on_futures_price_update(&mut self, best_ask: Decimal, best_bid: Decimal) -> Option<SignalEvent> {
        if best_ask <= Decimal::ZERO || best_bid <= Decimal::ZERO {
            return None;
        }
        self.futures.update(best_ask, best_bid);
        self.evaluate()
    }

    /// Public trade print on `leg`; only used when trade matching is enabled
    pub fn on_trade(&mut self, leg: Leg, trade: &TradeTick) -> Option<SignalEvent> {
        if !self.params.by_trade {
            return None;
        }
        let state = self.state();
        let order = self.pending_order.as_mut()?;
        if order.leg != leg || !order.matches_trade(trade) {
            return None;
        }
        order.apply_fill(trade.quantity);
        let filled = order.is_filled();

        let signal = match state {
            // any fill of the entering spot order is enough to start hedging
            SpreadState::SpotEnterOrderCreated => Signal::EnterOrderExecuted,
            SpreadState::FuturesEnterOrderCreated if filled => Signal::EnterOrderExecuted,
            SpreadState::FuturesExitOrderCreated | SpreadState::SpotExitOrderCreated if filled => {
                Signal::ExitOrderExecuted
            }
            _ => return None,
        };
        self.raise(signal)
    }

    /// Current spread under the formula of the active half of the cycle
    pub fn compute_spread(&self) -> Option<Decimal> {
        if !self.spot.has_prices() || !self.futures.has_prices() {
            return None;
        }
        let spread = if self.state().is_entering() {
            (self.spot.best_bid - self.futures.best_ask) / self.spot.best_bid
        } else {
            (self.spot.best_ask - self.futures.best_bid) / self.spot.best_ask
        };
        Some(spread * Decimal::ONE_HUNDRED)
    }

    fn evaluate(&mut self) -> Option<SignalEvent> {
        if self.state() == SpreadState::Parked {
            return None;
        }
        let spread = self.compute_spread()?;
        // compare against the history before this sample
        let reference = self.reference.average();

        self.curr_spread = Some(spread);
        self.min_spread = Some(self.min_spread.map_or(spread, |m| m.min(spread)));
        self.max_spread = Some(self.max_spread.map_or(spread, |m| m.max(spread)));
        self.reference.push(spread);

        let signal = self.detect(spread, reference)?;
        self.raise(signal)
    }

    fn detect(&mut self, spread: Decimal, reference: Option<Decimal>) -> Option<Signal> {
        let SpreadParams {
            rich_delta,
            loss_delta,
            by_price,
            ..
        } = self.params;

        match self.state() {
            SpreadState::CollectInformation | SpreadState::Parked => None,

            SpreadState::WaitingForNarrowSpread => {
                let avg = reference?;
                (spread < avg - rich_delta).then_some(Signal::MinSpreadReached)
            }

            SpreadState::SpotEnterOrderCreated => {
                let book = (self.spot.best_bid, self.spot.best_ask);
                let order = self.pending_order.as_mut()?;
                if by_price && order.crossed_by(book.0, book.1) {
                    order.mark_filled();
                    return Some(Signal::EnterOrderExecuted);
                }
                let avg = reference?;
                if spread > avg - loss_delta {
                    // a partial fill is hedged rather than abandoned
                    return Some(if order.has_fill() {
                        Signal::EnterOrderExecuted
                    } else {
                        Signal::MinSpreadLost
                    });
                }
                None
            }

            SpreadState::FuturesEnterOrderCreated => {
                let target = self.futures.maker_sell_price();
                let book = (self.futures.best_bid, self.futures.best_ask);
                let order = self.pending_order.as_mut()?;
                if by_price && order.crossed_by(book.0, book.1) {
                    order.mark_filled();
                    return Some(Signal::EnterOrderExecuted);
                }
                (target < order.price).then_some(Signal::MinSpreadChanged)
            }

            SpreadState::WaitingForWideSpread => {
                let avg = reference?;
                (spread > avg + rich_delta).then_some(Signal::MaxSpreadReached)
            }

            SpreadState::FuturesExitOrderCreated => {
                let book = (self.futures.best_bid, self.futures.best_ask);
                let order = self.pending_order.as_mut()?;
                if by_price && order.crossed_by(book.0, book.1) {
                    order.mark_filled();
                    return Some(Signal::ExitOrderExecuted);
                }
                let avg = reference?;
                // a partially filled cover keeps resting
                (spread < avg + loss_delta && !order.has_fill()).then_some(Signal::MaxSpreadLost)
            }

            SpreadState::SpotExitOrderCreated => {
                let target = self.spot.maker_sell_price();
                let book = (self.spot.best_bid, self.spot.best_ask);
                let order = self.pending_order.as_mut()?;
                if by_price && order.crossed_by(book.0, book.1) {
                    order.mark_filled();
                    return Some(Signal::ExitOrderExecuted);
                }
                (target < order.price).then_some(Signal::MaxSpreadChanged)
            }
        }
    }

    /// Edge-trigger: the same signal is raised at most once per cursor
    fn raise(&mut self, signal: Signal) -> Option<SignalEvent> {
        let event = SignalEvent {
            signal,
            cursor: self.cursor,
        };
        if self.last_raised == Some(event) {
            return None;
        }
        self.last_raised = Some(event);
        Some(event)
    }

    /// Human-readable one-line summary
    ///
    /// `{BASE} {bid}/{ask} | {min}<{curr}<{max}{suffix}` using the spot book.
    pub fn status_line(&self) -> String {
        fn pct(value: Option<Decimal>) -> String {
            value
                .map(|v| v.round_dp(4).normalize().to_string())
                .unwrap_or_else(|| "-".to_string())
        }
        format!(
            "{} {}/{} | {}<{}<{}{}",
            self.base_asset,
            self.spot.best_bid.normalize(),
            self.spot.best_ask.normalize(),
            pct(self.min_spread),
            pct(self.curr_spread),
            pct(self.max_spread),
            self.state().status_suffix()
        )
    }

    // =========================================================================
    // Engine-side mutation (called under the engine's transition guard)
    // =========================================================================

    /// Move to `next`, bumping the epoch; returns the new cursor
    pub(crate) fn commit(&mut self, next: SpreadState) -> StateCursor {
        self.cursor = self.cursor.advance(next);
        if !next.has_pending_order() {
            self.pending_order = None;
        }
        self.cursor
    }

    pub(crate) fn set_pending_order(&mut self, order: Order) {
        self.pending_order = Some(order);
    }

    pub(crate) fn pending_order_mut(&mut self) -> Option<&mut Order> {
        self.pending_order.as_mut()
    }

    pub(crate) fn set_spot_order_amount(&mut self, amount: Decimal) {
        self.spot_order_amount = amount;
    }

    pub(crate) fn record_enter_spread(&mut self, spread: Decimal) {
        self.enter_spread = Some(spread);
        self.exit_spread = None;
    }

    pub(crate) fn record_exit_spread(&mut self, spread: Decimal) {
        self.exit_spread = Some(spread);
    }

    /// Forget the position sizing after a cycle completes
    pub(crate) fn close_position(&mut self) {
        self.spot_order_amount = Decimal::ZERO;
    }

    /// Drop the reference history and extrema (phase switch)
    pub(crate) fn reset_statistics(&mut self) {
        self.reference.clear();
        self.min_spread = None;
        self.max_spread = None;
        self.curr_spread = None;
    }
}
