//! Trading event system
//!
//! Structured event types for logging every decision the engine takes.
//! Each event carries the spread and reference average at the moment of the
//! decision so entry/exit timing can be audited afterwards.
//!
//! # Example
//!
//! ```ignore
//! use crate::core::events::{log_event, TradingEvent};
//!
//! log_event(&TradingEvent::position_opened("BTC", enter_spread, quantity));
//! ```

use rust_decimal::Decimal;
use std::fmt;
use tracing::{debug, info, warn};

use crate::adapters::types::OrderSide;
use crate::core::state::{Signal, SpreadState};

/// Trading event types for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingEventType {
    // Decision events
    SignalRaised,
    TransitionCommitted,
    TransitionRejected,

    // Order events
    OrderPlaced,
    OrderReplaced,
    OrderCancelled,
    OrderFilled,

    // Position events
    PositionOpened,
    PositionClosed,
    SpreadParked,

    // System events
    EngineStarted,
    EngineShutdown,
}

impl fmt::Display for TradingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingEventType::SignalRaised => write!(f, "SIGNAL_RAISED"),
            TradingEventType::TransitionCommitted => write!(f, "TRANSITION_COMMITTED"),
            TradingEventType::TransitionRejected => write!(f, "TRANSITION_REJECTED"),
            TradingEventType::OrderPlaced => write!(f, "ORDER_PLACED"),
            TradingEventType::OrderReplaced => write!(f, "ORDER_REPLACED"),
            TradingEventType::OrderCancelled => write!(f, "ORDER_CANCELLED"),
            TradingEventType::OrderFilled => write!(f, "ORDER_FILLED"),
            TradingEventType::PositionOpened => write!(f, "POSITION_OPENED"),
            TradingEventType::PositionClosed => write!(f, "POSITION_CLOSED"),
            TradingEventType::SpreadParked => write!(f, "SPREAD_PARKED"),
            TradingEventType::EngineStarted => write!(f, "ENGINE_STARTED"),
            TradingEventType::EngineShutdown => write!(f, "ENGINE_SHUTDOWN"),
        }
    }
}

/// Trading event with all context fields for structured logging
#[derive(Debug, Clone, Default)]
pub struct TradingEvent {
    pub event_type: Option<TradingEventType>,
    pub timestamp_ms: i64,
    pub base: Option<String>,
    pub signal: Option<Signal>,
    pub from_state: Option<SpreadState>,
    pub to_state: Option<SpreadState>,
    /// Spread and reference average at decision time
    pub spread: Option<Decimal>,
    pub reference: Option<Decimal>,
    pub venue: Option<String>,
    pub order_id: Option<String>,
    pub side: Option<OrderSide>,
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub enter_spread: Option<Decimal>,
    pub exit_spread: Option<Decimal>,
    pub profit: Option<Decimal>,
    pub reason: Option<String>,
}

impl TradingEvent {
    /// Create a new event with the current timestamp
    pub fn new(event_type: TradingEventType) -> Self {
        Self {
            event_type: Some(event_type),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            ..Default::default()
        }
    }

    fn for_base(event_type: TradingEventType, base: &str) -> Self {
        Self {
            base: Some(base.to_string()),
            ..Self::new(event_type)
        }
    }

    /// Attach the market context of the decision
    pub fn with_market(mut self, spread: Option<Decimal>, reference: Option<Decimal>) -> Self {
        self.spread = spread;
        self.reference = reference;
        self
    }

    pub fn signal_raised(base: &str, signal: Signal, state: SpreadState) -> Self {
        Self {
            signal: Some(signal),
            from_state: Some(state),
            ..Self::for_base(TradingEventType::SignalRaised, base)
        }
    }

    pub fn transition_committed(base: &str, signal: Signal, from: SpreadState, to: SpreadState) -> Self {
        Self {
            signal: Some(signal),
            from_state: Some(from),
            to_state: Some(to),
            ..Self::for_base(TradingEventType::TransitionCommitted, base)
        }
    }

    pub fn transition_rejected(base: &str, signal: Signal, state: SpreadState, reason: &str) -> Self {
        Self {
            signal: Some(signal),
            from_state: Some(state),
            reason: Some(reason.to_string()),
            ..Self::for_base(TradingEventType::TransitionRejected, base)
        }
    }

    pub fn order_placed(
        base: &str,
        venue: &str,
        order_id: &str,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            venue: Some(venue.to_string()),
            order_id: Some(order_id.to_string()),
            side: Some(side),
            price: Some(price),
            quantity: Some(quantity),
            ..Self::for_base(TradingEventType::OrderPlaced, base)
        }
    }

    pub fn order_replaced(base: &str, venue: &str, order_id: &str, price: Decimal, quantity: Decimal) -> Self {
        Self {
            venue: Some(venue.to_string()),
            order_id: Some(order_id.to_string()),
            price: Some(price),
            quantity: Some(quantity),
            ..Self::for_base(TradingEventType::OrderReplaced, base)
        }
    }

    pub fn order_cancelled(base: &str, venue: &str, order_id: &str) -> Self {
        Self {
            venue: Some(venue.to_string()),
            order_id: Some(order_id.to_string()),
            ..Self::for_base(TradingEventType::OrderCancelled, base)
        }
    }

    pub fn order_filled(base: &str, venue: &str, order_id: &str, price: Decimal, quantity: Decimal) -> Self {
        Self {
            venue: Some(venue.to_string()),
            order_id: Some(order_id.to_string()),
            price: Some(price),
            quantity: Some(quantity),
            ..Self::for_base(TradingEventType::OrderFilled, base)
        }
    }

    pub fn position_opened(base: &str, enter_spread: Decimal, quantity: Decimal) -> Self {
        Self {
            enter_spread: Some(enter_spread),
            quantity: Some(quantity),
            ..Self::for_base(TradingEventType::PositionOpened, base)
        }
    }

    pub fn position_closed(
        base: &str,
        enter_spread: Decimal,
        exit_spread: Decimal,
        quantity: Decimal,
        profit: Decimal,
    ) -> Self {
        Self {
            enter_spread: Some(enter_spread),
            exit_spread: Some(exit_spread),
            quantity: Some(quantity),
            profit: Some(profit),
            ..Self::for_base(TradingEventType::PositionClosed, base)
        }
    }

    pub fn spread_parked(base: &str, state: SpreadState, reason: &str) -> Self {
        Self {
            from_state: Some(state),
            reason: Some(reason.to_string()),
            ..Self::for_base(TradingEventType::SpreadParked, base)
        }
    }

    pub fn engine_started() -> Self {
        Self::new(TradingEventType::EngineStarted)
    }

    pub fn engine_shutdown() -> Self {
        Self::new(TradingEventType::EngineShutdown)
    }
}

/// Log a trading event using structured tracing fields
///
/// Signals and rejected transitions are high-frequency and go to DEBUG;
/// parking goes to WARN; everything else is INFO.
pub fn log_event(event: &TradingEvent) {
    let event_type = event
        .event_type
        .map(|t| t.to_string())
        .unwrap_or_default();
    let spread = event.spread.map(|s| format!("{:.4}%", s));
    let reference = event.reference.map(|s| format!("{:.4}%", s));

    match event.event_type {
        Some(TradingEventType::SignalRaised) | Some(TradingEventType::TransitionRejected) => {
            debug!(
                event_type = %event_type,
                timestamp = event.timestamp_ms,
                base = ?event.base,
                signal = ?event.signal,
                state = ?event.from_state,
                spread = ?spread,
                reference = ?reference,
                reason = ?event.reason,
                ""
            );
        }
        Some(TradingEventType::SpreadParked) => {
            warn!(
                event_type = %event_type,
                timestamp = event.timestamp_ms,
                base = ?event.base,
                state = ?event.from_state,
                spread = ?spread,
                reference = ?reference,
                reason = ?event.reason,
                ""
            );
        }
        _ => {
            info!(
                event_type = %event_type,
                timestamp = event.timestamp_ms,
                base = ?event.base,
                signal = ?event.signal,
                from_state = ?event.from_state,
                to_state = ?event.to_state,
                spread = ?spread,
                reference = ?reference,
                venue = ?event.venue,
                order_id = ?event.order_id,
                side = ?event.side,
                price = ?event.price.map(|p| p.to_string()),
                quantity = ?event.quantity.map(|q| q.to_string()),
                enter_spread = ?event.enter_spread.map(|s| format!("{:.4}%", s)),
                exit_spread = ?event.exit_spread.map(|s| format!("{:.4}%", s)),
                profit = ?event.profit.map(|p| p.to_string()),
                reason = ?event.reason,
                ""
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_type_display() {
        assert_eq!(TradingEventType::SignalRaised.to_string(), "SIGNAL_RAISED");
        assert_eq!(TradingEventType::TransitionCommitted.to_string(), "TRANSITION_COMMITTED");
        assert_eq!(TradingEventType::PositionClosed.to_string(), "POSITION_CLOSED");
        assert_eq!(TradingEventType::SpreadParked.to_string(), "SPREAD_PARKED");
    }

    #[test]
    fn test_transition_committed_event() {
        let event = TradingEvent::transition_committed(
            "BTC",
            Signal::MinSpreadReached,
            SpreadState::WaitingForNarrowSpread,
            SpreadState::SpotEnterOrderCreated,
        )
        .with_market(Some(dec!(-0.5)), Some(dec!(-0.3)));

        assert_eq!(event.event_type, Some(TradingEventType::TransitionCommitted));
        assert_eq!(event.base.as_deref(), Some("BTC"));
        assert_eq!(event.to_state, Some(SpreadState::SpotEnterOrderCreated));
        assert_eq!(event.spread, Some(dec!(-0.5)));
        assert_eq!(event.reference, Some(dec!(-0.3)));
        assert!(event.timestamp_ms > 0);
    }

    #[test]
    fn test_position_closed_event() {
        let event = TradingEvent::position_closed("ETH", dec!(-0.497), dec!(0.099), dec!(10), dec!(0.0596));
        assert_eq!(event.profit, Some(dec!(0.0596)));
        assert_eq!(event.exit_spread, Some(dec!(0.099)));
        assert_eq!(event.order_id, None);
    }

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(&TradingEvent::engine_started());
        log_event(&TradingEvent::spread_parked("BTC", SpreadState::SpotExitOrderCreated, "feed ended"));
        log_event(&TradingEvent::signal_raised("BTC", Signal::MaxSpreadLost, SpreadState::FuturesExitOrderCreated));
    }
}
