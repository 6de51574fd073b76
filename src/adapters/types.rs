//! Core data types for venue adapters
//!
//! These types are shared by every venue so the spread engine only ever
//! sees typed, already-decoded market data and order records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Market Data
// =============================================================================

/// Best bid/ask update for one symbol (book-ticker stream)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookTicker {
    /// Highest resting buy price
    pub best_bid: Decimal,
    /// Lowest resting sell price
    pub best_ask: Decimal,
}

impl BookTicker {
    pub fn new(best_bid: Decimal, best_ask: Decimal) -> Self {
        Self { best_bid, best_ask }
    }

    /// Both sides populated with positive prices
    pub fn is_valid(&self) -> bool {
        self.best_bid > Decimal::ZERO && self.best_ask > Decimal::ZERO
    }

    /// The book has traded through a resting order at `price`
    ///
    /// A buy at `p` is gone once the ask reaches `p` or the bid drops below
    /// `p`; mirrored for sells. Paper matching and optimistic fills both use
    /// this rule.
    pub fn crosses(&self, side: OrderSide, price: Decimal) -> bool {
        match side {
            OrderSide::Buy => self.best_ask <= price || self.best_bid < price,
            OrderSide::Sell => self.best_bid >= price || self.best_ask > price,
        }
    }
}

/// Public trade print from the venue's trade tape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    pub price: Decimal,
    pub quantity: Decimal,
    /// Side of the resting (maker) order that was hit
    pub maker_side: OrderSide,
}

/// Receiving half of a trade-tape subscription
///
/// Cancelling `cancel` unsubscribes; the sender side stops and the
/// receiver drains to `None`.
#[derive(Debug)]
pub struct TradeStream {
    pub receiver: mpsc::Receiver<TradeTick>,
    pub cancel: CancellationToken,
}

// =============================================================================
// Order Types
// =============================================================================

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn is_buy(&self) -> bool {
        matches!(self, OrderSide::Buy)
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Venue-side order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
}

/// Limit order request sent to a gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl LimitOrderRequest {
    pub fn new(symbol: impl Into<String>, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price,
        }
    }

    /// Quote-asset value of the order
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }
}

/// Handle identifying an order on a venue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderHandle {
    pub venue: String,
    pub symbol: String,
    pub order_id: String,
}

impl std::fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}#{}", self.venue, self.symbol, self.order_id)
    }
}

/// Result of an order status query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    pub status: OrderStatus,
    /// Base quantity executed so far
    pub filled_quantity: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_book_ticker_validity() {
        assert!(BookTicker::new(dec!(100), dec!(100.5)).is_valid());
        assert!(!BookTicker::new(dec!(0), dec!(100.5)).is_valid());
        assert!(!BookTicker::new(dec!(100), dec!(0)).is_valid());
    }

    #[test]
    fn test_book_crosses_resting_orders() {
        let book = BookTicker::new(dec!(99.9), dec!(100.1));
        assert!(book.crosses(OrderSide::Buy, dec!(100)));
        assert!(!book.crosses(OrderSide::Buy, dec!(99.9)));
        assert!(book.crosses(OrderSide::Sell, dec!(100)));
        assert!(!book.crosses(OrderSide::Sell, dec!(100.1)));
    }

    #[test]
    fn test_limit_order_notional() {
        let req = LimitOrderRequest::new("BTCUSDT", OrderSide::Buy, dec!(0.5), dec!(200));
        assert_eq!(req.notional(), dec!(100));
    }

    #[test]
    fn test_order_side_serialization() {
        let json = serde_json::to_string(&OrderSide::Sell).unwrap();
        assert_eq!(json, "\"sell\"");
        let side: OrderSide = serde_json::from_str("\"buy\"").unwrap();
        assert!(side.is_buy());
    }

    #[test]
    fn test_order_handle_display() {
        let handle = OrderHandle {
            venue: "paper-spot".into(),
            symbol: "BTCUSDT".into(),
            order_id: "7".into(),
        };
        assert_eq!(handle.to_string(), "paper-spot:BTCUSDT#7");
    }
}
