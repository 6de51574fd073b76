//! Resting order record tracked by a spread

use rust_decimal::Decimal;

use crate::adapters::types::{BookTicker, OrderHandle, OrderReport, OrderSide, OrderStatus, TradeTick};

/// Which leg of the spread an order belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    Spot,
    Futures,
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Leg::Spot => write!(f, "spot"),
            Leg::Futures => write!(f, "futures"),
        }
    }
}

/// A limit order of ours resting on a venue
///
/// `amount` is the intended base quantity for this step of the cycle and
/// survives replacements. `filled` is the best local estimate, including
/// fills inferred from the book or the trade tape; `confirmed_filled` is what
/// the venue has reported. Only confirmed quantity is ever hedged or settled.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub handle: OrderHandle,
    pub leg: Leg,
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
    pub filled: Decimal,
    pub confirmed_filled: Decimal,
}

impl Order {
    pub fn new(handle: OrderHandle, leg: Leg, side: OrderSide, price: Decimal, amount: Decimal) -> Self {
        Self {
            handle,
            leg,
            side,
            price,
            amount,
            filled: Decimal::ZERO,
            confirmed_filled: Decimal::ZERO,
        }
    }

    pub fn is_buyer(&self) -> bool {
        self.side.is_buy()
    }

    pub fn is_filled(&self) -> bool {
        self.filled >= self.amount
    }

    pub fn has_fill(&self) -> bool {
        self.filled > Decimal::ZERO
    }

    pub fn remaining(&self) -> Decimal {
        (self.amount - self.filled).max(Decimal::ZERO)
    }

    /// Add executed quantity; returns the new cumulative fill
    pub fn apply_fill(&mut self, quantity: Decimal) -> Decimal {
        if quantity > Decimal::ZERO {
            self.filled = (self.filled + quantity).min(self.amount);
        }
        self.filled
    }

    /// Adopt the venue's report; inferred fill beyond it is dropped
    ///
    /// Returns the confirmed cumulative fill.
    pub fn confirm(&mut self, report: &OrderReport) -> Decimal {
        let reported = if report.status == OrderStatus::Filled && report.filled_quantity.is_zero() {
            self.amount
        } else {
            report.filled_quantity.min(self.amount)
        };
        self.confirmed_filled = self.confirmed_filled.max(reported);
        self.filled = self.confirmed_filled;
        self.confirmed_filled
    }

    pub fn mark_filled(&mut self) {
        self.filled = self.amount;
    }

    /// The book has traded through our price
    pub fn crossed_by(&self, best_bid: Decimal, best_ask: Decimal) -> bool {
        BookTicker::new(best_bid, best_ask).crosses(self.side, self.price)
    }

    /// A public print hit our side at our price
    pub fn matches_trade(&self, trade: &TradeTick) -> bool {
        trade.maker_side == self.side && trade.price == self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(side: OrderSide, price: Decimal, amount: Decimal) -> Order {
        let handle = OrderHandle {
            venue: "paper".into(),
            symbol: "BTCUSDT".into(),
            order_id: "1".into(),
        };
        Order::new(handle, Leg::Spot, side, price, amount)
    }

    #[test]
    fn test_fill_is_capped_and_monotone() {
        let mut o = order(OrderSide::Buy, dec!(100), dec!(10));
        assert_eq!(o.apply_fill(dec!(4)), dec!(4));
        assert_eq!(o.apply_fill(dec!(-1)), dec!(4));
        assert_eq!(o.apply_fill(dec!(20)), dec!(10));
        assert!(o.is_filled());
        assert_eq!(o.confirmed_filled, dec!(0));
    }

    #[test]
    fn test_confirm_replaces_inferred_fill() {
        let mut o = order(OrderSide::Buy, dec!(100), dec!(10));
        o.mark_filled();

        let open = OrderReport { status: OrderStatus::Open, filled_quantity: dec!(3) };
        assert_eq!(o.confirm(&open), dec!(3));
        assert_eq!(o.filled, dec!(3));
        assert!(!o.is_filled());

        // venues that omit the quantity on a full fill
        let filled = OrderReport { status: OrderStatus::Filled, filled_quantity: dec!(0) };
        assert_eq!(o.confirm(&filled), dec!(10));
        assert!(o.is_filled());

        // a stale report never walks a confirmation back
        assert_eq!(o.confirm(&open), dec!(10));
    }

    #[test]
    fn test_buy_crossed_rules() {
        let o = order(OrderSide::Buy, dec!(100), dec!(1));
        assert!(!o.crossed_by(dec!(100), dec!(100.1)));
        assert!(o.crossed_by(dec!(99.8), dec!(100)));
        assert!(o.crossed_by(dec!(99.9), dec!(100.1)));
        assert!(!o.crossed_by(dec!(100.1), dec!(100.2)));
    }

    #[test]
    fn test_sell_crossed_rules() {
        let o = order(OrderSide::Sell, dec!(100.5), dec!(1));
        assert!(!o.crossed_by(dec!(100.4), dec!(100.5)));
        assert!(o.crossed_by(dec!(100.5), dec!(100.6)));
        assert!(o.crossed_by(dec!(100.4), dec!(100.6)));
        assert!(!o.crossed_by(dec!(100.3), dec!(100.4)));
    }

    #[test]
    fn test_trade_match_requires_side_and_price() {
        let o = order(OrderSide::Buy, dec!(100), dec!(1));
        let hit = TradeTick { price: dec!(100), quantity: dec!(0.3), maker_side: OrderSide::Buy };
        let other_side = TradeTick { maker_side: OrderSide::Sell, ..hit };
        let other_price = TradeTick { price: dec!(100.1), ..hit };
        assert!(o.matches_trade(&hit));
        assert!(!o.matches_trade(&other_side));
        assert!(!o.matches_trade(&other_price));
    }
}
