//! Per-leg market state and order pricing
//!
//! A `SymbolInfo` holds one venue leg's live best bid/ask together with the
//! instrument filters (tick size, lot size, min notional) and the prices at
//! which that leg entered and exited the current position.

use rust_decimal::{Decimal, RoundingStrategy};

/// One venue leg (spot or futures) of a spread
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub exchange_id: String,
    pub symbol: String,
    pub quote_asset: String,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    /// Tick size; every order price is a multiple of it
    pub price_step: Decimal,
    /// Lot size; every order quantity is a multiple of it
    pub quantity_step: Decimal,
    pub min_notional: Decimal,
    pub enter_price: Decimal,
    pub exit_price: Decimal,
    pub fee: Decimal,
}

impl SymbolInfo {
    pub fn new(
        exchange_id: impl Into<String>,
        symbol: impl Into<String>,
        quote_asset: impl Into<String>,
        price_step: Decimal,
        quantity_step: Decimal,
    ) -> Self {
        Self {
            exchange_id: exchange_id.into(),
            symbol: symbol.into(),
            quote_asset: quote_asset.into(),
            best_bid: Decimal::ZERO,
            best_ask: Decimal::ZERO,
            price_step,
            quantity_step,
            min_notional: Decimal::ZERO,
            enter_price: Decimal::ZERO,
            exit_price: Decimal::ZERO,
            fee: Decimal::ZERO,
        }
    }

    pub fn with_min_notional(mut self, min_notional: Decimal) -> Self {
        self.min_notional = min_notional;
        self
    }

    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = fee;
        self
    }

    /// Store the latest top of book
    pub fn update(&mut self, best_ask: Decimal, best_bid: Decimal) {
        self.best_ask = best_ask;
        self.best_bid = best_bid;
    }

    /// Both sides of the book are populated
    pub fn has_prices(&self) -> bool {
        self.best_bid > Decimal::ZERO && self.best_ask > Decimal::ZERO
    }

    fn quantize(value: Decimal, step: Decimal, strategy: RoundingStrategy) -> Decimal {
        if step <= Decimal::ZERO {
            return value;
        }
        ((value / step).round_dp_with_strategy(0, strategy) * step).normalize()
    }

    pub fn floor_price(&self, price: Decimal) -> Decimal {
        Self::quantize(price, self.price_step, RoundingStrategy::ToNegativeInfinity)
    }

    pub fn ceil_price(&self, price: Decimal) -> Decimal {
        Self::quantize(price, self.price_step, RoundingStrategy::ToPositiveInfinity)
    }

    /// Quantities are always rounded down to the lot size
    pub fn floor_quantity(&self, quantity: Decimal) -> Decimal {
        Self::quantize(quantity, self.quantity_step, RoundingStrategy::ToZero)
    }

    /// Passive buy price: join the best bid, one tick under the ask if that would cross
    pub fn maker_buy_price(&self) -> Decimal {
        let price = self.best_bid.min(self.best_ask - self.price_step);
        self.floor_price(price)
    }

    /// Passive sell price: join the best ask, one tick over the bid if that would cross
    pub fn maker_sell_price(&self) -> Decimal {
        let price = self.best_ask.max(self.best_bid + self.price_step);
        self.ceil_price(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc() -> SymbolInfo {
        SymbolInfo::new("binance-spot", "BTCUSDT", "USDT", dec!(0.1), dec!(0.001))
    }

    #[test]
    fn test_has_prices_requires_both_sides() {
        let mut info = btc();
        assert!(!info.has_prices());
        info.update(dec!(100.5), dec!(0));
        assert!(!info.has_prices());
        info.update(dec!(100.5), dec!(100));
        assert!(info.has_prices());
    }

    #[test]
    fn test_maker_prices_join_the_book() {
        let mut info = btc();
        info.update(dec!(100.5), dec!(100));
        assert_eq!(info.maker_buy_price(), dec!(100));
        assert_eq!(info.maker_sell_price(), dec!(100.5));
    }

    #[test]
    fn test_maker_prices_never_cross_a_locked_book() {
        let mut info = btc();
        info.update(dec!(100), dec!(100));
        assert_eq!(info.maker_buy_price(), dec!(99.9));
        assert_eq!(info.maker_sell_price(), dec!(100.1));
    }

    #[test]
    fn test_prices_quantized_to_tick() {
        let mut info = btc();
        info.update(dec!(100.57), dec!(100.03));
        assert_eq!(info.maker_buy_price(), dec!(100));
        assert_eq!(info.maker_sell_price(), dec!(100.6));
    }

    #[test]
    fn test_quantity_rounds_down() {
        let info = btc();
        assert_eq!(info.floor_quantity(dec!(0.99999)), dec!(0.999));
        assert_eq!(info.floor_quantity(dec!(0.0004)), dec!(0));
    }
}
