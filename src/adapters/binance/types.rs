//! Typed payloads of Binance public market streams
//!
//! Spot and USD-M futures share the same field names for `@bookTicker` and
//! `@aggTrade`; futures adds event type/time fields that are ignored here.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::adapters::types::{BookTicker, OrderSide, TradeTick};

/// `<symbol>@bookTicker` payload
#[derive(Debug, Clone, Deserialize)]
pub struct BookTickerMsg {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b", with = "rust_decimal::serde::str")]
    pub best_bid: Decimal,
    #[serde(rename = "B", with = "rust_decimal::serde::str")]
    pub best_bid_qty: Decimal,
    #[serde(rename = "a", with = "rust_decimal::serde::str")]
    pub best_ask: Decimal,
    #[serde(rename = "A", with = "rust_decimal::serde::str")]
    pub best_ask_qty: Decimal,
}

impl From<BookTickerMsg> for BookTicker {
    fn from(msg: BookTickerMsg) -> Self {
        BookTicker::new(msg.best_bid, msg.best_ask)
    }
}

/// `<symbol>@aggTrade` payload
#[derive(Debug, Clone, Deserialize)]
pub struct AggTradeMsg {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    /// Trade time (ms)
    #[serde(rename = "T")]
    pub trade_time: u64,
    /// Buyer was the maker
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

impl From<AggTradeMsg> for TradeTick {
    fn from(msg: AggTradeMsg) -> Self {
        let maker_side = if msg.buyer_is_maker {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        TradeTick {
            price: msg.price,
            quantity: msg.quantity,
            maker_side,
        }
    }
}

/// Which Binance market a feed connects to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceMarket {
    Spot,
    UsdMFutures,
}

impl BinanceMarket {
    pub fn ws_base_url(&self) -> &'static str {
        match self {
            BinanceMarket::Spot => "wss://stream.binance.com:9443/ws",
            BinanceMarket::UsdMFutures => "wss://fstream.binance.com/ws",
        }
    }
}

/// Raw stream URL, e.g. `wss://stream.binance.com:9443/ws/btcusdt@bookTicker`
pub fn stream_url(base_url: &str, symbol: &str, stream: &str) -> String {
    format!("{}/{}@{}", base_url, symbol.to_lowercase(), stream)
}
