//! Binance public market data (spot and USD-M futures)

mod feed;
pub mod types;

pub use feed::BinanceFeed;
pub use types::BinanceMarket;
