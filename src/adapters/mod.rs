//! Venue adapters
//!
//! This module provides the venue boundary used by the spread engine:
//! the `OrderGateway` / `MarketDataFeed` traits, an in-memory paper gateway
//! and Binance public market data feeds.

pub mod binance;
pub mod errors;
pub mod paper;
pub mod reconnect;
pub mod traits;
pub mod types;
pub mod websocket;

// Re-export commonly used types for convenience
pub use errors::{ExchangeError, ExchangeResult};
pub use paper::PaperGateway;
pub use traits::{MarketDataFeed, OrderGateway};
pub use types::{
    BookTicker, LimitOrderRequest, OrderHandle, OrderReport, OrderSide, OrderStatus, TradeStream,
    TradeTick,
};
