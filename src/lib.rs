//! Spot/futures spread arbitrage engine
//!
//! - Per-asset spread tracking with a rolling reference average
//! - A guarded state machine that buys spot, shorts futures, then unwinds
//! - Venue adapters (paper gateway, Binance public feeds)

pub mod adapters;
pub mod config;
pub mod core;
pub mod error;

pub use error::AppError;
