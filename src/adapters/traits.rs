//! Venue boundary traits
//!
//! The spread engine talks to venues only through these two traits:
//! `OrderGateway` for order lifecycle calls and `MarketDataFeed` for the
//! public book-ticker and trade streams.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::adapters::errors::ExchangeResult;
use crate::adapters::types::{BookTicker, LimitOrderRequest, OrderHandle, OrderReport, TradeStream};

/// Order placement interface of one venue
///
/// # Example Implementation
///
/// ```ignore
/// #[async_trait]
/// impl OrderGateway for RestGateway {
///     async fn place_limit_order(&self, request: LimitOrderRequest) -> ExchangeResult<OrderHandle> {
///         let id = self.client.post_order(&request).await?;
///         Ok(OrderHandle { venue: self.venue_id().into(), symbol: request.symbol, order_id: id })
///     }
///     // ... other methods
/// }
/// ```
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Identifier used in configuration and logs (e.g. "binance-spot")
    fn venue_id(&self) -> &str;

    /// Place a resting limit order
    async fn place_limit_order(&self, request: LimitOrderRequest) -> ExchangeResult<OrderHandle>;

    /// Replace an open order with a new quantity/price
    ///
    /// Returns the handle of the replacement order. Fails with
    /// `ExchangeError::OrderTerminated` when the order already left the book.
    async fn replace_order(
        &self,
        handle: &OrderHandle,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderHandle>;

    /// Cancel an open order
    ///
    /// Fails with `ExchangeError::OrderTerminated` when the order is no longer open.
    async fn cancel_order(&self, handle: &OrderHandle) -> ExchangeResult<()>;

    /// Current status and executed quantity of an order
    async fn query_order(&self, handle: &OrderHandle) -> ExchangeResult<OrderReport>;

    /// Free balance of `asset` available for new orders
    async fn available_balance(&self, asset: &str) -> ExchangeResult<Decimal>;
}

/// Public market data interface of one venue
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    fn venue_id(&self) -> &str;

    /// Stream of best bid/ask updates for `symbol`
    ///
    /// The receiver yields `None` once the feed gives up reconnecting.
    async fn subscribe_book_ticker(&self, symbol: &str) -> ExchangeResult<mpsc::Receiver<BookTicker>>;

    /// Stream of public trade prints for `symbol`
    async fn subscribe_trades(&self, symbol: &str) -> ExchangeResult<TradeStream>;
}
