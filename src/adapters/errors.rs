//! Exchange adapter error types
//!
//! All venue-related errors are wrapped in the ExchangeError enum
//! which implements thiserror for consistent error handling.

use rust_decimal::Decimal;
use thiserror::Error;

/// Venue-specific error types for gateway and feed operations
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Connection to venue failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Subscription to market data failed
    #[error("Subscription failed for {symbol}: {reason}")]
    SubscriptionFailed { symbol: String, reason: String },

    /// Network operation timed out
    #[error("Network timeout after {0}ms")]
    NetworkTimeout(u64),

    /// Invalid or unexpected response from venue
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// WebSocket protocol error (boxed to reduce enum size)
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// Venue refused the order (bad price, below minimum, ...)
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// The order no longer exists on the venue (filled or cancelled server-side)
    #[error("Order {0} is no longer open")]
    OrderTerminated(String),

    /// Not enough free balance to place the order
    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: String,
        required: Decimal,
        available: Decimal,
    },
}

impl ExchangeError {
    /// True when the venue reports the order as already finished server-side.
    ///
    /// Callers treat this as transient and re-query the order once.
    pub fn is_order_terminated(&self) -> bool {
        matches!(self, ExchangeError::OrderTerminated(_))
    }
}

/// Result type alias for exchange operations
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_connection_failed_display() {
        let err = ExchangeError::ConnectionFailed("timeout".to_string());
        assert_eq!(err.to_string(), "Connection failed: timeout");
    }

    #[test]
    fn test_subscription_failed_display() {
        let err = ExchangeError::SubscriptionFailed {
            symbol: "BTCUSDT".to_string(),
            reason: "symbol not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Subscription failed for BTCUSDT: symbol not found"
        );
    }

    #[test]
    fn test_network_timeout_display() {
        let err = ExchangeError::NetworkTimeout(5000);
        assert_eq!(err.to_string(), "Network timeout after 5000ms");
    }

    #[test]
    fn test_insufficient_balance_display() {
        let err = ExchangeError::InsufficientBalance {
            asset: "USDT".to_string(),
            required: dec!(100),
            available: dec!(12.5),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient USDT balance: required 100, available 12.5"
        );
    }

    #[test]
    fn test_order_terminated_detection() {
        assert!(ExchangeError::OrderTerminated("42".into()).is_order_terminated());
        assert!(!ExchangeError::OrderRejected("bad".into()).is_order_terminated());
    }
}
