//! Application-wide error types using thiserror
//!
//! Venue errors are `ExchangeError`, spread engine errors are `EngineError`,
//! and both fold into `AppError` at the application edge.

use thiserror::Error;

use crate::adapters::errors::ExchangeError;

/// Errors raised by the spread engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("Venue not configured: {0}")]
    VenueMissing(String),

    /// Order size below venue minimum or no balance to fund it
    #[error("Sizing error: {0}")]
    Sizing(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::WebSocket(Box::new(e))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
