//! Reconnection with exponential backoff
//!
//! Used by the streaming feeds to re-establish a dropped WebSocket. Delays
//! double per attempt up to a cap, plus random jitter so several feeds that
//! dropped together do not reconnect in lockstep.

use std::future::Future;
use std::time::Duration;

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::config::constants;

/// Configuration for reconnection attempts
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts
    pub max_attempts: u32,
    /// Initial delay in milliseconds (doubles each attempt)
    pub initial_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Settings taken from the environment-overridable constants
    pub fn from_env() -> Self {
        Self {
            max_attempts: constants::reconnect_max_attempts(),
            initial_delay_ms: constants::reconnect_initial_delay_ms(),
            max_delay_ms: constants::reconnect_max_delay_ms(),
        }
    }

    /// Base delay before `attempt` (0-based), without jitter
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

/// Retry `connect_fn` with exponential backoff until it yields a value
///
/// Returns the last error once `max_attempts` attempts have failed.
///
/// # Example
/// ```ignore
/// let ws = reconnect_with_backoff(ReconnectConfig::default(), "binance-spot", || {
///     connect_tls(&url)
/// })
/// .await?;
/// ```
pub async fn reconnect_with_backoff<T, F, Fut>(
    config: ReconnectConfig,
    feed_name: &str,
    mut connect_fn: F,
) -> ExchangeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExchangeResult<T>>,
{
    let mut last_error: Option<ExchangeError> = None;

    for attempt in 0..config.max_attempts {
        let jitter = rand::random::<u64>() % 200;
        let backoff_ms = config.base_delay_ms(attempt) + jitter;

        tracing::info!(
            feed = %feed_name,
            attempt = attempt + 1,
            max_attempts = config.max_attempts,
            backoff_ms,
            "Reconnect attempt"
        );

        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;

        match connect_fn().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(feed = %feed_name, attempt = attempt + 1, error = %e, "Reconnect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        ExchangeError::ConnectionFailed("Reconnection failed after max attempts".into())
    }))
}
