//! Runtime constants with environment variable overrides
//!
//! Values that are operational tuning rather than trading parameters live
//! here instead of the YAML file. Each can be overridden via environment.

use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

// =============================================================================
// Market Data Channels
// =============================================================================

/// Capacity of each book-ticker channel (default: 1024 updates)
///
/// Environment variable: `FEED_CHANNEL_CAPACITY`
pub fn feed_channel_capacity() -> usize {
    env_or("FEED_CHANNEL_CAPACITY", 1024)
}

/// Capacity of each trade-tape channel (default: 1024 prints)
///
/// Environment variable: `TRADE_CHANNEL_CAPACITY`
pub fn trade_channel_capacity() -> usize {
    env_or("TRADE_CHANNEL_CAPACITY", 1024)
}

// =============================================================================
// Reconnection
// =============================================================================

/// Reconnect attempts before a feed gives up (default: 5)
///
/// Environment variable: `RECONNECT_MAX_ATTEMPTS`
pub fn reconnect_max_attempts() -> u32 {
    env_or("RECONNECT_MAX_ATTEMPTS", 5)
}

/// First reconnect delay, doubled on every attempt (default: 500ms)
///
/// Environment variable: `RECONNECT_INITIAL_DELAY_MS`
pub fn reconnect_initial_delay_ms() -> u64 {
    env_or("RECONNECT_INITIAL_DELAY_MS", 500)
}

/// Upper bound for the reconnect delay (default: 5000ms)
///
/// Environment variable: `RECONNECT_MAX_DELAY_MS`
pub fn reconnect_max_delay_ms() -> u64 {
    env_or("RECONNECT_MAX_DELAY_MS", 5000)
}

// =============================================================================
// Venue Calls
// =============================================================================

/// Timeout applied to each gateway call made inside a transition (default: 5000ms)
///
/// Environment variable: `VENUE_CALL_TIMEOUT_MS`
pub fn venue_call_timeout() -> Duration {
    Duration::from_millis(env_or("VENUE_CALL_TIMEOUT_MS", 5000))
}

/// Print all runtime constants (startup log)
pub fn log_configuration() {
    tracing::info!(
        feed_channel_capacity = feed_channel_capacity(),
        trade_channel_capacity = trade_channel_capacity(),
        reconnect_max_attempts = reconnect_max_attempts(),
        reconnect_initial_delay_ms = reconnect_initial_delay_ms(),
        reconnect_max_delay_ms = reconnect_max_delay_ms(),
        venue_call_timeout_ms = venue_call_timeout().as_millis() as u64,
        "Runtime constants"
    );
}
