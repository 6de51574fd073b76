//! Configuration types loaded from YAML
//!
//! Trading parameters, venue definitions and the tracked spreads. Operational
//! tuning knobs (channel sizes, reconnect backoff) live in `constants`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::AppError;

// ============================================================================
// Enums
// ============================================================================

/// How fills of our resting orders are detected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Optimistic: the book traded through our price
    ByPrice,
    /// Public trade prints matching our side and price
    ByTrade,
}

/// Market data source of a venue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    BinanceSpot,
    BinanceFutures,
    #[default]
    None,
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedKind::BinanceSpot => write!(f, "binance_spot"),
            FeedKind::BinanceFutures => write!(f, "binance_futures"),
            FeedKind::None => write!(f, "none"),
        }
    }
}

// ============================================================================
// Configuration Structs
// ============================================================================

fn default_rich_delta() -> Decimal {
    dec!(0.02)
}

fn default_loss_delta() -> Decimal {
    dec!(0.01)
}

fn default_reference_capacity() -> usize {
    600
}

fn default_warmup_secs() -> u64 {
    60
}

fn default_execution_modes() -> Vec<ExecutionMode> {
    vec![ExecutionMode::ByPrice]
}

fn default_status_interval_secs() -> u64 {
    10
}

/// Engine-wide trading parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Margin below/above the reference average required to enter/exit (percent)
    #[serde(default = "default_rich_delta")]
    pub rich_delta: Decimal,
    /// Margin at which a resting entry/exit order is abandoned (percent)
    #[serde(default = "default_loss_delta")]
    pub loss_delta: Decimal,
    /// Number of spread samples in the reference average
    #[serde(default = "default_reference_capacity")]
    pub reference_capacity: usize,
    /// Statistics-only period before the first order
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
    #[serde(default = "default_execution_modes")]
    pub execution_modes: Vec<ExecutionMode>,
    /// Quote amount committed to one entering spot order
    pub order_notional: Decimal,
    /// Admission limit on concurrently open positions; unset means unlimited
    #[serde(default)]
    pub max_open_positions: Option<usize>,
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

/// A trading venue (one gateway, optionally one market data feed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub id: String,
    #[serde(default)]
    pub feed: FeedKind,
    /// Starting balances of the paper gateway, by asset
    #[serde(default)]
    pub paper_balances: BTreeMap<String, Decimal>,
    /// Minimum order notional enforced by the paper gateway
    #[serde(default)]
    pub min_notional: Decimal,
}

/// One leg (spot or futures) of a tracked spread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegConfig {
    pub venue: String,
    pub quote: String,
    /// Venue symbol; defaults to `{base}{quote}`
    #[serde(default)]
    pub symbol: Option<String>,
    pub price_step: Decimal,
    pub quantity_step: Decimal,
    #[serde(default)]
    pub min_notional: Decimal,
    #[serde(default)]
    pub fee: Decimal,
}

impl LegConfig {
    pub fn symbol_for(&self, base: &str) -> String {
        self.symbol
            .clone()
            .unwrap_or_else(|| format!("{}{}", base, self.quote))
    }

    fn validate(&self, base: &str, leg: &str, venues: &HashSet<&str>) -> Result<(), AppError> {
        if !venues.contains(self.venue.as_str()) {
            return Err(AppError::Config(format!(
                "Spread '{}': {} venue '{}' is not defined",
                base, leg, self.venue
            )));
        }
        if self.quote.trim().is_empty() {
            return Err(AppError::Config(format!(
                "Spread '{}': {} quote asset cannot be empty",
                base, leg
            )));
        }
        if self.price_step <= Decimal::ZERO || self.quantity_step <= Decimal::ZERO {
            return Err(AppError::Config(format!(
                "Spread '{}': {} price_step and quantity_step must be > 0",
                base, leg
            )));
        }
        if self.min_notional < Decimal::ZERO || self.fee < Decimal::ZERO {
            return Err(AppError::Config(format!(
                "Spread '{}': {} min_notional and fee cannot be negative",
                base, leg
            )));
        }
        Ok(())
    }
}

/// A tracked base asset: spot leg + futures leg
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadConfig {
    pub base: String,
    pub spot: LegConfig,
    pub futures: LegConfig,
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub venues: Vec<VenueConfig>,
    pub spreads: Vec<SpreadConfig>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rich_delta <= Decimal::ZERO {
            return Err(AppError::Config(format!(
                "Engine: rich_delta must be > 0 (got {})",
                self.rich_delta
            )));
        }
        // Rule: the abort margin sits inside the entry margin
        if self.loss_delta <= Decimal::ZERO || self.loss_delta >= self.rich_delta {
            return Err(AppError::Config(format!(
                "Engine: loss_delta must be > 0 and < rich_delta (got {} vs {})",
                self.loss_delta, self.rich_delta
            )));
        }
        if self.reference_capacity == 0 {
            return Err(AppError::Config(
                "Engine: reference_capacity must be > 0".to_string(),
            ));
        }
        if self.execution_modes.is_empty() {
            return Err(AppError::Config(
                "Engine: at least one execution mode is required".to_string(),
            ));
        }
        if self.order_notional <= Decimal::ZERO {
            return Err(AppError::Config(format!(
                "Engine: order_notional must be > 0 (got {})",
                self.order_notional
            )));
        }
        if self.max_open_positions == Some(0) {
            return Err(AppError::Config(
                "Engine: max_open_positions must be > 0 when set".to_string(),
            ));
        }
        if self.status_interval_secs == 0 {
            return Err(AppError::Config(
                "Engine: status_interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn has_mode(&self, mode: ExecutionMode) -> bool {
        self.execution_modes.contains(&mode)
    }
}

impl AppConfig {
    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        self.engine.validate()?;

        if self.spreads.is_empty() {
            return Err(AppError::Config(
                "Configuration must contain at least one spread".to_string(),
            ));
        }

        let mut venue_ids = HashSet::new();
        for venue in &self.venues {
            if venue.id.trim().is_empty() {
                return Err(AppError::Config("Venue id cannot be empty".to_string()));
            }
            if !venue_ids.insert(venue.id.as_str()) {
                return Err(AppError::Config(format!(
                    "Venue '{}' is defined more than once",
                    venue.id
                )));
            }
        }

        let mut bases = HashSet::new();
        for spread in &self.spreads {
            if spread.base.trim().is_empty() {
                return Err(AppError::Config("Spread base asset cannot be empty".to_string()));
            }
            if !bases.insert(spread.base.as_str()) {
                return Err(AppError::Config(format!(
                    "Spread '{}' is defined more than once",
                    spread.base
                )));
            }
            spread.spot.validate(&spread.base, "spot", &venue_ids)?;
            spread.futures.validate(&spread.base, "futures", &venue_ids)?;
        }

        Ok(())
    }

    pub fn venue(&self, id: &str) -> Option<&VenueConfig> {
        self.venues.iter().find(|v| v.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(venue: &str) -> LegConfig {
        LegConfig {
            venue: venue.to_string(),
            quote: "USDT".to_string(),
            symbol: None,
            price_step: dec!(0.01),
            quantity_step: dec!(0.001),
            min_notional: dec!(5),
            fee: dec!(0.001),
        }
    }

    fn create_valid_config() -> AppConfig {
        AppConfig {
            engine: EngineConfig {
                rich_delta: dec!(0.02),
                loss_delta: dec!(0.01),
                reference_capacity: 600,
                warmup_secs: 60,
                execution_modes: vec![ExecutionMode::ByPrice, ExecutionMode::ByTrade],
                order_notional: dec!(100),
                max_open_positions: None,
                status_interval_secs: 10,
            },
            venues: vec![
                VenueConfig {
                    id: "spot".to_string(),
                    feed: FeedKind::BinanceSpot,
                    paper_balances: BTreeMap::new(),
                    min_notional: Decimal::ZERO,
                },
                VenueConfig {
                    id: "futures".to_string(),
                    feed: FeedKind::BinanceFutures,
                    paper_balances: BTreeMap::new(),
                    min_notional: Decimal::ZERO,
                },
            ],
            spreads: vec![SpreadConfig {
                base: "BTC".to_string(),
                spot: leg("spot"),
                futures: leg("futures"),
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_loss_delta_must_be_inside_rich_delta() {
        let mut config = create_valid_config();
        config.engine.loss_delta = dec!(0.02);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("loss_delta"), "got: {}", err);
    }

    #[test]
    fn test_zero_reference_capacity_fails() {
        let mut config = create_valid_config();
        config.engine.reference_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_open_positions_zero_fails() {
        let mut config = create_valid_config();
        config.engine.max_open_positions = Some(0);
        assert!(config.validate().is_err());
        config.engine.max_open_positions = Some(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_leg_venue_fails() {
        let mut config = create_valid_config();
        config.spreads[0].futures.venue = "nowhere".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("'nowhere' is not defined"), "got: {}", err);
    }

    #[test]
    fn test_duplicate_spread_fails() {
        let mut config = create_valid_config();
        let dup = config.spreads[0].clone();
        config.spreads.push(dup);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("more than once"));
    }

    #[test]
    fn test_zero_price_step_fails() {
        let mut config = create_valid_config();
        config.spreads[0].spot.price_step = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_symbol_defaults_to_base_and_quote() {
        let mut leg = leg("spot");
        assert_eq!(leg.symbol_for("ETH"), "ETHUSDT");
        leg.symbol = Some("ETH-USDT".to_string());
        assert_eq!(leg.symbol_for("ETH"), "ETH-USDT");
    }

    #[test]
    fn test_execution_mode_lookup() {
        let mut config = create_valid_config();
        assert!(config.engine.has_mode(ExecutionMode::ByTrade));
        config.engine.execution_modes = vec![ExecutionMode::ByPrice];
        assert!(!config.engine.has_mode(ExecutionMode::ByTrade));
    }
}
