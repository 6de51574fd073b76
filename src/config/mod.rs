//! Configuration module
//!
//! This module provides:
//! - Configuration types (`AppConfig`, `EngineConfig`, `VenueConfig`, `SpreadConfig`)
//! - YAML loading functionality (`load_config`)
//! - Runtime constants with environment variable overrides
//! - Logging initialization

pub mod constants;
mod loader;
pub mod logging;
mod types;

// Re-export types
pub use types::{
    AppConfig, EngineConfig, ExecutionMode, FeedKind, LegConfig, SpreadConfig, VenueConfig,
};

// Re-export loader functions
pub use loader::{config_path, load_config, load_config_from_str, DEFAULT_CONFIG_PATH};
