//! Core module - spread tracking, state machine, engine and runtime
//!
//! # Module Architecture
//!
//! This module uses **explicit re-exports** instead of glob exports (`pub use module::*`)
//! to keep the public API visible in one place.
//!
//! ## Usage
//! Prefer importing from `crate::core`:
//! ```ignore
//! use crate::core::{Spread, SpreadEngine, SpreadState};
//! ```

pub mod engine;
pub mod events;
pub mod order;
pub mod reference;
pub mod runtime;
pub mod spread;
pub mod state;
pub mod symbol;

// Explicit re-exports for the spread entity
pub use spread::{Spread, SpreadParams};
pub use symbol::SymbolInfo;
pub use order::{Leg, Order};
pub use reference::{ReferenceQueue, DEFAULT_REFERENCE_CAPACITY};

// Explicit re-exports for the state machine
pub use state::{transition_for, Action, Signal, SignalEvent, SpreadState, StateCursor, Transition};

// Explicit re-exports for the engine
pub use engine::{EngineSettings, SpreadEngine, TransitionOutcome, Venue};

// Explicit re-exports for events
pub use events::{log_event, TradingEvent, TradingEventType};

// Explicit re-exports for runtime
pub use runtime::{build_engine, feed_task, status_task, warmup_task, Runtime};
