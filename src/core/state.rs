//! Spread lifecycle states, signals and the transition table
//!
//! A spread cycles through an entering half (buy spot, then short futures)
//! and an exiting half (cover futures, then sell spot). Every state change
//! goes through `transition_for`, which is the only place edges are defined.

use std::fmt;

/// Lifecycle state of one spread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpreadState {
    /// Warm-up: statistics only, no orders
    CollectInformation,
    WaitingForNarrowSpread,
    SpotEnterOrderCreated,
    FuturesEnterOrderCreated,
    WaitingForWideSpread,
    FuturesExitOrderCreated,
    SpotExitOrderCreated,
    /// Safe non-trading state after a fatal error; no outgoing edges
    Parked,
}

impl SpreadState {
    pub const ALL: [SpreadState; 8] = [
        SpreadState::CollectInformation,
        SpreadState::WaitingForNarrowSpread,
        SpreadState::SpotEnterOrderCreated,
        SpreadState::FuturesEnterOrderCreated,
        SpreadState::WaitingForWideSpread,
        SpreadState::FuturesExitOrderCreated,
        SpreadState::SpotExitOrderCreated,
        SpreadState::Parked,
    ];

    /// States in which an order of ours rests on a venue
    pub fn has_pending_order(&self) -> bool {
        matches!(
            self,
            SpreadState::SpotEnterOrderCreated
                | SpreadState::FuturesEnterOrderCreated
                | SpreadState::FuturesExitOrderCreated
                | SpreadState::SpotExitOrderCreated
        )
    }

    /// Entering half of the cycle (no position open yet)
    pub fn is_entering(&self) -> bool {
        matches!(
            self,
            SpreadState::CollectInformation
                | SpreadState::WaitingForNarrowSpread
                | SpreadState::SpotEnterOrderCreated
                | SpreadState::FuturesEnterOrderCreated
        )
    }

    /// Suffix appended to the status line
    pub fn status_suffix(&self) -> &'static str {
        match self {
            SpreadState::CollectInformation => " (warm-up)",
            SpreadState::WaitingForNarrowSpread => "",
            SpreadState::SpotEnterOrderCreated => " [buying spot]",
            SpreadState::FuturesEnterOrderCreated => " [shorting futures]",
            SpreadState::WaitingForWideSpread => " [in position]",
            SpreadState::FuturesExitOrderCreated => " [covering futures]",
            SpreadState::SpotExitOrderCreated => " [selling spot]",
            SpreadState::Parked => " [PARKED]",
        }
    }
}

impl fmt::Display for SpreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpreadState::CollectInformation => "COLLECT_INFORMATION",
            SpreadState::WaitingForNarrowSpread => "WAITING_FOR_NARROW_SPREAD",
            SpreadState::SpotEnterOrderCreated => "SPOT_ENTER_ORDER_CREATED",
            SpreadState::FuturesEnterOrderCreated => "FUTURES_ENTER_ORDER_CREATED",
            SpreadState::WaitingForWideSpread => "WAITING_FOR_WIDE_SPREAD",
            SpreadState::FuturesExitOrderCreated => "FUTURES_EXIT_ORDER_CREATED",
            SpreadState::SpotExitOrderCreated => "SPOT_EXIT_ORDER_CREATED",
            SpreadState::Parked => "PARKED",
        };
        write!(f, "{}", name)
    }
}

/// Notification raised by a spread for the engine to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    MinSpreadReached,
    MinSpreadLost,
    MaxSpreadReached,
    MaxSpreadLost,
    EnterOrderExecuted,
    ExitOrderExecuted,
    MinSpreadChanged,
    MaxSpreadChanged,
    WarmupElapsed,
}

impl Signal {
    pub const ALL: [Signal; 9] = [
        Signal::MinSpreadReached,
        Signal::MinSpreadLost,
        Signal::MaxSpreadReached,
        Signal::MaxSpreadLost,
        Signal::EnterOrderExecuted,
        Signal::ExitOrderExecuted,
        Signal::MinSpreadChanged,
        Signal::MaxSpreadChanged,
        Signal::WarmupElapsed,
    ];
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Position in a spread's history: its state plus a commit counter
///
/// The epoch grows on every committed transition, including ones that
/// return to the same state, so a cursor identifies one concrete order
/// generation rather than just a state name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateCursor {
    pub state: SpreadState,
    pub epoch: u64,
}

impl StateCursor {
    pub fn new(state: SpreadState) -> Self {
        Self { state, epoch: 0 }
    }

    pub fn advance(self, state: SpreadState) -> Self {
        Self {
            state,
            epoch: self.epoch + 1,
        }
    }
}

/// A signal bound to the cursor it was raised against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvent {
    pub signal: Signal,
    pub cursor: StateCursor,
}

/// Side effect attached to a transition edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    FinishWarmup,
    PlaceSpotEnter,
    CancelSpotEnter,
    SettleSpotEnter,
    RepriceFuturesEnter,
    SettleFuturesEnter,
    PlaceFuturesExit,
    CancelFuturesExit,
    SettleFuturesExit,
    RepriceSpotExit,
    SettleSpotExit,
}

/// One edge of the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub action: Action,
    pub next: SpreadState,
}

/// Look up the edge for `(state, signal)`; `None` means no side effect
pub fn transition_for(state: SpreadState, signal: Signal) -> Option<Transition> {
    use Action::*;
    use Signal::*;
    use SpreadState::*;

    let (action, next) = match (state, signal) {
        (CollectInformation, WarmupElapsed) => (FinishWarmup, WaitingForNarrowSpread),
        (WaitingForNarrowSpread, MinSpreadReached) => (PlaceSpotEnter, SpotEnterOrderCreated),
        (SpotEnterOrderCreated, MinSpreadLost) => (CancelSpotEnter, WaitingForNarrowSpread),
        (SpotEnterOrderCreated, EnterOrderExecuted) => (SettleSpotEnter, FuturesEnterOrderCreated),
        (FuturesEnterOrderCreated, MinSpreadChanged) => (RepriceFuturesEnter, FuturesEnterOrderCreated),
        (FuturesEnterOrderCreated, EnterOrderExecuted) => (SettleFuturesEnter, WaitingForWideSpread),
        (WaitingForWideSpread, MaxSpreadReached) => (PlaceFuturesExit, FuturesExitOrderCreated),
        (FuturesExitOrderCreated, MaxSpreadLost) => (CancelFuturesExit, WaitingForWideSpread),
        (FuturesExitOrderCreated, ExitOrderExecuted) => (SettleFuturesExit, SpotExitOrderCreated),
        (SpotExitOrderCreated, MaxSpreadChanged) => (RepriceSpotExit, SpotExitOrderCreated),
        (SpotExitOrderCreated, ExitOrderExecuted) => (SettleSpotExit, WaitingForNarrowSpread),
        _ => return None,
    };
    Some(Transition { action, next })
}
