//! End-to-end tests of the spread cycle against paper venues
//!
//! Drives one BTC spread through warm-up, entry (spot buy, futures short),
//! exit (futures cover, spot sell) and profit realization, feeding book
//! tickers to both the paper gateways and the engine the way the runtime does.
//!
//! # Running the tests
//! ```bash
//! cargo test --test full_cycle
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use spread_arb::adapters::types::{BookTicker, OrderSide, TradeTick};
use spread_arb::adapters::PaperGateway;
use spread_arb::core::{
    transition_for, EngineSettings, Leg, Signal, SignalEvent, Spread, SpreadEngine, SpreadParams,
    SpreadState, SymbolInfo, TransitionOutcome, Venue,
};

const BASE: &str = "BTC";
const SYMBOL: &str = "BTCUSDT";

// =============================================================================
// Harness
// =============================================================================

struct Cycle {
    engine: Arc<SpreadEngine>,
    spot: Arc<PaperGateway>,
    futures: Arc<PaperGateway>,
}

impl Cycle {
    fn new(params: SpreadParams) -> Self {
        let spot = Arc::new(
            PaperGateway::new("paper-spot")
                .with_balance("USDT", dec!(10000))
                .with_market(SYMBOL, "BTC", "USDT")
                .with_min_notional(dec!(5)),
        );
        let futures = Arc::new(PaperGateway::new("paper-futures"));

        let mut venues = HashMap::new();
        venues.insert("paper-spot".to_string(), Venue::new(spot.clone()));
        venues.insert("paper-futures".to_string(), Venue::new(futures.clone()));

        let spread = Spread::new(
            BASE,
            SymbolInfo::new("paper-spot", SYMBOL, "USDT", dec!(0.1), dec!(0.001)).with_min_notional(dec!(5)),
            SymbolInfo::new("paper-futures", SYMBOL, "USDT", dec!(0.1), dec!(0.001)),
            params,
        );
        let settings = EngineSettings {
            spread_params: params,
            order_notional: dec!(1000),
            max_open_positions: Some(1),
        };
        let engine = Arc::new(SpreadEngine::new(settings, venues, vec![spread]).unwrap());
        Self { engine, spot, futures }
    }

    /// Spot book update: paper matching first, then the engine
    fn spot_book(&self, bid: Decimal, ask: Decimal) -> Option<SignalEvent> {
        self.spot.match_book(SYMBOL, &BookTicker::new(bid, ask));
        self.engine.on_spot_price_update(BASE, ask, bid).unwrap()
    }

    fn futures_book(&self, bid: Decimal, ask: Decimal) -> Option<SignalEvent> {
        self.futures.match_book(SYMBOL, &BookTicker::new(bid, ask));
        self.engine.on_futures_price_update(BASE, ask, bid).unwrap()
    }

    async fn apply(&self, event: Option<SignalEvent>, expected: Signal) -> TransitionOutcome {
        let event = event.unwrap_or_else(|| panic!("expected {} to be raised", expected));
        assert_eq!(event.signal, expected);
        self.engine.apply(BASE, event).await.unwrap()
    }

    fn state(&self) -> SpreadState {
        self.engine.state_of(BASE).unwrap()
    }

    fn placed(&self) -> (u64, u64) {
        (self.spot.placed_count(), self.futures.placed_count())
    }

    /// Inject every signal without an edge from the current state
    async fn assert_off_table_signals_are_inert(&self) {
        let before = self.engine.snapshot(BASE).unwrap().cursor();
        let placed = self.placed();
        for signal in Signal::ALL {
            if transition_for(before.state, signal).is_some() {
                continue;
            }
            let outcome = self
                .engine
                .apply(BASE, SignalEvent { signal, cursor: before })
                .await
                .unwrap();
            assert_eq!(outcome, TransitionOutcome::Stale, "{} in {}", signal, before.state);
        }
        assert_eq!(self.engine.snapshot(BASE).unwrap().cursor(), before);
        assert_eq!(self.placed(), placed);
    }

    /// Warm-up with a -0.3 reference average
    async fn warm_up(&self) {
        self.spot_book(dec!(100), dec!(100.1));
        for _ in 0..10 {
            self.futures_book(dec!(100.2), dec!(100.3));
        }
        self.engine.finish_warmup().await;
        assert_eq!(self.state(), SpreadState::WaitingForNarrowSpread);
    }

    /// Scenario A: spread -0.5 against a -0.3 reference places a spot buy at 100
    async fn enter_spot(&self) {
        let outcome = self
            .apply(self.futures_book(dec!(100.4), dec!(100.5)), Signal::MinSpreadReached)
            .await;
        assert!(outcome.is_committed());
    }

    /// Scenario B: spot fill of 10 at 100, futures short of 10 at 100.5
    async fn open_position(&self) {
        self.enter_spot().await;
        self.apply(self.spot_book(dec!(99.9), dec!(100)), Signal::EnterOrderExecuted)
            .await;
        assert_eq!(self.state(), SpreadState::FuturesEnterOrderCreated);
        self.apply(self.futures_book(dec!(100.5), dec!(100.6)), Signal::EnterOrderExecuted)
            .await;
        assert_eq!(self.state(), SpreadState::WaitingForWideSpread);
    }

    /// Seed a zero exit reference, then widen to 0.099 and fill the cover
    async fn cover_futures(&self) {
        for _ in 0..5 {
            assert!(self.spot_book(dec!(100.4), dec!(100.5)).is_none());
        }
        assert!(self.futures_book(dec!(100.9), dec!(101)).is_none());
        self.apply(self.spot_book(dec!(100.9), dec!(101)), Signal::MaxSpreadReached)
            .await;
        assert_eq!(self.state(), SpreadState::FuturesExitOrderCreated);

        self.apply(self.futures_book(dec!(100.8), dec!(100.9)), Signal::ExitOrderExecuted)
            .await;
        assert_eq!(self.state(), SpreadState::SpotExitOrderCreated);
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_scenario_a_spot_entry() {
    let cycle = Cycle::new(SpreadParams::default());
    cycle.warm_up().await;
    cycle.enter_spot().await;

    let snapshot = cycle.engine.snapshot(BASE).unwrap();
    assert_eq!(snapshot.curr_spread(), Some(dec!(-0.5)));
    let order = snapshot.pending_order().unwrap();
    assert_eq!(order.price, dec!(100));
    assert_eq!(order.amount, dec!(10));
    assert!(order.is_buyer());

    // quote is reserved while the order rests
    assert_eq!(cycle.spot.balance("USDT"), dec!(9000));
    assert_eq!(cycle.engine.available_permits(), Some(0));
}

#[tokio::test]
async fn test_scenario_b_hedge_sized_to_spot_fill() {
    let cycle = Cycle::new(SpreadParams::default());
    cycle.warm_up().await;
    cycle.enter_spot().await;
    cycle
        .apply(cycle.spot_book(dec!(99.9), dec!(100)), Signal::EnterOrderExecuted)
        .await;

    let hedge = cycle.futures.open_orders();
    assert_eq!(hedge.len(), 1);
    assert_eq!(hedge[0].1.side, OrderSide::Sell);
    assert_eq!(hedge[0].1.price, dec!(100.5));
    assert_eq!(hedge[0].1.quantity, dec!(10));
    assert_eq!(cycle.spot.balance("BTC"), dec!(10));

    cycle
        .apply(cycle.futures_book(dec!(100.5), dec!(100.6)), Signal::EnterOrderExecuted)
        .await;
    let snapshot = cycle.engine.snapshot(BASE).unwrap();
    assert_eq!(snapshot.spot_order_amount(), dec!(10));
    let enter = snapshot.enter_spread().unwrap();
    assert!((enter - dec!(-0.4975)).abs() < dec!(0.0001), "enter spread {}", enter);
    // a new phase starts with fresh statistics
    assert_eq!(snapshot.reference_len(), 0);
}

#[tokio::test]
async fn test_scenario_c_full_cycle_profit() {
    let cycle = Cycle::new(SpreadParams::default());
    cycle.warm_up().await;
    cycle.open_position().await;
    cycle.cover_futures().await;

    let sell = cycle.spot.open_orders();
    assert_eq!(sell.len(), 1);
    assert_eq!(sell[0].1.side, OrderSide::Sell);
    assert_eq!(sell[0].1.price, dec!(101));
    assert_eq!(sell[0].1.quantity, dec!(10));

    let outcome = cycle
        .apply(cycle.spot_book(dec!(101.1), dec!(101.2)), Signal::ExitOrderExecuted)
        .await;
    assert_eq!(
        outcome,
        TransitionOutcome::Committed {
            from: SpreadState::SpotExitOrderCreated,
            to: SpreadState::WaitingForNarrowSpread
        }
    );

    let snapshot = cycle.engine.snapshot(BASE).unwrap();
    let exit = snapshot.exit_spread().unwrap();
    assert!((exit - dec!(0.0991)).abs() < dec!(0.0001), "exit spread {}", exit);

    let profit = cycle.engine.profit_total();
    assert!(profit > dec!(0.0595) && profit < dec!(0.0598), "profit {}", profit);

    assert_eq!(cycle.spot.balance("USDT"), dec!(10010));
    assert_eq!(cycle.spot.balance("BTC"), dec!(0));
    assert_eq!(cycle.engine.available_permits(), Some(1));
    assert!(snapshot.pending_order().is_none());
}

#[tokio::test]
async fn test_only_table_edges_have_side_effects() {
    let cycle = Cycle::new(SpreadParams::default());
    cycle.assert_off_table_signals_are_inert().await;
    cycle.warm_up().await;
    cycle.assert_off_table_signals_are_inert().await;

    cycle.enter_spot().await;
    cycle.assert_off_table_signals_are_inert().await;

    cycle
        .apply(cycle.spot_book(dec!(99.9), dec!(100)), Signal::EnterOrderExecuted)
        .await;
    cycle.assert_off_table_signals_are_inert().await;

    cycle
        .apply(cycle.futures_book(dec!(100.5), dec!(100.6)), Signal::EnterOrderExecuted)
        .await;
    cycle.assert_off_table_signals_are_inert().await;

    cycle.cover_futures().await;
    cycle.assert_off_table_signals_are_inert().await;
}

#[tokio::test]
async fn test_duplicate_execution_signal_is_idempotent() {
    let cycle = Cycle::new(SpreadParams::default());
    cycle.warm_up().await;
    cycle.open_position().await;
    cycle.cover_futures().await;

    let event = cycle.spot_book(dec!(101.1), dec!(101.2)).unwrap();
    assert!(cycle.engine.apply(BASE, event).await.unwrap().is_committed());
    let profit = cycle.engine.profit_total();
    let placed = cycle.placed();

    assert_eq!(cycle.engine.apply(BASE, event).await.unwrap(), TransitionOutcome::Stale);
    assert_eq!(cycle.engine.profit_total(), profit);
    assert_eq!(cycle.placed(), placed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_fill_sources_place_one_hedge() {
    let cycle = Cycle::new(SpreadParams {
        by_trade: true,
        ..SpreadParams::default()
    });
    cycle.warm_up().await;
    cycle.enter_spot().await;

    // trade print fills the order, the book cross then reports the same fill
    let (order_id, _) = cycle.spot.open_orders().remove(0);
    cycle.spot.fill_order(&order_id, dec!(10));
    let trade = TradeTick {
        price: dec!(100),
        quantity: dec!(10),
        maker_side: OrderSide::Buy,
    };
    let from_trade = cycle.engine.on_trade(BASE, Leg::Spot, &trade).unwrap().unwrap();
    let from_price = SignalEvent {
        signal: Signal::EnterOrderExecuted,
        cursor: from_trade.cursor,
    };

    let (a, b) = tokio::join!(
        {
            let engine = Arc::clone(&cycle.engine);
            tokio::spawn(async move { engine.apply(BASE, from_trade).await.unwrap() })
        },
        {
            let engine = Arc::clone(&cycle.engine);
            tokio::spawn(async move { engine.apply(BASE, from_price).await.unwrap() })
        }
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(outcomes.iter().filter(|o| o.is_committed()).count(), 1);
    assert!(outcomes.contains(&TransitionOutcome::Stale));
    assert_eq!(cycle.futures.placed_count(), 1);
    assert_eq!(cycle.futures.open_orders().len(), 1);
}

#[tokio::test]
async fn test_partial_spot_fill_hedges_filled_amount() {
    let cycle = Cycle::new(SpreadParams {
        by_price: false,
        by_trade: true,
        ..SpreadParams::default()
    });
    cycle.warm_up().await;
    cycle.enter_spot().await;

    let (order_id, _) = cycle.spot.open_orders().remove(0);
    cycle.spot.fill_order(&order_id, dec!(4));
    let trade = TradeTick {
        price: dec!(100),
        quantity: dec!(4),
        maker_side: OrderSide::Buy,
    };
    let event = cycle.engine.on_trade(BASE, Leg::Spot, &trade).unwrap();
    cycle.apply(event, Signal::EnterOrderExecuted).await;

    assert_eq!(cycle.state(), SpreadState::FuturesEnterOrderCreated);
    // remainder cancelled and its notional returned
    assert!(cycle.spot.open_orders().is_empty());
    assert_eq!(cycle.spot.balance("USDT"), dec!(9600));
    assert_eq!(cycle.spot.balance("BTC"), dec!(4));

    let hedge = cycle.futures.open_orders();
    assert_eq!(hedge[0].1.quantity, dec!(4));
    assert_eq!(cycle.engine.snapshot(BASE).unwrap().spot_order_amount(), dec!(4));
}

#[tokio::test]
async fn test_spot_exit_reprices_toward_falling_ask() {
    let cycle = Cycle::new(SpreadParams::default());
    cycle.warm_up().await;
    cycle.open_position().await;
    cycle.cover_futures().await;

    let outcome = cycle
        .apply(cycle.spot_book(dec!(100.7), dec!(100.8)), Signal::MaxSpreadChanged)
        .await;
    assert_eq!(
        outcome,
        TransitionOutcome::Committed {
            from: SpreadState::SpotExitOrderCreated,
            to: SpreadState::SpotExitOrderCreated
        }
    );
    let open = cycle.spot.open_orders();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].1.price, dec!(100.8));
    assert_eq!(open[0].1.quantity, dec!(10));
}

#[tokio::test]
async fn test_min_spread_lost_cancels_and_rearms() {
    let cycle = Cycle::new(SpreadParams::default());
    cycle.warm_up().await;
    cycle.enter_spot().await;

    cycle
        .apply(cycle.futures_book(dec!(100), dec!(100.1)), Signal::MinSpreadLost)
        .await;
    assert_eq!(cycle.state(), SpreadState::WaitingForNarrowSpread);
    assert!(cycle.spot.open_orders().is_empty());
    assert_eq!(cycle.spot.balance("USDT"), dec!(10000));
    assert_eq!(cycle.engine.available_permits(), Some(1));
}

#[tokio::test]
async fn test_book_trading_through_fills_venue_and_engine_alike() {
    let cycle = Cycle::new(SpreadParams::default());
    cycle.warm_up().await;
    cycle.enter_spot().await;

    // bid drops through our 100 buy while the ask stays above it
    let outcome = cycle
        .apply(cycle.spot_book(dec!(99.9), dec!(100.1)), Signal::EnterOrderExecuted)
        .await;
    assert!(outcome.is_committed());
    assert!(cycle.spot.open_orders().is_empty());
    assert_eq!(cycle.spot.balance("BTC"), dec!(10));

    // ask lifts above our 100.5 short while the bid stays below it
    cycle
        .apply(cycle.futures_book(dec!(100.4), dec!(100.6)), Signal::EnterOrderExecuted)
        .await;
    assert_eq!(cycle.state(), SpreadState::WaitingForWideSpread);
    assert!(cycle.futures.open_orders().is_empty());
}
