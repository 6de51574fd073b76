//! Property-based tests for spread statistics
//!
//! Random book sequences on both legs must keep the running extrema around
//! the current spread, and the reference queue must stay bounded.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use spread_arb::core::{ReferenceQueue, Spread, SpreadParams, SymbolInfo};

fn spread() -> Spread {
    Spread::new(
        "ETH",
        SymbolInfo::new("spot", "ETHUSDT", "USDT", dec!(0.01), dec!(0.001)),
        SymbolInfo::new("futures", "ETHUSDT", "USDT", dec!(0.01), dec!(0.001)),
        SpreadParams::default(),
    )
}

/// (is_spot, bid cents, ask offset cents); bid 0 models an empty book side
fn book_update() -> impl Strategy<Value = (bool, i64, i64)> {
    (any::<bool>(), 0i64..500_000, 0i64..1_000)
}

fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

proptest! {
    #[test]
    fn extrema_bracket_current_spread(updates in prop::collection::vec(book_update(), 1..200)) {
        let mut s = spread();
        for (is_spot, bid, offset) in updates {
            let (bid, ask) = (cents(bid), cents(bid + offset));
            if is_spot {
                s.on_spot_price_update(ask, bid);
            } else {
                s.on_futures_price_update(ask, bid);
            }
            if let Some(curr) = s.curr_spread() {
                let min = s.min_spread().unwrap();
                let max = s.max_spread().unwrap();
                prop_assert!(min <= curr && curr <= max, "{} <= {} <= {}", min, curr, max);
            }
        }
    }

    #[test]
    fn zero_prices_never_touch_statistics(bid in 1i64..500_000, offset in 0i64..1_000) {
        let mut s = spread();
        s.on_spot_price_update(cents(bid + offset), cents(bid));
        s.on_futures_price_update(cents(bid + offset), cents(bid));
        let before = (s.curr_spread(), s.min_spread(), s.max_spread(), s.reference_len());

        prop_assert!(s.on_spot_price_update(Decimal::ZERO, cents(bid)).is_none());
        prop_assert!(s.on_futures_price_update(cents(bid), Decimal::ZERO).is_none());
        prop_assert_eq!(before, (s.curr_spread(), s.min_spread(), s.max_spread(), s.reference_len()));
    }

    #[test]
    fn reference_queue_is_bounded(
        samples in prop::collection::vec(-500i64..500, 0..1500),
        capacity in 1usize..700,
    ) {
        let mut queue = ReferenceQueue::new(capacity);
        for sample in &samples {
            queue.push(cents(*sample));
            prop_assert!(queue.len() <= capacity);
        }

        let kept: Vec<Decimal> = samples.iter().rev().take(capacity).map(|v| cents(*v)).collect();
        prop_assert_eq!(queue.len(), kept.len());
        if !kept.is_empty() {
            let expected = kept.iter().copied().sum::<Decimal>() / Decimal::from(kept.len());
            prop_assert_eq!(queue.average(), Some(expected));
        }
    }
}
