//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. State clamp: velocity and acceleration stay within their ATR multiples
//! 2. Kalman covariance: diagonal never goes negative
//! 3. Stop rounding: never moves a stop toward the market
//! 4. Volume normalization: on the step grid and inside the tradable range
//! 5. Trailing ratchet: applied stops only tighten
//! 6. Daily tilt: reward multiple stays inside its band

use chrono::NaiveDate;
use galileo_core::config::{EngineConfig, GeneralConfig, KalmanConfig};
use galileo_core::domain::{Bar, Instrument, PositionView, Quote, Side};
use galileo_core::exits::ExitManager;
use galileo_core::gates::{daily_tilt, DailyTally};
use galileo_core::market::MarketView;
use galileo_core::physics::integrator::{ACCELERATION_LIMIT_ATR, VELOCITY_LIMIT_ATR};
use galileo_core::physics::{clamp_state, KalmanCovariance, KalmanEstimator, PhysicsState};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_atr() -> impl Strategy<Value = f64> {
    1e-5..1e-2_f64
}

fn arb_fx_price() -> impl Strategy<Value = f64> {
    0.5..2.0_f64
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

/// Close-to-close moves in pips for a random walk.
fn arb_walk() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-8.0..8.0_f64, 5..60)
}

// ── 1. State clamp ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn clamp_bounds_velocity_and_acceleration(
        x in arb_fx_price(),
        v in -1e6..1e6_f64,
        a in -1e8..1e8_f64,
        atr in arb_atr(),
    ) {
        let clamped = clamp_state(PhysicsState { x, v, a }, atr);
        prop_assert_eq!(clamped.x, x);
        prop_assert!(clamped.v.abs() <= atr * VELOCITY_LIMIT_ATR);
        prop_assert!(clamped.a.abs() <= atr * ACCELERATION_LIMIT_ATR);
        // Values already inside the bounds pass through untouched.
        if v.abs() <= atr * VELOCITY_LIMIT_ATR {
            prop_assert_eq!(clamped.v, v);
        }
    }
}

// ── 2. Kalman covariance ─────────────────────────────────────────────

proptest! {
    #[test]
    fn covariance_diagonal_stays_non_negative(
        observations in prop::collection::vec(arb_fx_price(), 1..50),
        dt in 1.0..3600.0_f64,
        atr in arb_atr(),
        q in 1e-9..1e-4_f64,
        r in 1e-9..1e-4_f64,
    ) {
        let kf = KalmanEstimator::new(KalmanConfig { enabled: true, q, r });
        let mut cov = KalmanCovariance::default();
        let mut state = (observations[0], 0.0);
        for obs in observations {
            let (update, next) = kf.update(state, obs, &cov, dt, atr);
            prop_assert!(next.p00 >= 0.0, "p00 = {}", next.p00);
            prop_assert!(next.p11 >= -1e-15, "p11 = {}", next.p11);
            prop_assert!(update.gain_x >= 0.0 && update.gain_x <= 1.0);
            cov = next;
            state = (update.x, update.v);
        }
    }
}

// ── 3. Stop rounding ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn round_stop_never_moves_toward_market(price in arb_fx_price(), side in arb_side()) {
        let inst = Instrument::fx_major("EURUSD");
        let rounded = inst.round_stop(price, side);
        let slack = 1e-9 * inst.tick_size;
        match side {
            Side::Long => prop_assert!(rounded <= price + slack),
            Side::Short => prop_assert!(rounded >= price - slack),
        }
        prop_assert!((rounded - price).abs() < inst.tick_size + slack);
    }
}

// ── 4. Volume normalization ──────────────────────────────────────────

proptest! {
    #[test]
    fn normalized_volume_is_on_grid_and_in_range(units in -1e6..1e9_f64) {
        let inst = Instrument::fx_major("EURUSD");
        let vol = inst.normalize_volume(units);
        prop_assert!(vol >= inst.volume_min && vol <= inst.volume_max);
        let steps = vol / inst.volume_step;
        prop_assert!((steps - steps.round()).abs() < 1e-9);
    }
}

// ── 5. Trailing ratchet ──────────────────────────────────────────────

fn walk_bars(start: f64, moves: &[f64]) -> Vec<Bar> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut close = start;
    let mut bars = Vec::with_capacity(moves.len() + 1);
    for (i, step) in std::iter::once(&0.0).chain(moves).enumerate() {
        let open = close;
        close += step * 0.0001;
        bars.push(Bar {
            open_time: base + chrono::Duration::minutes(5 * i as i64),
            open,
            high: open.max(close) + 0.0001,
            low: open.min(close) - 0.0001,
            close,
        });
    }
    bars
}

proptest! {
    #[test]
    fn applied_trailing_stops_only_tighten(
        moves in arb_walk(),
        side in arb_side(),
        chandelier in any::<bool>(),
    ) {
        let mut config = EngineConfig::default();
        config.risk.trail_chandelier = chandelier;
        let exits = ExitManager::new(&config);
        let inst = Instrument::fx_major("EURUSD");
        let bars = walk_bars(1.1, &moves);
        let atr = vec![0.0008; bars.len()];

        let mut position = PositionView {
            id: 1,
            label: "GAL_U4".into(),
            side,
            units: 10_000.0,
            entry_price: 1.1,
            stop_loss: None,
            take_profit: None,
            entry_time: bars[0].open_time,
        };

        for end in 1..=bars.len() {
            let view = MarketView::new(&bars[..end], &atr[..end], &atr[..end], &atr[..end]).unwrap();
            let close = view.close();
            let quote = Quote::new(close, close + 0.00005);
            let updates = exits.trailing_pass(std::slice::from_ref(&position), &view, 0.0008, quote, &inst);
            prop_assert_eq!(updates.len(), 1);
            if let Some(stop) = updates[0].new_stop() {
                if let Some(prev) = position.stop_loss {
                    match side {
                        Side::Long => prop_assert!(stop > prev, "{stop} <= {prev}"),
                        Side::Short => prop_assert!(stop < prev, "{stop} >= {prev}"),
                    }
                }
                // Protective side of the exit price.
                let reference = quote.exit_price(side, close);
                match side {
                    Side::Long => prop_assert!(stop < reference),
                    Side::Short => prop_assert!(stop > reference),
                }
                position.stop_loss = Some(stop);
            }
        }
    }
}

// ── 6. Daily tilt ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn tilt_keeps_reward_in_band(
        wins in 0u32..20,
        losses in 0u32..20,
        r in 1.2..2.0_f64,
        cap in 0u32..10,
    ) {
        let general = GeneralConfig { max_trades_per_day: cap, ..GeneralConfig::default() };
        let tilt = daily_tilt(&general, r, DailyTally { wins, losses });
        prop_assert!(tilt.r_multiple >= 1.2 - 1e-12 && tilt.r_multiple <= 2.0 + 1e-12);
        if cap == 0 {
            prop_assert_eq!(tilt.max_trades, 0);
        } else {
            prop_assert!(tilt.max_trades >= 1 && tilt.max_trades <= cap + 1);
        }
    }
}
