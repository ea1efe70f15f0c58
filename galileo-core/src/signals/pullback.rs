//! Fibonacci pullback entries: arm inside the retracement zone, fire on a breakout.
//!
//! Per side, two states. A close inside the zone of the latest leg arms the side
//! and records a candidate stop; the arming bar never fires. While armed (age
//! at most `arm_bars`), a close that clears the prior `confirm_lookback` bars'
//! extreme fires with the stored stop and disarms. Past `arm_bars` the side
//! disarms without firing and waits for a fresh zone entry.

use crate::config::PullbackConfig;
use crate::domain::{Instrument, Side};
use crate::market::MarketView;
use crate::signals::{EntrySignal, SignalSource};
use crate::swing::{Leg, SwingDetector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Arm record for one side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmState {
    pub armed_at: usize,
    pub candidate_stop: f64,
}

/// Retracement band in price terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibZone {
    pub low: f64,
    pub high: f64,
    pub fib_min: f64,
    pub fib_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PullbackOutcome {
    Disabled,
    NoLeg,
    /// EMA slope disagrees with the leg and slope is enforced.
    SlopeAgainst,
    VelocityTooLow { vr: f64 },
    /// Close entered the zone this bar; no trigger on the arming bar.
    Armed { zone: FibZone, stop: f64 },
    Triggered(EntrySignal),
    /// Armed, still inside the window, no confirmation yet.
    Waiting { age: usize },
    /// Armed too long; the side has been disarmed.
    Expired { age: usize },
    /// Not armed and outside the zone.
    Idle,
}

/// ATR clamped between a pip floor and a multiple of itself.
pub fn soft_atr(atr: f64, pip_size: f64, config: &PullbackConfig) -> f64 {
    atr.max(config.atr_floor_pips * pip_size)
        .min(config.atr_cap_x * atr)
}

/// Band width as a function of the velocity ratio: faster markets retrace less.
fn fib_band(vr: f64, config: &PullbackConfig) -> (f64, f64) {
    if !config.auto_width {
        (config.fib_min, config.fib_max)
    } else if vr >= 3.0 {
        (0.30, 0.55)
    } else if vr >= 1.5 {
        (0.38, 0.62)
    } else {
        (0.50, 0.70)
    }
}

/// Pullback state machine for both sides.
#[derive(Debug, Clone)]
pub struct PullbackEngine {
    config: PullbackConfig,
    long: Option<ArmState>,
    short: Option<ArmState>,
}

impl PullbackEngine {
    pub fn new(config: PullbackConfig) -> Self {
        Self {
            config,
            long: None,
            short: None,
        }
    }

    pub fn arm_state(&self, side: Side) -> Option<ArmState> {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    fn slot(&mut self, side: Side) -> &mut Option<ArmState> {
        match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        }
    }

    pub fn reset(&mut self) {
        self.long = None;
        self.short = None;
    }

    /// Run one bar of the state machine for `side`.
    ///
    /// `atr` is the cached bar ATR and `velocity` the filtered particle velocity.
    pub fn evaluate(
        &mut self,
        side: Side,
        view: &MarketView<'_>,
        atr: f64,
        velocity: f64,
        instrument: &Instrument,
    ) -> PullbackOutcome {
        let cfg = self.config.clone();
        if !cfg.enabled {
            return PullbackOutcome::Disabled;
        }
        let detector = SwingDetector::new(view.bars);
        let leg = match side {
            Side::Long => detector.build_leg_up(cfg.back, cfg.look, instrument.tick_size),
            Side::Short => detector.build_leg_down(cfg.back, cfg.look, instrument.tick_size),
        };
        let Some(leg) = leg else {
            return PullbackOutcome::NoLeg;
        };

        let slope_ok = match side {
            Side::Long => view.ema_ago(0) > view.ema_ago(3),
            Side::Short => view.ema_ago(0) < view.ema_ago(3),
        };
        if !cfg.relax_ema_slope && cfg.need_ema_slope && !slope_ok {
            return PullbackOutcome::SlopeAgainst;
        }

        let soft = soft_atr(atr, instrument.pip_size, &cfg);
        let vr = velocity.abs() / soft.max(1e-12);
        if vr < cfg.min_vr {
            return PullbackOutcome::VelocityTooLow { vr };
        }

        let zone = zone_for(side, &leg, vr, &cfg);
        let stop = candidate_stop(side, &leg, &zone, soft, &cfg);
        let tol = cfg.zone_tol_pips.max(0.0) * instrument.pip_size;
        let close = view.close();
        let idx = view.index();

        if close >= zone.low - tol && close <= zone.high + tol {
            *self.slot(side) = Some(ArmState {
                armed_at: idx,
                candidate_stop: stop,
            });
            debug!(%side, bar = idx, zone_low = zone.low, zone_high = zone.high, stop, vr, "pullback armed");
            return PullbackOutcome::Armed { zone, stop };
        }

        let Some(arm) = *self.slot(side) else {
            return PullbackOutcome::Idle;
        };
        let age = idx.saturating_sub(arm.armed_at);
        if age > cfg.arm_bars.max(1) {
            *self.slot(side) = None;
            debug!(%side, bar = idx, age, "pullback arm expired");
            return PullbackOutcome::Expired { age };
        }

        if breakout(side, view, cfg.confirm_lookback.max(1), instrument.tick_size)
            && micro_confirm(side, view, cfg.micro_confirm)
        {
            let stop = if arm.candidate_stop.is_finite() {
                arm.candidate_stop
            } else {
                stop
            };
            *self.slot(side) = None;
            debug!(%side, bar = idx, stop, vr, "pullback triggered");
            return PullbackOutcome::Triggered(EntrySignal {
                side,
                source: SignalSource::Pullback,
                stop_loss: Some(stop),
                bar_index: idx,
            });
        }

        PullbackOutcome::Waiting { age }
    }
}

fn zone_for(side: Side, leg: &Leg, vr: f64, cfg: &PullbackConfig) -> FibZone {
    let (f_min, f_max) = fib_band(vr, cfg);
    let (hi, lo) = (leg.high(), leg.low());
    let range = hi - lo;
    let (low, high) = match side {
        // Long retraces down from the leg high.
        Side::Long => (hi - f_max * range, hi - f_min * range),
        // Short retraces up from the leg low.
        Side::Short => (lo + f_min * range, lo + f_max * range),
    };
    FibZone {
        low,
        high,
        fib_min: f_min,
        fib_max: f_max,
    }
}

fn candidate_stop(side: Side, leg: &Leg, zone: &FibZone, soft: f64, cfg: &PullbackConfig) -> f64 {
    match side {
        Side::Long => leg.low().min(zone.low) - cfg.atr_buf_x * soft,
        Side::Short => leg.high().max(zone.high) + cfg.atr_buf_x * soft,
    }
}

/// Close clears the prior `n` bars' extreme, within half a tick.
fn breakout(side: Side, view: &MarketView<'_>, n: usize, tick: f64) -> bool {
    let close = view.close();
    match side {
        Side::Long => close >= view.prior_high(n) - 0.5 * tick,
        Side::Short => close <= view.prior_low(n) + 0.5 * tick,
    }
}

/// Optional stricter check: close beyond the previous two bars' extreme.
fn micro_confirm(side: Side, view: &MarketView<'_>, enabled: bool) -> bool {
    if !enabled {
        return true;
    }
    let close = view.close();
    match side {
        Side::Long => close > view.prior_high(2),
        Side::Short => close < view.prior_low(2),
    }
}
