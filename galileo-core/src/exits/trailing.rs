//! ATR trailing stop.
//!
//! Chandelier mode anchors to the extreme since entry; otherwise the stop sits
//! `k * ATR` from the reference price. Either way the candidate stays at least
//! one tick on the protective side of the reference and is rounded away from it.

use super::{ExitKind, ExitManager, SkipReason, StopUpdate};
use crate::domain::{Bar, Instrument, PositionView, Quote, Side};
use crate::market::MarketView;
use chrono::NaiveDateTime;
use tracing::debug;

/// Highest high and lowest low from the bar containing `entry_time` through the
/// current bar. Bar 0 only counts when it is the sole bar.
pub fn high_low_since(bars: &[Bar], entry_time: NaiveDateTime) -> Option<(f64, f64)> {
    let last = bars.len().checked_sub(1)?;
    let start = (1..=last)
        .rev()
        .find(|&i| bars[i].open_time <= entry_time)
        .unwrap_or(last.min(1));
    let (hi, lo) = bars[start..]
        .iter()
        .fold((f64::NEG_INFINITY, f64::INFINITY), |(hi, lo), b| {
            (hi.max(b.high), lo.min(b.low))
        });
    (hi.is_finite() && lo.is_finite()).then_some((hi, lo))
}

/// Tick-rounded trailing stop for `side` before any improvement checks.
pub fn trail_candidate(
    side: Side,
    reference: f64,
    atr: f64,
    k: f64,
    extremes: Option<(f64, f64)>,
    instrument: &Instrument,
) -> f64 {
    let offset = k * atr;
    let base = match (side, extremes) {
        (Side::Long, Some((hi, _))) => hi - offset,
        (Side::Short, Some((_, lo))) => lo + offset,
        (Side::Long, None) => reference - offset,
        (Side::Short, None) => reference + offset,
    };
    let bounded = match side {
        Side::Long => base.min(reference - instrument.tick_size),
        Side::Short => base.max(reference + instrument.tick_size),
    };
    instrument.round_stop(bounded, side)
}

impl ExitManager {
    /// Trailing pass over `positions`, which the broker has already filtered by label.
    pub fn trailing_pass(
        &self,
        positions: &[PositionView],
        view: &MarketView<'_>,
        atr: f64,
        quote: Quote,
        instrument: &Instrument,
    ) -> Vec<StopUpdate> {
        positions
            .iter()
            .map(|p| self.trail_one(p, view, atr, quote, instrument))
            .collect()
    }

    fn trail_one(
        &self,
        position: &PositionView,
        view: &MarketView<'_>,
        atr: f64,
        quote: Quote,
        instrument: &Instrument,
    ) -> StopUpdate {
        if !(atr > 0.0 && atr.is_finite()) {
            return StopUpdate::skipped(position, ExitKind::Trailing, None, SkipReason::AtrInvalid);
        }
        let reference = quote.exit_price(position.side, view.close());
        if !reference.is_finite() {
            return StopUpdate::skipped(
                position,
                ExitKind::Trailing,
                None,
                SkipReason::NoReferencePrice,
            );
        }
        let extremes = if self.chandelier {
            high_low_since(view.bars, position.entry_time)
        } else {
            None
        };
        let candidate = trail_candidate(
            position.side,
            reference,
            atr,
            self.trail_atr_k,
            extremes,
            instrument,
        );
        let update = self.admit(
            position,
            ExitKind::Trailing,
            candidate,
            reference,
            Some(self.min_step_pips),
            instrument,
        );
        debug!(
            id = position.id,
            side = %position.side,
            reference,
            candidate,
            verdict = ?update.verdict,
            "trail"
        );
        update
    }
}
