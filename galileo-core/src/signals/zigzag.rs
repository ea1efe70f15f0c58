//! ZigZag breakout entries and the swing levels the escape logic reuses.
//!
//! Stateless: every bar looks up the most recent confirmed swing high and low
//! and fires when the close is strictly beyond the swing plus a break buffer.

use crate::config::ZigZagConfig;
use crate::domain::{Instrument, Side};
use crate::market::MarketView;
use crate::signals::{EntrySignal, SignalSource};
use crate::swing::SwingDetector;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Minimum search window for ZigZag swings, in bars.
const MIN_LOOK: usize = 50;

/// Swing levels and breakout triggers for the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZigZagLevels {
    pub swing_high: Option<f64>,
    pub swing_low: Option<f64>,
    pub long_trigger: Option<f64>,
    pub short_trigger: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ZigZagOutcome {
    Disabled,
    NoSwing,
    Inside { trigger: f64 },
    Triggered { signal: EntrySignal, trigger: f64 },
}

#[derive(Debug, Clone)]
pub struct ZigZagBreakout {
    config: ZigZagConfig,
    backstep: usize,
    look: usize,
}

impl ZigZagBreakout {
    /// `pullback_look` widens the search window when it exceeds the minimum.
    pub fn new(config: ZigZagConfig, pullback_look: usize) -> Self {
        let backstep = config.backstep.max(2);
        Self {
            config,
            backstep,
            look: pullback_look.max(MIN_LOOK),
        }
    }

    pub fn config(&self) -> &ZigZagConfig {
        &self.config
    }

    /// Effective `(backstep, lookback)` used for swing searches.
    pub fn window(&self) -> (usize, usize) {
        (self.backstep, self.look)
    }

    fn swing(&self, view: &MarketView<'_>, is_low: bool) -> Option<f64> {
        SwingDetector::new(view.bars)
            .find_last_swing(is_low, self.backstep, self.look)
            .map(|s| s.price)
    }

    /// Distance the close must clear beyond the swing.
    fn break_buffer(&self, atr: f64, instrument: &Instrument, extra_break: f64) -> f64 {
        instrument
            .pips(self.config.break_pips)
            .max(self.config.break_atr_x * atr)
            + extra_break.max(0.0)
    }

    /// Distance a structural stop sits beyond the opposite swing.
    fn stop_buffer(&self, atr: f64, instrument: &Instrument) -> f64 {
        instrument
            .pips(self.config.buffer_pips)
            .max(self.config.buffer_atr_x * atr)
    }

    /// Stop behind the last opposite swing, rounded away from the market.
    pub fn structural_stop(
        &self,
        side: Side,
        view: &MarketView<'_>,
        atr: f64,
        instrument: &Instrument,
    ) -> Option<f64> {
        let buffer = self.stop_buffer(atr, instrument);
        match side {
            Side::Long => self
                .swing(view, true)
                .map(|low| instrument.round_stop(low - buffer, Side::Long)),
            Side::Short => self
                .swing(view, false)
                .map(|high| instrument.round_stop(high + buffer, Side::Short)),
        }
    }

    pub fn levels(
        &self,
        view: &MarketView<'_>,
        atr: f64,
        instrument: &Instrument,
        extra_break: f64,
    ) -> ZigZagLevels {
        let buffer = self.break_buffer(atr, instrument, extra_break);
        let swing_high = self.swing(view, false);
        let swing_low = self.swing(view, true);
        ZigZagLevels {
            swing_high,
            swing_low,
            long_trigger: swing_high.map(|h| h + buffer),
            short_trigger: swing_low.map(|l| l - buffer),
        }
    }

    /// Breakout check for one side. `extra_break` comes from the energy regime.
    pub fn try_break(
        &self,
        side: Side,
        view: &MarketView<'_>,
        atr: f64,
        instrument: &Instrument,
        extra_break: f64,
    ) -> ZigZagOutcome {
        if !self.config.break_entries {
            return ZigZagOutcome::Disabled;
        }
        let buffer = self.break_buffer(atr, instrument, extra_break);
        let close = view.close();
        let (swing, trigger, fired) = match side {
            Side::Long => {
                let Some(high) = self.swing(view, false) else {
                    return ZigZagOutcome::NoSwing;
                };
                let trigger = high + buffer;
                (high, trigger, close > trigger)
            }
            Side::Short => {
                let Some(low) = self.swing(view, true) else {
                    return ZigZagOutcome::NoSwing;
                };
                let trigger = low - buffer;
                (low, trigger, close < trigger)
            }
        };
        if !fired {
            return ZigZagOutcome::Inside { trigger };
        }
        let stop_loss = self.structural_stop(side, view, atr, instrument);
        debug!(%side, bar = view.index(), swing, trigger, close, ?stop_loss, "zigzag breakout");
        ZigZagOutcome::Triggered {
            signal: EntrySignal {
                side,
                source: SignalSource::ZigZagBreak,
                stop_loss,
                bar_index: view.index(),
            },
            trigger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::indicators::{assert_approx, make_fx_bars};

    const ATR: f64 = 0.001;

    fn config() -> ZigZagConfig {
        ZigZagConfig {
            backstep: 2,
            break_pips: 2.0,
            break_atr_x: 0.4,
            buffer_pips: 2.0,
            buffer_atr_x: 0.0,
            ..ZigZagConfig::default()
        }
    }

    /// Dip to 1.0990 at index 10, peak at 1.1010 at index 20, then `tail`.
    fn closes_with_tail(tail: &[f64]) -> Vec<f64> {
        let mut closes: Vec<f64> = (0..=10).map(|i| 1.1000 - 0.0001 * i as f64).collect();
        closes.extend((11..=20).map(|i| 1.0990 + 0.0002 * (i - 10) as f64));
        closes.extend((21..=25).map(|i| 1.1010 - 0.0001 * (i - 20) as f64));
        closes.extend_from_slice(tail);
        closes
    }

    fn outcome(bars: &[Bar], side: Side, extra: f64) -> ZigZagOutcome {
        let atr = vec![ATR; bars.len()];
        let view = MarketView::new(bars, &atr, &atr, &atr).unwrap();
        ZigZagBreakout::new(config(), 20).try_break(side, &view, ATR, &Instrument::fx_major("EURUSD"), extra)
    }

    #[test]
    fn window_has_floors() {
        let zz = ZigZagBreakout::new(ZigZagConfig { backstep: 0, ..config() }, 10);
        assert_eq!(zz.window(), (2, 50));
        let zz = ZigZagBreakout::new(config(), 400);
        assert_eq!(zz.window(), (2, 400));
    }

    #[test]
    fn close_beyond_trigger_fires_long() {
        // Swing high 1.1012; buffer max(2 pips, 0.4 ATR) = 0.0004.
        let bars = make_fx_bars(&closes_with_tail(&[1.1017]), 0.0002);
        match outcome(&bars, Side::Long, 0.0) {
            ZigZagOutcome::Triggered { signal, trigger } => {
                assert_approx(trigger, 1.1016, 1e-12);
                assert_eq!(signal.source, SignalSource::ZigZagBreak);
                // Swing low 1.0988 minus 2 pips, floored to tick.
                assert_approx(signal.stop_loss.unwrap(), 1.0986, 1e-9);
            }
            other => panic!("expected Triggered, got {other:?}"),
        }
    }

    #[test]
    fn close_short_of_trigger_does_not_fire() {
        let bars = make_fx_bars(&closes_with_tail(&[1.1015]), 0.0002);
        assert!(matches!(
            outcome(&bars, Side::Long, 0.0),
            ZigZagOutcome::Inside { .. }
        ));
    }

    #[test]
    fn extra_break_raises_trigger() {
        let bars = make_fx_bars(&closes_with_tail(&[1.1017]), 0.0002);
        match outcome(&bars, Side::Long, 0.0002) {
            ZigZagOutcome::Inside { trigger } => assert_approx(trigger, 1.1018, 1e-12),
            other => panic!("expected Inside, got {other:?}"),
        }
    }

    #[test]
    fn short_fires_below_swing_low() {
        // Swing low 1.0988; trigger 1.0984.
        let bars = make_fx_bars(&closes_with_tail(&[1.0983]), 0.0002);
        match outcome(&bars, Side::Short, 0.0) {
            ZigZagOutcome::Triggered { signal, trigger } => {
                assert_approx(trigger, 1.0984, 1e-12);
                // Swing high 1.1012 plus 2 pips, ceiled to tick.
                assert_approx(signal.stop_loss.unwrap(), 1.1014, 1e-9);
            }
            other => panic!("expected Triggered, got {other:?}"),
        }
    }

    #[test]
    fn monotone_history_has_no_swing_high() {
        let closes: Vec<f64> = (0..40).map(|i| 1.1 + 0.0001 * i as f64).collect();
        let bars = make_fx_bars(&closes, 0.0002);
        assert_eq!(outcome(&bars, Side::Long, 0.0), ZigZagOutcome::NoSwing);
    }

    #[test]
    fn disabled_entries_short_circuit() {
        let bars = make_fx_bars(&closes_with_tail(&[1.1030]), 0.0002);
        let atr = vec![ATR; bars.len()];
        let view = MarketView::new(&bars, &atr, &atr, &atr).unwrap();
        let zz = ZigZagBreakout::new(ZigZagConfig { break_entries: false, ..config() }, 20);
        assert_eq!(
            zz.try_break(Side::Long, &view, ATR, &Instrument::fx_major("X"), 0.0),
            ZigZagOutcome::Disabled
        );
    }
}
