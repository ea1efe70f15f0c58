//! ZigZag escape: pull the stop to just beyond the latest opposite swing.

use super::{ExitKind, ExitManager, SkipReason, StopUpdate};
use crate::domain::{Instrument, PositionView, Quote};
use crate::market::MarketView;
use tracing::debug;

impl ExitManager {
    /// Escape pass. Uses the same distance rules as trailing but no minimum step.
    pub fn escape_pass(
        &self,
        positions: &[PositionView],
        view: &MarketView<'_>,
        atr: f64,
        quote: Quote,
        instrument: &Instrument,
    ) -> Vec<StopUpdate> {
        if !self.escape_enabled {
            return Vec::new();
        }
        positions
            .iter()
            .map(|p| self.escape_one(p, view, atr, quote, instrument))
            .collect()
    }

    fn escape_one(
        &self,
        position: &PositionView,
        view: &MarketView<'_>,
        atr: f64,
        quote: Quote,
        instrument: &Instrument,
    ) -> StopUpdate {
        let reference = quote.exit_price(position.side, view.close());
        if !reference.is_finite() {
            return StopUpdate::skipped(
                position,
                ExitKind::ZigZagEscape,
                None,
                SkipReason::NoReferencePrice,
            );
        }
        let Some(candidate) = self
            .zigzag
            .structural_stop(position.side, view, atr, instrument)
        else {
            return StopUpdate::skipped(position, ExitKind::ZigZagEscape, None, SkipReason::NoSwing);
        };
        let update = self.admit(
            position,
            ExitKind::ZigZagEscape,
            candidate,
            reference,
            None,
            instrument,
        );
        debug!(
            id = position.id,
            side = %position.side,
            candidate,
            verdict = ?update.verdict,
            "zigzag escape"
        );
        update
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::position;
    use super::super::StopVerdict;
    use super::*;
    use crate::config::{EngineConfig, ZigZagConfig};
    use crate::domain::Side;
    use crate::indicators::{assert_approx, make_fx_bars};

    /// Rally, dip to 1.1030 at index 20, then higher again.
    fn bars() -> Vec<crate::domain::Bar> {
        let mut closes: Vec<f64> = (0..=15).map(|i| 1.1000 + 0.0005 * i as f64).collect();
        closes.extend((16..=20).map(|i| 1.1075 - 0.0009 * (i - 15) as f64));
        closes.extend((21..=30).map(|i| 1.1030 + 0.0006 * (i - 20) as f64));
        make_fx_bars(&closes, 0.0002)
    }

    fn manager(escape_enabled: bool) -> ExitManager {
        let config = EngineConfig {
            zigzag: ZigZagConfig {
                escape_enabled,
                backstep: 2,
                ..ZigZagConfig::default()
            },
            ..EngineConfig::default()
        };
        ExitManager::new(&config)
    }

    #[test]
    fn long_stop_moves_under_last_swing_low() {
        let bars = bars();
        let atr = vec![0.001; bars.len()];
        let view = MarketView::new(&bars, &atr, &atr, &atr).unwrap();
        let pos = position(Side::Long, 1.1000, Some(1.0950));
        let updates = manager(true).escape_pass(&[pos], &view, 0.001, Quote::new(1.1090, 1.1091), &Instrument::fx_major("EURUSD"));
        // Swing low 1.1028 less 2 pips.
        assert_approx(updates[0].new_stop().unwrap(), 1.1026, 1e-9);
    }

    #[test]
    fn escape_never_loosens() {
        let bars = bars();
        let atr = vec![0.001; bars.len()];
        let view = MarketView::new(&bars, &atr, &atr, &atr).unwrap();
        let pos = position(Side::Long, 1.1000, Some(1.1050));
        let updates = manager(true).escape_pass(&[pos], &view, 0.001, Quote::new(1.1090, 1.1091), &Instrument::fx_major("EURUSD"));
        assert_eq!(updates[0].verdict, StopVerdict::Skip(SkipReason::NotBetter));
    }

    #[test]
    fn disabled_escape_proposes_nothing() {
        let bars = bars();
        let atr = vec![0.001; bars.len()];
        let view = MarketView::new(&bars, &atr, &atr, &atr).unwrap();
        let pos = position(Side::Short, 1.1100, None);
        assert!(manager(false)
            .escape_pass(&[pos], &view, 0.001, Quote::new(1.1, 1.1), &Instrument::fx_major("X"))
            .is_empty());
    }
}
