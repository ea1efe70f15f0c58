//! Read-only view of the bar series and its aligned indicator series.
//!
//! The newest bar in the view is the bar under evaluation. All "bars ago"
//! lookups are relative to it.

use crate::config::EngineConfig;
use crate::domain::Bar;
use crate::indicators::{channel, Atr, Ema, Indicator, IndicatorValues};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MarketError {
    #[error("empty bar series")]
    Empty,

    #[error("series '{name}' has {got} values for {expected} bars")]
    LengthMismatch {
        name: String,
        got: usize,
        expected: usize,
    },

    #[error("indicator series '{0}' not found")]
    MissingSeries(String),
}

/// Bars plus the ATR, EMA and engine-ATR series computed over them.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub bars: &'a [Bar],
    pub atr: &'a [f64],
    pub ema: &'a [f64],
    /// Secondary ATR used to normalize energy for regime classification.
    pub engine_atr: &'a [f64],
}

impl<'a> MarketView<'a> {
    pub fn new(
        bars: &'a [Bar],
        atr: &'a [f64],
        ema: &'a [f64],
        engine_atr: &'a [f64],
    ) -> Result<Self, MarketError> {
        if bars.is_empty() {
            return Err(MarketError::Empty);
        }
        for (name, series) in [("atr", atr), ("ema", ema), ("engine_atr", engine_atr)] {
            if series.len() != bars.len() {
                return Err(MarketError::LengthMismatch {
                    name: name.to_string(),
                    got: series.len(),
                    expected: bars.len(),
                });
            }
        }
        Ok(Self {
            bars,
            atr,
            ema,
            engine_atr,
        })
    }

    /// Index of the bar under evaluation.
    pub fn index(&self) -> usize {
        self.bars.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_bar(&self) -> Option<&'a Bar> {
        self.bars.last()
    }

    pub fn close(&self) -> f64 {
        self.bars.last().map_or(f64::NAN, |b| b.close)
    }

    pub fn atr_now(&self) -> f64 {
        self.atr.last().copied().unwrap_or(f64::NAN)
    }

    pub fn engine_atr_now(&self) -> f64 {
        self.engine_atr.last().copied().unwrap_or(f64::NAN)
    }

    /// EMA value `ago` bars before the current one (0 = current). NaN out of range.
    pub fn ema_ago(&self, ago: usize) -> f64 {
        self.ema
            .len()
            .checked_sub(1 + ago)
            .map_or(f64::NAN, |i| self.ema[i])
    }

    /// Highest high over `period` bars, current bar included.
    pub fn highest_high(&self, period: usize) -> f64 {
        channel::highest_high(self.bars, period)
    }

    /// Lowest low over `period` bars, current bar included.
    pub fn lowest_low(&self, period: usize) -> f64 {
        channel::lowest_low(self.bars, period)
    }

    /// Highest high of the `n` bars preceding the current one.
    pub fn prior_high(&self, n: usize) -> f64 {
        let len = self.bars.len();
        if n == 0 || len < n + 1 {
            return f64::NAN;
        }
        channel::highest_high(&self.bars[..len - 1], n)
    }

    /// Lowest low of the `n` bars preceding the current one.
    pub fn prior_low(&self, n: usize) -> f64 {
        let len = self.bars.len();
        if n == 0 || len < n + 1 {
            return f64::NAN;
        }
        channel::lowest_low(&self.bars[..len - 1], n)
    }
}

/// The indicator set the engine expects, named per configuration.
#[derive(Debug, Clone)]
pub struct IndicatorPlan {
    pub atr: Atr,
    pub ema: Ema,
    pub engine_atr: Atr,
}

impl IndicatorPlan {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            atr: Atr::with_smoothing(config.general.atr_period, config.general.atr_smoothing),
            ema: Ema::new(config.general.ema_period),
            engine_atr: Atr::with_smoothing(config.energy.atr_period, config.general.atr_smoothing),
        }
    }

    pub fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        let plan: [&dyn Indicator; 3] = [&self.atr, &self.ema, &self.engine_atr];
        IndicatorValues::precompute(bars, &plan)
    }

    /// Borrow a view over `bars` using series from `values`.
    pub fn view<'a>(
        &self,
        bars: &'a [Bar],
        values: &'a IndicatorValues,
    ) -> Result<MarketView<'a>, MarketError> {
        let get = |name: &str| {
            values
                .get_series(name)
                .ok_or_else(|| MarketError::MissingSeries(name.to_string()))
        };
        MarketView::new(
            bars,
            get(self.atr.name())?,
            get(self.ema.name())?,
            get(self.engine_atr.name())?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_fx_bars, DEFAULT_EPSILON};

    #[test]
    fn view_rejects_misaligned_series() {
        let bars = make_fx_bars(&[1.1, 1.2, 1.3], 0.0001);
        let short = vec![0.001; 2];
        let ok = vec![0.001; 3];
        let err = MarketView::new(&bars, &ok, &short, &ok).unwrap_err();
        assert_eq!(
            err,
            MarketError::LengthMismatch {
                name: "ema".into(),
                got: 2,
                expected: 3
            }
        );
        assert_eq!(MarketView::new(&[], &[], &[], &[]).unwrap_err(), MarketError::Empty);
    }

    #[test]
    fn bars_ago_lookups() {
        let bars = make_fx_bars(&[1.10, 1.12, 1.11, 1.13], 0.001);
        let ema = vec![1.0, 2.0, 3.0, 4.0];
        let atr = vec![0.001; 4];
        let view = MarketView::new(&bars, &atr, &ema, &atr).unwrap();
        assert_eq!(view.index(), 3);
        assert_eq!(view.ema_ago(0), 4.0);
        assert_eq!(view.ema_ago(3), 1.0);
        assert!(view.ema_ago(4).is_nan());
        // Previous two bars: highs 1.121 and 1.111.
        assert_approx(view.prior_high(2), 1.121, DEFAULT_EPSILON);
        assert_approx(view.prior_low(1), 1.109, DEFAULT_EPSILON);
        assert!(view.prior_high(4).is_nan());
        assert_approx(view.highest_high(4), 1.131, DEFAULT_EPSILON);
    }

    #[test]
    fn plan_builds_view_from_precomputed_values() {
        let mut cfg = EngineConfig::default();
        cfg.general.ema_period = 3;
        cfg.general.atr_period = 2;
        cfg.energy.atr_period = 3;
        let closes: Vec<f64> = (0..10).map(|i| 1.1 + 0.001 * i as f64).collect();
        let bars = make_fx_bars(&closes, 0.0005);
        let plan = IndicatorPlan::from_config(&cfg);
        let values = plan.precompute(&bars);
        let view = plan.view(&bars, &values).unwrap();
        assert!(view.atr_now() > 0.0);
        assert!(view.engine_atr_now() > 0.0);
        assert!(view.ema_ago(0).is_finite());

        let empty = IndicatorValues::new();
        assert!(matches!(plan.view(&bars, &empty), Err(MarketError::MissingSeries(_))));
    }
}
