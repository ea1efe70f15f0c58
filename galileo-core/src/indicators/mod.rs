//! Indicator trait, the precomputed values container, and the concrete indicators.
//!
//! Indicators are pure functions: bar history in, numeric series out.
//! Hosts precompute them once (or extend them incrementally) and hand the
//! engine aligned slices through `MarketView`. The engine never recomputes
//! a series on its own.

pub mod atr;
pub mod channel;
pub mod ema;

pub use atr::{Atr, AtrSmoothing};
pub use channel::{highest_high, lowest_low, Channel, ChannelBand};
pub use ema::{Ema, EmaState};

use crate::domain::Bar;
use std::collections::HashMap;

/// Trait for indicators.
///
/// Indicators take a full bar series and produce a numeric output series of
/// the same length. The first `lookback()` values are `f64::NAN` (warmup).
///
/// No indicator value at bar t may depend on price data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_200", "atr_14").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Container for precomputed indicator series keyed by indicator name.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute every indicator over `bars` and store the results by name.
    pub fn precompute(bars: &[Bar], indicators: &[&dyn Indicator]) -> Self {
        let mut iv = Self::new();
        for indicator in indicators {
            let series = indicator.compute(bars);
            debug_assert_eq!(series.len(), bars.len(), "indicator '{}'", indicator.name());
            iv.insert(indicator.name(), series);
        }
        iv
    }

    /// Insert a named indicator series.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Get the indicator value at a specific bar index.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(bar_index).copied())
    }

    /// Get the full series for a named indicator.
    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for first bar), high = max(open,close) + 1.0,
/// low = min(open,close) - 1.0, five minutes apart.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let data: Vec<(f64, f64, f64, f64)> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            (open, open.max(close) + 1.0, open.min(close) - 1.0, close)
        })
        .collect();
    make_ohlc_bars(&data)
}

/// Create bars from explicit (open, high, low, close) tuples, five minutes apart.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            open_time: base + chrono::Duration::minutes(5 * i as i64),
            open,
            high,
            low,
            close,
        })
        .collect()
}

/// FX-scale bars: high/low sit `half_range` above/below each close.
#[cfg(test)]
pub fn make_fx_bars(closes: &[f64], half_range: f64) -> Vec<Bar> {
    let data: Vec<(f64, f64, f64, f64)> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            (open, close + half_range, close - half_range, close)
        })
        .collect();
    make_ohlc_bars(&data)
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_values_insert_and_get() {
        let mut iv = IndicatorValues::new();
        iv.insert(
            "ema_20",
            vec![f64::NAN; 19]
                .into_iter()
                .chain(vec![100.0, 101.0])
                .collect(),
        );
        assert!(iv.get("ema_20", 0).unwrap().is_nan());
        assert_eq!(iv.get("ema_20", 19), Some(100.0));
        assert_eq!(iv.get("ema_20", 21), None);
        assert_eq!(iv.get("missing", 0), None);
    }

    #[test]
    fn precompute_stores_by_name() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let ema = Ema::new(3);
        let atr = Atr::new(2);
        let plan: [&dyn Indicator; 2] = [&ema, &atr];
        let iv = IndicatorValues::precompute(&bars, &plan);
        assert_eq!(iv.len(), 2);
        assert_approx(iv.get("ema_3", 2).unwrap(), 11.25, DEFAULT_EPSILON);
        assert_eq!(iv.get_series("atr_2").map(|s| s.len()), Some(5));
    }
}
