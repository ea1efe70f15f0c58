//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! Smoothing is selectable: exponential (alpha = 2/(period+1)) or Wilder (alpha = 1/period).
//! Both seed with the mean of the first `period` proper TR values, so the first
//! valid output sits at index `period`.

use crate::domain::Bar;
use crate::indicators::Indicator;
use serde::{Deserialize, Serialize};

/// Moving-average flavour used to smooth the true range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AtrSmoothing {
    #[default]
    Exponential,
    Wilder,
}

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    smoothing: AtrSmoothing,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self::with_smoothing(period, AtrSmoothing::Exponential)
    }

    pub fn with_smoothing(period: usize, smoothing: AtrSmoothing) -> Self {
        let period = period.max(1);
        let name = match smoothing {
            AtrSmoothing::Exponential => format!("atr_{period}"),
            AtrSmoothing::Wilder => format!("atr_wilder_{period}"),
        };
        Self {
            period,
            smoothing,
            name,
        }
    }
}

/// Compute the True Range series from bars.
/// TR[0] = high[0] - low[0] (no previous close).
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let n = bars.len();
    let mut tr = vec![f64::NAN; n];

    if n == 0 {
        return tr;
    }

    let h = bars[0].high;
    let l = bars[0].low;
    if !(h.is_nan() || l.is_nan()) {
        tr[0] = h - l;
    }

    for i in 1..n {
        let h = bars[i].high;
        let l = bars[i].low;
        let pc = bars[i - 1].close;
        if !(h.is_nan() || l.is_nan() || pc.is_nan()) {
            tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
        }
    }

    tr
}

impl AtrSmoothing {
    fn alpha(self, period: usize) -> f64 {
        match self {
            AtrSmoothing::Exponential => 2.0 / (period as f64 + 1.0),
            AtrSmoothing::Wilder => 1.0 / period as f64,
        }
    }
}

/// Recursive smoothing seeded with the mean of the first `period` values.
/// A NaN in the seed window, or anywhere after it, leaves the rest NaN.
pub fn seeded_smooth(values: &[f64], period: usize, alpha: f64) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return result;
    }
    let (seed_window, rest) = values.split_at(period);
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let mut prev = seed_window.iter().sum::<f64>() / period as f64;
    result[period - 1] = prev;

    for (slot, &v) in result[period..].iter_mut().zip(rest) {
        if v.is_nan() {
            break;
        }
        prev = alpha * v + (1.0 - alpha) * prev;
        *slot = prev;
    }
    result
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];
        if n < 2 {
            return result;
        }
        // TR[0] has no previous close, so smoothing starts from TR[1].
        let tr = true_range(bars);
        let smoothed = seeded_smooth(&tr[1..], self.period, self.smoothing.alpha(self.period));
        result[1..].copy_from_slice(&smoothed);
        result
    }
}
