//! Bar, the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLC bar keyed by its open time.
///
/// Bars form an append-only series ordered oldest (index 0) to newest.
/// The newest bar in a slice is the bar being evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.close > 0.0
    }
}

/// Seconds between the open times of the last two bars, floored at one second.
///
/// Used as the Kalman process-noise time step. A series with fewer than two bars
/// or non-increasing times yields 1.0.
pub fn bar_interval_secs(bars: &[Bar]) -> f64 {
    let n = bars.len();
    if n < 2 {
        return 1.0;
    }
    let secs = (bars[n - 1].open_time - bars[n - 2].open_time).num_milliseconds() as f64 / 1000.0;
    secs.max(1.0)
}
