//! Trend EMA, seeded on the first close the way charting platforms do it.
//!
//! EMA[0] = close[0], then EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1]
//! with alpha = 2 / (period + 1). There is no SMA warm-up, so a fresh chart
//! has a usable (if young) trend line from its first bar.
//!
//! A non-finite close yields NaN for that bar and the average restarts from
//! the next finite close.

use crate::domain::Bar;
use crate::indicators::Indicator;

/// Running EMA over a stream of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmaState {
    alpha: f64,
    value: Option<f64>,
}

impl EmaState {
    pub fn new(period: usize) -> Self {
        Self {
            alpha: 2.0 / (period.max(1) as f64 + 1.0),
            value: None,
        }
    }

    /// Fold in `x` and return the updated average.
    pub fn push(&mut self, x: f64) -> f64 {
        if !x.is_finite() {
            self.value = None;
            return f64::NAN;
        }
        let next = match self.value {
            Some(prev) => prev + self.alpha * (x - prev),
            None => x,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut state = EmaState::new(self.period);
        bars.iter().map(|b| state.push(b.close)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn first_value_is_the_first_close() {
        let result = Ema::new(200).compute(&make_bars(&[1.25, 1.26]));
        assert_eq!(result[0], 1.25);
        assert_approx(result[1], 1.25 + 0.01 * 2.0 / 201.0, DEFAULT_EPSILON);
    }

    #[test]
    fn period_3_known_values() {
        // alpha = 0.5
        let result = Ema::new(3).compute(&make_bars(&[10.0, 11.0, 12.0, 13.0]));
        assert_approx(result[0], 10.0, DEFAULT_EPSILON);
        assert_approx(result[1], 10.5, DEFAULT_EPSILON);
        assert_approx(result[2], 11.25, DEFAULT_EPSILON);
        assert_approx(result[3], 12.125, DEFAULT_EPSILON);
    }

    #[test]
    fn period_1_tracks_close() {
        let result = Ema::new(1).compute(&make_bars(&[100.0, 200.0, 300.0]));
        assert_eq!(result, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn gap_restarts_from_next_close() {
        let mut bars = make_bars(&[10.0, 12.0, 14.0, 20.0, 22.0]);
        bars[2].close = f64::NAN;
        let result = Ema::new(3).compute(&bars);
        assert_approx(result[1], 11.0, DEFAULT_EPSILON);
        assert!(result[2].is_nan());
        assert_eq!(result[3], 20.0);
        assert_approx(result[4], 21.0, DEFAULT_EPSILON);
    }

    #[test]
    fn flat_series_stays_flat() {
        let result = Ema::new(50).compute(&make_bars(&[1.1; 30]));
        assert!(result.iter().all(|&v| (v - 1.1).abs() < DEFAULT_EPSILON));
    }

    #[test]
    fn state_matches_batch() {
        let closes = [1.10, 1.12, 1.11, 1.15, 1.14];
        let batch = Ema::new(4).compute(&make_bars(&closes));
        let mut state = EmaState::new(4);
        assert_eq!(state.value(), None);
        for (i, &c) in closes.iter().enumerate() {
            assert_eq!(state.push(c), batch[i]);
        }
        assert_eq!(state.value(), batch.last().copied());
    }
}
