//! Price channel: highest high / lowest low over a window that includes the current bar.
//!
//! Produces three series (exposed as separate Indicator instances):
//! - Upper: max(high[t-period+1..=t])
//! - Lower: min(low[t-period+1..=t])
//! - Mid:   (upper + lower) / 2
//!
//! Lookback: period - 1.

use crate::domain::Bar;
use crate::indicators::Indicator;

/// Which line of the channel to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBand {
    Upper,
    Lower,
    Mid,
}

#[derive(Debug, Clone)]
pub struct Channel {
    period: usize,
    band: ChannelBand,
    name: String,
}

impl Channel {
    pub fn new(period: usize, band: ChannelBand) -> Self {
        let period = period.max(1);
        let tag = match band {
            ChannelBand::Upper => "upper",
            ChannelBand::Lower => "lower",
            ChannelBand::Mid => "mid",
        };
        Self {
            period,
            band,
            name: format!("channel_{tag}_{period}"),
        }
    }
}

/// Highest high of the last `period` bars of `bars`, current bar included.
/// NaN when the window is short or holds a NaN high.
pub fn highest_high(bars: &[Bar], period: usize) -> f64 {
    window_extreme(bars, period, |b| b.high, f64::max)
}

/// Lowest low of the last `period` bars of `bars`, current bar included.
pub fn lowest_low(bars: &[Bar], period: usize) -> f64 {
    window_extreme(bars, period, |b| b.low, f64::min)
}

fn window_extreme(
    bars: &[Bar],
    period: usize,
    field: impl Fn(&Bar) -> f64,
    pick: impl Fn(f64, f64) -> f64,
) -> f64 {
    let n = bars.len();
    if period == 0 || n < period {
        return f64::NAN;
    }
    let mut acc: Option<f64> = None;
    for bar in &bars[n - period..] {
        let v = field(bar);
        if v.is_nan() {
            return f64::NAN;
        }
        acc = Some(acc.map_or(v, |a| pick(a, v)));
    }
    acc.unwrap_or(f64::NAN)
}

impl Indicator for Channel {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];

        if n < self.period {
            return result;
        }

        for i in (self.period - 1)..n {
            let upto = &bars[..=i];
            result[i] = match self.band {
                ChannelBand::Upper => highest_high(upto, self.period),
                ChannelBand::Lower => lowest_low(upto, self.period),
                ChannelBand::Mid => {
                    0.5 * (highest_high(upto, self.period) + lowest_low(upto, self.period))
                }
            };
        }

        result
    }
}
