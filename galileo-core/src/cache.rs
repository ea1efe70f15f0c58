//! Per-bar market snapshot consumed read-only by every downstream engine.

use crate::market::MarketView;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest ATR the engine will compute against.
pub const MIN_ATR: f64 = 1e-9;

/// Reasons a bar's computation is skipped. Cached state is left untouched.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
pub enum ComputeError {
    #[error("need {required} bars, have {available}")]
    InsufficientBars { required: usize, available: usize },

    #[error("ATR {0} is below the minimum or not finite")]
    AtrTooSmall(f64),

    #[error("non-finite {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("non-positive {field}: {value}")]
    NonPositive { field: &'static str, value: f64 },
}

/// Channel, trend and volatility levels for one bar index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ComputationCache {
    pub bar_index: usize,
    pub close: f64,
    pub highest_high: f64,
    pub lowest_low: f64,
    pub midpoint: f64,
    pub ema: f64,
    pub atr: f64,
    /// Signed distance of close beyond the channel, in ATR units; 0 inside.
    pub band_diff: f64,
}

impl ComputationCache {
    /// Snapshot the current bar of `view` over a `lookback`-bar channel.
    pub fn build(view: &MarketView<'_>, lookback: usize) -> Result<Self, ComputeError> {
        let close = view.close();
        let atr = view.atr_now();
        if !(atr.is_finite() && atr >= MIN_ATR) {
            return Err(ComputeError::AtrTooSmall(atr));
        }
        positive("close", close)?;

        let highest_high = positive("highest_high", view.highest_high(lookback))?;
        let lowest_low = positive("lowest_low", view.lowest_low(lookback))?;
        let midpoint = positive("midpoint", 0.5 * (highest_high + lowest_low))?;
        let ema = positive("ema", view.ema_ago(0))?;

        Ok(Self {
            bar_index: view.index(),
            close,
            highest_high,
            lowest_low,
            midpoint,
            ema,
            atr,
            band_diff: band_diff(close, highest_high, lowest_low, atr),
        })
    }
}

/// Prices, channel levels and the EMA must be finite and above zero.
fn positive(field: &'static str, value: f64) -> Result<f64, ComputeError> {
    if !value.is_finite() {
        Err(ComputeError::NonFinite { field, value })
    } else if value <= 0.0 {
        Err(ComputeError::NonPositive { field, value })
    } else {
        Ok(value)
    }
}

/// Distance of `close` outside [low, high] measured in ATRs.
pub fn band_diff(close: f64, high: f64, low: f64, atr: f64) -> f64 {
    if close > high {
        (close - high) / atr
    } else if close < low {
        -(low - close) / atr
    } else {
        0.0
    }
}
