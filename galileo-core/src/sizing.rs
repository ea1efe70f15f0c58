//! Risk-based position sizing.
//!
//! ```text
//! risk_money = balance * risk_percent / 100
//! stop_ticks = max(tick, trail_atr_k * ATR) / tick
//! units      = risk_money / (stop_ticks * tick_value)
//! ```
//!
//! The result is snapped to the volume step and clamped to the instrument's
//! range. Whenever an input is unusable the configured fixed size is used.

use crate::config::EngineConfig;
use crate::domain::Instrument;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSizer {
    fixed_units: f64,
    risk_percent: f64,
    atr_multiplier: f64,
}

impl RiskSizer {
    pub fn new(fixed_units: f64, risk_percent: f64, atr_multiplier: f64) -> Self {
        Self {
            fixed_units,
            risk_percent,
            atr_multiplier,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.general.units,
            config.general.risk_percent,
            config.risk.trail_atr_k,
        )
    }

    fn fixed(&self, instrument: &Instrument) -> f64 {
        instrument.normalize_volume(self.fixed_units)
    }

    /// Units to trade for `balance` at the current ATR, before any energy scaling.
    pub fn units(&self, balance: f64, atr: f64, instrument: &Instrument) -> f64 {
        if !(atr > 0.0 && atr.is_finite()) || self.risk_percent <= 0.0 {
            return self.fixed(instrument);
        }
        let stop_distance = instrument.tick_size.max(self.atr_multiplier * atr);
        let ticks = stop_distance / instrument.tick_size;
        if instrument.tick_value <= 0.0 || !ticks.is_finite() {
            return self.fixed(instrument);
        }
        let risk_money = balance * self.risk_percent / 100.0;
        let raw = risk_money / (ticks * instrument.tick_value).max(1e-9);
        let units = instrument.normalize_volume(raw);
        if units < 1.0 {
            return self.fixed(instrument);
        }
        debug!(balance, atr, ticks, raw, units, "risk sizing");
        units
    }
}
