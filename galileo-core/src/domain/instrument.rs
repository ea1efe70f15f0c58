//! Instrument metadata: tick/pip geometry and tradable volume bounds.

use crate::domain::Side;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Slack applied before floor/ceil so prices that already sit on a tick
/// (up to float noise) are not pushed one tick away.
const TICK_EPSILON: f64 = 1e-9;

/// Tick rounding policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TickPolicy {
    /// Round to nearest tick
    RoundNearest,
    /// Round down (protective for long stops)
    RoundDown,
    /// Round up (protective for short stops)
    RoundUp,
}

/// Instrument metadata for tick size, pip size, and volume constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    /// Smallest valid price increment.
    pub tick_size: f64,
    /// Quoting unit for distance parameters (0.0001 on most FX majors).
    pub pip_size: f64,
    /// Account-currency value of one tick for one unit of volume.
    pub tick_value: f64,
    pub volume_min: f64,
    pub volume_step: f64,
    pub volume_max: f64,
}

impl Instrument {
    /// Create a validated instrument.
    pub fn new(
        symbol: impl Into<String>,
        tick_size: f64,
        pip_size: f64,
        tick_value: f64,
    ) -> Result<Self, InstrumentError> {
        let inst = Self {
            symbol: symbol.into(),
            tick_size,
            pip_size,
            tick_value,
            volume_min: 1000.0,
            volume_step: 1000.0,
            volume_max: 10_000_000.0,
        };
        inst.validate()?;
        Ok(inst)
    }

    /// Five-digit FX major (tick 0.00001, pip 0.0001).
    pub fn fx_major(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size: 0.00001,
            pip_size: 0.0001,
            tick_value: 0.00001,
            volume_min: 1000.0,
            volume_step: 1000.0,
            volume_max: 10_000_000.0,
        }
    }

    /// Override the tradable volume range.
    pub fn with_volume(mut self, min: f64, step: f64, max: f64) -> Result<Self, InstrumentError> {
        self.volume_min = min;
        self.volume_step = step;
        self.volume_max = max;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), InstrumentError> {
        if !(self.tick_size.is_finite() && self.tick_size > 0.0) {
            return Err(InstrumentError::InvalidTickSize(self.tick_size));
        }
        if !(self.pip_size.is_finite() && self.pip_size > 0.0) {
            return Err(InstrumentError::InvalidPipSize(self.pip_size));
        }
        if !(self.volume_step > 0.0 && self.volume_min > 0.0 && self.volume_min <= self.volume_max)
        {
            return Err(InstrumentError::InvalidVolumeRange {
                min: self.volume_min,
                step: self.volume_step,
                max: self.volume_max,
            });
        }
        Ok(())
    }

    /// Round price according to policy
    pub fn round_price(&self, price: f64, policy: TickPolicy) -> f64 {
        let ticks = price / self.tick_size;
        let rounded_ticks = match policy {
            TickPolicy::RoundNearest => ticks.round(),
            TickPolicy::RoundDown => (ticks + TICK_EPSILON).floor(),
            TickPolicy::RoundUp => (ticks - TICK_EPSILON).ceil(),
        };
        rounded_ticks * self.tick_size
    }

    /// Round a stop price away from the market: down for longs, up for shorts.
    pub fn round_stop(&self, price: f64, side: Side) -> f64 {
        let policy = match side {
            Side::Long => TickPolicy::RoundDown,
            Side::Short => TickPolicy::RoundUp,
        };
        self.round_price(price, policy)
    }

    /// Price distance expressed in pips (unsigned).
    pub fn to_pips(&self, distance: f64) -> f64 {
        distance.abs() / self.pip_size
    }

    /// Pips expressed as a price distance.
    pub fn pips(&self, pips: f64) -> f64 {
        pips * self.pip_size
    }

    /// Whole-pip distance between two prices, rounded to nearest.
    pub fn whole_pips_between(&self, a: f64, b: f64) -> i64 {
        let pips = self.to_pips(a - b).round();
        if pips.is_finite() {
            pips as i64
        } else {
            0
        }
    }

    /// Snap a volume to the step grid and clamp it into the tradable range.
    pub fn normalize_volume(&self, units: f64) -> f64 {
        if !units.is_finite() {
            return self.volume_min;
        }
        let stepped = (units / self.volume_step).round() * self.volume_step;
        stepped.clamp(self.volume_min, self.volume_max)
    }
}

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("tick_size must be positive and finite, got {0}")]
    InvalidTickSize(f64),

    #[error("pip_size must be positive and finite, got {0}")]
    InvalidPipSize(f64),

    #[error("invalid volume range: min={min} step={step} max={max}")]
    InvalidVolumeRange { min: f64, step: f64, max: f64 },
}
