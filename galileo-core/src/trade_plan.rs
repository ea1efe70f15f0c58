//! Turns a fired signal into concrete order levels and size.

use crate::config::EngineConfig;
use crate::domain::{Instrument, Side, TickPolicy};
use crate::signals::EntrySignal;
use crate::sizing::RiskSizer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Floor for the ATR used in stop distance math.
const MIN_PLAN_ATR: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub signal: EntrySignal,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub sl_pips: i64,
    pub tp_pips: i64,
    pub units: f64,
    pub r_multiple: f64,
}

impl TradePlan {
    pub fn side(&self) -> Side {
        self.signal.side
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlanRejection {
    /// Levels are not ordered stop < entry < target (reversed for shorts).
    WrongDirection {
        entry: f64,
        stop_loss: f64,
        take_profit: f64,
    },
    NonFinite,
    ZeroVolume,
}

impl fmt::Display for PlanRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanRejection::WrongDirection {
                entry,
                stop_loss,
                take_profit,
            } => write!(f, "DIR (entry={entry:.5} sl={stop_loss:.5} tp={take_profit:.5})"),
            PlanRejection::NonFinite => write!(f, "NaN/Inf level"),
            PlanRejection::ZeroVolume => write!(f, "volume==0"),
        }
    }
}

/// Everything a plan needs besides configuration.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs {
    pub signal: EntrySignal,
    pub close: f64,
    pub atr: f64,
    /// Reward multiple after the daily tilt.
    pub r_multiple: f64,
    pub balance: f64,
    /// Energy-regime size multiplier, 1.0 when neutral.
    pub volume_scale: f64,
}

/// Entry at the close, ATR-based stop and target, risk-sized volume.
///
/// The target is always `r` times the ATR stop distance, even when the signal
/// supplies its own stop.
pub fn plan_trade(
    config: &EngineConfig,
    inputs: &PlanInputs,
    instrument: &Instrument,
) -> Result<TradePlan, PlanRejection> {
    let side = inputs.signal.side;
    let entry = inputs.close;
    let atr = inputs.atr.max(MIN_PLAN_ATR);
    let distance = config.risk.trail_atr_k.max(0.3) * atr;
    let r = inputs.r_multiple.max(0.5);

    let nearest = |p: f64| instrument.round_price(p, TickPolicy::RoundNearest);
    let stop_loss = nearest(
        inputs
            .signal
            .stop_loss
            .unwrap_or(entry - side.sign() * distance),
    );
    let take_profit = nearest(entry + side.sign() * r * distance);

    if !(entry.is_finite() && stop_loss.is_finite() && take_profit.is_finite()) {
        return Err(PlanRejection::NonFinite);
    }
    let ordered = match side {
        Side::Long => stop_loss < entry && take_profit > entry,
        Side::Short => stop_loss > entry && take_profit < entry,
    };
    if !ordered {
        return Err(PlanRejection::WrongDirection {
            entry,
            stop_loss,
            take_profit,
        });
    }

    let min_pips = config.risk.min_stops_pips.max(0.0) as i64;
    let sl_pips = instrument.whole_pips_between(entry, stop_loss).max(1).max(min_pips);
    let tp_pips = instrument.whole_pips_between(take_profit, entry).max(1).max(min_pips);

    let base = RiskSizer::from_config(config).units(inputs.balance, atr, instrument);
    let scaled = base * inputs.volume_scale.max(0.0);
    // Less than half the minimum lot rounds to nothing on the venue's grid.
    if !scaled.is_finite() || scaled < 0.5 * instrument.volume_min {
        return Err(PlanRejection::ZeroVolume);
    }
    let units = instrument.normalize_volume(scaled);

    Ok(TradePlan {
        signal: inputs.signal,
        entry,
        stop_loss,
        take_profit,
        sl_pips,
        tp_pips,
        units,
        r_multiple: r,
    })
}
