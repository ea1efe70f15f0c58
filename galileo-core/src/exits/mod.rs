//! Exit management: ATR trailing and ZigZag escape.
//!
//! Both passes are advisory. They read [`PositionView`]s and emit a
//! [`StopUpdate`] per position; the caller decides whether to send the
//! modification to the broker. A proposal that would move a stop against the
//! position is never marked [`StopVerdict::Move`].

pub mod escape;
pub mod trailing;

pub use trailing::{high_low_since, trail_candidate};

use crate::config::EngineConfig;
use crate::domain::{Instrument, PositionId, PositionView, Side};
use crate::signals::ZigZagBreakout;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    Trailing,
    ZigZagEscape,
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Trailing => write!(f, "trail"),
            ExitKind::ZigZagEscape => write!(f, "zz_escape"),
        }
    }
}

/// Why a stop candidate was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    NotBetter,
    SmallStep { step_pips: f64 },
    TooCloseToPrice { pips: f64 },
    TooCloseToEntry { pips: f64 },
    NoSwing,
    NoReferencePrice,
    AtrInvalid,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotBetter => write!(f, "notBetter"),
            SkipReason::SmallStep { step_pips } => write!(f, "smallStep ({step_pips:.2}p)"),
            SkipReason::TooCloseToPrice { pips } => write!(f, "tooCloseToPrice ({pips:.2}p)"),
            SkipReason::TooCloseToEntry { pips } => write!(f, "tooCloseToEntry ({pips:.2}p)"),
            SkipReason::NoSwing => write!(f, "noSwing"),
            SkipReason::NoReferencePrice => write!(f, "noReferencePrice"),
            SkipReason::AtrInvalid => write!(f, "atrInvalid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StopVerdict {
    Move,
    Skip(SkipReason),
}

/// One exit pass result for one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopUpdate {
    pub position_id: PositionId,
    pub side: Side,
    pub kind: ExitKind,
    pub previous: Option<f64>,
    pub candidate: Option<f64>,
    pub verdict: StopVerdict,
}

impl StopUpdate {
    /// The stop to send, if the candidate passed every check.
    pub fn new_stop(&self) -> Option<f64> {
        match self.verdict {
            StopVerdict::Move => self.candidate,
            StopVerdict::Skip(_) => None,
        }
    }

    fn skipped(position: &PositionView, kind: ExitKind, candidate: Option<f64>, reason: SkipReason) -> Self {
        Self {
            position_id: position.id,
            side: position.side,
            kind,
            previous: position.stop_loss,
            candidate,
            verdict: StopVerdict::Skip(reason),
        }
    }
}

/// Runs the trailing and escape passes with shared distance rules.
#[derive(Debug, Clone)]
pub struct ExitManager {
    trail_atr_k: f64,
    chandelier: bool,
    min_step_pips: f64,
    min_from_price_pips: f64,
    min_from_entry_pips: f64,
    escape_enabled: bool,
    zigzag: ZigZagBreakout,
}

impl ExitManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            trail_atr_k: config.risk.trail_atr_k,
            chandelier: config.risk.trail_chandelier,
            min_step_pips: config.trailing.min_step_pips.max(0.0),
            min_from_price_pips: config.risk.min_sl_from_price_pips.max(0.0),
            min_from_entry_pips: config.risk.min_stops_pips.max(1.0),
            escape_enabled: config.zigzag.escape_enabled,
            zigzag: ZigZagBreakout::new(config.zigzag.clone(), config.pullback.look),
        }
    }

    pub fn escape_enabled(&self) -> bool {
        self.escape_enabled
    }

    /// Apply the improvement, step and distance rules to `candidate`.
    ///
    /// `min_step` is only consulted when the position already has a stop.
    fn admit(
        &self,
        position: &PositionView,
        kind: ExitKind,
        candidate: f64,
        reference: f64,
        min_step: Option<f64>,
        instrument: &Instrument,
    ) -> StopUpdate {
        let verdict = self.check(position, candidate, reference, min_step, instrument);
        StopUpdate {
            position_id: position.id,
            side: position.side,
            kind,
            previous: position.stop_loss,
            candidate: Some(candidate),
            verdict,
        }
    }

    fn check(
        &self,
        position: &PositionView,
        candidate: f64,
        reference: f64,
        min_step: Option<f64>,
        instrument: &Instrument,
    ) -> StopVerdict {
        if !position.stop_improves(candidate) {
            return StopVerdict::Skip(SkipReason::NotBetter);
        }
        if let (Some(step), Some(current)) = (min_step, position.stop_loss) {
            let step_pips = instrument.to_pips(candidate - current);
            if step_pips < step {
                return StopVerdict::Skip(SkipReason::SmallStep { step_pips });
            }
        }
        // Signed: a stop on the market side of the exit price comes out negative.
        let pips = position.side.sign() * (reference - candidate) / instrument.pip_size;
        if pips < self.min_from_price_pips {
            return StopVerdict::Skip(SkipReason::TooCloseToPrice { pips });
        }
        let pips = instrument.to_pips(position.entry_price - candidate);
        if pips < self.min_from_entry_pips {
            return StopVerdict::Skip(SkipReason::TooCloseToEntry { pips });
        }
        StopVerdict::Move
    }
}
