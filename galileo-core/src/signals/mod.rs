//! Entry signal engines: Fibonacci pullback (stateful) and ZigZag breakout (stateless).

pub mod pullback;
pub mod zigzag;

pub use pullback::{soft_atr, ArmState, FibZone, PullbackEngine, PullbackOutcome};
pub use zigzag::{ZigZagBreakout, ZigZagLevels, ZigZagOutcome};

use crate::domain::Side;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which engine produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalSource {
    Pullback,
    ZigZagBreak,
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalSource::Pullback => write!(f, "pullback"),
            SignalSource::ZigZagBreak => write!(f, "zigzag"),
        }
    }
}

/// A fired entry trigger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntrySignal {
    pub side: Side,
    pub source: SignalSource,
    /// Stop the engine derived from structure, if any. Overrides the ATR stop.
    pub stop_loss: Option<f64>,
    pub bar_index: usize,
}
