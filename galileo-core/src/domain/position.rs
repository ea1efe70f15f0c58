use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Broker-assigned position identifier.
pub type PositionId = u64;

/// Read-only snapshot of an open position owned by the broker.
///
/// Exit logic only proposes new stops against this view; the broker applies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    pub id: PositionId,
    pub label: String,
    pub side: Side,
    pub units: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub entry_time: NaiveDateTime,
}

impl PositionView {
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn matches_label(&self, prefix: &str) -> bool {
        self.label.starts_with(prefix)
    }

    /// True when `candidate` would move the stop in the position's favor.
    pub fn stop_improves(&self, candidate: f64) -> bool {
        match (self.stop_loss, self.side) {
            (None, _) => true,
            (Some(sl), Side::Long) => candidate > sl,
            (Some(sl), Side::Short) => candidate < sl,
        }
    }
}
