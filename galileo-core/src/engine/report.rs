//! What one engine cycle did, in a form that serializes to a JSON line.

use super::session::ComputeStatus;
use crate::cache::{ComputationCache, ComputeError};
use crate::domain::{PositionId, Side};
use crate::energy::{EnergyDecision, EnergyReading};
use crate::exits::StopUpdate;
use crate::gates::{GateRejection, Tilt};
use crate::physics::PhysicsState;
use crate::signals::{EntrySignal, PullbackOutcome, ZigZagOutcome};
use crate::trade_plan::{PlanRejection, TradePlan};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ComputeOutcome {
    Computed,
    Cached,
    Failed(ComputeError),
}

impl From<Result<ComputeStatus, ComputeError>> for ComputeOutcome {
    fn from(result: Result<ComputeStatus, ComputeError>) -> Self {
        match result {
            Ok(ComputeStatus::Computed) => ComputeOutcome::Computed,
            Ok(ComputeStatus::Cached) => ComputeOutcome::Cached,
            Err(e) => ComputeOutcome::Failed(e),
        }
    }
}

/// Per-side results of the entry engines for one bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalScan {
    pub pullback_long: Option<PullbackOutcome>,
    pub pullback_short: Option<PullbackOutcome>,
    pub zigzag_long: Option<ZigZagOutcome>,
    pub zigzag_short: Option<ZigZagOutcome>,
}

impl SignalScan {
    /// Fired signals, long first.
    pub fn signals(&self) -> Vec<EntrySignal> {
        let pick = |pb: Option<PullbackOutcome>, zz: Option<ZigZagOutcome>| match (pb, zz) {
            (Some(PullbackOutcome::Triggered(s)), _) => Some(s),
            (_, Some(ZigZagOutcome::Triggered { signal, .. })) => Some(signal),
            _ => None,
        };
        [
            pick(self.pullback_long, self.zigzag_long),
            pick(self.pullback_short, self.zigzag_short),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EntryOutcome {
    Placed {
        plan: TradePlan,
        position_id: PositionId,
        fill_price: f64,
    },
    Blocked {
        side: Side,
        reasons: Vec<GateRejection>,
    },
    PlanRejected {
        side: Side,
        reason: PlanRejection,
    },
    OrderFailed {
        side: Side,
        error: String,
    },
    /// Filled too far from the plan price and closed again.
    ClosedForSlippage {
        side: Side,
        position_id: PositionId,
        slippage_pips: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub bar_index: usize,
    pub compute: ComputeOutcome,
    pub state: Option<PhysicsState>,
    pub cache: Option<ComputationCache>,
    pub energy: Option<EnergyReading>,
    pub energy_decision: Option<EnergyDecision>,
    pub scan: SignalScan,
    pub tilt: Option<Tilt>,
    pub entry: Option<EntryOutcome>,
    pub stop_updates: Vec<StopUpdate>,
}

impl CycleReport {
    pub fn new(bar_index: usize, compute: ComputeOutcome) -> Self {
        Self {
            bar_index,
            compute,
            state: None,
            cache: None,
            energy: None,
            energy_decision: None,
            scan: SignalScan::default(),
            tilt: None,
            entry: None,
            stop_updates: Vec::new(),
        }
    }

    pub fn signals(&self) -> Vec<EntrySignal> {
        self.scan.signals()
    }

    /// Updates whose candidate passed every check.
    pub fn moved_stops(&self) -> impl Iterator<Item = &StopUpdate> {
        self.stop_updates.iter().filter(|u| u.new_stop().is_some())
    }
}
