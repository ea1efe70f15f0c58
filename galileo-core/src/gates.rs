//! Entry gates: business-rule vetoes surfaced as reason codes, plus the
//! per-day trade counter and the daily tilt.
//!
//! Every gate is evaluated so the report lists all reasons at once. An empty
//! list means the entry may proceed.

use crate::config::{GeneralConfig, RiskConfig};
use crate::domain::{Instrument, PositionView, Quote, Side};
use crate::energy::{EnergyGateVerdict, EnergyReason};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed trades needed before the tilt reacts.
const TILT_MIN_TRADES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GateRejection {
    Cooldown { bars_left: usize },
    DailyCap { taken: u32, cap: u32 },
    OpenSameSide,
    SpreadTooWide { spread_pips: f64 },
    AtrInvalid,
    EnergyBlocked(EnergyReason),
    EnergyGate(EnergyGateVerdict),
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRejection::Cooldown { bars_left } => write!(f, "cooldown ({bars_left} bars left)"),
            GateRejection::DailyCap { taken, cap } => write!(f, "maxTrades ({taken}/{cap})"),
            GateRejection::OpenSameSide => write!(f, "hasOpenSameSide"),
            GateRejection::SpreadTooWide { spread_pips } => {
                write!(f, "spreadTooWide ({spread_pips:.2}p)")
            }
            GateRejection::AtrInvalid => write!(f, "atrInvalid"),
            GateRejection::EnergyBlocked(reason) => write!(f, "energyBlocked ({reason})"),
            GateRejection::EnergyGate(verdict) => write!(f, "energyGate ({verdict})"),
        }
    }
}

/// Today's closed trades, as reported by the account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTally {
    pub wins: u32,
    pub losses: u32,
}

impl DailyTally {
    /// Count a closed trade. Break-even trades are ignored.
    pub fn record(&mut self, net_profit: f64) {
        if net_profit > 0.0 {
            self.wins += 1;
        } else if net_profit < 0.0 {
            self.losses += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> Option<f64> {
        let n = self.total();
        (n > 0).then(|| f64::from(self.wins) / f64::from(n))
    }
}

/// Effective reward multiple and trade cap for the day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tilt {
    pub r_multiple: f64,
    /// 0 means unlimited.
    pub max_trades: u32,
}

/// Lean into a winning day and back off a losing one.
///
/// An unlimited cap stays unlimited.
pub fn daily_tilt(general: &GeneralConfig, r_multiple: f64, tally: DailyTally) -> Tilt {
    let configured = general.max_trades_per_day;
    let mut tilt = Tilt {
        r_multiple,
        max_trades: configured,
    };
    if !general.use_daily_tilt || tally.total() < TILT_MIN_TRADES {
        return tilt;
    }
    let Some(wr) = tally.win_rate() else {
        return tilt;
    };
    if wr > 0.55 {
        tilt.r_multiple = (r_multiple * 1.10).min(2.0);
        if configured > 0 {
            tilt.max_trades = configured + 1;
        }
    } else if wr < 0.45 {
        tilt.r_multiple = (r_multiple * 0.90).max(1.2);
        if configured > 0 {
            tilt.max_trades = configured.saturating_sub(1).max(1);
        }
    }
    tilt
}

/// Trades taken today and the bar of the last entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeCounter {
    day: Option<NaiveDate>,
    trades_today: u32,
    last_trade_bar: Option<usize>,
}

impl TradeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the daily count when `today` differs from the tracked day.
    /// Returns true on a reset.
    pub fn roll(&mut self, today: NaiveDate) -> bool {
        if self.day == Some(today) {
            return false;
        }
        let rolled = self.day.is_some();
        self.day = Some(today);
        self.trades_today = 0;
        rolled
    }

    pub fn record_entry(&mut self, bar_index: usize) {
        self.trades_today += 1;
        self.last_trade_bar = Some(bar_index);
    }

    pub fn trades_today(&self) -> u32 {
        self.trades_today
    }

    pub fn last_trade_bar(&self) -> Option<usize> {
        self.last_trade_bar
    }
}

/// Snapshot the gates look at for one side.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub side: Side,
    pub bar_index: usize,
    pub positions: &'a [PositionView],
    pub quote: Quote,
    pub atr: f64,
    pub max_trades: u32,
}

/// All business-rule rejections for an entry on `ctx.side`.
pub fn entry_rejections(
    risk: &RiskConfig,
    counter: &TradeCounter,
    ctx: &GateContext<'_>,
    instrument: &Instrument,
) -> Vec<GateRejection> {
    let mut out = Vec::new();

    if risk.cooldown_bars > 0 {
        if let Some(last) = counter.last_trade_bar() {
            let elapsed = ctx.bar_index.saturating_sub(last);
            if elapsed < risk.cooldown_bars {
                out.push(GateRejection::Cooldown {
                    bars_left: risk.cooldown_bars - elapsed,
                });
            }
        }
    }

    if ctx.max_trades > 0 && counter.trades_today() >= ctx.max_trades {
        out.push(GateRejection::DailyCap {
            taken: counter.trades_today(),
            cap: ctx.max_trades,
        });
    }

    if ctx.positions.iter().any(|p| p.side == ctx.side) {
        out.push(GateRejection::OpenSameSide);
    }

    let spread_pips = ctx.quote.spread() / instrument.pip_size;
    if risk.spread_max_pips > 0.0 && spread_pips > risk.spread_max_pips {
        out.push(GateRejection::SpreadTooWide { spread_pips });
    }

    if !(ctx.atr > 0.0 && ctx.atr.is_finite()) {
        out.push(GateRejection::AtrInvalid);
    }

    out
}
