//! Orchestrator: one `Engine` per instrument, driven by bar closes and timer ticks.
//!
//! A bar cycle runs, in order:
//!
//! 1. Compute the bar (once per index; failures skip the rest of the cycle)
//! 2. Entry scan, only when flat: long pullback, short pullback unless the long
//!    fired, then ZigZag breaks for sides without a trigger
//! 3. For the first signal: daily tilt, gates, energy veto, plan, market order
//! 4. ZigZag escape over open positions
//! 5. ATR trailing over open positions
//!
//! Exits run every computed bar whether or not an entry fired.

pub mod broker;
pub mod guard;
pub mod report;
pub mod session;

pub use broker::{Broker, BrokerError, MarketOrderRequest};
pub use guard::{BusyFlag, BusyGuard, SharedEngine};
pub use report::{ComputeOutcome, CycleReport, EntryOutcome, SignalScan};
pub use session::{ComputeStatus, Session};

use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Instrument, InstrumentError, PositionView, Side};
use crate::exits::{ExitManager, StopUpdate};
use crate::gates::{daily_tilt, entry_rejections, GateContext, GateRejection, TradeCounter};
use crate::market::{IndicatorPlan, MarketView};
use crate::signals::{EntrySignal, PullbackEngine, PullbackOutcome, ZigZagBreakout};
use crate::trade_plan::{plan_trade, PlanInputs};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}

/// What a timer tick did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TimerOutcome {
    Disabled,
    /// Another invocation was in flight; nothing was touched.
    Busy,
    RateLimited,
    Compute(ComputeOutcome),
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    instrument: Instrument,
    session: Session,
    pullback: PullbackEngine,
    zigzag: ZigZagBreakout,
    exits: ExitManager,
    counter: TradeCounter,
    busy: BusyFlag,
    last_timer: Option<NaiveDateTime>,
}

impl Engine {
    pub fn new(config: EngineConfig, instrument: Instrument) -> Result<Self, EngineError> {
        let session = Session::new(&config);
        Self::with_session(config, instrument, session)
    }

    /// Engine around a prepared session, e.g. one with injected noise.
    pub fn with_session(
        config: EngineConfig,
        instrument: Instrument,
        session: Session,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        instrument.validate()?;
        Ok(Self {
            pullback: PullbackEngine::new(config.pullback.clone()),
            zigzag: ZigZagBreakout::new(config.zigzag.clone(), config.pullback.look),
            exits: ExitManager::new(&config),
            counter: TradeCounter::new(),
            busy: BusyFlag::new(),
            last_timer: None,
            session,
            instrument,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn pullback(&self) -> &PullbackEngine {
        &self.pullback
    }

    pub fn counter(&self) -> &TradeCounter {
        &self.counter
    }

    /// Handle on the re-entrancy flag, shared with this engine.
    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    /// Indicator series this engine expects in its `MarketView`.
    pub fn indicator_plan(&self) -> IndicatorPlan {
        IndicatorPlan::from_config(&self.config)
    }

    /// Full bar cycle. `None` when another invocation is in flight.
    pub fn on_bar(&mut self, view: &MarketView<'_>, broker: &mut dyn Broker) -> Option<CycleReport> {
        let Some(_guard) = self.busy.try_acquire() else {
            debug!(bar = view.index(), "engine busy, bar skipped");
            return None;
        };
        if let Some(bar) = view.last_bar() {
            self.roll_day(bar.open_time.date());
        }

        let mut report = self.compute(view);
        if matches!(report.compute, ComputeOutcome::Failed(_)) {
            return Some(report);
        }

        let prefix = self.config.general.label_prefix.clone();
        let positions = broker.positions(&prefix);
        if positions.is_empty() {
            report.scan = self.scan(view, &report);
            if let Some(signal) = report.signals().first().copied() {
                let entry = self.enter(signal, view, &positions, broker, &mut report);
                report.entry = Some(entry);
            }
        }

        self.manage_exits(view, broker, &prefix, &mut report);
        Some(report)
    }

    /// Compute and scan without a broker. Nothing is gated or placed.
    pub fn analyze(&mut self, view: &MarketView<'_>) -> Option<CycleReport> {
        let _guard = self.busy.try_acquire()?;
        let mut report = self.compute(view);
        if !matches!(report.compute, ComputeOutcome::Failed(_)) {
            report.scan = self.scan(view, &report);
        }
        Some(report)
    }

    /// Periodic compute between bar closes.
    pub fn on_timer(&mut self, view: &MarketView<'_>, now: NaiveDateTime) -> TimerOutcome {
        if !self.config.timer.use_timer_compute {
            return TimerOutcome::Disabled;
        }
        let Some(_guard) = self.busy.try_acquire() else {
            return TimerOutcome::Busy;
        };
        self.roll_day(now.date());

        let every = self.config.timer.calc_every_sec;
        if every > 0 {
            if let Some(last) = self.last_timer {
                let min_secs = i64::try_from(every.max(1)).unwrap_or(i64::MAX);
                if (now - last).num_seconds() < min_secs {
                    return TimerOutcome::RateLimited;
                }
            }
        }
        self.last_timer = Some(now);

        let result = self.session.compute_if_needed(view);
        if let Err(e) = &result {
            debug!(bar = view.index(), error = %e, "timer compute skipped");
        }
        TimerOutcome::Compute(result.into())
    }

    fn roll_day(&mut self, today: NaiveDate) {
        if self.counter.roll(today) {
            info!(%today, "daily trade count reset");
        }
    }

    fn compute(&mut self, view: &MarketView<'_>) -> CycleReport {
        let result = self.session.compute_if_needed(view);
        if let Err(e) = &result {
            debug!(bar = view.index(), error = %e, "compute skipped");
        }
        let mut report = CycleReport::new(view.index(), result.into());
        report.state = self.session.state();
        report.cache = self.session.cache().copied();
        report.energy = self.session.energy_reading();
        report.energy_decision = report.energy.map(|r| {
            self.session
                .energy()
                .classify(r.etot, view.engine_atr_now(), self.instrument.pip_size)
        });
        report
    }

    fn scan(&mut self, view: &MarketView<'_>, report: &CycleReport) -> SignalScan {
        let (Some(cache), Some(state)) = (report.cache, report.state) else {
            return SignalScan::default();
        };
        let extra_break = report.energy_decision.map_or(0.0, |d| d.extra_break);
        let inst = &self.instrument;
        let mut scan = SignalScan::default();

        let long = self
            .pullback
            .evaluate(Side::Long, view, cache.atr, state.v, inst);
        let long_fired = matches!(long, PullbackOutcome::Triggered(_));
        scan.pullback_long = Some(long);

        let mut short_fired = false;
        if !long_fired {
            let short = self
                .pullback
                .evaluate(Side::Short, view, cache.atr, state.v, inst);
            short_fired = matches!(short, PullbackOutcome::Triggered(_));
            scan.pullback_short = Some(short);
        }

        if !long_fired {
            scan.zigzag_long = Some(self.zigzag.try_break(Side::Long, view, cache.atr, inst, extra_break));
        }
        if !short_fired {
            scan.zigzag_short = Some(self.zigzag.try_break(Side::Short, view, cache.atr, inst, extra_break));
        }
        scan
    }

    fn enter(
        &mut self,
        signal: EntrySignal,
        view: &MarketView<'_>,
        positions: &[PositionView],
        broker: &mut dyn Broker,
        report: &mut CycleReport,
    ) -> EntryOutcome {
        let side = signal.side;
        let bar_index = view.index();
        let atr = report.cache.map_or(f64::NAN, |c| c.atr);
        let tally = view
            .last_bar()
            .map(|b| broker.daily_tally(b.open_time.date()))
            .unwrap_or_default();

        let tilt = daily_tilt(&self.config.general, self.config.risk.r_multiple, tally);
        report.tilt = Some(tilt);

        let ctx = GateContext {
            side,
            bar_index,
            positions,
            quote: broker.quote(),
            atr,
            max_trades: tilt.max_trades,
        };
        let mut reasons = entry_rejections(&self.config.risk, &self.counter, &ctx, &self.instrument);
        if let Some(decision) = report.energy_decision.filter(|d| d.block) {
            reasons.push(GateRejection::EnergyBlocked(decision.reason));
        }
        if self.config.energy.use_energy_gate {
            if let Some(reading) = report.energy {
                let verdict = self.session.energy().passes_gate(&reading);
                if !verdict.passed() {
                    reasons.push(GateRejection::EnergyGate(verdict));
                }
            }
        }
        if !reasons.is_empty() {
            let list: Vec<String> = reasons.iter().map(ToString::to_string).collect();
            info!(bar = bar_index, %side, reasons = ?list, "entry blocked");
            return EntryOutcome::Blocked { side, reasons };
        }

        let inputs = PlanInputs {
            signal,
            close: view.close(),
            atr,
            r_multiple: tilt.r_multiple,
            balance: broker.balance(),
            volume_scale: report.energy_decision.map_or(1.0, |d| d.volume_scale),
        };
        let plan = match plan_trade(&self.config, &inputs, &self.instrument) {
            Ok(plan) => plan,
            Err(reason) => {
                info!(bar = bar_index, %side, %reason, "entry plan rejected");
                return EntryOutcome::PlanRejected { side, reason };
            }
        };

        let request = MarketOrderRequest {
            side,
            units: plan.units,
            label: self.config.general.label_prefix.clone(),
            sl_pips: plan.sl_pips,
            tp_pips: plan.tp_pips,
            expected_price: plan.entry,
        };
        info!(
            bar = bar_index,
            %side,
            source = %signal.source,
            units = plan.units,
            entry = plan.entry,
            sl = plan.stop_loss,
            tp = plan.take_profit,
            sl_pips = plan.sl_pips,
            tp_pips = plan.tp_pips,
            "order pre"
        );
        let position = match broker.market_order(&request) {
            Ok(position) => position,
            Err(e) => {
                warn!(bar = bar_index, %side, error = %e, "market order failed");
                return EntryOutcome::OrderFailed {
                    side,
                    error: e.to_string(),
                };
            }
        };

        if position.stop_loss.is_none() || position.take_profit.is_none() {
            match broker.modify_position(position.id, Some(plan.stop_loss), Some(plan.take_profit)) {
                Ok(()) => info!(id = position.id, "initial SL/TP attached"),
                Err(e) => warn!(id = position.id, error = %e, "attaching initial SL/TP failed"),
            }
        }

        let max_range = self.config.risk.max_market_range_pips;
        if max_range > 0.0 {
            let slippage_pips = self.instrument.to_pips(position.entry_price - plan.entry);
            if slippage_pips > max_range {
                if let Err(e) = broker.close_position(position.id) {
                    warn!(id = position.id, error = %e, "closing slipped fill failed");
                }
                info!(id = position.id, slippage_pips, max_range, "fill closed for slippage");
                return EntryOutcome::ClosedForSlippage {
                    side,
                    position_id: position.id,
                    slippage_pips,
                };
            }
        }

        self.counter.record_entry(bar_index);
        info!(
            id = position.id,
            %side,
            fill = position.entry_price,
            trades_today = self.counter.trades_today(),
            "order filled"
        );
        EntryOutcome::Placed {
            plan,
            position_id: position.id,
            fill_price: position.entry_price,
        }
    }

    fn manage_exits(
        &self,
        view: &MarketView<'_>,
        broker: &mut dyn Broker,
        prefix: &str,
        report: &mut CycleReport,
    ) {
        let Some(cache) = report.cache else {
            return;
        };
        if self.exits.escape_enabled() {
            let positions = broker.positions(prefix);
            let updates =
                self.exits
                    .escape_pass(&positions, view, cache.atr, broker.quote(), &self.instrument);
            apply_stops(&positions, updates, broker, report);
        }
        // Re-read so trailing compares against stops the escape pass just moved.
        let positions = broker.positions(prefix);
        let updates =
            self.exits
                .trailing_pass(&positions, view, cache.atr, broker.quote(), &self.instrument);
        apply_stops(&positions, updates, broker, report);
    }
}

fn apply_stops(
    positions: &[PositionView],
    updates: Vec<StopUpdate>,
    broker: &mut dyn Broker,
    report: &mut CycleReport,
) {
    for update in updates {
        if let Some(stop) = update.new_stop() {
            let take_profit = positions
                .iter()
                .find(|p| p.id == update.position_id)
                .and_then(|p| p.take_profit);
            match broker.modify_position(update.position_id, Some(stop), take_profit) {
                Ok(()) => info!(
                    id = update.position_id,
                    kind = %update.kind,
                    side = %update.side,
                    old = ?update.previous,
                    new = stop,
                    "stop moved"
                ),
                Err(e) => warn!(
                    id = update.position_id,
                    kind = %update.kind,
                    new = stop,
                    error = %e,
                    "stop modification failed"
                ),
            }
        }
        report.stop_updates.push(update);
    }
}
