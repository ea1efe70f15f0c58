//! Galileo Core: physics price model, swing entries, energy gating, trailing exits.
//!
//! This crate contains the decision engine:
//! - Domain types (bars, instruments, quotes, position snapshots)
//! - Heun integrator for a damped price particle, with optional Kalman correction
//! - Energy classifier that blocks or scales entries
//! - Fibonacci pullback arm/trigger machine and ZigZag breakout entries
//! - Exit manager proposing trailing and ZigZag escape stops
//! - Orchestrator that runs the per-bar cycle against a `Broker`
//!
//! The engine never owns positions or talks to a venue directly. Hosts feed it
//! bar history and indicator series through `MarketView` and execute what it
//! decides through the `Broker` trait.

pub mod cache;
pub mod config;
pub mod domain;
pub mod energy;
pub mod engine;
pub mod exits;
pub mod gates;
pub mod indicators;
pub mod market;
pub mod physics;
pub mod signals;
pub mod sizing;
pub mod swing;
pub mod trade_plan;

pub use config::{ConfigError, EngineConfig};
pub use domain::{Bar, Instrument, PositionView, Quote, Side};
pub use engine::{Broker, CycleReport, Engine, EngineError, SharedEngine, TimerOutcome};
pub use market::{IndicatorPlan, MarketView};
