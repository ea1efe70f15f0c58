//! Engine configuration: one serde section per component, every field defaulted.
//!
//! Loaded from TOML. Missing sections or fields fall back to the defaults below,
//! so an empty file is a valid configuration.

use crate::energy::EnergyMode;
use crate::indicators::AtrSmoothing;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub general: GeneralConfig,
    pub risk: RiskConfig,
    pub timer: TimerConfig,
    pub energy: EnergyConfig,
    pub physics: PhysicsConfig,
    pub kalman: KalmanConfig,
    pub pullback: PullbackConfig,
    pub zigzag: ZigZagConfig,
    pub trailing: TrailingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Positions whose label starts with this prefix belong to the engine.
    pub label_prefix: String,
    /// Fixed order size used when risk sizing is off or degenerate.
    pub units: f64,
    pub risk_percent: f64,
    /// 0 = unlimited.
    pub max_trades_per_day: u32,
    pub use_daily_tilt: bool,
    /// Channel window (bars, current bar included).
    pub lookback: usize,
    pub atr_period: usize,
    pub atr_smoothing: AtrSmoothing,
    pub ema_period: usize,
    /// Master seed for the noise stream.
    pub seed: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            label_prefix: "GAL_U4".into(),
            units: 10_000.0,
            risk_percent: 1.0,
            max_trades_per_day: 0,
            use_daily_tilt: true,
            lookback: 50,
            atr_period: 14,
            atr_smoothing: AtrSmoothing::Exponential,
            ema_period: 200,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    /// ATR multiple for the initial stop and the trailing offset.
    pub trail_atr_k: f64,
    pub r_multiple: f64,
    /// Close a fresh fill whose slippage exceeds this many pips (0 = off).
    pub max_market_range_pips: f64,
    pub min_sl_from_price_pips: f64,
    pub trail_chandelier: bool,
    /// 0 = no spread filter.
    pub spread_max_pips: f64,
    pub min_stops_pips: f64,
    /// Bars to wait after an entry before the next one (0 = off).
    pub cooldown_bars: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            trail_atr_k: 0.8,
            r_multiple: 1.5,
            max_market_range_pips: 0.0,
            min_sl_from_price_pips: 0.5,
            trail_chandelier: true,
            spread_max_pips: 2.0,
            min_stops_pips: 0.0,
            cooldown_bars: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimerConfig {
    pub use_timer_compute: bool,
    /// Minimum seconds between two timer computations.
    pub calc_every_sec: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            use_timer_compute: true,
            calc_every_sec: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnergyConfig {
    /// Enables the raw-bounds gate (min/max/|dE|).
    pub use_energy_gate: bool,
    pub energy_min: f64,
    pub energy_max: f64,
    pub max_abs_de: f64,
    pub mode: EnergyMode,
    /// Period of the secondary ATR used to normalize energy for regime bands.
    pub atr_period: usize,
    pub quiet_x: f64,
    pub hot_x: f64,
    pub min_scale: f64,
    pub extra_break_pips: f64,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            use_energy_gate: false,
            energy_min: 0.0001,
            energy_max: 0.5,
            max_abs_de: 0.06,
            mode: EnergyMode::Scale,
            atr_period: 14,
            quiet_x: 0.20,
            hot_x: 1.20,
            min_scale: 0.35,
            extra_break_pips: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    pub mass: f64,
    pub damping: f64,
    /// Spring toward the channel midpoint.
    pub k1: f64,
    /// Spring toward the trend EMA.
    pub k2: f64,
    /// Stribeck friction: kinetic level.
    pub mu0: f64,
    /// Stribeck friction: static level.
    pub mu1: f64,
    pub v_star: f64,
    pub drive_gain: f64,
    pub noise_k: f64,
    pub sub_steps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            mass: 1.0,
            damping: 0.30,
            k1: 0.60,
            k2: 0.30,
            mu0: 0.00002,
            mu1: 0.0001,
            v_star: 0.0002,
            drive_gain: 1.0,
            noise_k: 0.10,
            sub_steps: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KalmanConfig {
    pub enabled: bool,
    pub q: f64,
    pub r: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            q: 1e-6,
            r: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PullbackConfig {
    pub enabled: bool,
    pub fib_min: f64,
    pub fib_max: f64,
    /// Stop buffer beyond the leg origin, in soft-ATR multiples.
    pub atr_buf_x: f64,
    /// Swing backstep for leg construction.
    pub back: usize,
    /// Swing search window in bars.
    pub look: usize,
    pub need_ema_slope: bool,
    pub relax_ema_slope: bool,
    pub auto_width: bool,
    pub atr_floor_pips: f64,
    pub atr_cap_x: f64,
    pub micro_confirm: bool,
    pub zone_tol_pips: f64,
    pub confirm_lookback: usize,
    pub arm_bars: usize,
    pub min_vr: f64,
}

impl Default for PullbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fib_min: 0.3,
            fib_max: 0.7,
            atr_buf_x: 0.25,
            back: 3,
            look: 400,
            need_ema_slope: true,
            relax_ema_slope: true,
            auto_width: true,
            atr_floor_pips: 6.0,
            atr_cap_x: 1.20,
            micro_confirm: false,
            zone_tol_pips: 2.0,
            confirm_lookback: 2,
            arm_bars: 10,
            min_vr: 0.45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZigZagConfig {
    pub escape_enabled: bool,
    pub backstep: usize,
    pub buffer_atr_x: f64,
    pub buffer_pips: f64,
    pub break_atr_x: f64,
    pub break_pips: f64,
    pub break_entries: bool,
}

impl Default for ZigZagConfig {
    fn default() -> Self {
        Self {
            escape_enabled: true,
            backstep: 3,
            buffer_atr_x: 0.0,
            buffer_pips: 2.0,
            break_atr_x: 0.4,
            break_pips: 2.0,
            break_entries: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrailingConfig {
    pub min_step_pips: f64,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self { min_step_pips: 1.0 }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Bars required before the first computation.
    pub fn warmup_bars(&self) -> usize {
        (self.general.lookback + 5).max(30)
    }

    /// Content hash of the configuration, stable across field order in the source file.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// Collect every violation rather than stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = Vec::new();
        let g = &self.general;
        let r = &self.risk;
        let e = &self.energy;
        let p = &self.physics;
        let pb = &self.pullback;

        if g.lookback == 0 {
            errs.push("general.lookback must be >= 1".to_string());
        }
        if g.atr_period == 0 || g.ema_period == 0 || e.atr_period == 0 {
            errs.push("indicator periods must be >= 1".to_string());
        }
        if !(g.units.is_finite() && g.units > 0.0) {
            errs.push(format!("general.units must be positive, got {}", g.units));
        }
        if !(g.risk_percent.is_finite() && g.risk_percent >= 0.0) {
            errs.push(format!("general.risk_percent must be >= 0, got {}", g.risk_percent));
        }
        if !(r.trail_atr_k.is_finite() && r.trail_atr_k > 0.0) {
            errs.push(format!("risk.trail_atr_k must be positive, got {}", r.trail_atr_k));
        }
        if !(r.r_multiple.is_finite() && r.r_multiple > 0.0) {
            errs.push(format!("risk.r_multiple must be positive, got {}", r.r_multiple));
        }
        if r.spread_max_pips < 0.0 || r.max_market_range_pips < 0.0 || r.min_stops_pips < 0.0 {
            errs.push("risk pip distances must be >= 0".to_string());
        }
        if e.energy_min > e.energy_max {
            errs.push(format!(
                "energy.energy_min ({}) exceeds energy_max ({})",
                e.energy_min, e.energy_max
            ));
        }
        if !(e.quiet_x < e.hot_x) || e.hot_x <= 0.0 {
            errs.push(format!(
                "energy.quiet_x ({}) must be below a positive hot_x ({})",
                e.quiet_x, e.hot_x
            ));
        }
        if !(e.min_scale > 0.0 && e.min_scale <= 1.0) {
            errs.push(format!("energy.min_scale must be in (0, 1], got {}", e.min_scale));
        }
        if !(p.mass.is_finite() && p.mass > 0.0) {
            errs.push(format!("physics.mass must be positive, got {}", p.mass));
        }
        if !(p.v_star.is_finite() && p.v_star > 0.0) {
            errs.push(format!("physics.v_star must be positive, got {}", p.v_star));
        }
        if p.sub_steps == 0 {
            errs.push("physics.sub_steps must be >= 1".to_string());
        }
        if self.kalman.q < 0.0 || self.kalman.r < 0.0 {
            errs.push("kalman.q and kalman.r must be >= 0".to_string());
        }
        if !(0.0..=1.0).contains(&pb.fib_min)
            || !(0.0..=1.0).contains(&pb.fib_max)
            || pb.fib_min >= pb.fib_max
        {
            errs.push(format!(
                "pullback fib band [{}, {}] must satisfy 0 <= min < max <= 1",
                pb.fib_min, pb.fib_max
            ));
        }
        if pb.back == 0 || pb.look == 0 {
            errs.push("pullback.back and pullback.look must be >= 1".to_string());
        }
        if pb.atr_cap_x <= 0.0 {
            errs.push(format!("pullback.atr_cap_x must be positive, got {}", pb.atr_cap_x));
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errs))
        }
    }
}
