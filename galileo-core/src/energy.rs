//! Market energy: a normalized measure of how hard the filtered particle is moving.
//!
//! Two independent checks consume it:
//! - `EnergyClassifier::classify` bands energy (normalized again by the engine ATR)
//!   into quiet / normal / hot regimes and turns the regime into a block, a size
//!   scale, or an extra breakout distance depending on `EnergyMode`.
//! - `EnergyClassifier::passes_gate` bounds raw energy and its bar-over-bar delta.
//!
//! Either check may veto an entry.

use crate::config::EnergyConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the hot regime affects entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyMode {
    Off,
    Block,
    Scale,
    Tighten,
}

/// Energy level and its change since the previous computed bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyReading {
    pub etot: f64,
    pub d_e: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyRegime {
    Quiet,
    Normal,
    Hot,
}

/// Why the classifier decided what it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyReason {
    Off,
    /// Engine ATR unusable; the classifier passes.
    ZeroAtr,
    Regime(EnergyRegime),
}

impl fmt::Display for EnergyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyReason::Off => write!(f, "off"),
            EnergyReason::ZeroAtr => write!(f, "atr=0"),
            EnergyReason::Regime(EnergyRegime::Quiet) => write!(f, "quiet"),
            EnergyReason::Regime(EnergyRegime::Normal) => write!(f, "normal"),
            EnergyReason::Regime(EnergyRegime::Hot) => write!(f, "hot"),
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyDecision {
    pub block: bool,
    /// Position-size multiplier in [min_scale, 1].
    pub volume_scale: f64,
    /// Extra breakout distance, in price units.
    pub extra_break: f64,
    /// Normalized energy the decision was made on, when one was computed.
    pub x: Option<f64>,
    pub reason: EnergyReason,
}

impl EnergyDecision {
    fn pass(reason: EnergyReason, x: Option<f64>) -> Self {
        Self {
            block: false,
            volume_scale: 1.0,
            extra_break: 0.0,
            x,
            reason,
        }
    }
}

/// Result of the raw-bounds gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyGateVerdict {
    Pass,
    NotANumber,
    BelowMin,
    AboveMax,
    DeltaTooLarge,
}

impl EnergyGateVerdict {
    pub fn passed(self) -> bool {
        self == EnergyGateVerdict::Pass
    }
}

impl fmt::Display for EnergyGateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyGateVerdict::Pass => write!(f, "pass"),
            EnergyGateVerdict::NotANumber => write!(f, "nan"),
            EnergyGateVerdict::BelowMin => write!(f, "Etot<min"),
            EnergyGateVerdict::AboveMax => write!(f, "Etot>max"),
            EnergyGateVerdict::DeltaTooLarge => write!(f, "|dE|>max"),
        }
    }
}

/// Tracks energy across bars and classifies it.
#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    config: EnergyConfig,
    etot_prev: f64,
    last: Option<EnergyReading>,
}

impl EnergyClassifier {
    pub fn new(config: EnergyConfig) -> Self {
        Self {
            config,
            etot_prev: 0.0,
            last: None,
        }
    }

    pub fn config(&self) -> &EnergyConfig {
        &self.config
    }

    /// Latest reading, if any bar has been observed.
    pub fn reading(&self) -> Option<EnergyReading> {
        self.last
    }

    /// Record the filtered state of a newly computed bar.
    ///
    /// Energy is `(|v| + |a|) / atr`; the delta is against the previous observation.
    pub fn observe(&mut self, v: f64, a: f64, atr: f64) -> EnergyReading {
        let etot = (v.abs() + a.abs()) / atr.max(1e-12);
        let reading = EnergyReading {
            etot,
            d_e: etot - self.etot_prev,
        };
        self.etot_prev = etot;
        self.last = Some(reading);
        reading
    }

    /// Band `etot / engine_atr` against the quiet/hot thresholds.
    ///
    /// Quiet is `x <= quiet_x` and only blocks in Block mode. Hot is `x >= hot_x`.
    pub fn classify(&self, etot: f64, engine_atr: f64, pip_size: f64) -> EnergyDecision {
        let c = &self.config;
        if c.mode == EnergyMode::Off {
            return EnergyDecision::pass(EnergyReason::Off, None);
        }
        if !(engine_atr > 0.0) {
            return EnergyDecision::pass(EnergyReason::ZeroAtr, None);
        }

        let x = etot / engine_atr;

        if x <= c.quiet_x {
            return EnergyDecision {
                block: c.mode == EnergyMode::Block,
                ..EnergyDecision::pass(EnergyReason::Regime(EnergyRegime::Quiet), Some(x))
            };
        }

        if x >= c.hot_x {
            let hot = EnergyDecision::pass(EnergyReason::Regime(EnergyRegime::Hot), Some(x));
            return match c.mode {
                EnergyMode::Scale => {
                    let t = ((x - c.hot_x) / c.hot_x).min(3.0);
                    EnergyDecision {
                        volume_scale: (1.0 - 0.5 * t).max(c.min_scale),
                        ..hot
                    }
                }
                EnergyMode::Tighten => EnergyDecision {
                    extra_break: c.extra_break_pips * pip_size,
                    ..hot
                },
                EnergyMode::Block | EnergyMode::Off => EnergyDecision { block: true, ..hot },
            };
        }

        EnergyDecision::pass(EnergyReason::Regime(EnergyRegime::Normal), Some(x))
    }

    /// Classify a raw (velocity, acceleration) pair directly.
    pub fn classify_state(
        &self,
        v: f64,
        a: f64,
        atr: f64,
        engine_atr: f64,
        pip_size: f64,
    ) -> EnergyDecision {
        let etot = (v.abs() + a.abs()) / atr.max(1e-12);
        self.classify(etot, engine_atr, pip_size)
    }

    /// Raw bounds check: `energy_min <= etot <= energy_max` and `|dE| <= max_abs_de`.
    pub fn passes_gate(&self, reading: &EnergyReading) -> EnergyGateVerdict {
        let c = &self.config;
        let de = reading.d_e.abs();
        if reading.etot.is_nan() || de.is_nan() {
            EnergyGateVerdict::NotANumber
        } else if reading.etot < c.energy_min {
            EnergyGateVerdict::BelowMin
        } else if reading.etot > c.energy_max {
            EnergyGateVerdict::AboveMax
        } else if de > c.max_abs_de {
            EnergyGateVerdict::DeltaTooLarge
        } else {
            EnergyGateVerdict::Pass
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;

    const PIP: f64 = 0.0001;

    fn classifier(mode: EnergyMode) -> EnergyClassifier {
        EnergyClassifier::new(EnergyConfig {
            mode,
            ..EnergyConfig::default()
        })
    }

    #[test]
    fn observe_tracks_delta() {
        let mut ec = classifier(EnergyMode::Scale);
        let r1 = ec.observe(0.0002, -0.0001, 0.001);
        assert_approx(r1.etot, 0.3, 1e-12);
        assert_approx(r1.d_e, 0.3, 1e-12);
        let r2 = ec.observe(0.0001, 0.0, 0.001);
        assert_approx(r2.etot, 0.1, 1e-12);
        assert_approx(r2.d_e, -0.2, 1e-12);
        assert_eq!(ec.reading(), Some(r2));
    }

    #[test]
    fn boundary_at_quiet_threshold_is_quiet() {
        // engine_atr = 1 makes x == etot.
        let block = classifier(EnergyMode::Block).classify(0.20, 1.0, PIP);
        assert_eq!(block.reason, EnergyReason::Regime(EnergyRegime::Quiet));
        assert!(block.block);

        let scale = classifier(EnergyMode::Scale).classify(0.20, 1.0, PIP);
        assert_eq!(scale.reason, EnergyReason::Regime(EnergyRegime::Quiet));
        assert!(!scale.block);
        assert_eq!(scale.volume_scale, 1.0);
    }

    #[test]
    fn boundary_at_hot_threshold_is_hot() {
        let scale = classifier(EnergyMode::Scale).classify(1.20, 1.0, PIP);
        assert_eq!(scale.reason, EnergyReason::Regime(EnergyRegime::Hot));
        // t = 0 at the threshold, so no shrink yet.
        assert_eq!(scale.volume_scale, 1.0);

        let block = classifier(EnergyMode::Block).classify(1.20, 1.0, PIP);
        assert!(block.block);

        let tighten = classifier(EnergyMode::Tighten).classify(1.20, 1.0, PIP);
        assert!(!tighten.block);
        assert_approx(tighten.extra_break, 2.0 * PIP, 1e-15);
    }

    #[test]
    fn between_thresholds_is_normal() {
        let d = classifier(EnergyMode::Block).classify(0.21, 1.0, PIP);
        assert_eq!(d.reason, EnergyReason::Regime(EnergyRegime::Normal));
        assert!(!d.block);
        let d = classifier(EnergyMode::Block).classify(1.19, 1.0, PIP);
        assert_eq!(d.reason, EnergyReason::Regime(EnergyRegime::Normal));
    }

    #[test]
    fn scale_shrinks_linearly_to_floor() {
        let ec = classifier(EnergyMode::Scale);
        // x = 1.8: t = 0.5, scale = 0.75
        assert_approx(ec.classify(1.8, 1.0, PIP).volume_scale, 0.75, 1e-12);
        // x = 3.0: t = 1.5, scale = 0.25 -> floored at 0.35
        assert_approx(ec.classify(3.0, 1.0, PIP).volume_scale, 0.35, 1e-12);
        // Far beyond: t capped at 3, still the floor.
        assert_approx(ec.classify(100.0, 1.0, PIP).volume_scale, 0.35, 1e-12);
    }

    #[test]
    fn normalizes_by_engine_atr() {
        let ec = classifier(EnergyMode::Block);
        // etot 0.5 over engine ATR 2.0 -> x = 0.25, normal.
        let d = ec.classify(0.5, 2.0, PIP);
        assert_eq!(d.x, Some(0.25));
        assert!(!d.block);
    }

    #[test]
    fn off_and_zero_atr_pass() {
        let off = classifier(EnergyMode::Off).classify(100.0, 1.0, PIP);
        assert_eq!(off.reason, EnergyReason::Off);
        assert!(!off.block);

        let zero = classifier(EnergyMode::Block).classify(100.0, 0.0, PIP);
        assert_eq!(zero.reason, EnergyReason::ZeroAtr);
        assert!(!zero.block);
        let nan = classifier(EnergyMode::Block).classify(100.0, f64::NAN, PIP);
        assert_eq!(nan.reason, EnergyReason::ZeroAtr);
    }

    #[test]
    fn classify_state_uses_velocity_and_acceleration() {
        let ec = classifier(EnergyMode::Block);
        // (|v| + |a|) / atr = 2.0 -> hot with engine ATR 1.
        let d = ec.classify_state(-0.0015, 0.0005, 0.001, 1.0, PIP);
        assert!(d.block);
        assert_eq!(d.reason.to_string(), "hot");
    }

    #[test]
    fn gate_checks_in_order() {
        let ec = classifier(EnergyMode::Off);
        let r = |etot: f64, d_e: f64| EnergyReading { etot, d_e };
        assert_eq!(ec.passes_gate(&r(f64::NAN, 0.0)), EnergyGateVerdict::NotANumber);
        assert_eq!(ec.passes_gate(&r(0.00001, 0.0)), EnergyGateVerdict::BelowMin);
        assert_eq!(ec.passes_gate(&r(0.6, 0.0)), EnergyGateVerdict::AboveMax);
        assert_eq!(ec.passes_gate(&r(0.2, -0.07)), EnergyGateVerdict::DeltaTooLarge);
        assert_eq!(ec.passes_gate(&r(0.2, 0.06)), EnergyGateVerdict::Pass);
        assert!(ec.passes_gate(&r(0.5, 0.0)).passed());
        assert_eq!(EnergyGateVerdict::DeltaTooLarge.to_string(), "|dE|>max");
    }
}
