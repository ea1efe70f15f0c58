//! Two-state (position, velocity) Kalman correction of the integrator output.
//!
//! The integrator already produced the state prediction, so only the covariance
//! is propagated here. Observation noise scales with ATR² and is inflated by
//! the normalized innovation (capped at 5x) so large surprises are trusted less.

use crate::config::KalmanConfig;
use crate::physics::integrator::PhysicsState;
use serde::{Deserialize, Serialize};

/// Initial diagonal covariance.
pub const INITIAL_VARIANCE: f64 = 1e-8;

/// 2x2 error covariance over (x, v).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KalmanCovariance {
    pub p00: f64,
    pub p01: f64,
    pub p10: f64,
    pub p11: f64,
}

impl Default for KalmanCovariance {
    fn default() -> Self {
        Self {
            p00: INITIAL_VARIANCE,
            p01: 0.0,
            p10: 0.0,
            p11: INITIAL_VARIANCE,
        }
    }
}

/// Filtered position/velocity plus the gain diagnostics of one update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KalmanUpdate {
    pub x: f64,
    pub v: f64,
    pub innovation: f64,
    pub gain_x: f64,
    pub gain_v: f64,
}

#[derive(Debug, Clone)]
pub struct KalmanEstimator {
    config: KalmanConfig,
}

impl KalmanEstimator {
    pub fn new(config: KalmanConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Fuse the predicted (x, v) with the observed close.
    ///
    /// `dt_bar` is the bar interval in seconds (at least 1).
    pub fn update(
        &self,
        prediction: (f64, f64),
        observation: f64,
        cov: &KalmanCovariance,
        dt_bar: f64,
        atr: f64,
    ) -> (KalmanUpdate, KalmanCovariance) {
        let (x, v) = prediction;
        let dt = dt_bar;
        let q = self.config.q * dt * dt;

        let p00n = cov.p00 + dt * (cov.p01 + cov.p10) + dt * dt * cov.p11 + q;
        let p01n = cov.p01 + dt * cov.p11;
        let p10n = cov.p10 + dt * cov.p11;
        let p11n = cov.p11 + q;

        let y = observation - x;
        let surprise = (y.abs() / atr.max(1e-8)).min(5.0);
        let r = (self.config.r * atr * atr * (1.0 + surprise)).max(1e-12);
        let s = p00n + r;
        let kx = p00n / s;
        let kv = p10n / s;

        let next = KalmanCovariance {
            p00: (1.0 - kx) * p00n,
            p01: (1.0 - kx) * p01n,
            p10: p10n - kv * p00n,
            p11: p11n - kv * p01n,
        };
        let out = KalmanUpdate {
            x: x + kx * y,
            v: v + kv * y,
            innovation: y,
            gain_x: kx,
            gain_v: kv,
        };
        (out, next)
    }

    /// Apply the filter to a full physics state; acceleration passes through.
    /// When disabled, returns the raw state and leaves the covariance as is.
    pub fn filter(
        &self,
        raw: PhysicsState,
        observation: f64,
        cov: &KalmanCovariance,
        dt_bar: f64,
        atr: f64,
    ) -> (PhysicsState, KalmanCovariance) {
        if !self.config.enabled {
            return (raw, *cov);
        }
        let (upd, next) = self.update((raw.x, raw.v), observation, cov, dt_bar, atr);
        (
            PhysicsState {
                x: upd.x,
                v: upd.v,
                a: raw.a,
            },
            next,
        )
    }
}
