//! Heun (RK2) integration of a 1-D particle standing in for price.
//!
//! Forces: two springs (toward the channel midpoint and the trend EMA), linear
//! damping, Stribeck friction, a drive proportional to how far close sits
//! outside the channel, and volatility-scaled Gaussian noise. Time is bar
//! normalized: one bar = 1.0, split into `sub_steps` equal slices.

use crate::cache::ComputationCache;
use crate::config::PhysicsConfig;
use crate::physics::noise::{gaussian, UniformSource};
use serde::{Deserialize, Serialize};

/// Velocity bound in ATR multiples.
pub const VELOCITY_LIMIT_ATR: f64 = 1e6;
/// Acceleration bound in ATR multiples.
pub const ACCELERATION_LIMIT_ATR: f64 = 1e7;

/// Position, velocity and acceleration of the price particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PhysicsState {
    pub x: f64,
    pub v: f64,
    pub a: f64,
}

impl PhysicsState {
    /// Particle at rest on `close`.
    pub fn at_rest(close: f64) -> Self {
        Self {
            x: close,
            v: 0.0,
            a: 0.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.v.is_finite() && self.a.is_finite()
    }
}

/// Sign that maps 0 (and NaN) to 0, unlike `f64::signum`.
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Clamp `value` into [-limit, limit]; non-finite values go to `sign * limit`.
fn clamp_signed(value: f64, limit: f64) -> f64 {
    if !value.is_finite() || value.abs() > limit {
        sign(value) * limit
    } else {
        value
    }
}

/// Bound velocity and acceleration to ATR-relative limits, preserving sign.
pub fn clamp_state(state: PhysicsState, atr: f64) -> PhysicsState {
    PhysicsState {
        x: state.x,
        v: clamp_signed(state.v, atr * VELOCITY_LIMIT_ATR),
        a: clamp_signed(state.a, atr * ACCELERATION_LIMIT_ATR),
    }
}

#[derive(Debug, Clone)]
pub struct PhysicsIntegrator {
    params: PhysicsConfig,
}

impl PhysicsIntegrator {
    pub fn new(params: PhysicsConfig) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PhysicsConfig {
        &self.params
    }

    /// Stribeck friction magnitude at speed |v|.
    fn friction_mu(&self, v: f64) -> f64 {
        let p = &self.params;
        let ratio = v.abs() / p.v_star.max(1e-12);
        p.mu0 + (p.mu1 - p.mu0) * (-(ratio * ratio)).exp()
    }

    /// Net acceleration at (x, v). Draws one Gaussian when noise is active.
    pub fn acceleration(
        &self,
        x: f64,
        v: f64,
        market: &ComputationCache,
        noise: &mut dyn UniformSource,
    ) -> f64 {
        let p = &self.params;
        let friction = -self.friction_mu(v) * sign(v);
        let spring1 = -p.k1 * (x - market.midpoint);
        let spring2 = -p.k2 * (x - market.ema);
        let damping = -p.damping * v;
        let drive = p.drive_gain * market.band_diff;

        let sigma = p.noise_k.max(0.0) * market.atr.max(0.0);
        let stochastic = if sigma > 0.0 && sigma.is_finite() {
            sigma * gaussian(noise)
        } else {
            0.0
        };

        let force = spring1 + spring2 + damping + friction + drive + stochastic;
        let a = force / p.mass.max(1e-12);
        if a.is_finite() {
            a
        } else {
            0.0
        }
    }

    /// Advance one bar in `sub_steps` Heun slices (0 is treated as 1).
    pub fn step(
        &self,
        state: PhysicsState,
        market: &ComputationCache,
        sub_steps: u32,
        noise: &mut dyn UniformSource,
    ) -> PhysicsState {
        let steps = sub_steps.max(1);
        let dt = 1.0 / steps as f64;
        let PhysicsState { mut x, mut v, mut a } = state;

        for _ in 0..steps {
            let a0 = self.acceleration(x, v, market, noise);
            let x1 = x + v * dt + 0.5 * a0 * dt * dt;
            let v_preview = v + a0 * dt;
            let a1 = self.acceleration(x1, v_preview, market, noise);
            v += 0.5 * (a0 + a1) * dt;
            x = x1;
            a = a1;
        }

        PhysicsState { x, v, a }
    }
}
