//! Price-as-particle model: integrator, Kalman correction, and the noise source.

pub mod integrator;
pub mod kalman;
pub mod noise;

pub use integrator::{clamp_state, sign, PhysicsIntegrator, PhysicsState};
pub use kalman::{KalmanCovariance, KalmanEstimator, KalmanUpdate};
pub use noise::{derive_seed, gaussian, FixedSequence, SeededUniform, UniformSource};
