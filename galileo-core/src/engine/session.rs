//! Per-instrument computation session.
//!
//! Owns everything that persists across bars: the filtered physics state, the
//! Kalman covariance, the energy history and the last computed snapshot.
//! `compute_if_needed` is the only mutator and is transactional: it either
//! commits a full new bar or leaves the session exactly as it was.

use crate::cache::{ComputationCache, ComputeError};
use crate::config::EngineConfig;
use crate::domain::bar_interval_secs;
use crate::energy::{EnergyClassifier, EnergyReading};
use crate::market::MarketView;
use crate::physics::{
    clamp_state, KalmanCovariance, KalmanEstimator, PhysicsIntegrator, PhysicsState,
    SeededUniform, UniformSource,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// Noise stream label under the configured master seed.
const PHYSICS_STREAM: &str = "physics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeStatus {
    /// A new bar index was computed and committed.
    Computed,
    /// This bar index was already computed; nothing changed.
    Cached,
}

pub struct Session {
    integrator: PhysicsIntegrator,
    kalman: KalmanEstimator,
    energy: EnergyClassifier,
    noise: Box<dyn UniformSource>,
    lookback: usize,
    warmup: usize,
    sub_steps: u32,
    state: Option<PhysicsState>,
    covariance: KalmanCovariance,
    cache: Option<ComputationCache>,
    last_computed_bar: Option<usize>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("covariance", &self.covariance)
            .field("cache", &self.cache)
            .field("last_computed_bar", &self.last_computed_bar)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session whose noise stream is derived from `general.seed`.
    pub fn new(config: &EngineConfig) -> Self {
        let noise = SeededUniform::for_stream(config.general.seed, PHYSICS_STREAM);
        Self::with_noise(config, Box::new(noise))
    }

    /// Session with a caller-supplied random source.
    pub fn with_noise(config: &EngineConfig, noise: Box<dyn UniformSource>) -> Self {
        Self {
            integrator: PhysicsIntegrator::new(config.physics.clone()),
            kalman: KalmanEstimator::new(config.kalman.clone()),
            energy: EnergyClassifier::new(config.energy.clone()),
            noise,
            lookback: config.general.lookback,
            warmup: config.warmup_bars(),
            sub_steps: config.physics.sub_steps,
            state: None,
            covariance: KalmanCovariance::default(),
            cache: None,
            last_computed_bar: None,
        }
    }

    /// Compute the bar under evaluation unless it already has been.
    pub fn compute_if_needed(&mut self, view: &MarketView<'_>) -> Result<ComputeStatus, ComputeError> {
        let index = view.index();
        if self.last_computed_bar == Some(index) {
            return Ok(ComputeStatus::Cached);
        }
        if view.len() < self.warmup {
            return Err(ComputeError::InsufficientBars {
                required: self.warmup,
                available: view.len(),
            });
        }

        let cache = ComputationCache::build(view, self.lookback)?;
        let dt_bar = bar_interval_secs(view.bars);

        let start = self
            .state
            .unwrap_or_else(|| PhysicsState::at_rest(cache.close));
        let raw = self
            .integrator
            .step(start, &cache, self.sub_steps, self.noise.as_mut());
        let (filtered, covariance) =
            self.kalman
                .filter(raw, cache.close, &self.covariance, dt_bar, cache.atr);
        let state = clamp_state(filtered, cache.atr);
        let reading = self.energy.observe(state.v, state.a, cache.atr);

        trace!(raw_x = raw.x, raw_v = raw.v, raw_a = raw.a, "integrator");
        debug!(
            bar = index,
            x = state.x,
            v = state.v,
            a = state.a,
            etot = reading.etot,
            d_e = reading.d_e,
            "bar computed"
        );

        self.state = Some(state);
        self.covariance = covariance;
        self.cache = Some(cache);
        self.last_computed_bar = Some(index);
        Ok(ComputeStatus::Computed)
    }

    /// Drop all persisted state; the next compute starts at rest.
    pub fn reset(&mut self) {
        self.state = None;
        self.covariance = KalmanCovariance::default();
        self.cache = None;
        self.last_computed_bar = None;
        self.energy = EnergyClassifier::new(self.energy.config().clone());
    }

    pub fn is_ready(&self) -> bool {
        self.last_computed_bar.is_some()
    }

    pub fn state(&self) -> Option<PhysicsState> {
        self.state
    }

    pub fn covariance(&self) -> KalmanCovariance {
        self.covariance
    }

    pub fn cache(&self) -> Option<&ComputationCache> {
        self.cache.as_ref()
    }

    pub fn energy(&self) -> &EnergyClassifier {
        &self.energy
    }

    pub fn energy_reading(&self) -> Option<EnergyReading> {
        self.energy.reading()
    }

    pub fn last_computed_bar(&self) -> Option<usize> {
        self.last_computed_bar
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KalmanConfig, PhysicsConfig};
    use crate::domain::Bar;
    use crate::indicators::make_fx_bars;
    use crate::physics::FixedSequence;

    fn quiet_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.general.lookback = 20;
        config.physics = PhysicsConfig {
            noise_k: 0.0,
            ..PhysicsConfig::default()
        };
        config.kalman = KalmanConfig {
            enabled: false,
            ..KalmanConfig::default()
        };
        config
    }

    fn flat(n: usize) -> Vec<Bar> {
        make_fx_bars(&vec![1.1; n], 0.0002)
    }

    fn compute(session: &mut Session, bars: &[Bar], atr: f64) -> Result<ComputeStatus, ComputeError> {
        let atr = vec![atr; bars.len()];
        let ema: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let view = MarketView::new(bars, &atr, &ema, &atr).unwrap();
        session.compute_if_needed(&view)
    }

    #[test]
    fn needs_warmup_bars() {
        let mut session = Session::new(&quiet_config());
        let err = compute(&mut session, &flat(29), 0.001).unwrap_err();
        assert_eq!(
            err,
            ComputeError::InsufficientBars {
                required: 30,
                available: 29
            }
        );
        assert!(!session.is_ready());
    }

    #[test]
    fn computes_once_per_bar_index() {
        let mut session = Session::new(&quiet_config());
        let bars = flat(40);
        assert_eq!(compute(&mut session, &bars, 0.001), Ok(ComputeStatus::Computed));
        let snapshot = session.state();
        assert_eq!(compute(&mut session, &bars, 0.001), Ok(ComputeStatus::Cached));
        assert_eq!(session.state(), snapshot);
        assert_eq!(session.last_computed_bar(), Some(39));
        assert_eq!(compute(&mut session, &flat(41), 0.001), Ok(ComputeStatus::Computed));
        assert_eq!(session.last_computed_bar(), Some(40));
    }

    #[test]
    fn first_compute_starts_at_rest() {
        let mut session = Session::new(&quiet_config());
        compute(&mut session, &flat(40), 0.001).unwrap();
        // Flat market at equilibrium: no force acts.
        let s = session.state().unwrap();
        assert!((s.x - 1.1).abs() < 1e-12);
        assert!(s.v.abs() < 1e-12);
        assert!(s.a.abs() < 1e-12);
    }

    #[test]
    fn invalid_atr_leaves_state_untouched() {
        let mut session = Session::new(&quiet_config());
        compute(&mut session, &flat(40), 0.001).unwrap();
        let before = (session.state(), session.covariance(), session.energy_reading());
        let err = compute(&mut session, &flat(41), f64::NAN).unwrap_err();
        assert!(matches!(err, ComputeError::AtrTooSmall(_)));
        assert_eq!(
            (session.state(), session.covariance(), session.energy_reading()),
            before
        );
        assert_eq!(session.last_computed_bar(), Some(39));
    }

    #[test]
    fn non_positive_close_leaves_state_untouched() {
        let mut session = Session::new(&quiet_config());
        compute(&mut session, &flat(40), 0.001).unwrap();
        let before = (session.state(), session.covariance(), session.energy_reading());

        let mut closes = vec![1.1; 41];
        closes[40] = 0.0;
        let bars = make_fx_bars(&closes, 0.0002);
        let err = compute(&mut session, &bars, 0.001).unwrap_err();
        assert!(matches!(err, ComputeError::NonPositive { field: "close", .. }));
        assert_eq!(
            (session.state(), session.covariance(), session.energy_reading()),
            before
        );
        assert_eq!(session.last_computed_bar(), Some(39));
    }

    #[test]
    fn same_seed_replays_identically() {
        let mut config = quiet_config();
        config.physics.noise_k = 0.5;
        config.general.seed = 42;
        let run = |config: &EngineConfig| {
            let mut session = Session::new(config);
            let closes: Vec<f64> = (0..60).map(|i| 1.1 + 0.0001 * (i % 7) as f64).collect();
            let bars = make_fx_bars(&closes, 0.0002);
            for end in 30..bars.len() {
                compute(&mut session, &bars[..=end], 0.001).unwrap();
            }
            session.state().unwrap()
        };
        let a = run(&config);
        assert_eq!(a, run(&config));
        config.general.seed = 43;
        assert_ne!(a, run(&config));
    }

    #[test]
    fn injected_noise_is_used() {
        let mut config = quiet_config();
        config.physics.noise_k = 1.0;
        // u1 = 0.5, u2 = 0.0: z = sqrt(2 ln 2) > 0 every draw.
        let mut session = Session::with_noise(&config, Box::new(FixedSequence::new(vec![0.5, 0.0])));
        compute(&mut session, &flat(40), 0.001).unwrap();
        assert!(session.state().unwrap().v > 0.0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut session = Session::new(&quiet_config());
        compute(&mut session, &flat(40), 0.001).unwrap();
        session.reset();
        assert!(!session.is_ready());
        assert!(session.cache().is_none());
        assert!(session.energy_reading().is_none());
    }
}
