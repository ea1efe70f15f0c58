//! Re-entrancy protection.
//!
//! [`BusyFlag`] marks a computation in flight. Acquiring returns a guard that
//! clears the flag on drop, so the flag is released on every exit path,
//! including unwinding. [`SharedEngine`] adds a mutex for multi-threaded hosts
//! and skips timer work instead of waiting when the engine is occupied.

use super::broker::Broker;
use super::{CycleReport, Engine, TimerOutcome};
use crate::market::MarketView;
use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag, or `None` if it is already set.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| BusyGuard(Arc::clone(&self.0)))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Clears the owning [`BusyFlag`] when dropped.
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Engine behind a mutex, serializing bar and timer invocations.
#[derive(Debug)]
pub struct SharedEngine {
    inner: Mutex<Engine>,
    busy: BusyFlag,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        let busy = engine.busy_flag();
        Self {
            inner: Mutex::new(engine),
            busy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Engine> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("engine mutex poisoned; continuing with last committed state");
            poisoned.into_inner()
        })
    }

    /// Bar close: waits for any timer pass to finish.
    pub fn on_bar(&self, view: &MarketView<'_>, broker: &mut dyn Broker) -> Option<CycleReport> {
        self.lock().on_bar(view, broker)
    }

    /// Timer tick: skipped when another invocation holds the engine.
    pub fn on_timer(&self, view: &MarketView<'_>, now: NaiveDateTime) -> TimerOutcome {
        if self.busy.is_busy() {
            return TimerOutcome::Busy;
        }
        match self.inner.try_lock() {
            Ok(mut engine) => engine.on_timer(view, now),
            Err(TryLockError::WouldBlock) => TimerOutcome::Busy,
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!("engine mutex poisoned; continuing with last committed state");
                poisoned.into_inner().on_timer(view, now)
            }
        }
    }

    pub fn into_inner(self) -> Engine {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
