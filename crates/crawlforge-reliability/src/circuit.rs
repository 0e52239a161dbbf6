//! Lock-free circuit breaker guarding browser launch and per-host navigation.
//!
//! Three states, atomics + a semaphore for half-open trial traffic. Launch
//! failure retries twice with backoff (1s, 2s, §4.1) before the circuit
//! breaker sees a failure at all; the breaker itself guards against
//! hammering a host/engine that is failing *across* launch attempts.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering::Relaxed};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for State {
    fn from(v: u8) -> Self {
        match v {
            1 => State::Open,
            2 => State::HalfOpen,
            _ => State::Closed,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub open_cooldown_ms: u64,
    pub half_open_max_in_flight: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_cooldown_ms: 30_000,
            half_open_max_in_flight: 2,
        }
    }
}

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> u64;
}

#[derive(Default, Debug)]
pub struct RealClock;

impl Clock for RealClock {
    fn now_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Per-host (or per-engine) circuit breaker. Cheap to construct; callers
/// key a `DashMap<String, Arc<CircuitBreaker>>` by host.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    open_until_ms: AtomicU64,
    half_open_permits: Arc<Semaphore>,
    cfg: CircuitConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let permits = cfg.half_open_max_in_flight as usize;
        Arc::new(Self {
            state: AtomicU8::new(State::Closed as u8),
            failures: AtomicU32::new(0),
            open_until_ms: AtomicU64::new(0),
            half_open_permits: Arc::new(Semaphore::new(permits)),
            cfg,
            clock,
        })
    }

    pub fn with_default_clock(cfg: CircuitConfig) -> Arc<Self> {
        Self::new(cfg, Arc::new(RealClock))
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state.load(Relaxed).into()
    }

    /// `Ok(None)` when closed, `Ok(Some(permit))` when a half-open trial
    /// slot was granted (hold the permit for the call's duration), `Err`
    /// when the circuit is open or half-open is saturated.
    pub fn try_acquire(&self) -> Result<Option<OwnedSemaphorePermit>, &'static str> {
        match self.state() {
            State::Closed => Ok(None),
            State::Open => {
                let now = self.clock.now_ms();
                if now >= self.open_until_ms.load(Relaxed) {
                    self.state.store(State::HalfOpen as u8, Relaxed);
                    self.try_acquire()
                } else {
                    Err("circuit open")
                }
            }
            State::HalfOpen => match Arc::clone(&self.half_open_permits).try_acquire_owned() {
                Ok(permit) => Ok(Some(permit)),
                Err(_) => Err("half-open saturated"),
            },
        }
    }

    pub fn on_success(&self) {
        match self.state() {
            State::Closed => self.failures.store(0, Relaxed),
            State::HalfOpen => {
                self.state.store(State::Closed as u8, Relaxed);
                self.failures.store(0, Relaxed);
                let deficit = (self.cfg.half_open_max_in_flight as usize)
                    .saturating_sub(self.half_open_permits.available_permits());
                if deficit > 0 {
                    self.half_open_permits.add_permits(deficit);
                }
            }
            State::Open => {}
        }
    }

    pub fn on_failure(&self) {
        match self.state() {
            State::Closed => {
                if self.failures.fetch_add(1, Relaxed) + 1 >= self.cfg.failure_threshold {
                    self.trip_open();
                }
            }
            State::HalfOpen => self.trip_open(),
            State::Open => {}
        }
    }

    fn trip_open(&self) {
        self.state.store(State::Open as u8, Relaxed);
        self.failures.store(0, Relaxed);
        let until = self.clock.now_ms() + self.cfg.open_cooldown_ms;
        self.open_until_ms.store(until, Relaxed);
        let deficit = (self.cfg.half_open_max_in_flight as usize)
            .saturating_sub(self.half_open_permits.available_permits());
        if deficit > 0 {
            self.half_open_permits.add_permits(deficit);
        }
    }
}
