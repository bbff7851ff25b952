//! Per-service circuit breakers.
//!
//! # States
//! ```text
//! CLOSED ──(failures >= threshold)──▶ OPEN
//!   ▲                                  │ cool-down elapsed, first caller
//!   │ probe ok                         ▼
//!   └──────────────────────────── HALF_OPEN ──(probe failed)──▶ OPEN
//! ```
//!
//! Each breaker keeps its state behind its own mutex; `allow` and result
//! recording each run their whole read-decide-mutate step inside a single
//! critical section, so concurrent callers can neither lose a failure count
//! nor both become the half-open probe. The lock is never held across an
//! `.await`.
//!
//! A successful `allow` hands out an [`Admission`]. The request's outcome is
//! recorded through it. An admission dropped without a result (the client
//! went away mid-request) changes nothing, except that a dropped probe frees
//! the probe slot so the next caller can try again.
//!
//! Every trip starts a new generation. Admissions remember the generation
//! they were issued in, and results from an earlier one are ignored, even if
//! they arrive after a probe has closed the breaker again.
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::{
    config::{CircuitBreakerConfig, DEFAULT_FAILURE_THRESHOLD, ValidationResult},
    core::forwarder::ForwardResult,
    ports::clock::Clock,
};

/// Breaker status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BreakerStatus::Closed => "CLOSED",
            BreakerStatus::Open => "OPEN",
            BreakerStatus::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Thresholds shared by every breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cool_down: Duration,
}

impl BreakerSettings {
    pub fn from_config(config: &CircuitBreakerConfig) -> ValidationResult<Self> {
        Ok(Self {
            failure_threshold: config.failure_threshold.max(1),
            cool_down: config.cool_down()?,
        })
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cool_down: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    status: BreakerStatus,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    generation: u64,
}

/// Point-in-time copy of a breaker's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub status: BreakerStatus,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
    pub probe_in_flight: bool,
}

/// Failure-gating state machine for a single service.
pub struct CircuitBreaker {
    service: String,
    settings: BreakerSettings,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("settings", &self.settings)
            .field("state", &self.snapshot())
            .finish()
    }
}

impl CircuitBreaker {
    /// A closed breaker with no recorded failures.
    pub fn new(
        service: impl Into<String>,
        settings: BreakerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service: service.into(),
            settings,
            clock,
            state: Mutex::new(BreakerState {
                status: BreakerStatus::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
                generation: 0,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    // Transitions never panic while holding the lock, so a poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            status: state.status,
            consecutive_failures: state.consecutive_failures,
            opened_at: state.opened_at,
            probe_in_flight: state.probe_in_flight,
        }
    }

    pub fn status(&self) -> BreakerStatus {
        self.lock().status
    }

    /// Admission check. `None` means the request must not reach the backend.
    pub fn allow(self: &Arc<Self>) -> Option<Admission> {
        let (probe, generation) = {
            let mut state = self.lock();
            let probe = match state.status {
                BreakerStatus::Closed => false,
                BreakerStatus::Open => {
                    let now = self.clock.now();
                    let cooled_down = state.opened_at.is_none_or(|opened| {
                        now.saturating_duration_since(opened) >= self.settings.cool_down
                    });
                    if !cooled_down {
                        return None;
                    }
                    state.status = BreakerStatus::HalfOpen;
                    state.probe_in_flight = true;
                    tracing::info!(
                        service = %self.service,
                        "Circuit breaker half-open, admitting probe request"
                    );
                    true
                }
                BreakerStatus::HalfOpen => {
                    if state.probe_in_flight {
                        return None;
                    }
                    state.probe_in_flight = true;
                    tracing::debug!(service = %self.service, "Re-admitting half-open probe");
                    true
                }
            };
            (probe, state.generation)
        };

        Some(Admission {
            breaker: Arc::clone(self),
            probe,
            generation,
            settled: false,
        })
    }

    fn on_result(&self, probe: bool, generation: u64, success: bool) {
        let mut state = self.lock();
        if generation != state.generation {
            tracing::debug!(
                service = %self.service,
                status = %state.status,
                success,
                "Ignoring result of request admitted before the breaker last opened"
            );
            return;
        }
        match (state.status, probe) {
            (BreakerStatus::Closed, _) => {
                if success {
                    state.consecutive_failures = 0;
                } else {
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                    if state.consecutive_failures >= self.settings.failure_threshold {
                        self.trip(&mut state);
                    }
                }
            }
            (BreakerStatus::HalfOpen, true) => {
                state.probe_in_flight = false;
                if success {
                    state.status = BreakerStatus::Closed;
                    state.consecutive_failures = 0;
                    state.opened_at = None;
                    tracing::info!(
                        service = %self.service,
                        "Probe succeeded, circuit breaker closed"
                    );
                } else {
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                    self.trip(&mut state);
                }
            }
            // Only the probe is admitted in the current generation while not closed.
            (BreakerStatus::Open, _) | (BreakerStatus::HalfOpen, false) => {}
        }
    }

    fn trip(&self, state: &mut BreakerState) {
        state.status = BreakerStatus::Open;
        state.generation = state.generation.wrapping_add(1);
        state.opened_at = Some(self.clock.now());
        tracing::warn!(
            service = %self.service,
            consecutive_failures = state.consecutive_failures,
            cool_down = %humantime::format_duration(self.settings.cool_down),
            "Circuit breaker opened"
        );
    }

    fn release_probe(&self) {
        let mut state = self.lock();
        if state.status == BreakerStatus::HalfOpen && state.probe_in_flight {
            state.probe_in_flight = false;
            tracing::debug!(service = %self.service, "Probe abandoned, slot released");
        }
    }
}

/// Permission to forward one request, obtained from [`CircuitBreaker::allow`].
#[must_use = "an admission must be settled with `record` once the backend call finishes"]
pub struct Admission {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    generation: u64,
    settled: bool,
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission")
            .field("service", &self.breaker.service)
            .field("probe", &self.probe)
            .finish()
    }
}

impl Admission {
    /// True when this request is the single half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn service(&self) -> &str {
        self.breaker.service()
    }

    /// Feed the request's outcome back into the breaker.
    pub fn record(mut self, result: &ForwardResult) {
        self.settled = true;
        self.breaker.on_result(self.probe, self.generation, result.success);
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}

/// One independent breaker per configured service.
#[derive(Debug, Default)]
pub struct CircuitBreakers {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakers {
    pub fn new<I, S>(services: I, settings: BreakerSettings, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let breakers = services
            .into_iter()
            .map(|service| {
                let service = service.into();
                let breaker =
                    Arc::new(CircuitBreaker::new(service.clone(), settings, clock.clone()));
                (service, breaker)
            })
            .collect();
        Self { breakers }
    }

    /// Admission check for `service_id`; `None` when denied or unknown.
    pub fn allow(&self, service_id: &str) -> Option<Admission> {
        match self.breakers.get(service_id) {
            Some(breaker) => breaker.allow(),
            None => {
                tracing::error!(service = %service_id, "No circuit breaker for service");
                None
            }
        }
    }

    /// Record the outcome of an admitted request against its service's breaker.
    pub fn record(&self, admission: Admission, result: &ForwardResult) {
        admission.record(result);
    }

    pub fn snapshot(&self, service_id: &str) -> Option<BreakerSnapshot> {
        self.breakers.get(service_id).map(|b| b.snapshot())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
