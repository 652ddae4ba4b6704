//! Process-wide, per-service circuit breaker (spec §4.1, §3 `CircuitBreakerState`).
//!
//! One [`CircuitBreaker`] exists per service name (`source_m3u`, `logo_fetch`,
//! ...), shared by every client created for that service. The breaker's
//! profile is swappable without losing in-flight counters: readers and the
//! writer both go through the same `RwLock`, so a profile update is atomic
//! with respect to `allow`/`record_*`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerProfile;

const MAX_TRANSITIONS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CbState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Success2xx,
    ClientError4xx,
    ServerError5xx,
    Timeout,
    NetworkError,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StateTransition {
    pub at: DateTime<Utc>,
    pub from: CbState,
    pub to: CbState,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CircuitBreakerStats {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub failure_rate: f64,
    pub category_counts: HashMap<ErrorCategory, u64>,
    pub recent_transitions: Vec<StateTransition>,
}

struct Inner {
    state: CbState,
    consecutive_failures: u32,
    half_open_probes_in_flight: u32,
    opened_at: Option<Instant>,
    last_state_change: Instant,
    total_requests: u64,
    successes: u64,
    failures: u64,
    category_counts: HashMap<ErrorCategory, u64>,
    transitions: VecDeque<StateTransition>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CbState::Closed,
            consecutive_failures: 0,
            half_open_probes_in_flight: 0,
            opened_at: None,
            last_state_change: Instant::now(),
            total_requests: 0,
            successes: 0,
            failures: 0,
            category_counts: HashMap::new(),
            transitions: VecDeque::new(),
        }
    }

    fn transition(&mut self, to: CbState, reason: &'static str) {
        if self.state == to {
            return;
        }
        self.transitions.push_back(StateTransition { at: Utc::now(), from: self.state, to, reason });
        while self.transitions.len() > MAX_TRANSITIONS {
            self.transitions.pop_front();
        }
        self.state = to;
        self.last_state_change = Instant::now();
    }
}

/// What the caller is permitted to do after consulting the breaker.
pub enum Admission {
    /// Request may proceed. `probe` is true if this is a half-open probe
    /// (so the caller knows a failure must immediately reopen the circuit).
    Allowed { probe: bool },
    Denied,
}

pub struct CircuitBreaker {
    name: String,
    profile: RwLock<Arc<CircuitBreakerProfile>>,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, profile: CircuitBreakerProfile) -> Self {
        Self { name: name.into(), profile: RwLock::new(Arc::new(profile)), inner: RwLock::new(Inner::new()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Atomically swap in a new profile; in-progress counters are untouched.
    pub async fn update_profile(&self, profile: CircuitBreakerProfile) {
        *self.profile.write().await = Arc::new(profile);
    }

    pub async fn profile(&self) -> Arc<CircuitBreakerProfile> {
        self.profile.read().await.clone()
    }

    pub async fn state(&self) -> CbState {
        self.inner.read().await.state
    }

    /// Decide whether a request against this service may proceed, per the
    /// state machine in spec §4.1.
    pub async fn allow(&self) -> Admission {
        let profile = self.profile().await;
        let mut inner = self.inner.write().await;
        match inner.state {
            CbState::Closed => Admission::Allowed { probe: false },
            CbState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed() >= profile.reset_timeout).unwrap_or(false);
                if elapsed {
                    info!(service = %self.name, "circuit breaker: open -> half_open (reset timeout elapsed)");
                    inner.transition(CbState::HalfOpen, "timeout_recovery");
                    inner.half_open_probes_in_flight = 1;
                    Admission::Allowed { probe: true }
                } else {
                    debug!(service = %self.name, "circuit breaker: open, denying request");
                    Admission::Denied
                }
            }
            CbState::HalfOpen => {
                if inner.half_open_probes_in_flight < profile.half_open_max {
                    inner.half_open_probes_in_flight += 1;
                    Admission::Allowed { probe: true }
                } else {
                    Admission::Denied
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let profile = self.profile().await;
        let mut inner = self.inner.write().await;
        inner.total_requests += 1;
        inner.successes += 1;
        *inner.category_counts.entry(ErrorCategory::Success2xx).or_insert(0) += 1;
        inner.consecutive_failures = 0;
        match inner.state {
            CbState::HalfOpen => {
                inner.half_open_probes_in_flight = inner.half_open_probes_in_flight.saturating_sub(1);
                info!(service = %self.name, "circuit breaker: half_open probe succeeded -> closed");
                inner.transition(CbState::Closed, "probe_success");
                let _ = profile;
            }
            CbState::Closed | CbState::Open => {}
        }
    }

    pub async fn record_failure(&self, category: ErrorCategory) {
        let profile = self.profile().await;
        let mut inner = self.inner.write().await;
        inner.total_requests += 1;
        inner.failures += 1;
        *inner.category_counts.entry(category).or_insert(0) += 1;
        match inner.state {
            CbState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= profile.failure_threshold {
                    warn!(service = %self.name, failures = inner.consecutive_failures, "circuit breaker: closed -> open (threshold exceeded)");
                    inner.transition(CbState::Open, "threshold_exceeded");
                    inner.opened_at = Some(Instant::now());
                }
            }
            CbState::HalfOpen => {
                inner.half_open_probes_in_flight = inner.half_open_probes_in_flight.saturating_sub(1);
                warn!(service = %self.name, "circuit breaker: half_open probe failed -> open");
                inner.transition(CbState::Open, "probe_failure");
                inner.opened_at = Some(Instant::now());
                inner.consecutive_failures = profile.failure_threshold;
            }
            CbState::Open => {
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    pub async fn force_open(&self) {
        let mut inner = self.inner.write().await;
        inner.transition(CbState::Open, "manual_reset");
        inner.opened_at = Some(Instant::now());
    }

    pub async fn force_closed(&self) {
        let mut inner = self.inner.write().await;
        inner.transition(CbState::Closed, "manual_reset");
        inner.consecutive_failures = 0;
        inner.half_open_probes_in_flight = 0;
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read().await;
        let failure_rate = if inner.total_requests > 0 { inner.failures as f64 / inner.total_requests as f64 } else { 0.0 };
        CircuitBreakerStats {
            total_requests: inner.total_requests,
            successes: inner.successes,
            failures: inner.failures,
            failure_rate,
            category_counts: inner.category_counts.clone(),
            recent_transitions: inner.transitions.iter().cloned().collect(),
        }
    }
}

/// Process-wide registry of breakers, keyed by service name (spec §3:
/// "CircuitBreakerState ... Process-wide, one per service name").
pub struct CircuitBreakerManager {
    config: RwLock<crate::config::CircuitBreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    pub fn new(config: crate::config::CircuitBreakerConfig) -> Self {
        Self { config: RwLock::new(config), breakers: RwLock::new(HashMap::new()) }
    }

    pub async fn get_or_create(&self, service_name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().await.get(service_name) {
            return existing.clone();
        }
        let mut breakers = self.breakers.write().await;
        if let Some(existing) = breakers.get(service_name) {
            return existing.clone();
        }
        let profile = self.config.read().await.profile_for(service_name).clone();
        let breaker = Arc::new(CircuitBreaker::new(service_name, profile));
        breakers.insert(service_name.to_string(), breaker.clone());
        breaker
    }

    /// Update the live configuration; existing breaker *state* (counters,
    /// current state) is preserved, only the profile pointer moves (spec
    /// §4.1: "Configuration is live-updatable... must not lose in-progress
    /// counters or the current state of active breakers").
    pub async fn reconfigure(&self, config: crate::config::CircuitBreakerConfig) {
        let breakers = self.breakers.read().await;
        for (name, breaker) in breakers.iter() {
            breaker.update_profile(config.profile_for(name).clone()).await;
        }
        *self.config.write().await = config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn profile(threshold: u32, reset: Duration) -> CircuitBreakerProfile {
        CircuitBreakerProfile { failure_threshold: threshold, reset_timeout: reset, half_open_max: 1, acceptable_status_codes: vec![] }
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new("source_m3u", profile(3, Duration::from_secs(30)));
        for _ in 0..2 {
            assert!(matches!(cb.allow().await, Admission::Allowed { probe: false }));
            cb.record_failure(ErrorCategory::NetworkError).await;
        }
        assert_eq!(cb.state().await, CbState::Closed);
        cb.record_failure(ErrorCategory::NetworkError).await;
        assert_eq!(cb.state().await, CbState::Open);
        assert!(matches!(cb.allow().await, Admission::Denied));
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_circuit() {
        let cb = CircuitBreaker::new("source_m3u", profile(1, Duration::from_millis(10)));
        cb.record_failure(ErrorCategory::NetworkError).await;
        assert_eq!(cb.state().await, CbState::Open);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(cb.allow().await, Admission::Allowed { probe: true }));
        assert_eq!(cb.state().await, CbState::HalfOpen);
        cb.record_success().await;
        assert_eq!(cb.state().await, CbState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens() {
        let cb = CircuitBreaker::new("source_m3u", profile(1, Duration::from_millis(10)));
        cb.record_failure(ErrorCategory::NetworkError).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = cb.allow().await;
        cb.record_failure(ErrorCategory::NetworkError).await;
        assert_eq!(cb.state().await, CbState::Open);
    }

    #[tokio::test]
    async fn manager_shares_breaker_by_service_name() {
        let manager = CircuitBreakerManager::new(crate::config::CircuitBreakerConfig::default());
        let a = manager.get_or_create("source_m3u").await;
        let b = manager.get_or_create("source_m3u").await;
        assert!(Arc::ptr_eq(&a, &b));
    }
}
