//! Circuit breakers for adapter calls.
//!
//! [`CircuitBreakerState`] is the pure state machine: every transition
//! takes the monotonic instant it happens at, so it can be driven without
//! real timers. [`CircuitBreaker`] wraps one behind a mutex for a single
//! call site, and [`BreakerRegistry`] hands out one breaker per call-site
//! name.
//!
//! ```text
//! CLOSED --threshold failures--> OPEN --cooldown--> HALF_OPEN
//!    ^                             ^                   |
//!    |                             +------failure------+
//!    +---------------------success---------------------+
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ctxengine_config::ResilienceConfig;
use ctxengine_core::AdapterError;
use serde::Serialize;
use tracing::{info, warn};

/// Call-site names used by the assembler.
pub const ENTITY_DATA: &str = "entity_data";
pub const KB_CHUNKS: &str = "kb_chunks";
pub const CROSS_AGENT: &str = "cross_agent";
pub const RAG_SEARCH: &str = "rag_search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_millis(10_000),
        }
    }
}

impl From<&ResilienceConfig> for BreakerSettings {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_millis(config.cooldown_ms),
        }
    }
}

/// Snapshot for reporting. Timestamps are wall-clock and never feed back
/// into state decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub last_failure: Option<String>,
    pub last_success: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerState {
    state: BreakerState,
    consecutive_failures: u32,
    total_successes: u64,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    last_failure_wall: Option<DateTime<Utc>>,
    last_success_wall: Option<DateTime<Utc>>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            total_successes: 0,
            last_failure: None,
            last_success: None,
            last_failure_wall: None,
            last_success_wall: None,
        }
    }
}

impl CircuitBreakerState {
    /// Current state at `now`. An OPEN breaker whose cooldown has elapsed
    /// since the last failure moves to HALF_OPEN.
    pub fn poll(&mut self, settings: &BreakerSettings, now: Instant) -> BreakerState {
        if self.state == BreakerState::Open {
            let cooled = self
                .last_failure
                .is_none_or(|at| now.saturating_duration_since(at) >= settings.cooldown);
            if cooled {
                self.state = BreakerState::HalfOpen;
            }
        }
        self.state
    }

    /// Whether a call may go through at `now`.
    pub fn permits(&mut self, settings: &BreakerSettings, now: Instant) -> bool {
        self.poll(settings, now) != BreakerState::Open
    }

    pub fn record_success(&mut self, now: Instant, wall: DateTime<Utc>) {
        self.total_successes += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(now);
        self.last_success_wall = Some(wall);
        self.state = BreakerState::Closed;
    }

    pub fn record_failure(&mut self, settings: &BreakerSettings, now: Instant, wall: DateTime<Utc>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(now);
        self.last_failure_wall = Some(wall);
        match self.state {
            BreakerState::HalfOpen => self.state = BreakerState::Open,
            BreakerState::Closed if self.consecutive_failures >= settings.failure_threshold => {
                self.state = BreakerState::Open;
            }
            _ => {}
        }
    }

    /// Force CLOSED and clear the failure count.
    pub fn reset(&mut self) {
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn stats(&mut self, settings: &BreakerSettings, now: Instant) -> BreakerStats {
        BreakerStats {
            state: self.poll(settings, now),
            consecutive_failures: self.consecutive_failures,
            total_successes: self.total_successes,
            last_failure: self.last_failure_wall.map(|t| t.to_rfc3339()),
            last_success: self.last_success_wall.map(|t| t.to_rfc3339()),
        }
    }
}

/// A breaker guarding one call site.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<CircuitBreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(CircuitBreakerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.lock().poll(&self.settings, Instant::now())
    }

    pub fn stats(&self) -> BreakerStats {
        self.lock().stats(&self.settings, Instant::now())
    }

    pub fn reset(&self) {
        self.lock().reset();
        info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Run `call` unless the breaker is open. An open breaker returns
    /// [`AdapterError::CircuitOpen`] without invoking `call`.
    ///
    /// The lock is not held across the await.
    pub async fn call<T, F, Fut>(&self, call: F) -> Result<T, AdapterError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        if !self.lock().permits(&self.settings, Instant::now()) {
            return Err(AdapterError::CircuitOpen(self.name.clone()));
        }

        let result = call().await;

        let mut inner = self.lock();
        let before = inner.state;
        match &result {
            Ok(_) => inner.record_success(Instant::now(), Utc::now()),
            Err(_) => inner.record_failure(&self.settings, Instant::now(), Utc::now()),
        }
        let after = inner.state;
        let failures = inner.consecutive_failures;
        drop(inner);

        if before != after {
            match after {
                BreakerState::Open => warn!(
                    breaker = %self.name,
                    failures,
                    "Circuit breaker opened"
                ),
                _ => info!(breaker = %self.name, state = ?after, "Circuit breaker state changed"),
            }
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One breaker per call-site name, created on first use.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    settings: BreakerSettings,
    breakers: Mutex<BTreeMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            breakers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.settings)))
            .clone()
    }

    pub fn stats(&self) -> BTreeMap<String, BreakerStats> {
        let breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.stats()))
            .collect()
    }

    pub fn reset_all(&self) {
        let breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        for breaker in breakers.values() {
            breaker.reset();
        }
    }
}
