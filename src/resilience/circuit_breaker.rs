//! # Circuit Breaker Implementation
//!
//! Classic three-state breaker: Closed (normal operation), Open (failing fast)
//! and HalfOpen (one trial allowed through).
//!
//! Open to HalfOpen is evaluated on read from the time of the last failure, so
//! a breaker never needs a timer task of its own.

use crate::config::CircuitBreakerConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Recovery probe - the next call is a trial
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during guarded execution
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not invoked
    #[error("circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and the failure was recorded
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

/// Invoked with `(component, from, to)` after every state transition
pub type StateChangeCallback = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    rejected_calls: u64,
}

type Transition = Option<(CircuitState, CircuitState)>;

pub struct CircuitBreaker {
    name: String,
    max_failures: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerState>,
    on_state_change: Option<StateChangeCallback>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("max_failures", &self.max_failures)
            .field("reset_timeout", &self.reset_timeout)
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, max_failures: u32, reset_timeout: Duration) -> Self {
        let name = name.into();
        info!(
            component = %name,
            max_failures,
            reset_timeout_ms = reset_timeout.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            max_failures: max_failures.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                total_calls: 0,
                total_successes: 0,
                total_failures: 0,
                rejected_calls: 0,
            }),
            on_state_change: None,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(name, config.max_failures, config.reset_timeout())
    }

    pub fn with_state_change_callback(mut self, callback: StateChangeCallback) -> Self {
        self.on_state_change = Some(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, promoting Open to HalfOpen once the reset timeout has elapsed
    pub fn state(&self) -> CircuitState {
        let (state, transition) = {
            let mut inner = self.inner.lock();
            let transition = self.evaluate_timeout(&mut inner);
            (inner.state, transition)
        };
        self.notify(transition);
        state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Run `operation` unless the circuit is open, recording its outcome
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.should_allow() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(CircuitBreakerError::OperationFailed(error))
            }
        }
    }

    /// Admission check for callers that record outcomes manually.
    /// Counts a rejection when the circuit is open.
    pub fn should_allow(&self) -> bool {
        let (allowed, transition) = {
            let mut inner = self.inner.lock();
            let transition = self.evaluate_timeout(&mut inner);
            let allowed = inner.state != CircuitState::Open;
            if allowed {
                inner.total_calls += 1;
            } else {
                inner.rejected_calls += 1;
            }
            (allowed, transition)
        };
        self.notify(transition);

        if !allowed {
            debug!(component = %self.name, "Circuit open, rejecting call");
        }
        allowed
    }

    pub fn record_success(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.total_successes += 1;
            inner.failure_count = 0;
            match inner.state {
                CircuitState::HalfOpen => Self::transition(&mut inner, CircuitState::Closed),
                _ => None,
            }
        };
        self.notify(transition);
    }

    pub fn record_failure(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.total_failures += 1;
            inner.failure_count = inner.failure_count.saturating_add(1);
            inner.last_failure = Some(Instant::now());
            match inner.state {
                CircuitState::Closed if inner.failure_count >= self.max_failures => {
                    Self::transition(&mut inner, CircuitState::Open)
                }
                CircuitState::HalfOpen => Self::transition(&mut inner, CircuitState::Open),
                _ => None,
            }
        };
        self.notify(transition);
    }

    /// Open the circuit regardless of failure history
    pub fn force_open(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.last_failure = Some(Instant::now());
            Self::transition(&mut inner, CircuitState::Open)
        };
        self.notify(transition);
    }

    /// Close the circuit and clear the failure count
    pub fn force_closed(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.failure_count = 0;
            Self::transition(&mut inner, CircuitState::Closed)
        };
        self.notify(transition);
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state();
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            state,
            failure_count: inner.failure_count,
            total_calls: inner.total_calls,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            rejected_calls: inner.rejected_calls,
        }
    }

    fn evaluate_timeout(&self, inner: &mut BreakerState) -> Transition {
        if inner.state != CircuitState::Open {
            return None;
        }
        let elapsed = inner.last_failure.map(|at| at.elapsed()).unwrap_or(Duration::MAX);
        if elapsed >= self.reset_timeout {
            Self::transition(inner, CircuitState::HalfOpen)
        } else {
            None
        }
    }

    fn transition(inner: &mut BreakerState, to: CircuitState) -> Transition {
        let from = inner.state;
        if from == to {
            return None;
        }
        inner.state = to;
        Some((from, to))
    }

    /// Runs outside the state lock so callbacks may query the breaker
    fn notify(&self, transition: Transition) {
        let Some((from, to)) = transition else {
            return;
        };

        match to {
            CircuitState::Open => warn!(
                component = %self.name,
                from = %from,
                "🔴 Circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(
                component = %self.name,
                "🟡 Circuit breaker half-open, allowing trial call"
            ),
            CircuitState::Closed => info!(
                component = %self.name,
                from = %from,
                "🟢 Circuit breaker closed"
            ),
        }

        if let Some(callback) = &self.on_state_change {
            callback(&self.name, from, to);
        }
    }
}
