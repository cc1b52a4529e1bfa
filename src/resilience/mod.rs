//! # Resilience Module
//!
//! Failure isolation and admission control used by providers and the manager:
//!
//! - [`CircuitBreaker`]: three-state breaker with lazy Open to HalfOpen recovery
//! - [`RateLimiter`]: token bucket protecting the store from call storms
//! - [`CircuitBreakerManager`]: named breakers, one per configuration source

pub mod circuit_breaker;
pub mod manager;
pub mod rate_limiter;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerMetrics, CircuitState, StateChangeCallback,
};
pub use manager::CircuitBreakerManager;
pub use rate_limiter::RateLimiter;
