//! Named circuit breakers, created on first use from a shared template.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics};
use crate::config::CircuitBreakerConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct CircuitBreakerManager {
    template: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    pub fn new(template: CircuitBreakerConfig) -> Self {
        Self {
            template,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Existing breaker for `name`, or a new one built from the template
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        // Another caller may have inserted it between the locks
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }

        debug!(component = %name, "Creating circuit breaker");
        let breaker = Arc::new(CircuitBreaker::from_config(name, &self.template));
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    pub fn components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn metrics(&self) -> HashMap<String, CircuitBreakerMetrics> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.metrics()))
            .collect()
    }

    pub fn force_closed_all(&self) {
        for breaker in self.breakers.read().values() {
            breaker.force_closed();
        }
    }
}
