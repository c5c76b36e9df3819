//! Per-role circuit breaker.
//!
//! A role that keeps failing is tripped and its calls are refused until the
//! cool-down passes. The next calls are trials: enough trial successes close
//! the circuit, one trial failure trips it again.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::agents::AgentRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit
    pub trip_after: u32,

    #[serde(with = "crate::config::humantime_duration")]
    pub cool_down: Duration,

    /// Trial successes that close it again
    pub close_after: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            trip_after: 3,
            cool_down: Duration::from_secs(30),
            close_after: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct Circuit {
    failures: u32,
    tripped_at: Option<Instant>,
    trial_successes: u32,
}

impl Circuit {
    fn state(&self, cool_down: Duration) -> CircuitState {
        match self.tripped_at {
            None => CircuitState::Closed,
            Some(at) if at.elapsed() < cool_down => CircuitState::Open,
            Some(_) => CircuitState::HalfOpen,
        }
    }

    fn trip(&mut self) {
        self.tripped_at = Some(Instant::now());
        self.trial_successes = 0;
    }
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: Mutex<HashMap<AgentRole, Circuit>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, role: AgentRole) -> CircuitState {
        self.circuits
            .lock()
            .get(&role)
            .map(|c| c.state(self.config.cool_down))
            .unwrap_or(CircuitState::Closed)
    }

    /// Whether a call for `role` may go out now.
    pub fn allows(&self, role: AgentRole) -> bool {
        self.state(role) != CircuitState::Open
    }

    pub fn on_success(&self, role: AgentRole) {
        let mut circuits = self.circuits.lock();
        let circuit = circuits.entry(role).or_default();
        circuit.failures = 0;
        if circuit.tripped_at.is_none() {
            return;
        }
        circuit.trial_successes += 1;
        if circuit.trial_successes >= self.config.close_after {
            *circuit = Circuit::default();
            tracing::info!(role = %role, "Circuit closed");
        }
    }

    pub fn on_failure(&self, role: AgentRole) {
        let mut circuits = self.circuits.lock();
        let circuit = circuits.entry(role).or_default();
        match circuit.state(self.config.cool_down) {
            CircuitState::Open => {}
            CircuitState::HalfOpen => {
                circuit.trip();
                tracing::warn!(role = %role, "Trial call failed, circuit tripped again");
            }
            CircuitState::Closed => {
                circuit.failures += 1;
                if circuit.failures >= self.config.trip_after {
                    circuit.trip();
                    tracing::warn!(role = %role, failures = circuit.failures, "Circuit tripped");
                }
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
