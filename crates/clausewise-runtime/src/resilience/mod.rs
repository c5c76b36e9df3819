//! Guards around model calls: a circuit breaker per agent role and token
//! allowances per role and per run.
//!
//! Rate-limit retries live next to the call site in
//! [`LlmClient`](crate::agents::LlmClient).

mod budget;
mod circuit_breaker;

pub use budget::{BudgetConfig, BudgetTracker, LlmUsage};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
