//! Token allowances for model calls.
//!
//! A run has one overall allowance and each agent role has its own. A call
//! is refused up front when its estimate would overrun either one.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::agents::AgentRole;
use crate::providers::TokenUsage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Tokens for the whole run
    pub run_limit: u32,

    pub role_limit: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            run_limit: 200_000,
            role_limit: 80_000,
        }
    }
}

/// Totals over every call charged so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub calls: u32,
    pub input: u32,
    pub output: u32,

    /// Calls that read part of their prompt from the cache
    pub cache_hits: u32,
}

impl LlmUsage {
    pub fn total(&self) -> u32 {
        self.input + self.output
    }

    fn absorb(&mut self, usage: &TokenUsage) {
        self.calls += 1;
        self.input += usage.input;
        self.output += usage.output;
        if usage.cache_read > 0 {
            self.cache_hits += 1;
        }
    }
}

#[derive(Default)]
struct Ledger {
    overall: LlmUsage,
    by_role: HashMap<AgentRole, u32>,
}

pub struct BudgetTracker {
    limits: BudgetConfig,
    ledger: Mutex<Ledger>,
}

impl BudgetTracker {
    pub fn from_config(config: &BudgetConfig) -> Self {
        Self {
            limits: config.clone(),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn with_limits(run_limit: u32, role_limit: u32) -> Self {
        Self::from_config(&BudgetConfig {
            run_limit,
            role_limit,
        })
    }

    /// Whether `estimate` more tokens for `role` stays inside both limits.
    pub fn allows(&self, role: AgentRole, estimate: u32) -> bool {
        let ledger = self.ledger.lock();
        let role_spent = ledger.by_role.get(&role).copied().unwrap_or(0);
        role_spent.saturating_add(estimate) <= self.limits.role_limit
            && ledger.overall.total().saturating_add(estimate) <= self.limits.run_limit
    }

    pub fn charge(&self, role: AgentRole, usage: &TokenUsage) {
        let mut ledger = self.ledger.lock();
        *ledger.by_role.entry(role).or_insert(0) += usage.total();
        ledger.overall.absorb(usage);
    }

    pub fn usage(&self) -> LlmUsage {
        self.ledger.lock().overall
    }

    pub fn spent_by(&self, role: AgentRole) -> u32 {
        self.ledger.lock().by_role.get(&role).copied().unwrap_or(0)
    }

    /// Tokens left in the run allowance.
    pub fn remaining(&self) -> u32 {
        self.limits
            .run_limit
            .saturating_sub(self.ledger.lock().overall.total())
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::from_config(&BudgetConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u32, output: u32) -> TokenUsage {
        TokenUsage {
            input,
            output,
            ..Default::default()
        }
    }

    #[test]
    fn test_role_limit_is_separate_per_role() {
        let tracker = BudgetTracker::with_limits(500, 100);
        assert!(tracker.allows(AgentRole::ClauseExtractor, 100));
        assert!(!tracker.allows(AgentRole::ClauseExtractor, 101));

        tracker.charge(AgentRole::ClauseExtractor, &usage(30, 20));

        assert_eq!(tracker.spent_by(AgentRole::ClauseExtractor), 50);
        assert_eq!(tracker.spent_by(AgentRole::RiskAssessor), 0);
        assert!(!tracker.allows(AgentRole::ClauseExtractor, 60));
        assert!(tracker.allows(AgentRole::RiskAssessor, 100));
        assert_eq!(tracker.remaining(), 450);
    }

    #[test]
    fn test_run_limit_spans_roles() {
        let tracker = BudgetTracker::with_limits(120, 100);
        tracker.charge(AgentRole::Parser, &usage(50, 10));
        tracker.charge(AgentRole::ClauseExtractor, &usage(40, 10));

        assert!(tracker.allows(AgentRole::RiskAssessor, 10));
        assert!(!tracker.allows(AgentRole::RiskAssessor, 11));
    }

    #[test]
    fn test_usage_counts_cache_hits() {
        let tracker = BudgetTracker::default();
        tracker.charge(AgentRole::Summariser, &usage(10, 5));
        tracker.charge(
            AgentRole::Summariser,
            &TokenUsage {
                input: 10,
                output: 5,
                cache_read: 900,
                cache_write: 0,
            },
        );

        let totals = tracker.usage();
        assert_eq!(totals.calls, 2);
        assert_eq!(totals.total(), 30);
        assert_eq!(totals.cache_hits, 1);
    }
}
