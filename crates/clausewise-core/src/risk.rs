//! Risk findings attached to clauses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::clause::{ClauseId, ClauseType};

/// Severity of a risk finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Parse a case-insensitive label ("low", "Medium", "HIGH").
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" | "moderate" => Some(Severity::Medium),
            "high" | "critical" => Some(Severity::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity and rationale attached to one clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFinding {
    /// Clause this finding belongs to
    pub clause_id: ClauseId,

    pub severity: Severity,

    /// Why this severity was assigned
    pub rationale: String,

    /// Specific red flags
    #[serde(default)]
    pub concerns: BTreeSet<String>,

    /// Suggested action or negotiation point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl RiskFinding {
    pub fn new(
        clause_id: impl Into<ClauseId>,
        severity: Severity,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            clause_id: clause_id.into(),
            severity,
            rationale: rationale.into(),
            concerns: BTreeSet::new(),
            recommendation: None,
        }
    }

    pub fn with_concern(mut self, concern: impl Into<String>) -> Self {
        self.concerns.insert(concern.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// Contract-wide view of the findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskOverview {
    /// Highest severity across all findings
    pub overall: Severity,

    /// Important clause types absent from the contract
    #[serde(default)]
    pub missing_clauses: Vec<ClauseType>,

    /// Brief narrative of the main risk themes
    #[serde(default)]
    pub summary_of_concerns: String,
}

impl RiskOverview {
    /// Derive an overview from findings alone.
    pub fn from_findings(findings: &[RiskFinding]) -> Self {
        let overall = findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Low);

        let high = findings
            .iter()
            .filter(|f| f.severity == Severity::High)
            .count();

        let summary_of_concerns = match (findings.len(), high) {
            (0, _) => "No clauses were assessed.".to_string(),
            (n, 0) => format!("{} clause(s) assessed; no high-risk findings.", n),
            (n, h) => format!("{} clause(s) assessed; {} rated high risk.", n, h),
        };

        Self {
            overall,
            missing_clauses: Vec::new(),
            summary_of_concerns,
        }
    }
}

/// Output of the Risk Assessor role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub findings: Vec<RiskFinding>,

    #[serde(default)]
    pub overview: Option<RiskOverview>,
}

impl RiskAssessment {
    pub fn new(findings: Vec<RiskFinding>) -> Self {
        Self {
            findings,
            overview: None,
        }
    }

    /// The supplied overview, or one derived from the findings.
    pub fn overview_or_derived(&self) -> RiskOverview {
        self.overview
            .clone()
            .unwrap_or_else(|| RiskOverview::from_findings(&self.findings))
    }
}
