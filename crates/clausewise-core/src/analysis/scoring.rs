//! Deterministic per-clause risk scoring.

use std::collections::BTreeSet;

use crate::clause::{Clause, ClauseType};
use crate::risk::{RiskAssessment, RiskFinding, RiskOverview, Severity};

use super::patterns::{red_flags, LIABILITY_CAP, NOTICE_PERIOD};

/// Clause types a commercial contract is expected to carry.
pub const EXPECTED_CLAUSES: [ClauseType; 5] = [
    ClauseType::Termination,
    ClauseType::Liability,
    ClauseType::Confidentiality,
    ClauseType::GoverningLaw,
    ClauseType::DisputeResolution,
];

/// Missing expected clauses at or above this count raise the overall rating.
const MISSING_ESCALATION: usize = 2;

/// Score every clause and derive the contract-wide overview.
pub fn assess_clauses(clauses: &[Clause]) -> RiskAssessment {
    let findings: Vec<RiskFinding> = clauses.iter().map(assess_clause).collect();

    let present: BTreeSet<ClauseType> = clauses.iter().map(|c| c.clause_type).collect();
    let missing_clauses: Vec<ClauseType> = EXPECTED_CLAUSES
        .iter()
        .copied()
        .filter(|t| !present.contains(t))
        .collect();

    let mut overview = RiskOverview::from_findings(&findings);
    if missing_clauses.len() >= MISSING_ESCALATION && overview.overall < Severity::Medium {
        overview.overall = Severity::Medium;
    }
    if !missing_clauses.is_empty() {
        let names: Vec<&str> = missing_clauses.iter().map(|t| t.as_str()).collect();
        overview.summary_of_concerns = format!(
            "{} Missing expected clauses: {}.",
            overview.summary_of_concerns,
            names.join(", ")
        );
    }
    overview.missing_clauses = missing_clauses;

    RiskAssessment {
        findings,
        overview: Some(overview),
    }
}

/// Score one clause from its red flags and type-specific gaps.
pub fn assess_clause(clause: &Clause) -> RiskFinding {
    let mut concerns: Vec<(&str, Severity)> = red_flags(&clause.text);
    concerns.extend(type_specific_gaps(clause));

    let severity = concerns
        .iter()
        .map(|(_, s)| *s)
        .max()
        .unwrap_or(Severity::Low);

    let rationale = if concerns.is_empty() {
        format!("No red flags detected in the {} clause.", clause.clause_type)
    } else {
        let labels: Vec<&str> = concerns.iter().map(|(l, _)| *l).collect();
        format!(
            "{} concern(s) in the {} clause: {}.",
            concerns.len(),
            clause.clause_type,
            labels.join(", ")
        )
    };

    let mut finding = RiskFinding::new(clause.id.clone(), severity, rationale)
        .with_recommendation(recommendation(severity, clause));
    for (label, _) in concerns {
        finding = finding.with_concern(label);
    }
    finding
}

fn type_specific_gaps(clause: &Clause) -> Vec<(&'static str, Severity)> {
    let text = &clause.text;
    match clause.clause_type {
        ClauseType::Liability if !LIABILITY_CAP.is_match(text) => {
            vec![("no liability cap stated", Severity::Medium)]
        }
        ClauseType::Termination if !NOTICE_PERIOD.is_match(text) => {
            vec![("no notice period stated", Severity::Medium)]
        }
        ClauseType::Indemnification if !text.to_lowercase().contains("mutual") && !text.to_lowercase().contains("each party") => {
            vec![("one-sided indemnity", Severity::Medium)]
        }
        _ => Vec::new(),
    }
}

fn recommendation(severity: Severity, clause: &Clause) -> String {
    let location = clause
        .section_reference
        .as_deref()
        .map(|s| format!(" ({})", s))
        .unwrap_or_default();
    match severity {
        Severity::Low => "Accept as drafted.".to_string(),
        Severity::Medium => format!("Negotiate the {} clause{}.", clause.clause_type, location),
        Severity::High => format!(
            "Seek legal review of the {} clause{} before signing.",
            clause.clause_type, location
        ),
    }
}
