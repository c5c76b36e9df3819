//! Template executive summary.
//!
//! Sections follow the structure a stakeholder reads top-down: overview,
//! key findings, risk highlights, missing protections, recommended actions.

use crate::clause::{Clause, ContractProfile};
use crate::risk::{RiskFinding, RiskOverview, Severity};

const MAX_HIGHLIGHTS: usize = 5;

/// Render the executive summary for an assessed contract.
pub fn summarise(
    profile: Option<&ContractProfile>,
    clauses: &[Clause],
    findings: &[&RiskFinding],
    overview: Option<&RiskOverview>,
) -> String {
    let mut out = String::new();

    out.push_str("Contract Overview\n");
    out.push_str(&overview_line(profile));
    out.push_str("\n\n");

    out.push_str("Key Findings\n");
    if clauses.is_empty() {
        out.push_str("- No clauses were identified.\n");
    } else {
        let overall = overview
            .map(|o| o.overall)
            .or_else(|| findings.iter().map(|f| f.severity).max())
            .unwrap_or(Severity::Low);
        out.push_str(&format!(
            "- {} clause(s) identified; overall risk is {}.\n",
            clauses.len(),
            overall.as_str().to_uppercase()
        ));
        if let Some(o) = overview.filter(|o| !o.summary_of_concerns.is_empty()) {
            out.push_str(&format!("- {}\n", o.summary_of_concerns));
        }
    }
    out.push('\n');

    out.push_str("Risk Highlights\n");
    let mut ranked: Vec<(&RiskFinding, Option<&Clause>)> = findings
        .iter()
        .filter(|f| f.severity > Severity::Low)
        .map(|f| (*f, clauses.iter().find(|c| c.id == f.clause_id)))
        .collect();
    ranked.sort_by(|a, b| b.0.severity.cmp(&a.0.severity));
    if ranked.is_empty() {
        out.push_str("- No medium or high risks found.\n");
    }
    for (finding, clause) in ranked.iter().take(MAX_HIGHLIGHTS) {
        out.push_str(&format!(
            "- [{}] {}: {}\n",
            finding.severity.as_str().to_uppercase(),
            clause_label(clause, finding),
            finding.rationale
        ));
    }
    out.push('\n');

    out.push_str("Missing Protections\n");
    match overview.map(|o| o.missing_clauses.as_slice()) {
        Some(missing) if !missing.is_empty() => {
            let names: Vec<&str> = missing.iter().map(|t| t.as_str()).collect();
            out.push_str(&format!("- {}\n", names.join(", ")));
        }
        _ => out.push_str("- None identified.\n"),
    }
    out.push('\n');

    out.push_str("Recommended Actions\n");
    let actions: Vec<&str> = ranked
        .iter()
        .filter_map(|(f, _)| f.recommendation.as_deref())
        .take(MAX_HIGHLIGHTS)
        .collect();
    if actions.is_empty() {
        out.push_str("- No changes required before signing.\n");
    }
    for (i, action) in actions.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, action));
    }

    out.trim_end().to_string()
}

fn overview_line(profile: Option<&ContractProfile>) -> String {
    let Some(profile) = profile else {
        return "Contract details were not identified.".to_string();
    };
    let kind = profile.contract_type.as_deref().unwrap_or("Contract");
    let parties = if profile.parties.is_empty() {
        "unnamed parties".to_string()
    } else {
        profile.parties.join(" and ")
    };
    let date = profile.effective_date.as_deref().unwrap_or("not specified");
    format!("{} between {}; effective date {}.", kind, parties, date)
}

fn clause_label(clause: &Option<&Clause>, finding: &RiskFinding) -> String {
    match clause {
        Some(c) => match &c.section_reference {
            Some(section) => format!("{} ({})", c.clause_type, section),
            None => c.clause_type.to_string(),
        },
        None => finding.clause_id.to_string(),
    }
}
