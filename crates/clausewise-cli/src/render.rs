//! Plain-text rendering of an analysis run.

use std::fmt::Write;

use clausewise_core::{FinalReport, RiskFinding};
use clausewise_runtime::AnalysisRun;

pub fn render_text(run: &AnalysisRun) -> String {
    let mut out = String::new();
    let report = &run.report;
    let elapsed = (run.finished_at - run.started_at).num_milliseconds();

    let _ = writeln!(out, "Status: {} ({} mode, {} ms)", report.status, run.mode, elapsed);
    if let Some(kind) = report.document_kind {
        let _ = writeln!(out, "Document: {}", kind.as_str());
    }
    let _ = writeln!(out, "{}", report.message);

    render_tools(&mut out, report);

    if let Some(error) = &report.error {
        let _ = writeln!(out, "\nError: {} in {}", error.kind, error.stage);
        let _ = writeln!(out, "  {}", error.message);
        return out;
    }

    if let Some(profile) = &report.contract_profile {
        if let Some(kind) = &profile.contract_type {
            let _ = writeln!(out, "Contract: {}", kind);
        }
        if !profile.parties.is_empty() {
            let _ = writeln!(out, "Parties: {}", profile.parties.join(", "));
        }
    }

    if let Some(overview) = &report.risk_overview {
        let _ = writeln!(out, "\nOverall risk: {}", overview.overall.as_str());
        if !overview.missing_clauses.is_empty() {
            let missing: Vec<&str> = overview.missing_clauses.iter().map(|c| c.as_str()).collect();
            let _ = writeln!(out, "Missing clauses: {}", missing.join(", "));
        }
    }

    let findings = report.risk_findings.as_deref().unwrap_or_default();
    if let Some(clauses) = &report.clauses {
        let _ = writeln!(out, "\nClauses ({}):", clauses.len());
        for clause in clauses {
            let finding = findings.iter().find(|f| f.clause_id == clause.id);
            let _ = writeln!(
                out,
                "  [{}] {} {}",
                clause.id.as_str(),
                clause.clause_type.as_str(),
                severity_tag(finding)
            );
            if let Some(finding) = finding {
                let _ = writeln!(out, "      {}", finding.rationale);
                if let Some(recommendation) = &finding.recommendation {
                    let _ = writeln!(out, "      -> {}", recommendation);
                }
            }
        }
    }

    if let Some(summary) = &report.summary {
        let _ = writeln!(out, "\n{}", summary.trim_end());
    }
    out
}

fn render_tools(out: &mut String, report: &FinalReport) {
    if report.tool_calls.is_empty() {
        return;
    }
    let _ = writeln!(out, "Extraction attempts:");
    for (i, call) in report.tool_calls.iter().enumerate() {
        let _ = writeln!(out, "  {}. {} (retry {}): {}", i + 1, call.tool, call.retry_count, call.outcome);
    }
}

fn severity_tag(finding: Option<&RiskFinding>) -> String {
    match finding {
        Some(f) => format!("[{}]", f.severity.as_str().to_uppercase()),
        None => String::new(),
    }
}
