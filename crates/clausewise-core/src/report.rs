//! Error Handler: converts a terminal state into the final report.
//!
//! The handler is a pure function of the state. It never fails and never
//! mutates, so calling it twice on the same state yields equal reports.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clause::{Clause, ContractProfile};
use crate::error::{ErrorKind, StageFailure};
use crate::risk::{RiskFinding, RiskOverview};
use crate::stage::StageId;
use crate::state::{AnalysisState, DocumentKind, Status, ToolCallRecord};

/// Outcome of a run as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Completed,
    Failed,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Completed => f.write_str("completed"),
            ReportStatus::Failed => f.write_str("failed"),
        }
    }
}

/// User-facing result of one analysis run.
///
/// Exactly one of (`summary`, `clauses`, `risk_findings`) or `error` is
/// populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub status: ReportStatus,

    pub summary: Option<String>,

    pub clauses: Option<Vec<Clause>>,

    /// Findings in clause order
    pub risk_findings: Option<Vec<RiskFinding>>,

    pub error: Option<StageFailure>,

    /// Human-readable explanation of the outcome
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_kind: Option<DocumentKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_profile: Option<ContractProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_overview: Option<RiskOverview>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl FinalReport {
    /// Build the report for any state. Alias for [`ErrorHandler::handle`].
    pub fn from_state(state: &AnalysisState) -> Self {
        ErrorHandler::new().handle(state)
    }

    pub fn is_completed(&self) -> bool {
        self.status == ReportStatus::Completed
    }

    /// Failure kind, if the run failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// The terminal stage of every run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorHandler;

impl ErrorHandler {
    pub fn new() -> Self {
        Self
    }

    /// Produce the final report for `state`.
    ///
    /// A state that is neither complete nor failed means the workflow ended
    /// early; that is reported as a `PreconditionViolation`.
    pub fn handle(&self, state: &AnalysisState) -> FinalReport {
        match state.status() {
            Status::Complete => match state.summary() {
                Some(summary) => self.completed(state, summary),
                None => self.failed(
                    state,
                    StageFailure::new(
                        StageId::ErrorHandler,
                        ErrorKind::PreconditionViolation,
                        "state is complete but carries no summary",
                    ),
                ),
            },
            Status::Failed => {
                let failure = state.error().cloned().unwrap_or_else(|| {
                    StageFailure::new(
                        StageId::ErrorHandler,
                        ErrorKind::Unknown,
                        "state failed without a recorded cause",
                    )
                });
                self.failed(state, failure)
            }
            status @ (Status::Pending | Status::InProgress) => self.failed(
                state,
                StageFailure::new(
                    StageId::ErrorHandler,
                    ErrorKind::PreconditionViolation,
                    format!("workflow ended with state still {}", status),
                ),
            ),
        }
    }

    /// User-facing explanation for a failure kind.
    pub fn explain(&self, kind: ErrorKind) -> &'static str {
        match kind {
            ErrorKind::UnsupportedFormat => {
                "The document format is not supported. Provide a PDF, DOCX or plain-text file."
            }
            ErrorKind::ExtractionFailed => {
                "No usable text could be extracted from the document."
            }
            ErrorKind::ExtractionExhausted => {
                "Every text extraction strategy was tried without producing usable text."
            }
            ErrorKind::ValidationFailed => {
                "The document does not appear to be a contract."
            }
            ErrorKind::AgentInvocationFailed => {
                "An analysis agent failed or returned output that could not be used."
            }
            ErrorKind::PreconditionViolation => {
                "The analysis workflow ran a step out of order. This is a defect."
            }
            ErrorKind::Cancelled => "The analysis was cancelled before it finished.",
            ErrorKind::Unknown => "The analysis failed for an unexpected reason.",
        }
    }

    fn completed(&self, state: &AnalysisState, summary: &str) -> FinalReport {
        let clauses = state.clauses().to_vec();
        let findings: Vec<RiskFinding> = state
            .findings_in_clause_order()
            .into_iter()
            .cloned()
            .collect();

        let message = format!(
            "Analysis complete: {} clause(s) assessed.",
            clauses.len()
        );

        FinalReport {
            status: ReportStatus::Completed,
            summary: Some(summary.to_string()),
            clauses: Some(clauses),
            risk_findings: Some(findings),
            error: None,
            message,
            document_kind: state.document_kind(),
            contract_profile: state.contract_profile().cloned(),
            risk_overview: state.risk_overview().cloned(),
            tool_calls: state.tool_call_log().to_vec(),
        }
    }

    fn failed(&self, state: &AnalysisState, failure: StageFailure) -> FinalReport {
        let message = format!("{} ({})", self.explain(failure.kind), failure);

        FinalReport {
            status: ReportStatus::Failed,
            summary: None,
            clauses: None,
            risk_findings: None,
            error: Some(failure),
            message,
            document_kind: state.document_kind(),
            contract_profile: None,
            risk_overview: None,
            tool_calls: state.tool_call_log().to_vec(),
        }
    }
}
