//! The analysis state threaded through every stage.
//!
//! # Invariants
//! - `status` only moves forward: Pending -> InProgress -> {Complete | Failed}
//! - `error` is present iff `status == Failed`
//! - Once failed, clauses, findings and summary are frozen
//! - Clauses are sealed when clause extraction completes
//! - Every finding references an existing clause; once sealed there is
//!   exactly one finding per clause
//!
//! Every mutator validates its whole input before writing, so a rejected
//! call leaves the state untouched and `version` unchanged.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::clause::{normalize_whitespace, Clause, ClauseExtraction, ClauseId, ContractProfile};
use crate::error::{ErrorKind, StageFailure, StateError};
use crate::risk::{RiskAssessment, RiskFinding, RiskOverview};
use crate::stage::StageId;

/// Default bound on adaptive extraction attempts.
pub const DEFAULT_MAX_TOOL_ATTEMPTS: u32 = 3;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Complete => "complete",
            Status::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Complete | Status::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse document format, used to order extraction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    /// PDF with selectable text
    PdfText,
    /// PDF made of page images
    PdfScanned,
    /// Word document
    Docx,
    Unknown,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::PdfText => "pdf-text",
            DocumentKind::PdfScanned => "pdf-scanned",
            DocumentKind::Docx => "docx",
            DocumentKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one extraction tool attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// Text passed the quality evaluator
    Success,

    /// Text was produced but judged unusable
    LowConfidence { reason: String },

    /// The tool does not handle this format
    Unsupported { message: String },

    /// The tool errored or timed out
    Failed { message: String },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success)
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ToolOutcome::Success => "success",
            ToolOutcome::LowConfidence { .. } => "low_confidence",
            ToolOutcome::Unsupported { .. } => "unsupported",
            ToolOutcome::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutcome::Success => f.write_str("success"),
            ToolOutcome::LowConfidence { reason } => write!(f, "low confidence ({})", reason),
            ToolOutcome::Unsupported { message } => write!(f, "unsupported ({})", message),
            ToolOutcome::Failed { message } => write!(f, "failed ({})", message),
        }
    }
}

/// One entry of the adaptive tool-call log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Registered tool name
    pub tool: String,

    pub outcome: ToolOutcome,

    /// How many times this tool had been tried before this attempt
    pub retry_count: u32,
}

impl ToolCallRecord {
    pub fn new(tool: impl Into<String>, outcome: ToolOutcome, retry_count: u32) -> Self {
        Self {
            tool: tool.into(),
            outcome,
            retry_count,
        }
    }
}

/// Shared, progressively-enriched record for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisState {
    source_bytes: Vec<u8>,
    format_hint: Option<String>,
    extracted_text: Option<String>,
    document_kind: Option<DocumentKind>,
    clauses: Vec<Clause>,
    clauses_sealed: bool,
    profile: Option<ContractProfile>,
    risk_findings: BTreeMap<ClauseId, RiskFinding>,
    findings_sealed: bool,
    risk_overview: Option<RiskOverview>,
    summary: Option<String>,
    status: Status,
    error: Option<StageFailure>,
    tool_call_log: Vec<ToolCallRecord>,
    tool_call_limit: u32,
    version: u64,
}

impl AnalysisState {
    /// Create a pending state for one document.
    pub fn new(source_bytes: impl Into<Vec<u8>>, format_hint: Option<String>) -> Self {
        Self {
            source_bytes: source_bytes.into(),
            format_hint,
            extracted_text: None,
            document_kind: None,
            clauses: Vec::new(),
            clauses_sealed: false,
            profile: None,
            risk_findings: BTreeMap::new(),
            findings_sealed: false,
            risk_overview: None,
            summary: None,
            status: Status::Pending,
            error: None,
            tool_call_log: Vec::new(),
            tool_call_limit: DEFAULT_MAX_TOOL_ATTEMPTS,
            version: 0,
        }
    }

    /// Bound the tool-call log (minimum one entry).
    pub fn with_tool_call_limit(mut self, limit: u32) -> Self {
        self.tool_call_limit = limit.max(1);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn source_bytes(&self) -> &[u8] {
        &self.source_bytes
    }

    pub fn format_hint(&self) -> Option<&str> {
        self.format_hint.as_deref()
    }

    pub fn extracted_text(&self) -> Option<&str> {
        self.extracted_text.as_deref()
    }

    pub fn document_kind(&self) -> Option<DocumentKind> {
        self.document_kind
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn clauses_sealed(&self) -> bool {
        self.clauses_sealed
    }

    pub fn contract_profile(&self) -> Option<&ContractProfile> {
        self.profile.as_ref()
    }

    pub fn risk_findings(&self) -> &BTreeMap<ClauseId, RiskFinding> {
        &self.risk_findings
    }

    pub fn risk_finding(&self, id: &ClauseId) -> Option<&RiskFinding> {
        self.risk_findings.get(id)
    }

    /// Findings ordered like the clauses they belong to.
    pub fn findings_in_clause_order(&self) -> Vec<&RiskFinding> {
        self.clauses
            .iter()
            .filter_map(|c| self.risk_findings.get(&c.id))
            .collect()
    }

    pub fn findings_sealed(&self) -> bool {
        self.findings_sealed
    }

    pub fn risk_overview(&self) -> Option<&RiskOverview> {
        self.risk_overview.as_ref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn error(&self) -> Option<&StageFailure> {
        self.error.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    pub fn tool_call_log(&self) -> &[ToolCallRecord] {
        &self.tool_call_log
    }

    pub fn tool_call_limit(&self) -> u32 {
        self.tool_call_limit
    }

    pub fn tool_attempts(&self) -> u32 {
        self.tool_call_log.len() as u32
    }

    pub fn last_tool_outcome(&self) -> Option<&ToolOutcome> {
        self.tool_call_log.last().map(|r| &r.outcome)
    }

    /// Monotonic counter bumped by every accepted mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Move from Pending to InProgress.
    pub fn begin(&mut self) -> Result<(), StateError> {
        match self.status {
            Status::Pending => {
                self.status = Status::InProgress;
                self.bump();
                Ok(())
            }
            other => Err(StateError::CannotBegin(other.as_str())),
        }
    }

    /// Record the extracted text and the document kind it was read as.
    pub fn set_text(&mut self, text: impl Into<String>, kind: DocumentKind) -> Result<(), StateError> {
        let text = text.into();
        self.check_text(&text)?;
        self.extracted_text = Some(text);
        self.document_kind = Some(kind);
        self.bump();
        Ok(())
    }

    /// Append one adaptive tool attempt.
    pub fn record_tool_call(&mut self, record: ToolCallRecord) -> Result<(), StateError> {
        self.ensure_writable()?;
        if self.extracted_text.is_some() {
            return Err(StateError::TextAlreadySet);
        }
        if self.tool_attempts() >= self.tool_call_limit {
            return Err(StateError::ToolLogFull(self.tool_call_limit));
        }
        self.tool_call_log.push(record);
        self.bump();
        Ok(())
    }

    /// Record a successful parse, optionally with the tool attempt that produced it.
    ///
    /// Applied as one transition: either both the text and the log entry are
    /// written or neither is.
    pub fn complete_parse(
        &mut self,
        text: impl Into<String>,
        kind: DocumentKind,
        attempt: Option<ToolCallRecord>,
    ) -> Result<(), StateError> {
        let text = text.into();
        self.check_text(&text)?;
        if attempt.is_some() && self.tool_attempts() >= self.tool_call_limit {
            return Err(StateError::ToolLogFull(self.tool_call_limit));
        }
        if let Some(record) = attempt {
            self.tool_call_log.push(record);
        }
        self.extracted_text = Some(text);
        self.document_kind = Some(kind);
        self.bump();
        Ok(())
    }

    /// Append a single clause (document order is insertion order).
    pub fn add_clause(&mut self, clause: Clause) -> Result<(), StateError> {
        self.ensure_clauses_open()?;
        if self.clauses.iter().any(|c| c.id == clause.id) {
            return Err(StateError::DuplicateClause(clause.id));
        }
        self.check_span(&clause)?;
        self.clauses.push(clause);
        self.bump();
        Ok(())
    }

    /// Close the clause list; no clause may be added afterwards.
    pub fn seal_clauses(&mut self) -> Result<(), StateError> {
        self.ensure_clauses_open()?;
        self.clauses_sealed = true;
        self.bump();
        Ok(())
    }

    /// Append a whole extraction result and seal the clause list.
    pub fn record_clauses(&mut self, extraction: ClauseExtraction) -> Result<(), StateError> {
        self.ensure_clauses_open()?;

        let mut seen: HashSet<&ClauseId> = self.clauses.iter().map(|c| &c.id).collect();
        for clause in &extraction.clauses {
            if !seen.insert(&clause.id) {
                return Err(StateError::DuplicateClause(clause.id.clone()));
            }
            self.check_span(clause)?;
        }

        self.clauses.extend(extraction.clauses);
        self.profile = Some(extraction.profile);
        self.clauses_sealed = true;
        self.bump();
        Ok(())
    }

    /// Attach one risk finding to an existing clause.
    pub fn set_risk_finding(&mut self, finding: RiskFinding) -> Result<(), StateError> {
        self.ensure_findings_open()?;
        if !self.has_clause(&finding.clause_id) {
            return Err(StateError::UnknownClause(finding.clause_id));
        }
        if self.risk_findings.contains_key(&finding.clause_id) {
            return Err(StateError::DuplicateFinding(finding.clause_id));
        }
        self.risk_findings.insert(finding.clause_id.clone(), finding);
        self.bump();
        Ok(())
    }

    /// Record a complete assessment and seal the findings.
    ///
    /// This is the exit check of the risk stage: after it succeeds every
    /// clause has exactly one finding.
    pub fn record_findings(&mut self, assessment: RiskAssessment) -> Result<(), StateError> {
        self.ensure_findings_open()?;

        let overview = assessment.overview_or_derived();
        let mut incoming: HashSet<&ClauseId> = HashSet::new();
        for finding in &assessment.findings {
            if !self.has_clause(&finding.clause_id) {
                return Err(StateError::UnknownClause(finding.clause_id.clone()));
            }
            if self.risk_findings.contains_key(&finding.clause_id)
                || !incoming.insert(&finding.clause_id)
            {
                return Err(StateError::DuplicateFinding(finding.clause_id.clone()));
            }
        }
        if let Some(missing) = self
            .clauses
            .iter()
            .find(|c| !incoming.contains(&c.id) && !self.risk_findings.contains_key(&c.id))
        {
            return Err(StateError::MissingFinding(missing.id.clone()));
        }

        for finding in assessment.findings {
            self.risk_findings.insert(finding.clause_id.clone(), finding);
        }
        self.risk_overview = Some(overview);
        self.findings_sealed = true;
        self.bump();
        Ok(())
    }

    /// Record the executive summary; this completes the run.
    pub fn set_summary(&mut self, summary: impl Into<String>) -> Result<(), StateError> {
        self.ensure_writable()?;
        if !self.findings_sealed {
            return Err(StateError::FindingsIncomplete);
        }
        let summary = summary.into();
        if summary.trim().is_empty() {
            return Err(StateError::EmptySummary);
        }
        self.summary = Some(summary);
        self.status = Status::Complete;
        self.bump();
        Ok(())
    }

    /// Transition to Failed, keeping the first recorded root cause.
    ///
    /// Returns `true` if this call recorded the failure. Calls on an already
    /// failed or completed state are no-ops.
    pub fn mark_failed(&mut self, stage: StageId, kind: ErrorKind, message: impl Into<String>) -> bool {
        match self.status {
            Status::Failed => false,
            Status::Complete => {
                tracing::warn!(stage = %stage, kind = %kind, "Ignoring failure on completed state");
                false
            }
            Status::Pending | Status::InProgress => {
                self.error = Some(StageFailure::new(stage, kind, message));
                self.status = Status::Failed;
                self.bump();
                true
            }
        }
    }

    /// Re-check every structural invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.error.is_some() != (self.status == Status::Failed) {
            return Err(format!(
                "error presence does not match status {}",
                self.status
            ));
        }
        if self.summary.is_some() && self.status != Status::Complete {
            return Err("summary set without completion".to_string());
        }
        for id in self.risk_findings.keys() {
            if !self.has_clause(id) {
                return Err(format!("finding for unknown clause {}", id));
            }
        }
        if self.findings_sealed {
            if let Some(c) = self.clauses.iter().find(|c| !self.risk_findings.contains_key(&c.id)) {
                return Err(format!("clause {} has no finding", c.id));
            }
        }
        if self.tool_attempts() > self.tool_call_limit {
            return Err("tool call log exceeds its bound".to_string());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------

    fn bump(&mut self) {
        self.version += 1;
    }

    fn has_clause(&self, id: &ClauseId) -> bool {
        self.clauses.iter().any(|c| &c.id == id)
    }

    fn ensure_writable(&self) -> Result<(), StateError> {
        match self.status {
            Status::Failed => Err(StateError::AlreadyFailed),
            Status::Complete => Err(StateError::AlreadyComplete),
            Status::Pending | Status::InProgress => Ok(()),
        }
    }

    fn check_text(&self, text: &str) -> Result<(), StateError> {
        self.ensure_writable()?;
        if self.extracted_text.is_some() {
            return Err(StateError::TextAlreadySet);
        }
        if text.trim().is_empty() {
            return Err(StateError::EmptyText);
        }
        Ok(())
    }

    fn ensure_clauses_open(&self) -> Result<(), StateError> {
        self.ensure_writable()?;
        if self.extracted_text.is_none() {
            return Err(StateError::MissingText("clause extraction"));
        }
        if self.clauses_sealed {
            return Err(StateError::ClausesSealed);
        }
        Ok(())
    }

    fn ensure_findings_open(&self) -> Result<(), StateError> {
        self.ensure_writable()?;
        if !self.clauses_sealed {
            return Err(StateError::ClausesNotSealed);
        }
        if self.findings_sealed {
            return Err(StateError::FindingsSealed);
        }
        Ok(())
    }

    fn check_span(&self, clause: &Clause) -> Result<(), StateError> {
        let (Some(span), Some(text)) = (clause.span, self.extracted_text.as_deref()) else {
            return Ok(());
        };
        let slice = span.slice(text).ok_or_else(|| StateError::SpanOutOfBounds {
            id: clause.id.clone(),
            start: span.start,
            end: span.end,
            len: text.len(),
        })?;
        if normalize_whitespace(slice) != normalize_whitespace(&clause.text) {
            return Err(StateError::SpanMismatch(clause.id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::{ClauseType, TextSpan};
    use crate::risk::Severity;
    use proptest::prelude::*;

    const TEXT: &str = "Termination clause: either party may terminate on 30 days notice.\n\nConfidentiality clause: each party keeps the other's information secret.";

    fn parsed_state() -> AnalysisState {
        let mut state = AnalysisState::new(TEXT.as_bytes().to_vec(), None);
        state.begin().unwrap();
        state.set_text(TEXT, DocumentKind::Unknown).unwrap();
        state
    }

    fn two_clauses() -> ClauseExtraction {
        ClauseExtraction::new(vec![
            Clause::new("C1", ClauseType::Termination, "Termination clause: either party may terminate on 30 days notice."),
            Clause::new("C2", ClauseType::Confidentiality, "Confidentiality clause: each party keeps the other's information secret."),
        ])
    }

    fn both_findings() -> RiskAssessment {
        RiskAssessment::new(vec![
            RiskFinding::new("C1", Severity::Low, "mutual"),
            RiskFinding::new("C2", Severity::Medium, "no term limit"),
        ])
    }

    #[test]
    fn test_happy_path_completes() {
        let mut state = parsed_state();
        state.record_clauses(two_clauses()).unwrap();
        state.record_findings(both_findings()).unwrap();
        state.set_summary("Low overall risk.").unwrap();

        assert_eq!(state.status(), Status::Complete);
        assert!(state.check_invariants().is_ok());
        assert_eq!(state.findings_in_clause_order().len(), 2);
    }

    #[test]
    fn test_mark_failed_keeps_first_cause() {
        let mut state = parsed_state();
        assert!(state.mark_failed(StageId::ClauseExtractor, ErrorKind::AgentInvocationFailed, "first"));
        assert!(!state.mark_failed(StageId::RiskAssessor, ErrorKind::Unknown, "second"));

        let error = state.error().unwrap();
        assert_eq!(error.kind, ErrorKind::AgentInvocationFailed);
        assert_eq!(error.message, "first");
    }

    #[test]
    fn test_failed_state_rejects_mutation() {
        let mut state = parsed_state();
        state.mark_failed(StageId::Parser, ErrorKind::Unknown, "boom");
        let version = state.version();

        assert_eq!(state.record_clauses(two_clauses()), Err(StateError::AlreadyFailed));
        assert_eq!(state.set_summary("x"), Err(StateError::AlreadyFailed));
        assert!(state.clauses().is_empty());
        assert_eq!(state.version(), version);
    }

    #[test]
    fn test_clauses_sealed_after_extraction() {
        let mut state = parsed_state();
        state.record_clauses(two_clauses()).unwrap();

        let extra = Clause::new("C3", ClauseType::Other, "Late addition");
        assert_eq!(state.add_clause(extra), Err(StateError::ClausesSealed));
    }

    #[test]
    fn test_incomplete_findings_rejected_atomically() {
        let mut state = parsed_state();
        state.record_clauses(two_clauses()).unwrap();

        let partial = RiskAssessment::new(vec![RiskFinding::new("C1", Severity::Low, "ok")]);
        let err = state.record_findings(partial).unwrap_err();

        assert_eq!(err, StateError::MissingFinding(ClauseId::new("C2")));
        assert!(state.risk_findings().is_empty());
        assert!(!state.findings_sealed());
    }

    #[test]
    fn test_unknown_clause_finding_rejected() {
        let mut state = parsed_state();
        state.record_clauses(two_clauses()).unwrap();

        let err = state
            .set_risk_finding(RiskFinding::new("C9", Severity::High, "?"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AgentInvocationFailed);
    }

    #[test]
    fn test_span_must_match_text() {
        let mut state = parsed_state();
        let good = Clause::new("C1", ClauseType::Termination, "Termination clause:")
            .with_span(TextSpan::new(0, 19));
        state.add_clause(good).unwrap();

        let bad = Clause::new("C2", ClauseType::Other, "something else")
            .with_span(TextSpan::new(0, 11));
        assert_eq!(state.add_clause(bad), Err(StateError::SpanMismatch(ClauseId::new("C2"))));

        let out_of_bounds = Clause::new("C3", ClauseType::Other, "x")
            .with_span(TextSpan::new(0, 10_000));
        assert!(matches!(
            state.add_clause(out_of_bounds),
            Err(StateError::SpanOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_tool_log_is_bounded() {
        let mut state = AnalysisState::new(b"x".to_vec(), None).with_tool_call_limit(2);
        state.begin().unwrap();
        let failed = || ToolCallRecord::new("ocr", ToolOutcome::Failed { message: "no".into() }, 0);

        state.record_tool_call(failed()).unwrap();
        state.record_tool_call(failed()).unwrap();
        assert_eq!(state.record_tool_call(failed()), Err(StateError::ToolLogFull(2)));
        assert_eq!(state.tool_attempts(), 2);
    }

    #[test]
    fn test_summary_requires_findings() {
        let mut state = parsed_state();
        state.record_clauses(two_clauses()).unwrap();
        assert_eq!(state.set_summary("too early"), Err(StateError::FindingsIncomplete));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Clauses,
        Findings,
        Summary,
        Fail,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Clauses),
            Just(Op::Findings),
            Just(Op::Summary),
            Just(Op::Fail),
        ]
    }

    proptest! {
        #[test]
        fn prop_invariants_hold_for_any_sequence(ops in prop::collection::vec(op_strategy(), 0..12)) {
            let mut state = parsed_state();
            for op in ops {
                let frozen = state.is_failed().then(|| {
                    (state.clauses().to_vec(), state.risk_findings().clone(), state.summary().map(str::to_string))
                });

                let _ = match op {
                    Op::Clauses => state.record_clauses(two_clauses()).map(|_| ()),
                    Op::Findings => state.record_findings(both_findings()).map(|_| ()),
                    Op::Summary => state.set_summary("done").map(|_| ()),
                    Op::Fail => {
                        state.mark_failed(StageId::Parser, ErrorKind::Unknown, "forced");
                        Ok(())
                    }
                };

                prop_assert!(state.check_invariants().is_ok());
                if let Some((clauses, findings, summary)) = frozen {
                    prop_assert_eq!(state.clauses(), clauses.as_slice());
                    prop_assert_eq!(state.risk_findings(), &findings);
                    prop_assert_eq!(state.summary().map(str::to_string), summary);
                }
            }
        }
    }
}
