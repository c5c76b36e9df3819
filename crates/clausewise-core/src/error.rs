//! Failure taxonomy shared by every stage.
//!
//! Stage-level failures are data, not panics: they are recorded on the
//! analysis state via `mark_failed` and turned into a user-facing report by
//! the [`ErrorHandler`](crate::report::ErrorHandler).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::clause::ClauseId;
use crate::stage::StageId;

/// Category of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No reader strategy understands the document format
    UnsupportedFormat,

    /// A reader strategy failed to produce usable text
    ExtractionFailed,

    /// The adaptive tool loop spent its attempt budget
    ExtractionExhausted,

    /// The document is not recognizable as a contract
    ValidationFailed,

    /// A reasoning agent errored or returned malformed output
    AgentInvocationFailed,

    /// A stage ran with missing required state (orchestration defect)
    PreconditionViolation,

    /// The run was cancelled between stages
    Cancelled,

    /// Anything not covered above
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::UnsupportedFormat,
        ErrorKind::ExtractionFailed,
        ErrorKind::ExtractionExhausted,
        ErrorKind::ValidationFailed,
        ErrorKind::AgentInvocationFailed,
        ErrorKind::PreconditionViolation,
        ErrorKind::Cancelled,
        ErrorKind::Unknown,
    ];

    /// Canonical name, as printed by the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::ExtractionFailed => "ExtractionFailed",
            ErrorKind::ExtractionExhausted => "ExtractionExhausted",
            ErrorKind::ValidationFailed => "ValidationFailed",
            ErrorKind::AgentInvocationFailed => "AgentInvocationFailed",
            ErrorKind::PreconditionViolation => "PreconditionViolation",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Unknown => "Unknown",
        }
    }

    /// Whether the failure points at a wiring defect rather than the input.
    pub fn is_defect(&self) -> bool {
        matches!(self, ErrorKind::PreconditionViolation)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure captured at a stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Stage that was running (or about to run) when the failure occurred
    pub stage: StageId,

    /// Failure category
    pub kind: ErrorKind,

    /// Diagnostic message
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: StageId, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}: {}", self.kind, self.stage, self.message)
    }
}

impl std::error::Error for StageFailure {}

/// Rejected mutation of the analysis state.
///
/// Mutators validate before writing, so a returned error means the state is
/// unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("state has already failed; mutation rejected")]
    AlreadyFailed,

    #[error("state is already complete; mutation rejected")]
    AlreadyComplete,

    #[error("state cannot begin from status {0}")]
    CannotBegin(&'static str),

    #[error("extracted text is already set")]
    TextAlreadySet,

    #[error("extracted text is empty")]
    EmptyText,

    #[error("extracted text is required before {0}")]
    MissingText(&'static str),

    #[error("tool call log is full ({0} attempts)")]
    ToolLogFull(u32),

    #[error("clauses are sealed once clause extraction completes")]
    ClausesSealed,

    #[error("clause extraction has not completed")]
    ClausesNotSealed,

    #[error("duplicate clause id: {0}")]
    DuplicateClause(ClauseId),

    #[error("clause {id} span {start}..{end} is out of bounds (text length {len})")]
    SpanOutOfBounds {
        id: ClauseId,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("clause {0} text does not match its span")]
    SpanMismatch(ClauseId),

    #[error("risk finding references unknown clause: {0}")]
    UnknownClause(ClauseId),

    #[error("more than one risk finding for clause: {0}")]
    DuplicateFinding(ClauseId),

    #[error("clause {0} has no risk finding")]
    MissingFinding(ClauseId),

    #[error("risk findings are sealed once risk assessment completes")]
    FindingsSealed,

    #[error("risk assessment has not completed")]
    FindingsIncomplete,

    #[error("summary is empty")]
    EmptySummary,
}

impl StateError {
    /// Map the rejection onto the failure taxonomy.
    ///
    /// Rejections caused by agent output (bad ids, spans, completeness) are
    /// agent failures; rejections caused by calling a mutator at the wrong
    /// time are wiring defects.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StateError::EmptyText => ErrorKind::ExtractionFailed,
            StateError::DuplicateClause(_)
            | StateError::SpanOutOfBounds { .. }
            | StateError::SpanMismatch(_)
            | StateError::UnknownClause(_)
            | StateError::DuplicateFinding(_)
            | StateError::MissingFinding(_)
            | StateError::EmptySummary => ErrorKind::AgentInvocationFailed,
            StateError::AlreadyFailed
            | StateError::AlreadyComplete
            | StateError::CannotBegin(_)
            | StateError::TextAlreadySet
            | StateError::MissingText(_)
            | StateError::ToolLogFull(_)
            | StateError::ClausesSealed
            | StateError::ClausesNotSealed
            | StateError::FindingsSealed
            | StateError::FindingsIncomplete => ErrorKind::PreconditionViolation,
        }
    }
}
