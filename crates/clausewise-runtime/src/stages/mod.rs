//! Pipeline stages.
//!
//! A stage reads the state and returns a [`StageOutput`]; it never writes
//! the state. The [`StageExecutor`](crate::executor::StageExecutor) applies
//! the output, so a stage invocation is either fully applied or turned into
//! a failure.

mod analysis;
mod parser;

pub use analysis::{ClauseStage, RiskStage, SummaryStage};
pub use parser::{AdaptiveParserStage, ParserStage};

use async_trait::async_trait;
use thiserror::Error;

use clausewise_core::{
    AnalysisState, ClauseExtraction, DocumentKind, ErrorKind, RiskAssessment, StageId,
    ToolCallRecord,
};

use crate::agents::{AgentError, ReasoningAgent};
use crate::reader::ReaderError;

/// What a stage produced.
#[derive(Debug, Clone)]
pub enum StageOutput {
    /// Usable text, and the tool attempt that produced it in adaptive mode
    Parsed {
        text: String,
        kind: DocumentKind,
        attempt: Option<ToolCallRecord>,
    },

    /// An adaptive tool attempt that did not yield usable text
    ToolAttempt(ToolCallRecord),

    Clauses(ClauseExtraction),

    Findings(RiskAssessment),

    Summary(String),
}

impl StageOutput {
    /// The stage allowed to produce this output.
    pub fn producer(&self) -> StageId {
        match self {
            StageOutput::Parsed { .. } | StageOutput::ToolAttempt(_) => StageId::Parser,
            StageOutput::Clauses(_) => StageId::ClauseExtractor,
            StageOutput::Findings(_) => StageId::RiskAssessor,
            StageOutput::Summary(_) => StageId::Summariser,
        }
    }
}

/// A classified stage failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<AgentError> for StageError {
    fn from(err: AgentError) -> Self {
        StageError::new(ErrorKind::AgentInvocationFailed, err.to_string())
    }
}

impl From<ReaderError> for StageError {
    fn from(err: ReaderError) -> Self {
        let kind = match err {
            ReaderError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ReaderError::ExtractionFailed(_) | ReaderError::Timeout(_) => {
                ErrorKind::ExtractionFailed
            }
        };
        StageError::new(kind, err.to_string())
    }
}

/// One step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn run(&self, state: &AnalysisState) -> Result<StageOutput, StageError>;
}

/// Invoke an agent under its own timeout.
pub(crate) async fn invoke_agent<A>(agent: &A, input: &A::Input) -> Result<A::Output, StageError>
where
    A: ReasoningAgent + ?Sized,
{
    let timeout = agent.timeout();
    match tokio::time::timeout(timeout, agent.invoke(input)).await {
        Ok(result) => result.map_err(StageError::from),
        Err(_) => Err(AgentError::Timeout(timeout).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_reader_errors_map_to_kinds() {
        let unsupported: StageError = ReaderError::UnsupportedFormat("zip".into()).into();
        assert_eq!(unsupported.kind, ErrorKind::UnsupportedFormat);

        let timeout: StageError = ReaderError::Timeout(Duration::from_secs(1)).into();
        assert_eq!(timeout.kind, ErrorKind::ExtractionFailed);
    }

    #[test]
    fn test_agent_errors_are_invocation_failures() {
        let err: StageError = AgentError::BudgetExceeded.into();
        assert_eq!(err.kind, ErrorKind::AgentInvocationFailed);
        assert_eq!(err.message, "Budget exceeded");
    }
}
