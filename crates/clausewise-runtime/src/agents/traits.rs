//! Reasoning agent trait and the request types of the four roles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use clausewise_core::{
    Clause, ClauseExtraction, ContractProfile, DocumentKind, RiskAssessment, RiskFinding,
    RiskOverview, ValidationVerdict,
};

/// Errors from reasoning agents.
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("LLM call failed: {0}")]
    LlmError(String),

    #[error("Malformed agent output: {0}")]
    Malformed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Budget exceeded")]
    BudgetExceeded,

    #[error("Circuit open for {0}")]
    CircuitOpen(AgentRole),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The four reasoning roles, one per forward stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Parser,
    ClauseExtractor,
    RiskAssessor,
    Summariser,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Parser,
        AgentRole::ClauseExtractor,
        AgentRole::RiskAssessor,
        AgentRole::Summariser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Parser => "parser",
            AgentRole::ClauseExtractor => "clause_extractor",
            AgentRole::RiskAssessor => "risk_assessor",
            AgentRole::Summariser => "summariser",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability that turns structured input into structured output.
///
/// Agents hold no per-run state: the same agent value serves concurrent
/// runs.
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    type Input: Send + Sync;
    type Output: Send;

    fn role(&self) -> AgentRole;

    async fn invoke(&self, input: &Self::Input) -> Result<Self::Output, AgentError>;

    /// Upper bound the stage applies to one invocation.
    fn timeout(&self) -> Duration {
        Duration::from_secs(120)
    }
}

/// Parser input: text to validate as a contract.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub text: String,
    pub document_kind: DocumentKind,
}

/// Clause Extractor input.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub text: String,
}

/// Risk Assessor input.
#[derive(Debug, Clone)]
pub struct RiskRequest {
    pub clauses: Vec<Clause>,
    pub profile: Option<ContractProfile>,
}

/// Summariser input.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub clauses: Vec<Clause>,
    pub findings: Vec<RiskFinding>,
    pub overview: Option<RiskOverview>,
    pub profile: Option<ContractProfile>,
}

pub type ParserAgent = dyn ReasoningAgent<Input = ValidationRequest, Output = ValidationVerdict>;
pub type ExtractorAgent = dyn ReasoningAgent<Input = ExtractionRequest, Output = ClauseExtraction>;
pub type AssessorAgent = dyn ReasoningAgent<Input = RiskRequest, Output = RiskAssessment>;
pub type SummariserAgent = dyn ReasoningAgent<Input = SummaryRequest, Output = String>;

/// One agent per role.
#[derive(Clone)]
pub struct AgentSet {
    pub parser: Arc<ParserAgent>,
    pub extractor: Arc<ExtractorAgent>,
    pub assessor: Arc<AssessorAgent>,
    pub summariser: Arc<SummariserAgent>,
}

impl AgentSet {
    pub fn new(
        parser: Arc<ParserAgent>,
        extractor: Arc<ExtractorAgent>,
        assessor: Arc<AssessorAgent>,
        summariser: Arc<SummariserAgent>,
    ) -> Self {
        Self {
            parser,
            extractor,
            assessor,
            summariser,
        }
    }

    /// Deterministic rule-based agents for every role.
    pub fn heuristic() -> Self {
        use super::heuristic::{
            HeuristicAssessor, HeuristicExtractor, HeuristicParser, HeuristicSummariser,
        };
        Self::new(
            Arc::new(HeuristicParser),
            Arc::new(HeuristicExtractor),
            Arc::new(HeuristicAssessor),
            Arc::new(HeuristicSummariser),
        )
    }
}

impl fmt::Debug for AgentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSet")
            .field("parser", &self.parser.role())
            .field("extractor", &self.extractor.role())
            .field("assessor", &self.assessor.role())
            .field("summariser", &self.summariser.role())
            .finish()
    }
}
