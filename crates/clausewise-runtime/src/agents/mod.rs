//! Reasoning agents for the four pipeline roles.
//!
//! Each role has a deterministic heuristic agent and a model-backed agent.
//! Stages only see the [`ReasoningAgent`] trait.

mod heuristic;
mod llm;
mod traits;

pub use heuristic::{HeuristicAssessor, HeuristicExtractor, HeuristicParser, HeuristicSummariser};
pub use llm::{parse_json_reply, LlmAssessor, LlmClient, LlmExtractor, LlmParser, LlmSummariser};
pub use traits::{
    AgentError, AgentRole, AgentSet, AssessorAgent, ExtractionRequest, ExtractorAgent,
    ParserAgent, ReasoningAgent, RiskRequest, SummariserAgent, SummaryRequest, ValidationRequest,
};
