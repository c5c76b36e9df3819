//! Rule-based agents backed by `clausewise_core::analysis`.
//!
//! Deterministic and offline: the default agents for the CLI and the
//! fallback when no model is configured.

use async_trait::async_trait;

use clausewise_core::analysis;
use clausewise_core::{ClauseExtraction, RiskAssessment, ValidationVerdict};

use super::traits::{
    AgentError, AgentRole, ExtractionRequest, ReasoningAgent, RiskRequest, SummaryRequest,
    ValidationRequest,
};

/// Keyword-based contract validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicParser;

#[async_trait]
impl ReasoningAgent for HeuristicParser {
    type Input = ValidationRequest;
    type Output = ValidationVerdict;

    fn role(&self) -> AgentRole {
        AgentRole::Parser
    }

    async fn invoke(&self, input: &ValidationRequest) -> Result<ValidationVerdict, AgentError> {
        Ok(analysis::check_contract(&input.text))
    }
}

/// Heading-driven clause segmentation.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

#[async_trait]
impl ReasoningAgent for HeuristicExtractor {
    type Input = ExtractionRequest;
    type Output = ClauseExtraction;

    fn role(&self) -> AgentRole {
        AgentRole::ClauseExtractor
    }

    async fn invoke(&self, input: &ExtractionRequest) -> Result<ClauseExtraction, AgentError> {
        Ok(analysis::segment_clauses(&input.text))
    }
}

/// Red-flag risk scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAssessor;

#[async_trait]
impl ReasoningAgent for HeuristicAssessor {
    type Input = RiskRequest;
    type Output = RiskAssessment;

    fn role(&self) -> AgentRole {
        AgentRole::RiskAssessor
    }

    async fn invoke(&self, input: &RiskRequest) -> Result<RiskAssessment, AgentError> {
        Ok(analysis::assess_clauses(&input.clauses))
    }
}

/// Template executive summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSummariser;

#[async_trait]
impl ReasoningAgent for HeuristicSummariser {
    type Input = SummaryRequest;
    type Output = String;

    fn role(&self) -> AgentRole {
        AgentRole::Summariser
    }

    async fn invoke(&self, input: &SummaryRequest) -> Result<String, AgentError> {
        let findings: Vec<_> = input.findings.iter().collect();
        Ok(analysis::summarise(
            input.profile.as_ref(),
            &input.clauses,
            &findings,
            input.overview.as_ref(),
        ))
    }
}
