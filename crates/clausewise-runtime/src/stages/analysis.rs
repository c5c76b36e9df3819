//! Clause Extractor, Risk Assessor and Summariser stages.

use async_trait::async_trait;
use std::sync::Arc;

use clausewise_core::{AnalysisState, ErrorKind, RiskAssessment, StageId};

use super::{invoke_agent, Stage, StageError, StageOutput};
use crate::agents::{
    AssessorAgent, ExtractionRequest, ExtractorAgent, RiskRequest, SummariserAgent, SummaryRequest,
};
use crate::config::EmptyClausePolicy;

fn missing_text() -> StageError {
    StageError::new(ErrorKind::PreconditionViolation, "extracted text is not set")
}

pub struct ClauseStage {
    agent: Arc<ExtractorAgent>,
    empty_policy: EmptyClausePolicy,
}

impl ClauseStage {
    pub fn new(agent: Arc<ExtractorAgent>, empty_policy: EmptyClausePolicy) -> Self {
        Self {
            agent,
            empty_policy,
        }
    }
}

#[async_trait]
impl Stage for ClauseStage {
    fn id(&self) -> StageId {
        StageId::ClauseExtractor
    }

    async fn run(&self, state: &AnalysisState) -> Result<StageOutput, StageError> {
        let text = state.extracted_text().ok_or_else(missing_text)?;
        let extraction = invoke_agent(
            self.agent.as_ref(),
            &ExtractionRequest {
                text: text.to_string(),
            },
        )
        .await?;

        if extraction.clauses.is_empty() {
            match self.empty_policy {
                EmptyClausePolicy::FailFast => {
                    return Err(StageError::new(
                        ErrorKind::ValidationFailed,
                        "no clauses could be identified in the document",
                    ))
                }
                EmptyClausePolicy::Proceed => {
                    tracing::warn!("No clauses identified; continuing with an empty clause list")
                }
            }
        }

        tracing::info!(clauses = extraction.clauses.len(), "Clauses extracted");
        Ok(StageOutput::Clauses(extraction))
    }
}

pub struct RiskStage {
    agent: Arc<AssessorAgent>,
}

impl RiskStage {
    pub fn new(agent: Arc<AssessorAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Stage for RiskStage {
    fn id(&self) -> StageId {
        StageId::RiskAssessor
    }

    async fn run(&self, state: &AnalysisState) -> Result<StageOutput, StageError> {
        let clauses = state.clauses();
        if clauses.is_empty() {
            return Ok(StageOutput::Findings(RiskAssessment::new(Vec::new())));
        }

        let assessment = invoke_agent(
            self.agent.as_ref(),
            &RiskRequest {
                clauses: clauses.to_vec(),
                profile: state.contract_profile().cloned(),
            },
        )
        .await?;

        tracing::info!(findings = assessment.findings.len(), "Risk assessed");
        Ok(StageOutput::Findings(assessment))
    }
}

pub struct SummaryStage {
    agent: Arc<SummariserAgent>,
}

impl SummaryStage {
    pub fn new(agent: Arc<SummariserAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Stage for SummaryStage {
    fn id(&self) -> StageId {
        StageId::Summariser
    }

    async fn run(&self, state: &AnalysisState) -> Result<StageOutput, StageError> {
        let request = SummaryRequest {
            clauses: state.clauses().to_vec(),
            findings: state
                .findings_in_clause_order()
                .into_iter()
                .cloned()
                .collect(),
            overview: state.risk_overview().cloned(),
            profile: state.contract_profile().cloned(),
        };
        let summary = invoke_agent(self.agent.as_ref(), &request).await?;
        Ok(StageOutput::Summary(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentError, AgentRole, HeuristicExtractor, ReasoningAgent};
    use clausewise_core::{ClauseExtraction, DocumentKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoClauses;

    #[async_trait]
    impl ReasoningAgent for NoClauses {
        type Input = ExtractionRequest;
        type Output = ClauseExtraction;

        fn role(&self) -> AgentRole {
            AgentRole::ClauseExtractor
        }

        async fn invoke(&self, _: &ExtractionRequest) -> Result<ClauseExtraction, AgentError> {
            Ok(ClauseExtraction::default())
        }
    }

    struct CountingAssessor(AtomicU32);

    #[async_trait]
    impl ReasoningAgent for CountingAssessor {
        type Input = RiskRequest;
        type Output = RiskAssessment;

        fn role(&self) -> AgentRole {
            AgentRole::RiskAssessor
        }

        async fn invoke(&self, _: &RiskRequest) -> Result<RiskAssessment, AgentError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RiskAssessment::default())
        }
    }

    struct Stalling;

    #[async_trait]
    impl ReasoningAgent for Stalling {
        type Input = ExtractionRequest;
        type Output = ClauseExtraction;

        fn role(&self) -> AgentRole {
            AgentRole::ClauseExtractor
        }

        async fn invoke(&self, _: &ExtractionRequest) -> Result<ClauseExtraction, AgentError> {
            tokio::time::sleep(std::time::Duration::from_secs(600)).await;
            Ok(ClauseExtraction::default())
        }

        fn timeout(&self) -> std::time::Duration {
            std::time::Duration::from_secs(1)
        }
    }

    fn parsed(text: &str) -> AnalysisState {
        let mut state = AnalysisState::new(b"doc".to_vec(), None);
        state.begin().unwrap();
        state.set_text(text, DocumentKind::Unknown).unwrap();
        state
    }

    #[tokio::test]
    async fn test_empty_clauses_fail_fast() {
        let stage = ClauseStage::new(Arc::new(NoClauses), EmptyClausePolicy::FailFast);
        let err = stage.run(&parsed("Some text")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_empty_clauses_proceed_skips_assessor() {
        let stage = ClauseStage::new(Arc::new(NoClauses), EmptyClausePolicy::Proceed);
        let mut state = parsed("Some text");
        let StageOutput::Clauses(extraction) = stage.run(&state).await.unwrap() else {
            panic!("expected clauses");
        };
        state.record_clauses(extraction).unwrap();

        let assessor = Arc::new(CountingAssessor(AtomicU32::new(0)));
        let risk = RiskStage::new(assessor.clone());
        let StageOutput::Findings(assessment) = risk.run(&state).await.unwrap() else {
            panic!("expected findings");
        };
        assert!(assessment.findings.is_empty());
        assert_eq!(assessor.0.load(Ordering::SeqCst), 0);
        assert!(state.record_findings(assessment).is_ok());
    }

    #[tokio::test]
    async fn test_extractor_without_text_is_precondition_violation() {
        let stage = ClauseStage::new(Arc::new(HeuristicExtractor), EmptyClausePolicy::FailFast);
        let mut state = AnalysisState::new(b"doc".to_vec(), None);
        state.begin().unwrap();
        let err = stage.run(&state).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PreconditionViolation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_timeout_is_invocation_failure() {
        let stage = ClauseStage::new(Arc::new(Stalling), EmptyClausePolicy::FailFast);
        let err = stage.run(&parsed("Some text")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AgentInvocationFailed);
        assert!(err.message.contains("Timeout"));
    }
}
