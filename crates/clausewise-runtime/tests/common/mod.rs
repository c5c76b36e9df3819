//! Shared stubs for pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use clausewise_core::{
    Clause, ClauseExtraction, ClauseType, RiskAssessment, RiskFinding, Severity, ValidationVerdict,
};
use clausewise_runtime::agents::{
    ExtractionRequest, RiskRequest, SummaryRequest, ValidationRequest,
};
use clausewise_runtime::{
    AgentError, AgentRole, AgentSet, DocumentReader, ExtractionTool, ReaderError, ReasoningAgent,
};

pub const CONTRACT: &str = "MUTUAL NON-DISCLOSURE AGREEMENT\n\nThis Agreement is made between Acme Corp and Beta LLC.\n\n1. Confidentiality. Each party shall keep the other party's confidential information secret.\n\n2. Governing Law. This Agreement is governed by the laws of England.\n";

pub const LABELLED_CONTRACT: &str = "Termination clause: Either side may end this arrangement with 30 days written notice.\n\nConfidentiality clause: Neither side may disclose the other's business information to anyone.\n";

/// Reader that always returns the same text.
pub struct TextReader(pub &'static str);

#[async_trait]
impl DocumentReader for TextReader {
    async fn read(&self, _: &[u8], _: Option<&str>) -> Result<String, ReaderError> {
        Ok(self.0.to_string())
    }
}

/// Reader that always fails.
pub struct BrokenReader;

#[async_trait]
impl DocumentReader for BrokenReader {
    async fn read(&self, _: &[u8], _: Option<&str>) -> Result<String, ReaderError> {
        Err(ReaderError::ExtractionFailed("corrupt stream".into()))
    }
}

/// Direct-text tool that fails until its `succeed_on` attempt.
pub struct FlakyTool {
    pub succeed_on: u32,
    pub calls: AtomicU32,
}

impl FlakyTool {
    pub fn new(succeed_on: u32) -> Self {
        Self {
            succeed_on,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ExtractionTool for FlakyTool {
    fn name(&self) -> &str {
        clausewise_core::TOOL_DIRECT_TEXT
    }

    async fn extract(&self, _: &[u8], _: Option<&str>, attempt: u32) -> Result<String, ReaderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.succeed_on {
            return Err(ReaderError::ExtractionFailed(format!("attempt {} garbled", attempt)));
        }
        Ok(CONTRACT.to_string())
    }
}

pub struct AcceptingParser;

#[async_trait]
impl ReasoningAgent for AcceptingParser {
    type Input = ValidationRequest;
    type Output = ValidationVerdict;

    fn role(&self) -> AgentRole {
        AgentRole::Parser
    }

    async fn invoke(&self, _: &ValidationRequest) -> Result<ValidationVerdict, AgentError> {
        Ok(ValidationVerdict {
            is_contract: true,
            contract_type: Some("NDA".into()),
            reasoning: "stub".into(),
        })
    }
}

/// Extractor returning C1 (confidentiality) and C2 (governing law).
#[derive(Default)]
pub struct TwoClauseExtractor {
    pub calls: AtomicU32,
}

#[async_trait]
impl ReasoningAgent for TwoClauseExtractor {
    type Input = ExtractionRequest;
    type Output = ClauseExtraction;

    fn role(&self) -> AgentRole {
        AgentRole::ClauseExtractor
    }

    async fn invoke(&self, _: &ExtractionRequest) -> Result<ClauseExtraction, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ClauseExtraction::new(vec![
            Clause::new("C1", ClauseType::Confidentiality, "Each party shall keep secrets."),
            Clause::new("C2", ClauseType::GoverningLaw, "Governed by the laws of England."),
        ]))
    }
}

/// One medium finding per clause.
pub struct FlatAssessor;

#[async_trait]
impl ReasoningAgent for FlatAssessor {
    type Input = RiskRequest;
    type Output = RiskAssessment;

    fn role(&self) -> AgentRole {
        AgentRole::RiskAssessor
    }

    async fn invoke(&self, request: &RiskRequest) -> Result<RiskAssessment, AgentError> {
        Ok(RiskAssessment::new(
            request
                .clauses
                .iter()
                .map(|c| RiskFinding::new(c.id.clone(), Severity::Medium, "stub rationale"))
                .collect(),
        ))
    }
}

pub struct CountingSummariser;

#[async_trait]
impl ReasoningAgent for CountingSummariser {
    type Input = SummaryRequest;
    type Output = String;

    fn role(&self) -> AgentRole {
        AgentRole::Summariser
    }

    async fn invoke(&self, request: &SummaryRequest) -> Result<String, AgentError> {
        Ok(format!(
            "{} clauses, {} findings.",
            request.clauses.len(),
            request.findings.len()
        ))
    }
}

pub fn stub_agents() -> AgentSet {
    stub_agents_with(Arc::new(TwoClauseExtractor::default()))
}

pub fn stub_agents_with(extractor: Arc<TwoClauseExtractor>) -> AgentSet {
    AgentSet::new(
        Arc::new(AcceptingParser),
        extractor,
        Arc::new(FlatAssessor),
        Arc::new(CountingSummariser),
    )
}
