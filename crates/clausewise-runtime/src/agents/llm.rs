//! Model-backed agents.
//!
//! Every call goes through [`LlmClient`], which applies the circuit breaker,
//! the token budget and rate-limit retries, then validates the JSON reply
//! against the role's embedded schema before it is mapped onto domain types.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use clausewise_core::{
    locate_span, validate_output, Clause, ClauseExtraction, ClauseId, ClauseType, ContractProfile,
    OutputSchema, RiskAssessment, RiskFinding, RiskOverview, Severity, ValidationVerdict,
};

use super::traits::{
    AgentError, AgentRole, AgentSet, ExtractionRequest, ReasoningAgent, RiskRequest,
    SummaryRequest, ValidationRequest,
};
use crate::prompts;
use crate::providers::{CompletionConfig, CompletionRequest, LlmProvider, ProviderError};
use crate::resilience::{BudgetTracker, CircuitBreaker, LlmUsage};

/// Provider plus the resilience shared by all model-backed agents.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    breaker: Arc<CircuitBreaker>,
    budget: Arc<BudgetTracker>,
    max_retries: usize,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self {
            provider,
            config,
            breaker: Arc::new(CircuitBreaker::default()),
            budget: Arc::new(BudgetTracker::default()),
            max_retries: 3,
        }
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_budget(mut self, budget: Arc<BudgetTracker>) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn usage(&self) -> LlmUsage {
        self.budget.usage()
    }

    /// One completion for `role`, returning the reply text.
    pub async fn complete(&self, role: AgentRole, user: String) -> Result<String, AgentError> {
        if !self.breaker.allows(role) {
            return Err(AgentError::CircuitOpen(role));
        }

        let request = CompletionRequest::new(role, prompts::system_prompt(role), user);
        let estimated = self.provider.estimate_tokens(&request) + self.config.max_tokens;
        if !self.budget.allows(role, estimated) {
            tracing::warn!(role = %role, estimated, "Token budget exhausted");
            return Err(AgentError::BudgetExceeded);
        }

        let result = (|| async { self.provider.complete(&request, &self.config).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_times(self.max_retries),
            )
            .when(ProviderError::is_retryable)
            .notify(|err: &ProviderError, dur: Duration| {
                tracing::debug!(role = %role, error = %err, delay = ?dur, "Retrying model call");
            })
            .await;

        match result {
            Ok(completion) => {
                self.breaker.on_success(role);
                self.budget.charge(role, &completion.usage);
                if completion.truncated {
                    tracing::warn!(role = %role, max_tokens = self.config.max_tokens, "Reply hit the token limit");
                }
                tracing::debug!(
                    role = %role,
                    provider = self.provider.name(),
                    tokens = completion.usage.total(),
                    "Model call complete"
                );
                Ok(completion.text)
            }
            Err(err) => {
                self.breaker.on_failure(role);
                Err(AgentError::LlmError(err.to_string()))
            }
        }
    }

    /// One completion whose reply must be a JSON object matching `schema`.
    pub async fn complete_json(
        &self,
        role: AgentRole,
        user: String,
        schema: OutputSchema,
    ) -> Result<serde_json::Value, AgentError> {
        let reply = self.complete(role, user).await?;
        let value = parse_json_reply(&reply)?;
        validate_output(schema, &value).map_err(|errors| {
            AgentError::Malformed(format!("{} output: {}", schema, errors.join("; ")))
        })?;
        Ok(value)
    }
}

/// Pull the JSON object out of a model reply, tolerating code fences and prose.
pub fn parse_json_reply(reply: &str) -> Result<serde_json::Value, AgentError> {
    let trimmed = reply.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    if let Ok(value) = serde_json::from_str(unfenced.trim()) {
        return Ok(value);
    }

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&unfenced[start..=end])
            .map_err(|e| AgentError::Malformed(format!("reply is not JSON: {}", e))),
        _ => Err(AgentError::Malformed("reply contains no JSON object".to_string())),
    }
}

// ----------------------------------------------------------------------
// Wire shapes (already schema-validated when these are deserialized)
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawClause {
    clause_type: String,
    #[serde(default)]
    title: Option<String>,
    text: String,
    #[serde(default)]
    section_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    clauses: Vec<RawClause>,
    #[serde(default)]
    contract_type: Option<String>,
    #[serde(default)]
    parties: Vec<String>,
    #[serde(default)]
    effective_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    clause_id: String,
    risk_level: String,
    risk_reasoning: String,
    #[serde(default)]
    key_concerns: Vec<String>,
    #[serde(default)]
    recommendation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAssessment {
    assessments: Vec<RawFinding>,
    #[serde(default)]
    overall_risk: Option<String>,
    #[serde(default)]
    missing_clauses: Vec<String>,
    #[serde(default)]
    summary_of_concerns: Option<String>,
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, AgentError> {
    serde_json::from_value(value).map_err(|e| AgentError::Malformed(e.to_string()))
}

fn severity(label: &str) -> Result<Severity, AgentError> {
    Severity::from_label(label)
        .ok_or_else(|| AgentError::Malformed(format!("unknown risk level '{}'", label)))
}

/// Map an extraction reply onto clauses, locating each quote in `text`.
fn to_extraction(raw: RawExtraction, text: &str) -> ClauseExtraction {
    let clauses = raw
        .clauses
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let clause_type = ClauseType::from_label(&c.clause_type);
            let title = c
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| clause_type.as_str().replace('_', " "));
            let mut clause = Clause::new(ClauseId::sequential(i), clause_type, c.text.trim())
                .with_title(title);
            if let Some(span) = locate_span(text, &c.text) {
                clause = clause.with_span(span);
            }
            if let Some(section) = c.section_reference.filter(|s| !s.trim().is_empty()) {
                clause = clause.with_section(section);
            }
            clause
        })
        .collect();

    ClauseExtraction {
        clauses,
        profile: ContractProfile {
            contract_type: raw.contract_type,
            parties: raw.parties,
            effective_date: raw.effective_date,
        },
    }
}

fn to_assessment(raw: RawAssessment) -> Result<RiskAssessment, AgentError> {
    let findings = raw
        .assessments
        .into_iter()
        .map(|f| {
            let mut finding =
                RiskFinding::new(f.clause_id, severity(&f.risk_level)?, f.risk_reasoning);
            for concern in f.key_concerns {
                finding = finding.with_concern(concern);
            }
            if let Some(rec) = f.recommendation.filter(|r| !r.trim().is_empty()) {
                finding = finding.with_recommendation(rec);
            }
            Ok(finding)
        })
        .collect::<Result<Vec<_>, AgentError>>()?;

    let mut overview = RiskOverview::from_findings(&findings);
    if let Some(label) = raw.overall_risk {
        overview.overall = severity(&label)?;
    }
    overview.missing_clauses = raw
        .missing_clauses
        .iter()
        .map(|label| ClauseType::from_label(label))
        .filter(|t| *t != ClauseType::Other)
        .collect();
    if let Some(summary) = raw.summary_of_concerns.filter(|s| !s.trim().is_empty()) {
        overview.summary_of_concerns = summary;
    }

    Ok(RiskAssessment {
        findings,
        overview: Some(overview),
    })
}

// ----------------------------------------------------------------------
// Agents
// ----------------------------------------------------------------------

/// Contract validation by model.
pub struct LlmParser {
    client: LlmClient,
}

impl LlmParser {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReasoningAgent for LlmParser {
    type Input = ValidationRequest;
    type Output = ValidationVerdict;

    fn role(&self) -> AgentRole {
        AgentRole::Parser
    }

    async fn invoke(&self, input: &ValidationRequest) -> Result<ValidationVerdict, AgentError> {
        let value = self
            .client
            .complete_json(
                self.role(),
                prompts::validation_context(&input.text),
                OutputSchema::ValidationVerdict,
            )
            .await?;
        decode(value)
    }

    fn timeout(&self) -> Duration {
        self.client.timeout()
    }
}

/// Clause extraction by model.
pub struct LlmExtractor {
    client: LlmClient,
}

impl LlmExtractor {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReasoningAgent for LlmExtractor {
    type Input = ExtractionRequest;
    type Output = ClauseExtraction;

    fn role(&self) -> AgentRole {
        AgentRole::ClauseExtractor
    }

    async fn invoke(&self, input: &ExtractionRequest) -> Result<ClauseExtraction, AgentError> {
        let value = self
            .client
            .complete_json(
                self.role(),
                prompts::extraction_context(&input.text),
                OutputSchema::ClauseExtraction,
            )
            .await?;
        Ok(to_extraction(decode(value)?, &input.text))
    }

    fn timeout(&self) -> Duration {
        self.client.timeout()
    }
}

/// Risk assessment by model.
pub struct LlmAssessor {
    client: LlmClient,
}

impl LlmAssessor {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReasoningAgent for LlmAssessor {
    type Input = RiskRequest;
    type Output = RiskAssessment;

    fn role(&self) -> AgentRole {
        AgentRole::RiskAssessor
    }

    async fn invoke(&self, input: &RiskRequest) -> Result<RiskAssessment, AgentError> {
        let value = self
            .client
            .complete_json(
                self.role(),
                prompts::risk_context(&input.clauses, input.profile.as_ref()),
                OutputSchema::RiskAssessment,
            )
            .await?;
        to_assessment(decode(value)?)
    }

    fn timeout(&self) -> Duration {
        self.client.timeout()
    }
}

/// Executive summary by model.
pub struct LlmSummariser {
    client: LlmClient,
}

impl LlmSummariser {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReasoningAgent for LlmSummariser {
    type Input = SummaryRequest;
    type Output = String;

    fn role(&self) -> AgentRole {
        AgentRole::Summariser
    }

    async fn invoke(&self, input: &SummaryRequest) -> Result<String, AgentError> {
        let context = prompts::summary_context(
            &input.clauses,
            &input.findings,
            input.overview.as_ref(),
            input.profile.as_ref(),
        );
        let reply = self.client.complete(self.role(), context).await?;
        let summary = reply.trim();
        if summary.is_empty() {
            return Err(AgentError::Malformed("empty summary".to_string()));
        }
        Ok(summary.to_string())
    }

    fn timeout(&self) -> Duration {
        self.client.timeout()
    }
}

impl AgentSet {
    /// Model-backed agents for every role, sharing one client.
    pub fn llm(client: LlmClient) -> Self {
        Self::new(
            Arc::new(LlmParser::new(client.clone())),
            Arc::new(LlmExtractor::new(client.clone())),
            Arc::new(LlmAssessor::new(client.clone())),
            Arc::new(LlmSummariser::new(client)),
        )
    }
}
