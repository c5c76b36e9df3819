//! Stage executor: the only writer of the analysis state.
//!
//! Each `execute` call produces exactly one transition: the stage output is
//! applied, or the failure is recorded with `mark_failed`. Stage errors,
//! timeouts, panics and rejected mutations never escape as errors.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use clausewise_core::{AnalysisState, ErrorKind, StageFailure, StageId, StateError, Status};

use crate::stages::{Stage, StageError, StageOutput};

/// Result of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Output applied; the state now has this version
    Advanced { stage: StageId, version: u64 },

    /// The failure recorded on the state
    Failed(StageFailure),

    /// The state had already failed or completed; nothing ran
    Skipped,
}

impl Transition {
    pub fn label(&self) -> &'static str {
        match self {
            Transition::Advanced { .. } => "advanced",
            Transition::Failed(_) => "failed",
            Transition::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageExecutor {
    timeout: Duration,
}

impl StageExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn execute(&self, stage: &dyn Stage, state: &mut AnalysisState) -> Transition {
        let id = stage.id();
        if state.status().is_terminal() {
            tracing::debug!(stage = %id, status = %state.status(), "Stage skipped on terminal state");
            return Transition::Skipped;
        }

        if let Err(reason) = check_preconditions(id, state) {
            return fail(state, id, ErrorKind::PreconditionViolation, reason);
        }

        let started = Instant::now();
        tracing::info!(stage = %id, version = state.version(), "Stage started");

        let result = {
            let view: &AnalysisState = state;
            let run = AssertUnwindSafe(stage.run(view)).catch_unwind();
            match tokio::time::timeout(self.timeout, run).await {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => Err(StageError::new(
                    ErrorKind::Unknown,
                    format!("stage panicked: {}", panic_message(panic.as_ref())),
                )),
                Err(_) => Err(StageError::new(
                    timeout_kind(id),
                    format!("stage timed out after {:?}", self.timeout),
                )),
            }
        };

        let transition = match result {
            Ok(output) => match apply(id, state, output) {
                Ok(()) => Transition::Advanced {
                    stage: id,
                    version: state.version(),
                },
                Err(err) => fail(state, id, err.kind, err.message),
            },
            Err(err) => fail(state, id, err.kind, err.message),
        };

        tracing::info!(
            stage = %id,
            outcome = transition.label(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage finished"
        );
        transition
    }
}

impl Default for StageExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

/// What must already hold before a stage may run.
pub fn check_preconditions(stage: StageId, state: &AnalysisState) -> Result<(), String> {
    if state.status() != Status::InProgress {
        return Err(format!("{} requires an in-progress state, found {}", stage, state.status()));
    }
    match stage {
        StageId::Parser if state.extracted_text().is_some() => {
            Err("text has already been extracted".to_string())
        }
        StageId::Parser => Ok(()),
        StageId::ClauseExtractor if state.extracted_text().is_none() => {
            Err("clause extraction requires extracted text".to_string())
        }
        StageId::ClauseExtractor if state.clauses_sealed() => {
            Err("clauses have already been extracted".to_string())
        }
        StageId::ClauseExtractor => Ok(()),
        StageId::RiskAssessor if !state.clauses_sealed() => {
            Err("risk assessment requires completed clause extraction".to_string())
        }
        StageId::RiskAssessor if state.findings_sealed() => {
            Err("risk has already been assessed".to_string())
        }
        StageId::RiskAssessor => Ok(()),
        StageId::Summariser if !state.findings_sealed() => {
            Err("summarising requires completed risk assessment".to_string())
        }
        StageId::Summariser => Ok(()),
        StageId::ErrorHandler => Err("the error handler is not an executable stage".to_string()),
    }
}

fn apply(stage: StageId, state: &mut AnalysisState, output: StageOutput) -> Result<(), StageError> {
    if output.producer() != stage {
        return Err(StageError::new(
            ErrorKind::PreconditionViolation,
            format!("{} returned output belonging to {}", stage, output.producer()),
        ));
    }

    let applied: Result<(), StateError> = match output {
        StageOutput::Parsed {
            text,
            kind,
            attempt,
        } => state.complete_parse(text, kind, attempt),
        StageOutput::ToolAttempt(record) => state.record_tool_call(record),
        StageOutput::Clauses(extraction) => state.record_clauses(extraction),
        StageOutput::Findings(assessment) => state.record_findings(assessment),
        StageOutput::Summary(summary) => state.set_summary(summary),
    };
    applied.map_err(|err| StageError::new(err.kind(), err.to_string()))
}

fn fail(state: &mut AnalysisState, stage: StageId, kind: ErrorKind, message: String) -> Transition {
    tracing::warn!(stage = %stage, kind = %kind, message = %message, "Stage failed");
    state.mark_failed(stage, kind, message);
    match state.error() {
        Some(failure) => Transition::Failed(failure.clone()),
        None => Transition::Skipped,
    }
}

fn timeout_kind(stage: StageId) -> ErrorKind {
    match stage {
        StageId::Parser => ErrorKind::ExtractionFailed,
        _ => ErrorKind::AgentInvocationFailed,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::agents::{HeuristicAssessor, HeuristicSummariser};
    use crate::stages::{RiskStage, SummaryStage};
    use clausewise_core::{
        Clause, ClauseExtraction, ClauseType, DocumentKind, RiskAssessment, RiskFinding, Severity,
    };
    use std::sync::Arc;

    struct Fixed(StageId, Result<StageOutput, StageError>);

    #[async_trait]
    impl Stage for Fixed {
        fn id(&self) -> StageId {
            self.0
        }

        async fn run(&self, _: &AnalysisState) -> Result<StageOutput, StageError> {
            self.1.clone()
        }
    }

    struct Panicking;

    #[async_trait]
    impl Stage for Panicking {
        fn id(&self) -> StageId {
            StageId::Parser
        }

        async fn run(&self, _: &AnalysisState) -> Result<StageOutput, StageError> {
            panic!("reader exploded");
        }
    }

    struct Hanging;

    #[async_trait]
    impl Stage for Hanging {
        fn id(&self) -> StageId {
            StageId::Parser
        }

        async fn run(&self, _: &AnalysisState) -> Result<StageOutput, StageError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(StageError::new(ErrorKind::Unknown, "unreachable"))
        }
    }

    fn in_progress() -> AnalysisState {
        let mut state = AnalysisState::new(b"doc".to_vec(), None);
        state.begin().unwrap();
        state
    }

    fn parsed_output() -> StageOutput {
        StageOutput::Parsed {
            text: "Termination clause.".into(),
            kind: DocumentKind::Unknown,
            attempt: None,
        }
    }

    #[tokio::test]
    async fn test_output_is_applied() {
        let mut state = in_progress();
        let transition = StageExecutor::default()
            .execute(&Fixed(StageId::Parser, Ok(parsed_output())), &mut state)
            .await;

        assert!(matches!(transition, Transition::Advanced { stage: StageId::Parser, .. }));
        assert_eq!(state.extracted_text(), Some("Termination clause."));
        assert_eq!(state.document_kind(), Some(DocumentKind::Unknown));
    }

    #[tokio::test]
    async fn test_stage_error_marks_failed() {
        let mut state = in_progress();
        let transition = StageExecutor::default()
            .execute(
                &Fixed(
                    StageId::Parser,
                    Err(StageError::new(ErrorKind::ExtractionFailed, "corrupt")),
                ),
                &mut state,
            )
            .await;

        let Transition::Failed(failure) = transition else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, ErrorKind::ExtractionFailed);
        assert_eq!(failure.stage, StageId::Parser);
        assert_eq!(state.status(), Status::Failed);
    }

    #[tokio::test]
    async fn test_precondition_violation() {
        let mut state = in_progress();
        let transition = StageExecutor::default()
            .execute(
                &Fixed(StageId::RiskAssessor, Ok(StageOutput::Findings(Default::default()))),
                &mut state,
            )
            .await;

        let Transition::Failed(failure) = transition else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, ErrorKind::PreconditionViolation);
    }

    #[tokio::test]
    async fn test_failed_state_is_skipped_and_untouched() {
        let mut state = in_progress();
        state.mark_failed(StageId::Parser, ErrorKind::ExtractionFailed, "x");
        let version = state.version();

        let transition = StageExecutor::default()
            .execute(&Fixed(StageId::Parser, Ok(parsed_output())), &mut state)
            .await;

        assert_eq!(transition, Transition::Skipped);
        assert_eq!(state.version(), version);
        assert!(state.extracted_text().is_none());
    }

    #[tokio::test]
    async fn test_later_stages_leave_failed_state_alone() {
        let mut state = in_progress();
        state.set_text("Payment is due within 90 days.", DocumentKind::Unknown).unwrap();
        state
            .record_clauses(ClauseExtraction::new(vec![Clause::new(
                "C1",
                ClauseType::Payment,
                "Payment is due within 90 days.",
            )]))
            .unwrap();
        state
            .record_findings(RiskAssessment::new(vec![RiskFinding::new(
                "C1",
                Severity::High,
                "Long payment terms",
            )]))
            .unwrap();
        state.mark_failed(StageId::Summariser, ErrorKind::AgentInvocationFailed, "model down");

        let clauses = state.clauses().to_vec();
        let findings = state.risk_findings().clone();
        let version = state.version();
        let executor = StageExecutor::default();

        let risk = RiskStage::new(Arc::new(HeuristicAssessor));
        let summary = SummaryStage::new(Arc::new(HeuristicSummariser));
        assert_eq!(executor.execute(&risk, &mut state).await, Transition::Skipped);
        assert_eq!(executor.execute(&summary, &mut state).await, Transition::Skipped);

        assert_eq!(state.clauses(), clauses.as_slice());
        assert_eq!(state.risk_findings(), &findings);
        assert!(state.summary().is_none());
        assert_eq!(state.version(), version);
        assert_eq!(state.error().map(|e| e.stage), Some(StageId::Summariser));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let mut state = in_progress();
        let transition = StageExecutor::default().execute(&Panicking, &mut state).await;

        let Transition::Failed(failure) = transition else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, ErrorKind::Unknown);
        assert!(failure.message.contains("reader exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parser_timeout_is_extraction_failure() {
        let mut state = in_progress();
        let transition = StageExecutor::new(Duration::from_secs(5))
            .execute(&Hanging, &mut state)
            .await;

        let Transition::Failed(failure) = transition else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, ErrorKind::ExtractionFailed);
    }

    #[tokio::test]
    async fn test_rejected_mutation_is_agent_failure() {
        let mut state = in_progress();
        state.set_text("Some contract text.", DocumentKind::Unknown).unwrap();
        let clause = Clause::new("C1", ClauseType::Other, "Text");
        let duplicate = ClauseExtraction::new(vec![clause.clone(), clause]);

        let transition = StageExecutor::default()
            .execute(
                &Fixed(StageId::ClauseExtractor, Ok(StageOutput::Clauses(duplicate))),
                &mut state,
            )
            .await;

        let Transition::Failed(failure) = transition else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, ErrorKind::AgentInvocationFailed);
        assert!(state.clauses().is_empty());
    }

    #[tokio::test]
    async fn test_output_from_wrong_stage_rejected() {
        let mut state = in_progress();
        let transition = StageExecutor::default()
            .execute(
                &Fixed(StageId::Parser, Ok(StageOutput::Summary("done".into()))),
                &mut state,
            )
            .await;

        let Transition::Failed(failure) = transition else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, ErrorKind::PreconditionViolation);
    }
}
