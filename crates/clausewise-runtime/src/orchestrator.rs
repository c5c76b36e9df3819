//! Orchestrator: drives one analysis state from creation to a final report.
//!
//! The orchestrator owns the stages and the router. It:
//! - Asks the router for the next step after every stage
//! - Hands the state to the [`StageExecutor`], the only writer
//! - Lets nothing but the Error Handler run once the state has failed
//! - Checks cancellation before every dispatch
//! - Caps the number of dispatches per run
//!
//! Runs take `&self`, so one orchestrator serves any number of concurrent
//! runs, each owning its own state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use clausewise_core::{
    AdaptiveRouter, AnalysisState, ErrorHandler, ErrorKind, FinalReport, FixedOrderRouter, Route,
    Router, StageId, Status,
};

use crate::agents::AgentSet;
use crate::cancel::CancellationFlag;
use crate::config::{PipelineMode, RuntimeConfig};
use crate::executor::{StageExecutor, Transition};
use crate::reader::{DocumentReader, ToolRegistry};
use crate::stages::{
    AdaptiveParserStage, ClauseStage, ParserStage, RiskStage, Stage, SummaryStage,
};
use crate::RuntimeError;

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Created,
    Running(StageId),
    Completed,
    Failed,
}

impl RunPhase {
    fn of(state: &AnalysisState, current: Option<StageId>) -> Self {
        match (state.status(), current) {
            (Status::Complete, _) => RunPhase::Completed,
            (Status::Failed, _) => RunPhase::Failed,
            (_, Some(stage)) => RunPhase::Running(stage),
            (_, None) => RunPhase::Created,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Created => f.write_str("created"),
            RunPhase::Running(stage) => write!(f, "running({})", stage),
            RunPhase::Completed => f.write_str("completed"),
            RunPhase::Failed => f.write_str("failed"),
        }
    }
}

/// One dispatch in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub stage: StageId,

    /// "advanced", "failed", "skipped", "aborted", "cancelled" or "handled"
    pub outcome: String,

    /// State version after the dispatch
    pub state_version: u64,

    pub elapsed_ms: u64,
}

/// A finished run: the report plus run metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub report: FinalReport,

    pub mode: PipelineMode,

    pub trace: Vec<TraceEntry>,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    /// Final state version
    pub state_version: u64,
}

impl AnalysisRun {
    pub fn is_completed(&self) -> bool {
        self.report.is_completed()
    }

    /// Stages dispatched, in order.
    pub fn stages(&self) -> Vec<StageId> {
        self.trace.iter().map(|t| t.stage).collect()
    }
}

struct StageSet {
    parser: Arc<dyn Stage>,
    extractor: Arc<dyn Stage>,
    assessor: Arc<dyn Stage>,
    summariser: Arc<dyn Stage>,
}

impl StageSet {
    fn get(&self, id: StageId) -> Option<&dyn Stage> {
        match id {
            StageId::Parser => Some(self.parser.as_ref()),
            StageId::ClauseExtractor => Some(self.extractor.as_ref()),
            StageId::RiskAssessor => Some(self.assessor.as_ref()),
            StageId::Summariser => Some(self.summariser.as_ref()),
            StageId::ErrorHandler => None,
        }
    }
}

/// Drives analysis runs.
pub struct Orchestrator {
    mode: PipelineMode,
    router: Box<dyn Router>,
    stages: StageSet,
    executor: StageExecutor,
    error_handler: ErrorHandler,
    max_dispatches: u32,
    tool_call_limit: u32,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn router_name(&self) -> &'static str {
        self.router.name()
    }

    /// Analyse one document.
    pub async fn analyze(&self, bytes: Vec<u8>, hint: Option<String>) -> AnalysisRun {
        self.analyze_with_cancel(bytes, hint, &CancellationFlag::new())
            .await
    }

    /// Analyse one document, stopping before the next stage once `cancel`
    /// is set.
    pub async fn analyze_with_cancel(
        &self,
        bytes: Vec<u8>,
        hint: Option<String>,
        cancel: &CancellationFlag,
    ) -> AnalysisRun {
        let started_at = Utc::now();
        let mut state = self.new_state(bytes, hint);
        let trace = self.drive(&mut state, cancel).await;
        let report = self.error_handler.handle(&state);

        tracing::info!(
            status = %report.status,
            kind = report.error_kind().map(|k| k.as_str()).unwrap_or("none"),
            dispatches = trace.len(),
            "Analysis finished"
        );

        AnalysisRun {
            report,
            mode: self.mode,
            trace,
            started_at,
            finished_at: Utc::now(),
            state_version: state.version(),
        }
    }

    /// Fresh state sized for this orchestrator's tool budget.
    pub fn new_state(&self, bytes: Vec<u8>, hint: Option<String>) -> AnalysisState {
        AnalysisState::new(bytes, hint).with_tool_call_limit(self.tool_call_limit)
    }

    /// Run `state` until the router reports terminal.
    ///
    /// On return the state is `Complete` or `Failed`.
    pub async fn drive(
        &self,
        state: &mut AnalysisState,
        cancel: &CancellationFlag,
    ) -> Vec<TraceEntry> {
        let mut trace = Vec::new();
        if state.status() == Status::Pending {
            if let Err(err) = state.begin() {
                state.mark_failed(StageId::Parser, ErrorKind::PreconditionViolation, err.to_string());
            }
        }

        let mut previous: Option<StageId> = None;
        let mut dispatches: u32 = 0;
        // Room for the Error Handler after the ceiling trips
        let hard_stop = self.max_dispatches.saturating_add(2);

        loop {
            if dispatches >= hard_stop {
                tracing::error!(router = self.router.name(), dispatches, "Router did not terminate");
                break;
            }
            dispatches += 1;

            let next = match self.router.next(previous, state) {
                Route::Terminal => break,
                Route::Abort(failure) => {
                    tracing::warn!(failure = %failure, "Router aborted the run");
                    let stage = failure.stage;
                    state.mark_failed(failure.stage, failure.kind, failure.message);
                    trace.push(entry(stage, "aborted", state, Instant::now()));
                    continue;
                }
                Route::Dispatch(stage) => stage,
            };

            let started = Instant::now();
            tracing::debug!(phase = %RunPhase::of(state, Some(next)), "Dispatching");

            if !state.is_failed() {
                if dispatches > self.max_dispatches {
                    state.mark_failed(
                        next,
                        ErrorKind::Unknown,
                        format!("dispatch limit of {} reached", self.max_dispatches),
                    );
                    trace.push(entry(next, "aborted", state, started));
                    continue;
                }
                if next != StageId::ErrorHandler && cancel.is_cancelled() {
                    state.mark_failed(next, ErrorKind::Cancelled, format!("run cancelled before {}", next));
                    trace.push(entry(next, "cancelled", state, started));
                    continue;
                }
            }

            if next == StageId::ErrorHandler {
                let report = self.error_handler.handle(state);
                tracing::info!(
                    kind = report.error_kind().map(|k| k.as_str()).unwrap_or("none"),
                    "Error handler ran"
                );
                trace.push(entry(next, "handled", state, started));
                previous = Some(next);
                continue;
            }

            let transition = match self.stages.get(next) {
                Some(stage) => self.executor.execute(stage, state).await,
                None => Transition::Skipped,
            };
            trace.push(entry(next, transition.label(), state, started));
            previous = Some(next);
        }

        if !state.status().is_terminal() {
            state.mark_failed(
                previous.unwrap_or(StageId::Parser),
                ErrorKind::Unknown,
                "run ended without reaching a terminal state",
            );
        }
        trace
    }
}

fn entry(stage: StageId, outcome: &str, state: &AnalysisState, started: Instant) -> TraceEntry {
    TraceEntry {
        stage,
        outcome: outcome.to_string(),
        state_version: state.version(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

/// Builds an [`Orchestrator`] from config, agents and reader.
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: RuntimeConfig,
    agents: Option<AgentSet>,
    reader: Option<Arc<dyn DocumentReader>>,
    tools: Option<Arc<ToolRegistry>>,
    router: Option<Box<dyn Router>>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mode(mut self, mode: PipelineMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn max_tool_attempts(mut self, attempts: u32) -> Self {
        self.config.max_tool_attempts = attempts;
        self
    }

    /// Agents for the four roles (default: heuristic).
    pub fn agents(mut self, agents: AgentSet) -> Self {
        self.agents = Some(agents);
        self
    }

    /// Reader used by the fixed-order Parser (default: the tool registry).
    pub fn reader(mut self, reader: Arc<dyn DocumentReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Tools for the adaptive Parser (default: the built-in tools).
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(Arc::new(tools));
        self
    }

    /// Replace the mode's routing policy.
    pub fn router(mut self, router: Box<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn build(self) -> Result<Orchestrator, RuntimeError> {
        let config = self.config;
        config.validate()?;

        let agents = self.agents.unwrap_or_else(AgentSet::heuristic);
        let tools = self
            .tools
            .unwrap_or_else(|| Arc::new(ToolRegistry::with_defaults(&config)));

        let parser: Arc<dyn Stage> = match config.mode {
            PipelineMode::Fixed => {
                let reader = self.reader.unwrap_or_else(|| tools.clone());
                Arc::new(ParserStage::new(reader, agents.parser.clone()))
            }
            PipelineMode::Adaptive => {
                if tools.is_empty() {
                    return Err(RuntimeError::NoExtractionTools);
                }
                Arc::new(AdaptiveParserStage::new(tools, agents.parser.clone()))
            }
        };

        let router = self.router.unwrap_or_else(|| match config.mode {
            PipelineMode::Fixed => Box::new(FixedOrderRouter::new()),
            PipelineMode::Adaptive => Box::new(AdaptiveRouter::new(config.max_tool_attempts)),
        });

        tracing::debug!(mode = %config.mode, router = router.name(), ?agents, "Orchestrator built");

        Ok(Orchestrator {
            mode: config.mode,
            router,
            stages: StageSet {
                parser,
                extractor: Arc::new(ClauseStage::new(agents.extractor.clone(), config.empty_clauses)),
                assessor: Arc::new(RiskStage::new(agents.assessor.clone())),
                summariser: Arc::new(SummaryStage::new(agents.summariser.clone())),
            },
            executor: StageExecutor::new(config.stage_timeout),
            error_handler: ErrorHandler::new(),
            max_dispatches: config.max_dispatches,
            tool_call_limit: config.max_tool_attempts,
        })
    }
}
