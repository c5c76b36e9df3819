//! # clausewise-runtime
//!
//! Async execution of the contract analysis pipeline.
//!
//! This crate wires the deterministic pieces of `clausewise-core` to the
//! outside world:
//! - Document reading through pluggable extraction tools
//! - Reasoning agents (heuristic, or model-backed behind a provider)
//! - Stages, the stage executor and the orchestrator
//! - Configuration, cancellation and resilience around model calls
//!
//! ## Example
//!
//! ```rust,no_run
//! use clausewise_runtime::{Orchestrator, PipelineMode};
//!
//! # async fn run() -> Result<(), clausewise_runtime::RuntimeError> {
//! let orchestrator = Orchestrator::builder()
//!     .mode(PipelineMode::Adaptive)
//!     .build()?;
//!
//! let bytes = std::fs::read("contract.pdf").unwrap_or_default();
//! let run = orchestrator.analyze(bytes, Some("pdf".into())).await;
//! println!("{}", run.report.message);
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod agents;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod executor;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod reader;
pub mod resilience;
pub mod stages;

pub use agents::{AgentError, AgentRole, AgentSet, LlmClient, ReasoningAgent};
pub use cache::{CacheConfig, CachedProvider};
pub use cancel::CancellationFlag;
pub use config::{ConfigError, EmptyClausePolicy, PipelineMode, RuntimeConfig};
pub use executor::{StageExecutor, Transition};
pub use orchestrator::{AnalysisRun, Orchestrator, OrchestratorBuilder, RunPhase, TraceEntry};
pub use providers::{LlmProvider, ProviderError};
pub use reader::{DocumentReader, ExtractionTool, ReaderError, ToolRegistry};
pub use stages::{Stage, StageError, StageOutput};

/// Errors building the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Adaptive mode needs at least one extraction tool")]
    NoExtractionTools,
}
