//! # clausewise-core
//!
//! Deterministic building blocks of the contract analysis workflow.
//!
//! This crate owns everything that can be decided without I/O:
//! - The analysis state and the invariants its mutators enforce
//! - The failure taxonomy and the Error Handler that turns any terminal
//!   state into a [`FinalReport`]
//! - Routing policies (fixed-order and adaptive) and tool selection
//! - Text-quality and document-kind heuristics
//! - Rule-based clause segmentation, risk scoring and summarisation
//! - JSON Schema validation of structured agent output
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the same state always routes and reports the same way
//! 2. **No model calls, no I/O**: async execution lives in `clausewise-runtime`
//! 3. **Atomic mutations**: a rejected mutation leaves the state untouched
//!
//! ## Example
//!
//! ```rust
//! use clausewise_core::{AnalysisState, ErrorHandler, ErrorKind, StageId};
//!
//! let mut state = AnalysisState::new(b"%PDF-1.4".to_vec(), Some("pdf".into()));
//! state.begin().unwrap();
//! state.mark_failed(StageId::Parser, ErrorKind::ExtractionFailed, "no text layer");
//!
//! let report = ErrorHandler::new().handle(&state);
//! assert_eq!(report.error_kind(), Some(ErrorKind::ExtractionFailed));
//! ```

pub mod analysis;
pub mod clause;
pub mod error;
pub mod quality;
pub mod report;
pub mod risk;
pub mod router;
pub mod schema;
pub mod stage;
pub mod state;

// Re-export main types at crate root
pub use analysis::ValidationVerdict;
pub use clause::{
    locate_span, normalize_whitespace, Clause, ClauseExtraction, ClauseId, ClauseType,
    ContractProfile, TextSpan,
};
pub use error::{ErrorKind, StageFailure, StateError};
pub use quality::{assess_text, refine_kind, sniff_kind, QualityThresholds, TextQuality};
pub use report::{ErrorHandler, FinalReport, ReportStatus};
pub use risk::{RiskAssessment, RiskFinding, RiskOverview, Severity};
pub use router::{
    AdaptiveRouter, FixedOrderRouter, Route, Router, ToolChoice, ToolSelector, TOOL_DIRECT_TEXT,
    TOOL_FORMAT_SPECIFIC, TOOL_OCR,
};
pub use schema::{validate_output, OutputSchema};
pub use stage::StageId;
pub use state::{
    AnalysisState, DocumentKind, Status, ToolCallRecord, ToolOutcome, DEFAULT_MAX_TOOL_ATTEMPTS,
};
