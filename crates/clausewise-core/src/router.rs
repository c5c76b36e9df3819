//! Routing policies: which stage runs next.
//!
//! Routers are pure functions of the previous stage and the current state.
//! Whenever the state has failed, every router sends control to the Error
//! Handler and then ends the run.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, StageFailure};
use crate::stage::StageId;
use crate::state::{AnalysisState, DocumentKind, Status, ToolCallRecord, ToolOutcome};

/// In-process text decoding.
pub const TOOL_DIRECT_TEXT: &str = "direct-text";
/// External format converter.
pub const TOOL_FORMAT_SPECIFIC: &str = "format-specific";
/// External OCR engine.
pub const TOOL_OCR: &str = "ocr";

/// Decision returned by a router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Run this stage next
    Dispatch(StageId),

    /// Record this failure, then continue routing
    Abort(StageFailure),

    /// The run is over
    Terminal,
}

/// A routing policy.
pub trait Router: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decide the next step given the stage that just ran (`None` at start).
    fn next(&self, previous: Option<StageId>, state: &AnalysisState) -> Route;
}

/// Shared failure edge: Error Handler once, then terminal.
fn failure_route(previous: Option<StageId>, state: &AnalysisState) -> Option<Route> {
    if state.status() != Status::Failed {
        return None;
    }
    Some(match previous {
        Some(StageId::ErrorHandler) => Route::Terminal,
        _ => Route::Dispatch(StageId::ErrorHandler),
    })
}

/// Forward edge shared by both policies once parsing is behind us.
fn forward_route(previous: StageId, state: &AnalysisState) -> Route {
    match previous.successor() {
        Some(next) => Route::Dispatch(next),
        None if previous == StageId::ErrorHandler || state.status() == Status::Complete => {
            Route::Terminal
        }
        None => Route::Abort(StageFailure::new(
            previous,
            ErrorKind::PreconditionViolation,
            format!("{} finished but state is {}", previous, state.status()),
        )),
    }
}

/// Parser, Clause Extractor, Risk Assessor, Summariser, in that order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedOrderRouter;

impl FixedOrderRouter {
    pub fn new() -> Self {
        Self
    }
}

impl Router for FixedOrderRouter {
    fn name(&self) -> &'static str {
        "fixed-order"
    }

    fn next(&self, previous: Option<StageId>, state: &AnalysisState) -> Route {
        if let Some(route) = failure_route(previous, state) {
            return route;
        }
        match previous {
            None => Route::Dispatch(StageId::Parser),
            Some(stage) => forward_route(stage, state),
        }
    }
}

/// Fixed order, except the Parser is re-dispatched until it yields text or
/// the attempt budget runs out.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveRouter {
    max_attempts: u32,
}

impl AdaptiveRouter {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn after_parser(&self, state: &AnalysisState) -> Route {
        if state.extracted_text().is_some() {
            return Route::Dispatch(StageId::ClauseExtractor);
        }

        let attempts = state.tool_attempts();
        let budget = self.max_attempts.min(state.tool_call_limit());
        if attempts < budget {
            tracing::debug!(
                attempts,
                budget,
                last = state.last_tool_outcome().map(|o| o.label()).unwrap_or("none"),
                "Re-dispatching parser"
            );
            return Route::Dispatch(StageId::Parser);
        }

        Route::Abort(StageFailure::new(
            StageId::Parser,
            ErrorKind::ExtractionExhausted,
            format!(
                "no usable text after {} attempt(s): {}",
                attempts,
                describe_log(state.tool_call_log())
            ),
        ))
    }
}

impl Default for AdaptiveRouter {
    fn default() -> Self {
        Self::new(crate::state::DEFAULT_MAX_TOOL_ATTEMPTS)
    }
}

impl Router for AdaptiveRouter {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn next(&self, previous: Option<StageId>, state: &AnalysisState) -> Route {
        if let Some(route) = failure_route(previous, state) {
            return route;
        }
        match previous {
            None => Route::Dispatch(StageId::Parser),
            Some(StageId::Parser) => self.after_parser(state),
            Some(stage) => forward_route(stage, state),
        }
    }
}

fn describe_log(log: &[ToolCallRecord]) -> String {
    if log.is_empty() {
        return "no tools ran".to_string();
    }
    log.iter()
        .map(|r| format!("{} #{} {}", r.tool, r.retry_count + 1, r.outcome))
        .collect::<Vec<_>>()
        .join("; ")
}

/// The next tool to try and how many times it has been tried before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolChoice {
    pub tool: String,
    pub retry_count: u32,
}

/// Picks the next extraction tool from the document kind and the call log.
///
/// Untried tools come first, in the kind's preferred order. Once every tool
/// has been tried, the least-tried one is retried with a higher
/// `retry_count`. Tools that reported the format unsupported are never
/// retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolSelector;

impl ToolSelector {
    pub fn new() -> Self {
        Self
    }

    /// Preferred tool order for a document kind.
    pub fn preferred(&self, kind: DocumentKind) -> &'static [&'static str] {
        match kind {
            DocumentKind::PdfText => &[TOOL_DIRECT_TEXT, TOOL_OCR, TOOL_FORMAT_SPECIFIC],
            DocumentKind::PdfScanned => &[TOOL_OCR, TOOL_DIRECT_TEXT],
            DocumentKind::Docx => &[TOOL_FORMAT_SPECIFIC, TOOL_DIRECT_TEXT],
            DocumentKind::Unknown => &[TOOL_DIRECT_TEXT, TOOL_FORMAT_SPECIFIC, TOOL_OCR],
        }
    }

    /// Choose the next tool, restricted to `available` names.
    pub fn select(
        &self,
        kind: DocumentKind,
        log: &[ToolCallRecord],
        available: &[&str],
    ) -> Option<ToolChoice> {
        let candidates: Vec<&str> = self
            .preferred(kind)
            .iter()
            .copied()
            .filter(|t| available.contains(t))
            .collect();

        let tries = |tool: &str| log.iter().filter(|r| r.tool == tool).count() as u32;

        if let Some(untried) = candidates.iter().find(|t| tries(t) == 0) {
            return Some(ToolChoice {
                tool: untried.to_string(),
                retry_count: 0,
            });
        }

        let unsupported = |tool: &str| {
            log.iter()
                .any(|r| r.tool == tool && matches!(r.outcome, ToolOutcome::Unsupported { .. }))
        };

        candidates
            .iter()
            .filter(|t| !unsupported(t))
            .min_by_key(|t| tries(t))
            .map(|t| ToolChoice {
                tool: t.to_string(),
                retry_count: tries(t),
            })
    }
}
