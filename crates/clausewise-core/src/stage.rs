//! Stage identifiers for the analysis workflow.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named unit of work on the analysis state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Extracts text from the source document and validates it is a contract
    Parser,

    /// Identifies clauses in the extracted text
    ClauseExtractor,

    /// Scores each extracted clause for risk
    RiskAssessor,

    /// Produces the executive summary
    Summariser,

    /// Terminal sink for every failure path
    ErrorHandler,
}

impl StageId {
    /// The forward stages, in fixed pipeline order.
    pub const PIPELINE: [StageId; 4] = [
        StageId::Parser,
        StageId::ClauseExtractor,
        StageId::RiskAssessor,
        StageId::Summariser,
    ];

    /// Stable snake_case name, used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            StageId::Parser => "parser",
            StageId::ClauseExtractor => "clause_extractor",
            StageId::RiskAssessor => "risk_assessor",
            StageId::Summariser => "summariser",
            StageId::ErrorHandler => "error_handler",
        }
    }

    /// The next forward stage, or `None` after the Summariser.
    pub fn successor(&self) -> Option<StageId> {
        match self {
            StageId::Parser => Some(StageId::ClauseExtractor),
            StageId::ClauseExtractor => Some(StageId::RiskAssessor),
            StageId::RiskAssessor => Some(StageId::Summariser),
            StageId::Summariser | StageId::ErrorHandler => None,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_chain_ends_at_summariser() {
        let mut chain = vec![StageId::Parser];
        while let Some(next) = chain.last().and_then(|s| s.successor()) {
            chain.push(next);
        }
        assert_eq!(chain, StageId::PIPELINE.to_vec());
        assert_eq!(StageId::ErrorHandler.successor(), None);
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&StageId::ClauseExtractor).unwrap();
        assert_eq!(json, "\"clause_extractor\"");
    }
}
