//! Deterministic contract analysis.
//!
//! Rule-based counterparts of the four reasoning roles. They back the
//! heuristic agents and make every run reproducible without a model.

mod digest;
pub mod patterns;
mod scoring;
mod segmenter;

pub use digest::summarise;
pub use scoring::{assess_clause, assess_clauses, EXPECTED_CLAUSES};
pub use segmenter::{classify, extract_profile, segment_clauses};

use serde::{Deserialize, Serialize};

/// Distinct contract-marker words needed to accept a document.
const MIN_CONTRACT_MARKERS: usize = 3;

/// Distinct "<type> clause:" labels that accept a document on their own.
const MIN_LABELLED_CLAUSES: usize = 2;

/// Parser verdict on whether extracted text is a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_contract: bool,

    #[serde(default)]
    pub contract_type: Option<String>,

    /// One-line justification
    pub reasoning: String,
}

/// Decide whether `text` reads like a legal contract.
pub fn check_contract(text: &str) -> ValidationVerdict {
    let markers = patterns::contract_marker_count(text);
    let labelled = patterns::labelled_clause_count(text);
    let contract_type = patterns::detect_contract_type(text).map(str::to_string);
    let is_contract = markers >= MIN_CONTRACT_MARKERS
        || labelled >= MIN_LABELLED_CLAUSES
        || contract_type.is_some();

    let reasoning = match (&contract_type, is_contract) {
        (Some(kind), _) => format!("Identified as {} ({} contract markers).", kind, markers),
        (None, true) if markers < MIN_CONTRACT_MARKERS => {
            format!("{} labelled contract clauses found.", labelled)
        }
        (None, true) => format!("{} distinct contract markers found.", markers),
        (None, false) => format!(
            "Only {} contract marker(s) found; at least {} expected.",
            markers, MIN_CONTRACT_MARKERS
        ),
    };

    ValidationVerdict {
        is_contract,
        contract_type,
        reasoning,
    }
}
