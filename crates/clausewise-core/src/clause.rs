//! Clause records and the contract profile extracted alongside them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a clause within one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClauseId(String);

impl ClauseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier for the clause at `index` in document order ("C1", "C2", ...).
    pub fn sequential(index: usize) -> Self {
        Self(format!("C{}", index + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClauseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClauseId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Legal category of a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseType {
    Termination,
    Liability,
    Confidentiality,
    Payment,
    Indemnification,
    GoverningLaw,
    ForceMajeure,
    Warranties,
    Assignment,
    IntellectualProperty,
    DataProtection,
    NonCompete,
    DisputeResolution,
    Other,
}

impl ClauseType {
    pub const ALL: [ClauseType; 14] = [
        ClauseType::Termination,
        ClauseType::Liability,
        ClauseType::Confidentiality,
        ClauseType::Payment,
        ClauseType::Indemnification,
        ClauseType::GoverningLaw,
        ClauseType::ForceMajeure,
        ClauseType::Warranties,
        ClauseType::Assignment,
        ClauseType::IntellectualProperty,
        ClauseType::DataProtection,
        ClauseType::NonCompete,
        ClauseType::DisputeResolution,
        ClauseType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClauseType::Termination => "termination",
            ClauseType::Liability => "liability",
            ClauseType::Confidentiality => "confidentiality",
            ClauseType::Payment => "payment",
            ClauseType::Indemnification => "indemnification",
            ClauseType::GoverningLaw => "governing_law",
            ClauseType::ForceMajeure => "force_majeure",
            ClauseType::Warranties => "warranties",
            ClauseType::Assignment => "assignment",
            ClauseType::IntellectualProperty => "intellectual_property",
            ClauseType::DataProtection => "data_protection",
            ClauseType::NonCompete => "non_compete",
            ClauseType::DisputeResolution => "dispute_resolution",
            ClauseType::Other => "other",
        }
    }

    /// Lenient mapping from free-form labels produced by reasoning agents.
    ///
    /// Unrecognized labels map to [`ClauseType::Other`].
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();

        match normalized.as_str() {
            "termination" | "term_and_termination" => ClauseType::Termination,
            "liability" | "limitation_of_liability" | "limitation_of_liabilities" => {
                ClauseType::Liability
            }
            "confidentiality" | "non_disclosure" | "nondisclosure" => ClauseType::Confidentiality,
            "payment" | "payment_terms" | "fees" | "fees_and_payment" => ClauseType::Payment,
            "indemnification" | "indemnity" => ClauseType::Indemnification,
            "governing_law" | "jurisdiction" | "governing_law_and_jurisdiction" => {
                ClauseType::GoverningLaw
            }
            "force_majeure" => ClauseType::ForceMajeure,
            "warranties" | "representations_and_warranties" | "warranty" => {
                ClauseType::Warranties
            }
            "assignment" => ClauseType::Assignment,
            "intellectual_property" | "ip" => ClauseType::IntellectualProperty,
            "data_protection" | "privacy" | "data_protection___privacy" => {
                ClauseType::DataProtection
            }
            "non_compete" | "non_solicitation" | "non_compete___non_solicitation" => {
                ClauseType::NonCompete
            }
            "dispute_resolution" | "arbitration" => ClauseType::DisputeResolution,
            _ => ClauseType::Other,
        }
    }
}

impl fmt::Display for ClauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte range into the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The slice of `text` covered by this span, if it lies on char boundaries.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.start > self.end {
            return None;
        }
        text.get(self.start..self.end)
    }
}

/// A structurally identified excerpt of contract text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// Stable identifier
    pub id: ClauseId,

    /// Legal category
    pub clause_type: ClauseType,

    /// Short heading
    #[serde(default)]
    pub title: String,

    /// Literal clause text
    pub text: String,

    /// Location in the extracted text, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<TextSpan>,

    /// Section number or reference, e.g. "Section 8.2"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_reference: Option<String>,
}

impl Clause {
    pub fn new(id: impl Into<ClauseId>, clause_type: ClauseType, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            clause_type,
            title: String::new(),
            text: text.into(),
            span: None,
            section_reference: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_span(mut self, span: TextSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section_reference = Some(section.into());
        self
    }
}

impl From<String> for ClauseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Contract-level facts identified during clause extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractProfile {
    /// e.g. "NDA", "Master Services Agreement"
    #[serde(default)]
    pub contract_type: Option<String>,

    /// Names of the parties
    #[serde(default)]
    pub parties: Vec<String>,

    /// Effective date, as written in the document
    #[serde(default)]
    pub effective_date: Option<String>,
}

/// Output of the Clause Extractor role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClauseExtraction {
    pub clauses: Vec<Clause>,

    #[serde(default)]
    pub profile: ContractProfile,
}

impl ClauseExtraction {
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self {
            clauses,
            profile: ContractProfile::default(),
        }
    }
}

/// Collapse runs of whitespace so quotes can be compared with source slices.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Find where `needle` occurs literally in `text`.
pub fn locate_span(text: &str, needle: &str) -> Option<TextSpan> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }
    text.find(needle)
        .map(|start| TextSpan::new(start, start + needle.len()))
}
