//! JSON Schema validation for structured agent output.
//!
//! Model replies are checked against the embedded schemas before they are
//! mapped onto domain types.

use std::fmt;
use std::sync::OnceLock;

const CLAUSE_EXTRACTION_SCHEMA: &str = include_str!("../schemas/clause_extraction.schema.json");
const RISK_ASSESSMENT_SCHEMA: &str = include_str!("../schemas/risk_assessment.schema.json");
const VALIDATION_VERDICT_SCHEMA: &str = include_str!("../schemas/validation_verdict.schema.json");

type Compiled = OnceLock<Result<jsonschema::Validator, String>>;

static CLAUSE_EXTRACTION: Compiled = OnceLock::new();
static RISK_ASSESSMENT: Compiled = OnceLock::new();
static VALIDATION_VERDICT: Compiled = OnceLock::new();

/// Which structured output is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputSchema {
    ClauseExtraction,
    RiskAssessment,
    ValidationVerdict,
}

impl OutputSchema {
    pub fn name(&self) -> &'static str {
        match self {
            OutputSchema::ClauseExtraction => "clause_extraction",
            OutputSchema::RiskAssessment => "risk_assessment",
            OutputSchema::ValidationVerdict => "validation_verdict",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            OutputSchema::ClauseExtraction => CLAUSE_EXTRACTION_SCHEMA,
            OutputSchema::RiskAssessment => RISK_ASSESSMENT_SCHEMA,
            OutputSchema::ValidationVerdict => VALIDATION_VERDICT_SCHEMA,
        }
    }

    fn cell(&self) -> &'static Compiled {
        match self {
            OutputSchema::ClauseExtraction => &CLAUSE_EXTRACTION,
            OutputSchema::RiskAssessment => &RISK_ASSESSMENT,
            OutputSchema::ValidationVerdict => &VALIDATION_VERDICT,
        }
    }
}

impl fmt::Display for OutputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Get or initialize the compiled validator for `schema`.
fn get_validator(schema: OutputSchema) -> Result<&'static jsonschema::Validator, String> {
    let result = schema.cell().get_or_init(|| {
        let value: serde_json::Value = serde_json::from_str(schema.source())
            .map_err(|e| format!("Invalid {} schema JSON: {}", schema, e))?;
        jsonschema::options()
            .build(&value)
            .map_err(|e| format!("Failed to compile {} schema: {}", schema, e))
    });

    result.as_ref().map_err(|e| e.clone())
}

/// Validate an agent's JSON output.
///
/// Returns every violation as "message at /instance/path".
pub fn validate_output(schema: OutputSchema, value: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator(schema).map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_schemas_compile() {
        for schema in [
            OutputSchema::ClauseExtraction,
            OutputSchema::RiskAssessment,
            OutputSchema::ValidationVerdict,
        ] {
            assert!(get_validator(schema).is_ok(), "{} failed to compile", schema);
        }
    }

    #[test]
    fn test_valid_extraction_passes() {
        let value = json!({
            "clauses": [{
                "clause_type": "termination",
                "title": "Termination",
                "text": "Either party may terminate.",
                "section_reference": "Section 9"
            }],
            "contract_type": "NDA",
            "parties": ["Acme", "Beta"],
            "effective_date": null
        });
        assert!(validate_output(OutputSchema::ClauseExtraction, &value).is_ok());
    }

    #[test]
    fn test_missing_text_fails() {
        let value = json!({ "clauses": [{ "clause_type": "payment" }] });
        let errors = validate_output(OutputSchema::ClauseExtraction, &value).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("text")));
    }

    #[test]
    fn test_bad_risk_level_fails() {
        let value = json!({
            "assessments": [{
                "clause_id": "C1",
                "risk_level": "catastrophic",
                "risk_reasoning": "?"
            }]
        });
        assert!(validate_output(OutputSchema::RiskAssessment, &value).is_err());
    }

    #[test]
    fn test_verdict_requires_boolean() {
        let value = json!({ "is_contract": "yes", "reasoning": "looks legal" });
        assert!(validate_output(OutputSchema::ValidationVerdict, &value).is_err());
    }
}
