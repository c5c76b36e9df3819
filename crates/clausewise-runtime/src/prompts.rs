//! System prompts for the model-backed agents.
//!
//! Laid out for prompt caching:
//! 1. Base prompt (shared across all roles) - cached
//! 2. Role prompt - cached
//! 3. Document content - not cached

use clausewise_core::{Clause, ContractProfile, RiskFinding, RiskOverview};

use crate::agents::AgentRole;

/// Longest document excerpt sent to a model, in bytes.
pub const MAX_DOCUMENT_BYTES: usize = 120_000;

/// Base system prompt shared across all roles.
pub const BASE_SYSTEM_PROMPT: &str = r#"
You are one step of a contract analysis pipeline.

You receive the output of the previous step and produce the input of the next.
You analyse only the document you are given.
You do not invent clauses, parties, dates, or obligations.

## Ground Rules
1. Quote contract text exactly when asked for clause text
2. If something is not in the document, leave it out
3. Prefer specific, practical statements over generic legal disclaimers
4. When a JSON shape is specified, reply with that JSON object only
"#;

/// Parser / validator prompt.
pub const PARSER_PROMPT: &str = r#"
## Role: Document Validation

Confirm whether the extracted text is a legal contract and identify its type
(NDA, MSA, Employment, SaaS, Lease, etc.). If the text is clearly not a
contract, say so.

## Output Format (JSON)
{
  "is_contract": true | false,
  "contract_type": "string or null",
  "reasoning": "one or two sentences"
}
"#;

/// Clause extractor prompt.
pub const CLAUSE_EXTRACTOR_PROMPT: &str = r#"
## Role: Clause Extraction

Extract these clause types if present:
termination, liability, confidentiality, payment, indemnification,
governing_law, force_majeure, warranties, assignment, intellectual_property,
data_protection, non_compete, dispute_resolution. Anything else is "other".

For each clause found give its type, a short title, the full clause text
copied verbatim, and the section reference (e.g. "Section 5.2").

Also identify the parties, the contract type and the effective date.

If a clause type is not present in the contract, do not fabricate one.

## Output Format (JSON)
{
  "clauses": [
    {
      "clause_type": "termination",
      "title": "Termination for Convenience",
      "text": "exact text from the document",
      "section_reference": "Section 9.1"
    }
  ],
  "contract_type": "string or null",
  "parties": ["Party A", "Party B"],
  "effective_date": "string or null"
}
"#;

/// Risk assessor prompt.
pub const RISK_ASSESSOR_PROMPT: &str = r#"
## Role: Risk Assessment

Assess every clause you are given, exactly once, keyed by its clause_id.

Risk levels:
- low: standard market terms, balanced obligations
- medium: slightly one-sided terms, minor gaps, or ambiguous language
- high: heavily one-sided, unusually broad scope, missing critical
  protections, or potentially unenforceable terms

For each clause list the specific concerns and recommend an action
(accept as-is, negotiate, seek legal review).

Also list clause types that would normally be expected in this kind of
contract but are absent, give an overall rating, and summarise the main
risk themes.

## Output Format (JSON)
{
  "assessments": [
    {
      "clause_id": "C1",
      "risk_level": "low" | "medium" | "high",
      "risk_reasoning": "why this level",
      "key_concerns": ["specific issue"],
      "recommendation": "what to do"
    }
  ],
  "overall_risk": "low" | "medium" | "high",
  "missing_clauses": ["force_majeure"],
  "summary_of_concerns": "main risk themes"
}
"#;

/// Summariser prompt.
pub const SUMMARISER_PROMPT: &str = r#"
## Role: Executive Summary

Write a clear, actionable summary of the analysis for a non-technical
decision maker, in Markdown, with these sections:

1. **Contract Overview**: contract type, parties, effective date
2. **Key Findings**: the most important clauses and what they mean
3. **Risk Highlights**: top risks by severity, in plain English
4. **Missing Protections**: expected clauses that are absent
5. **Recommended Actions**: prioritised next steps, naming sections

Be direct and specific. Keep it under 500 words. Reply with the summary
text only, no JSON.
"#;

/// Role-specific prompt.
pub fn role_prompt(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Parser => PARSER_PROMPT,
        AgentRole::ClauseExtractor => CLAUSE_EXTRACTOR_PROMPT,
        AgentRole::RiskAssessor => RISK_ASSESSOR_PROMPT,
        AgentRole::Summariser => SUMMARISER_PROMPT,
    }
}

/// Full system prompt for a role.
pub fn system_prompt(role: AgentRole) -> String {
    format!("{}\n{}", BASE_SYSTEM_PROMPT.trim(), role_prompt(role))
}

/// Cut `text` to at most `MAX_DOCUMENT_BYTES` on a char boundary.
pub fn excerpt(text: &str) -> &str {
    if text.len() <= MAX_DOCUMENT_BYTES {
        return text;
    }
    let mut end = MAX_DOCUMENT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

pub fn validation_context(text: &str) -> String {
    format!("## Extracted Text\n\n{}", excerpt(text))
}

pub fn extraction_context(text: &str) -> String {
    format!("## Contract Text\n\n{}", excerpt(text))
}

pub fn risk_context(clauses: &[Clause], profile: Option<&ContractProfile>) -> String {
    let mut out = String::new();
    if let Some(kind) = profile.and_then(|p| p.contract_type.as_deref()) {
        out.push_str(&format!("Contract type: {}\n\n", kind));
    }
    out.push_str("## Clauses\n");
    for clause in clauses {
        out.push_str(&format!(
            "\n### {} [{}] {}\n{}\n",
            clause.id, clause.clause_type, clause.title, clause.text
        ));
    }
    out
}

pub fn summary_context(
    clauses: &[Clause],
    findings: &[RiskFinding],
    overview: Option<&RiskOverview>,
    profile: Option<&ContractProfile>,
) -> String {
    let mut out = String::new();
    if let Some(profile) = profile {
        out.push_str("## Contract\n");
        out.push_str(&format!(
            "Type: {}\nParties: {}\nEffective date: {}\n\n",
            profile.contract_type.as_deref().unwrap_or("unknown"),
            if profile.parties.is_empty() {
                "unknown".to_string()
            } else {
                profile.parties.join(", ")
            },
            profile.effective_date.as_deref().unwrap_or("not stated"),
        ));
    }

    out.push_str("## Clause Findings\n");
    for clause in clauses {
        let Some(finding) = findings.iter().find(|f| f.clause_id == clause.id) else {
            continue;
        };
        out.push_str(&format!(
            "\n- {} {} ({}): {} risk. {}",
            clause.id, clause.title, clause.clause_type, finding.severity, finding.rationale
        ));
        if !finding.concerns.is_empty() {
            let concerns: Vec<&str> = finding.concerns.iter().map(String::as_str).collect();
            out.push_str(&format!(" Concerns: {}.", concerns.join("; ")));
        }
        if let Some(rec) = &finding.recommendation {
            out.push_str(&format!(" Recommendation: {}", rec));
        }
    }

    if let Some(overview) = overview {
        out.push_str(&format!("\n\n## Overall\nOverall risk: {}\n", overview.overall));
        if !overview.missing_clauses.is_empty() {
            let missing: Vec<&str> = overview.missing_clauses.iter().map(|c| c.as_str()).collect();
            out.push_str(&format!("Missing clauses: {}\n", missing.join(", ")));
        }
        if !overview.summary_of_concerns.is_empty() {
            out.push_str(&overview.summary_of_concerns);
            out.push('\n');
        }
    }
    out
}
