//! Shared detection patterns for the deterministic analysers.

use lazy_static::lazy_static;
use regex::Regex;

use crate::clause::ClauseType;
use crate::risk::Severity;

lazy_static! {
    // =========================================================================
    // STRUCTURE
    // =========================================================================

    /// Numbered heading: "1.", "4.2", "Section 7", "Article IV", "Clause 3:"
    /// Group 1 is the reference, group 2 the rest of the line.
    pub static ref NUMBERED_HEADING: Regex = Regex::new(
        r"^\s*((?i:section|article|clause)\s+[0-9IVXLCivxlc]+(?:\.\d+)*|\d+(?:\.\d+)*)[.):]?\s+(\S.*)$"
    ).unwrap();

    /// Stand-alone upper-case heading line: "CONFIDENTIALITY", "GOVERNING LAW:"
    pub static ref CAPS_HEADING: Regex = Regex::new(
        r"^\s*([A-Z][A-Z0-9 ,&/'-]{2,60}?)\s*:?\s*$"
    ).unwrap();

    /// Labelled clause line: "Termination clause: ...", "Governing law clause -"
    /// Group 1 is the label.
    pub static ref CLAUSE_LABEL: Regex = Regex::new(
        r"(?im)^\s*([A-Za-z][A-Za-z &/-]{1,48}?)\s+clause\s*[:.-]"
    ).unwrap();

    // =========================================================================
    // CONTRACT PROFILE
    // =========================================================================

    /// Vocabulary that marks legal-contract prose
    pub static ref CONTRACT_MARKERS: Regex = Regex::new(
        r"(?i)\b(agreement|contract|part(?:y|ies)|hereby|whereas|hereinafter|shall|terms and conditions|in witness whereof|effective date)\b"
    ).unwrap();

    /// "between Acme Corp ... and Beta LLC"
    pub static ref PARTIES: Regex = Regex::new(
        r"(?i)\bbetween\s+(.{2,80}?)(?:\s*\([^)]*\))?,?\s+and\s+(.{2,80}?)(?:\s*\([^)]*\))?\s*(?:,|\.|;|\n|$)"
    ).unwrap();

    /// "effective as of March 1, 2024", "Effective Date: 2024-03-01"
    pub static ref EFFECTIVE_DATE: Regex = Regex::new(
        r"(?i)effective(?:\s+date)?(?:\s+(?:as\s+of|on|from))?\s*:?\s*((?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4}|\d{1,2}\s+(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{4}|\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})"
    ).unwrap();

    /// Notice period such as "30 days" or "thirty (30) days"
    pub static ref NOTICE_PERIOD: Regex = Regex::new(
        r"(?i)\b\d+\)?\s*(?:business\s+|calendar\s+)?(?:days?|months?)\b"
    ).unwrap();

    /// Monetary cap language
    pub static ref LIABILITY_CAP: Regex = Regex::new(
        r"(?i)\b(shall not exceed|capped at|cap(?:ped)? on|limited to|maximum aggregate|in no event .{0,40}exceed)"
    ).unwrap();

    /// Known contract types, checked in order
    pub static ref CONTRACT_TYPES: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"(?i)\b(non-disclosure|nondisclosure|confidentiality)\s+agreement\b|\bNDA\b").unwrap(), "NDA"),
        (Regex::new(r"(?i)\bmaster\s+services?\s+agreement\b|\bMSA\b").unwrap(), "Master Services Agreement"),
        (Regex::new(r"(?i)\bemployment\s+(agreement|contract)\b").unwrap(), "Employment Agreement"),
        (Regex::new(r"(?i)\b(software\s+as\s+a\s+service|saas|subscription)\s+agreement\b").unwrap(), "SaaS Agreement"),
        (Regex::new(r"(?i)\b(lease|tenancy)\s+agreement\b").unwrap(), "Lease"),
        (Regex::new(r"(?i)\blicen[cs]e\s+agreement\b").unwrap(), "License Agreement"),
        (Regex::new(r"(?i)\b(consulting|independent\s+contractor)\s+agreement\b").unwrap(), "Consulting Agreement"),
        (Regex::new(r"(?i)\bservices?\s+agreement\b").unwrap(), "Services Agreement"),
        (Regex::new(r"(?i)\b(purchase|supply|sales?)\s+agreement\b").unwrap(), "Supply Agreement"),
    ];

    // =========================================================================
    // CLAUSE TYPES
    // =========================================================================

    /// Keyword pattern per clause type
    pub static ref CLAUSE_KEYWORDS: Vec<(ClauseType, Regex)> = vec![
        (ClauseType::Termination, Regex::new(r"(?i)\b(terminat\w*|expir\w*|cancell?\w*)").unwrap()),
        (ClauseType::Liability, Regex::new(r"(?i)\b(liabilit\w*|liable|consequential\s+damages|limitation\s+of)").unwrap()),
        (ClauseType::Confidentiality, Regex::new(r"(?i)\b(confidential\w*|non-disclosure|proprietary\s+information)").unwrap()),
        (ClauseType::Payment, Regex::new(r"(?i)\b(payments?|fees?|invoic\w*|price|compensation|remunerat\w*)\b").unwrap()),
        (ClauseType::Indemnification, Regex::new(r"(?i)\b(indemn\w*|hold\s+harmless)").unwrap()),
        (ClauseType::GoverningLaw, Regex::new(r"(?i)\b(governing\s+law|governed\s+by|laws\s+of|jurisdiction)").unwrap()),
        (ClauseType::ForceMajeure, Regex::new(r"(?i)\b(force\s+majeure|acts?\s+of\s+god|beyond\s+(?:its|their|the)\s+reasonable\s+control)").unwrap()),
        (ClauseType::Warranties, Regex::new(r"(?i)\b(warrant\w*|representations?)\b").unwrap()),
        (ClauseType::Assignment, Regex::new(r"(?i)\b(assign\w*|transfer\s+(?:this|its)\s+(?:agreement|rights))").unwrap()),
        (ClauseType::IntellectualProperty, Regex::new(r"(?i)\b(intellectual\s+property|copyrights?|patents?|trademarks?|work\s+product)").unwrap()),
        (ClauseType::DataProtection, Regex::new(r"(?i)\b(personal\s+data|data\s+protection|privacy|gdpr)").unwrap()),
        (ClauseType::NonCompete, Regex::new(r"(?i)\b(non-compet\w*|not\s+compete|solicit\w*)").unwrap()),
        (ClauseType::DisputeResolution, Regex::new(r"(?i)\b(arbitrat\w*|disputes?|mediat\w*)").unwrap()),
    ];

    // =========================================================================
    // RED FLAGS
    // =========================================================================

    /// Concern label, severity it implies, and the language that triggers it
    pub static ref RED_FLAGS: Vec<(&'static str, Severity, Regex)> = vec![
        ("unlimited liability", Severity::High, Regex::new(r"(?i)\b(unlimited|uncapped)\s+liabilit").unwrap()),
        ("indemnity for any and all claims", Severity::High, Regex::new(r"(?i)\bany\s+and\s+all\s+(claims|losses|damages|liabilit)").unwrap()),
        ("perpetual or irrevocable obligation", Severity::High, Regex::new(r"(?i)\b(perpetual|irrevocabl[ey]|in\s+perpetuity)\b").unwrap()),
        ("waiver of rights or remedies", Severity::High, Regex::new(r"(?i)\bwaives?\s+(any|all|its|their)\b").unwrap()),
        ("unilateral discretion", Severity::Medium, Regex::new(r"(?i)\b(sole|absolute)\s+discretion\b").unwrap()),
        ("action without notice", Severity::Medium, Regex::new(r"(?i)\bwithout\s+(prior\s+)?notice\b").unwrap()),
        ("automatic renewal", Severity::Medium, Regex::new(r"(?i)\bauto(matic(ally)?)?[\s-]*renew").unwrap()),
        ("non-refundable payments", Severity::Medium, Regex::new(r"(?i)\bnon-?refundable\b").unwrap()),
        ("unilateral amendment", Severity::Medium, Regex::new(r"(?i)\b(may|reserves\s+the\s+right\s+to)\s+(amend|modify|change)\s+(this|these|the)\b").unwrap()),
        ("exclusivity", Severity::Medium, Regex::new(r"(?i)\bexclusive(ly)?\b").unwrap()),
        ("penalty or liquidated damages", Severity::Medium, Regex::new(r"(?i)\b(penalt(y|ies)|liquidated\s+damages)\b").unwrap()),
        ("termination for convenience", Severity::Low, Regex::new(r"(?i)\bfor\s+(any\s+reason|convenience)\b").unwrap()),
    ];
}

/// Count distinct contract-marker words in `text`.
pub fn contract_marker_count(text: &str) -> usize {
    let mut seen: Vec<String> = CONTRACT_MARKERS
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    seen.sort();
    seen.dedup();
    seen.len()
}

/// Count distinct clause types named by "<label> clause:" lines in `text`.
pub fn labelled_clause_count(text: &str) -> usize {
    let mut kinds: Vec<ClauseType> = CLAUSE_LABEL
        .captures_iter(text)
        .filter_map(|caps| {
            let label = caps.get(1)?.as_str();
            CLAUSE_KEYWORDS
                .iter()
                .find(|(_, pattern)| pattern.is_match(label))
                .map(|(kind, _)| *kind)
        })
        .collect();
    kinds.sort();
    kinds.dedup();
    kinds.len()
}

/// First known contract type named in `text`.
pub fn detect_contract_type(text: &str) -> Option<&'static str> {
    CONTRACT_TYPES
        .iter()
        .find(|(pattern, _)| pattern.is_match(text))
        .map(|(_, name)| *name)
}

/// Red flags present in `text`, in declaration order.
pub fn red_flags(text: &str) -> Vec<(&'static str, Severity)> {
    RED_FLAGS
        .iter()
        .filter(|(_, _, pattern)| pattern.is_match(text))
        .map(|(label, severity, _)| (*label, *severity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_heading_forms() {
        let caps = NUMBERED_HEADING.captures("4.2 Termination for Cause").unwrap();
        assert_eq!(&caps[1], "4.2");
        assert_eq!(&caps[2], "Termination for Cause");

        let caps = NUMBERED_HEADING.captures("Section 7. Governing Law").unwrap();
        assert_eq!(&caps[1], "Section 7");

        assert!(NUMBERED_HEADING.captures("30 days after delivery").is_some());
        assert!(NUMBERED_HEADING.captures("The parties agree").is_none());
    }

    #[test]
    fn test_caps_heading() {
        assert!(CAPS_HEADING.is_match("CONFIDENTIALITY"));
        assert!(CAPS_HEADING.is_match("GOVERNING LAW:"));
        assert!(!CAPS_HEADING.is_match("Confidentiality"));
    }

    #[test]
    fn test_labelled_clauses_count_distinct_types() {
        let text = "Termination clause: either side may end it.\nConfidentiality clause: keep it secret.\nTermination clause - again.";
        assert_eq!(labelled_clause_count(text), 2);
        assert_eq!(labelled_clause_count("Santa clause: a festive pun."), 0);
        assert_eq!(labelled_clause_count("This clause: has no label type."), 0);
    }

    #[test]
    fn test_contract_type_detection() {
        assert_eq!(detect_contract_type("MUTUAL NON-DISCLOSURE AGREEMENT"), Some("NDA"));
        assert_eq!(
            detect_contract_type("This Master Services Agreement"),
            Some("Master Services Agreement")
        );
        assert_eq!(detect_contract_type("A shopping list"), None);
    }

    #[test]
    fn test_red_flags() {
        let flags = red_flags("Supplier may terminate at its sole discretion and without notice.");
        let labels: Vec<_> = flags.iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["unilateral discretion", "action without notice"]);
        assert!(red_flags("Either party may terminate on 30 days written notice.").is_empty());
    }

    #[test]
    fn test_effective_date() {
        let caps = EFFECTIVE_DATE
            .captures("This Agreement is effective as of March 1, 2024 between")
            .unwrap();
        assert_eq!(&caps[1], "March 1, 2024");

        let caps = EFFECTIVE_DATE.captures("Effective Date: 2024-03-01").unwrap();
        assert_eq!(&caps[1], "2024-03-01");
    }

    #[test]
    fn test_marker_count_is_distinct() {
        assert_eq!(contract_marker_count("shall shall SHALL"), 1);
        assert!(contract_marker_count("This Agreement is between the Parties, who hereby agree") >= 3);
    }
}
