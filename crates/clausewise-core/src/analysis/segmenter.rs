//! Deterministic clause segmentation.
//!
//! Splits extracted text into blocks at blank lines and heading lines, merges
//! bare headings into the body that follows, and classifies each block by
//! keyword weight. Unheaded blocks that match no clause type (preambles,
//! signature blocks) are dropped.

use crate::clause::{Clause, ClauseExtraction, ClauseId, ClauseType, ContractProfile, TextSpan};

use super::patterns::{
    detect_contract_type, CAPS_HEADING, CLAUSE_KEYWORDS, EFFECTIVE_DATE, NUMBERED_HEADING,
    PARTIES,
};

const HEADING_WEIGHT: usize = 3;
const MAX_TITLE_CHARS: usize = 80;
const PROFILE_WINDOW: usize = 2_000;

/// Heading recognised on the first line of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Heading {
    section: Option<String>,
    title: String,
}

/// Byte range of a block plus its first-line heading, if any.
#[derive(Debug, Clone)]
struct Block {
    start: usize,
    end: usize,
    lines: usize,
    heading: Option<Heading>,
}

/// Split `text` into clauses with spans into `text`.
pub fn segment_clauses(text: &str) -> ClauseExtraction {
    let blocks = merge_bare_headings(split_blocks(text));

    let mut clauses = Vec::new();
    for block in blocks {
        let body = &text[block.start..block.end];
        if block.lines == 1 && is_document_title(body) {
            continue;
        }
        let heading_text = block.heading.as_ref().map(|h| h.title.as_str()).unwrap_or("");
        let clause_type = classify(heading_text, body);

        if block.heading.is_none() && clause_type == ClauseType::Other {
            continue;
        }

        let id = ClauseId::sequential(clauses.len());
        let title = match &block.heading {
            Some(h) => h.title.clone(),
            None => default_title(clause_type),
        };

        let mut clause = Clause::new(id, clause_type, body)
            .with_title(title)
            .with_span(TextSpan::new(block.start, block.end));
        if let Some(section) = block.heading.and_then(|h| h.section) {
            clause = clause.with_section(section);
        }
        clauses.push(clause);
    }

    ClauseExtraction {
        clauses,
        profile: extract_profile(text),
    }
}

/// Contract type, parties and effective date from the opening of the text.
pub fn extract_profile(text: &str) -> ContractProfile {
    let window = prefix(text, PROFILE_WINDOW);

    let parties = PARTIES
        .captures(window)
        .map(|caps| {
            [caps.get(1), caps.get(2)]
                .into_iter()
                .flatten()
                .map(|m| clean_party(m.as_str()))
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default();

    ContractProfile {
        contract_type: detect_contract_type(window).map(str::to_string),
        parties,
        effective_date: EFFECTIVE_DATE
            .captures(window)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string()),
    }
}

/// Pick the clause type with the highest keyword weight.
pub fn classify(heading: &str, body: &str) -> ClauseType {
    let mut best = (ClauseType::Other, 0usize);
    for (clause_type, pattern) in CLAUSE_KEYWORDS.iter() {
        let score = pattern.find_iter(heading).count() * HEADING_WEIGHT
            + pattern.find_iter(body).count();
        if score > best.1 {
            best = (*clause_type, score);
        }
    }
    best.0
}

fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        let trimmed = line.trim();
        if trimmed.is_empty() {
            blocks.extend(current.take());
            continue;
        }

        let heading = parse_heading(trimmed);
        if heading.is_some() {
            blocks.extend(current.take());
        }

        let content_start = line_start + (line.len() - line.trim_start().len());
        let content_end = line_start + line.trim_end().len();

        match current.as_mut() {
            Some(block) => {
                block.end = content_end;
                block.lines += 1;
            }
            None => {
                current = Some(Block {
                    start: content_start,
                    end: content_end,
                    lines: 1,
                    heading,
                });
            }
        }
    }
    blocks.extend(current);
    blocks
}

/// Fold a one-line heading block into the block after it.
fn merge_bare_headings(blocks: Vec<Block>) -> Vec<Block> {
    let mut merged: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks {
        let absorb = merged
            .last()
            .is_some_and(|prev| prev.lines == 1 && prev.heading.is_some() && block.heading.is_none());
        match merged.last_mut() {
            Some(prev) if absorb => {
                prev.end = block.end;
                prev.lines += block.lines;
            }
            _ => merged.push(block),
        }
    }
    merged
}

fn parse_heading(line: &str) -> Option<Heading> {
    if let Some(caps) = NUMBERED_HEADING.captures(line) {
        let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        if rest.chars().next().is_some_and(char::is_uppercase) {
            return Some(Heading {
                section: caps.get(1).map(|m| m.as_str().to_string()),
                title: title_from(rest),
            });
        }
        return None;
    }

    if is_document_title(line) {
        return None;
    }

    CAPS_HEADING.captures(line).and_then(|caps| {
        let raw = caps.get(1)?.as_str().trim();
        // single short tokens like "AND" or "USA" are not headings
        (raw.len() >= 5).then(|| Heading {
            section: None,
            title: title_case(raw),
        })
    })
}

/// Upper-case line naming the agreement itself, e.g. "MASTER SERVICES AGREEMENT".
fn is_document_title(line: &str) -> bool {
    CAPS_HEADING.is_match(line) && (line.contains("AGREEMENT") || line.contains("CONTRACT"))
}

/// Heading text up to the first sentence break.
fn title_from(rest: &str) -> String {
    let cut = rest
        .find(['.', ':', ';'])
        .unwrap_or(rest.len());
    let title = rest[..cut].trim();
    if title.chars().count() <= MAX_TITLE_CHARS {
        title.to_string()
    } else {
        let short: String = title.chars().take(MAX_TITLE_CHARS).collect();
        format!("{}...", short.trim_end())
    }
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn default_title(clause_type: ClauseType) -> String {
    title_case(&clause_type.as_str().replace('_', " "))
}

fn clean_party(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == ',' || c.is_whitespace())
        .trim_start_matches("the ")
        .to_string()
}

fn prefix(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
