//! Best-effort conversion of free-form model output into citation records.
//!
//! The model is asked for a fenced JSON array, but answers drift: sometimes the
//! array is bare, sometimes wrapped in an object, sometimes the model ignores
//! the format and writes prose. Heuristics run in a fixed order and the first
//! one that produces JSON objects wins; the line scanner is the last resort.
//! Extraction never fails: unusable input yields an empty list.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// A pointer into a source document returned as search evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Citation {
    pub filename: Option<String>,
    /// Page, location or section label
    pub section: Option<String>,
    /// Excerpt text
    pub snippet: Option<String>,
}

impl Citation {
    /// Kept only when it names a document and points somewhere inside it.
    pub fn is_valid(&self) -> bool {
        self.filename.is_some() && (self.section.is_some() || self.snippet.is_some())
    }
}

const FILENAME_KEYS: [&str; 6] = ["filename", "file", "file_name", "name", "document", "source"];
const SECTION_KEYS: [&str; 4] = ["section", "page", "location", "loc"];
const SNIPPET_KEYS: [&str; 4] = ["snippet", "text", "excerpt", "quote"];

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```\s*json[^\n]*\n(.*?)```").expect("valid fence regex"));

static DOCUMENT_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:document|source|file(?:name)?)\s*:\s*(.+)$").expect("valid label regex")
});

static FILENAME_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)[^\s"'`*()\[\],;:]+\.(?:pdf|docx?|txt|md|rtf|html?|csv|xlsx|pptx)\b"#)
        .expect("valid filename token regex")
});

static TRAILING_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)([^\s"'`*()\[\]]+\.(?:pdf|docx?|txt|md|rtf|html?|csv|xlsx|pptx))[\s"'`*)\].,;]*$"#,
    )
    .expect("valid filename regex")
});

static SECTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Section|Article|Chapter|SECTION|ARTICLE|CHAPTER)\b")
        .expect("valid section regex")
});

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•]+|\d+[.)])\s+").expect("valid list marker regex"));

static SNIPPET_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:snippet|excerpt|quote|text)\s*:\s*").expect("valid snippet label regex")
});

static SECTION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:section|location|page)\s*:\s*").expect("valid section label regex")
});

/// Parse raw model output into citations, in order of appearance.
pub fn extract_citations(raw: &str) -> Vec<Citation> {
    let candidates = fenced_block(raw)
        .or_else(|| bracketed_array(raw))
        .or_else(|| parse_candidates(raw.trim()));

    let citations = match candidates {
        Some(objects) => objects.iter().map(citation_from_object).collect(),
        None => scan_lines(raw),
    };

    citations.into_iter().filter(Citation::is_valid).collect()
}

fn fenced_block(raw: &str) -> Option<Vec<Map<String, Value>>> {
    FENCED_JSON
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| parse_candidates(body.as_str().trim()))
}

fn bracketed_array(raw: &str) -> Option<Vec<Map<String, Value>>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end <= start {
        return None;
    }
    parse_candidates(&raw[start..=end])
}

/// Succeeds only when the JSON holds at least one object to map.
fn parse_candidates(text: &str) -> Option<Vec<Map<String, Value>>> {
    if text.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(text).ok()?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("citations") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };
    let objects: Vec<Map<String, Value>> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    if objects.is_empty() { None } else { Some(objects) }
}

fn citation_from_object(obj: &Map<String, Value>) -> Citation {
    Citation {
        filename: first_alias(obj, &FILENAME_KEYS),
        section: first_alias(obj, &SECTION_KEYS),
        snippet: first_alias(obj, &SNIPPET_KEYS),
    }
}

fn first_alias(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| scalar_text(obj.get(*key)?))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn scan_lines(raw: &str) -> Vec<Citation> {
    let mut found = Vec::new();
    let mut current = Citation::default();

    for line in raw.lines() {
        let line = LIST_MARKER.replace(line.trim(), "");
        let line = strip_emphasis(&line);
        if line.is_empty() || is_structural(line) {
            continue;
        }

        if let Some((filename, section)) = filename_in_line(line) {
            let previous = std::mem::take(&mut current);
            if previous.filename.is_some() {
                found.push(previous);
            }
            current.filename = Some(filename);
            current.section = section;
            continue;
        }

        if SECTION_LINE.is_match(line) {
            current.section = non_empty(&SECTION_LABEL.replace(line, ""));
            continue;
        }

        let text = SNIPPET_LABEL.replace(line, "");
        let text = text.trim().trim_matches('"').trim();
        if text.is_empty() {
            continue;
        }
        current.snippet = Some(match current.snippet.take() {
            Some(existing) => format!("{existing} {text}"),
            None => text.to_string(),
        });
    }

    if current.filename.is_some() {
        found.push(current);
    }
    found
}

fn strip_emphasis(line: &str) -> &str {
    line.trim_matches(|c| c == '*' || c == '_').trim()
}

fn is_structural(line: &str) -> bool {
    if line.starts_with("```") {
        return true;
    }
    if line.chars().all(|c| matches!(c, '-' | '=' | '*' | '_' | '#')) {
        return true;
    }
    // Bare headings such as "Citations:" or "## Sources"
    let heading = line.trim_start_matches('#').trim();
    line.starts_with('#') || (heading.ends_with(':') && !heading.contains(' '))
}

/// Filename named on a line, plus a section reference that follows it on the
/// same line ("Source: zoning.pdf, Section 4.2").
fn filename_in_line(line: &str) -> Option<(String, Option<String>)> {
    if let Some(caps) = DOCUMENT_LABEL.captures(line) {
        let value = caps.get(1)?.as_str();
        let value = value
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*'))
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';'))
            .trim();
        if TRAILING_FILENAME.is_match(value) {
            return non_empty(value).map(|filename| (filename, None));
        }
        if let Some(token) = FILENAME_TOKEN.find(value) {
            let section = trailing_section(&value[token.end()..]);
            return Some((token.as_str().to_string(), section));
        }
        return non_empty(value).map(|filename| (filename, None));
    }
    TRAILING_FILENAME
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| (m.as_str().to_string(), None))
}

fn trailing_section(rest: &str) -> Option<String> {
    let start = SECTION_LINE.find(rest)?.start();
    non_empty(rest[start..].trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ')')))
}
