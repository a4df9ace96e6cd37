use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::error::ValidationError;

pub const DEFAULT_TOP_K: u32 = 6;
pub const MIN_TOP_K: u32 = 1;
pub const MAX_TOP_K: u32 = 25;

/// Jurisdiction levels a search (or an ingested document) may be scoped to.
pub const JURISDICTIONS: [&str; 4] = ["federal", "state", "county", "municipal"];

/// A validated search against the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
}

impl SearchRequest {
    /// Build a request from tool-call arguments (`query`, `top_k`, `jurisdiction`).
    pub fn from_args(args: &Map<String, Value>) -> Result<Self, ValidationError> {
        let query = normalize_query(args.get("query"))?;
        let top_k = parse_top_k(args.get("top_k").or_else(|| args.get("topK")))?;
        let jurisdiction = match args.get("jurisdiction") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => normalize_jurisdiction(raw)?,
            Some(other) => {
                return Err(ValidationError::new(
                    "jurisdiction",
                    format!("must be a string, got {other}"),
                ));
            }
        };
        Ok(Self {
            query,
            top_k,
            jurisdiction,
        })
    }
}

fn normalize_query(value: Option<&Value>) -> Result<String, ValidationError> {
    match value {
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                Err(ValidationError::new("query", "must not be empty"))
            } else {
                Ok(trimmed.to_string())
            }
        }
        None | Some(Value::Null) => Err(ValidationError::new("query", "is required")),
        Some(_) => Err(ValidationError::new("query", "must be a string")),
    }
}

/// Out-of-range integers are clamped into [MIN_TOP_K, MAX_TOP_K].
fn parse_top_k(value: Option<&Value>) -> Result<u32, ValidationError> {
    let Some(value) = value else {
        return Ok(DEFAULT_TOP_K);
    };
    if value.is_null() {
        return Ok(DEFAULT_TOP_K);
    }
    let parsed = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or_else(|| ValidationError::new("top_k", "must be an integer"))?;
    Ok(parsed.clamp(MIN_TOP_K as i64, MAX_TOP_K as i64) as u32)
}

/// Blank input counts as "no restriction"; anything else must be a known level.
pub fn normalize_jurisdiction(raw: &str) -> Result<Option<String>, ValidationError> {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Ok(None);
    }
    if JURISDICTIONS.contains(&normalized.as_str()) {
        Ok(Some(normalized))
    } else {
        Err(ValidationError::new(
            "jurisdiction",
            format!(
                "'{}' is not one of: {}",
                raw.trim(),
                JURISDICTIONS.join(", ")
            ),
        ))
    }
}
