//! Defensive parsing of model output.
//!
//! The model is asked for bare JSON but often wraps it in a fenced code block,
//! prefixes a `json` language tag, or returns something that is not JSON at
//! all. [`parse_model_payload`] peels those layers off and coerces the fields
//! it finds; callers degrade a [`ParseFailure`] to an empty payload.

use crate::models::TeeTimeSlot;
use serde_json::{Map, Value};
use std::fmt;

const FENCE: &str = "```";

/// Why a model response could not be read as a structured payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// Nothing left after trimming and unwrapping.
    Empty,
    /// The candidate text is not valid JSON.
    InvalidJson(String),
    /// Valid JSON, but not an object.
    NotAnObject,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty response"),
            Self::InvalidJson(e) => write!(f, "invalid JSON: {e}"),
            Self::NotAnObject => write!(f, "JSON is not an object"),
        }
    }
}

impl std::error::Error for ParseFailure {}

/// Fields recovered from a model response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelPayload {
    /// Non-blank summary, trimmed.
    pub summary: Option<String>,
    pub tee_times: Vec<TeeTimeSlot>,
    pub warnings: Vec<String>,
}

/// Strip fences and a leading language tag, leaving the JSON candidate.
pub fn extract_candidate(raw: &str) -> &str {
    let mut candidate = raw.trim();

    if candidate.contains(FENCE) {
        let parts: Vec<&str> = candidate.split(FENCE).collect();
        candidate = if parts.len() >= 3 {
            parts[1]
        } else {
            parts[parts.len() - 1]
        };
    }
    candidate = candidate.trim();

    if candidate
        .get(..4)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("json"))
    {
        candidate = candidate[4..].trim();
    }
    candidate
}

/// Parse raw model text into a [`ModelPayload`].
pub fn parse_model_payload(raw: &str) -> Result<ModelPayload, ParseFailure> {
    let candidate = extract_candidate(raw);
    if candidate.is_empty() {
        return Err(ParseFailure::Empty);
    }

    let value: Value =
        serde_json::from_str(candidate).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(payload_from_object(&map)),
        _ => Err(ParseFailure::NotAnObject),
    }
}

fn payload_from_object(map: &Map<String, Value>) -> ModelPayload {
    let summary = match map.get("summary") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    };

    let tee_times = match map.get("tee_times") {
        Some(Value::Array(items)) => items.iter().filter_map(slot_from_value).collect(),
        _ => Vec::new(),
    };

    let warnings = match map.get("warnings") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(scalar_text)
            .filter(|w| !w.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    ModelPayload {
        summary,
        tee_times,
        warnings,
    }
}

/// Build a slot from one `tee_times` entry; entries without a time are dropped.
fn slot_from_value(value: &Value) -> Option<TeeTimeSlot> {
    let item = value.as_object()?;
    let time = item.get("time").and_then(scalar_text)?;
    if time.is_empty() {
        return None;
    }

    Some(TeeTimeSlot {
        time,
        status: item.get("status").and_then(scalar_text).unwrap_or_default(),
        available_slots: item.get("available_slots").and_then(coerce_int),
        is_bookable: item.get("is_bookable").is_some_and(coerce_bool),
        notes: match item.get("notes") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        },
    })
}

/// Trimmed text of a string or number; `None` for null, bools and containers.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Best-effort integer coercion.
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Best-effort boolean coercion; anything unrecognised is `false`.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "1" | "bookable"
        ),
        _ => false,
    }
}
