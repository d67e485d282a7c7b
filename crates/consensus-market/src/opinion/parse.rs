//! Reading structured opinions out of model text

use consensus_core::{Direction, Timeframe};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static FENCED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok());

/// Direction, confidence and rationale read from a response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOpinion {
    pub direction: Direction,
    pub confidence: f64,
    pub rationale: String,
}

/// Find the first JSON object in `text`
///
/// Accepts a bare document, a fenced code block, or an object embedded in
/// free text. A top-level array yields its first object.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    let candidates = [
        Some(trimmed),
        FENCED
            .as_ref()
            .and_then(|re| re.captures(trimmed))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim()),
        embedded_object(trimmed),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .find_map(|value| match value {
            Value::Object(_) => Some(value),
            Value::Array(items) => items.into_iter().find(Value::is_object),
            _ => None,
        })
}

fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Pick the entry for `timeframe` when the model answered for several
fn select_for_timeframe(text: &str, timeframe: Timeframe) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        let matching = items.iter().find(|item| {
            item.get("timeframe")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Timeframe>().ok())
                == Some(timeframe)
        });
        if let Some(item) = matching {
            return Some(item.clone());
        }
    }
    extract_json(text)
}

/// Parse a number or numeric string, tolerating a trailing percent sign
fn read_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

/// Normalize a confidence to `[0, 1]`; values in `(1, 100]` are percentages
pub fn normalize_confidence(raw: f64) -> Result<f64, String> {
    if !raw.is_finite() || raw < 0.0 {
        return Err(format!("confidence {raw} is out of range"));
    }
    if raw <= 1.0 {
        Ok(raw)
    } else if raw <= 100.0 {
        Ok(raw / 100.0)
    } else {
        Err(format!("confidence {raw} is out of range"))
    }
}

fn text_field(object: &Value, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    }
}

fn rationale(object: &Value) -> String {
    let sections: Vec<String> = [
        ("Technical", "technical_analysis"),
        ("Sentiment", "sentiment_analysis"),
        ("Key factors", "key_factors"),
    ]
    .iter()
    .filter_map(|(label, key)| text_field(object, key).map(|text| format!("{label}: {text}")))
    .collect();

    if sections.is_empty() {
        text_field(object, "rationale")
            .or_else(|| text_field(object, "reasoning"))
            .unwrap_or_default()
    } else {
        sections.join("\n")
    }
}

/// Parse a model response into an opinion for `timeframe`
pub fn parse_opinion(text: &str, timeframe: Timeframe) -> Result<ParsedOpinion, String> {
    let object = select_for_timeframe(text, timeframe)
        .ok_or_else(|| "response contains no JSON object".to_string())?;

    let label = ["prediction_label", "direction", "prediction"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .ok_or_else(|| "missing prediction_label".to_string())?;
    let direction = label.parse::<Direction>()?;

    let raw = ["signal_strength", "confidence"]
        .iter()
        .find_map(|key| object.get(*key))
        .ok_or_else(|| "missing signal_strength".to_string())?;
    let confidence = read_number(raw)
        .ok_or_else(|| format!("signal_strength {raw} is not a number"))
        .and_then(normalize_confidence)?;

    Ok(ParsedOpinion {
        direction,
        confidence,
        rationale: rationale(&object),
    })
}
