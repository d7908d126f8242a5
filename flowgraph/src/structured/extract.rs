//! Text normalization ahead of strict JSON parsing.
//!
//! Models wrap JSON in prose and markdown fences; this strips the wrapping
//! and nothing else. Kept separate from validation so it stays small,
//! testable alone, and swappable if upstream formatting changes.

use serde_json::Value;

/// Returns the payload inside the first markdown code fence, or the
/// trimmed input when no fence is present. A `json` language tag after the
/// opening fence is dropped.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let mut body = &trimmed[start + 3..];
    if let Some(rest) = body.strip_prefix("json") {
        body = rest;
    }
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim()
}

/// Normalizes and parses one model response into JSON.
pub fn parse_payload(raw: &str) -> Result<Value, String> {
    let payload = strip_code_fences(raw);
    if payload.is_empty() {
        return Err("response contained no JSON payload".to_string());
    }
    serde_json::from_str(payload).map_err(|e| format!("invalid JSON: {e}"))
}
