//! Reasoner helpers
//!
//! Models rarely answer with bare JSON. [`parse_decision`] digs the first
//! usable decision object out of a reply that may wrap it in prose or a
//! markdown code fence.

pub mod ollama;

pub use ollama::OllamaReasoner;

use sdk::errors::EngineError;
use sdk::ports::{Decision, ReasonerContext};

/// Instructions sent ahead of every context
pub const SYSTEM_PROMPT: &str = r#"You control a computer to complete the user's task one action at a time.
Reply with a single JSON object and nothing else:
{"type": "<browser|app|system|keyboard|mouse|wait|done>", "params": {...}, "description": "<what this does>", "isFinal": <true if this action finishes the task>}
params per type:
  browser: {"url"?, "selector"?, "text"?}
  app: {"name", "args"?}
  system: {"command"}
  keyboard: {"text"?, "keys"?}
  mouse: {"x"?, "y"?, "button"?, "clicks"?}
  wait: {"duration_ms"?}
  done: {"summary"?}
Use "done" when the task is already complete."#;

/// Render the context as the user message for the reasoner
pub fn render_context(context: &ReasonerContext) -> Result<String, EngineError> {
    serde_json::to_string_pretty(context)
        .map_err(|e| EngineError::Reasoner(format!("failed to encode context: {}", e)))
}

/// Parse a model reply into a decision
///
/// Tries, in order: the whole reply as JSON, the body of the first code
/// fence, then every balanced `{...}` object in the text. The first object
/// carrying a `type` field wins.
pub fn parse_decision(content: &str) -> Result<Decision, EngineError> {
    let trimmed = content.trim();

    if let Some(decision) = try_parse_decision(trimmed) {
        return decision;
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(decision) = try_parse_decision(inner.trim()) {
            return decision;
        }
    }

    for (pos, _) in trimmed.match_indices('{') {
        if let Some(candidate) = extract_balanced_json(&trimmed[pos..]) {
            if let Some(decision) = try_parse_decision(candidate) {
                return decision;
            }
        }
    }

    Err(EngineError::ReasonerParse(preview(trimmed)))
}

/// `None` when `s` is not a JSON object with a `type` field
fn try_parse_decision(s: &str) -> Option<Result<Decision, EngineError>> {
    let json: serde_json::Value = serde_json::from_str(s).ok()?;
    json.get("type")?.as_str()?;
    Some(Decision::from_value(&json))
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start = fence_start + 3 + after_opening.find('\n')? + 1;
    let body_end = body_start + content[body_start..].find("```")?;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(s: &str) -> String {
    const LIMIT: usize = 120;
    match s.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}
