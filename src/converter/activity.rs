//! Parsing helpers for coarse-grained activity events.
//!
//! Activity snapshots describe a tool call with free text only: a title such
//! as `Running grep` and a description such as `pattern: "TODO" limit: 5`.
//! These helpers recover a tool name and structured arguments from that text,
//! and recognise the patch that marks an activity as done.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Number, Value};

/// Icon values that mark an activity as completed.
const DONE_ICONS: &[&str] = &[
    "✓", "✅", "✔", "done", "check", "complete", "completed", "success",
];

/// Patch paths whose string value is used as the result text.
const RESULT_TEXT_PATHS: &[&str] = &["result", "output", "description", "title"];

fn running_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^Running\s+(.+?)(?:\s*(?:\.\.\.|…))?$").expect("valid regex")
    })
}

fn completed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.+?)\s+completed$").expect("valid regex"))
}

fn argument_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_.-]*):\s*("(?:[^"\\]|\\.)*"|'[^']*'|\S+)"#)
            .expect("valid regex")
    })
}

/// Derives a tool name from an activity title.
///
/// `Running X` → `X`, `X completed` → `X`, anything else verbatim.
pub fn tool_name_from_title(title: &str) -> String {
    let title = title.trim();
    if let Some(caps) = running_pattern().captures(title) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = completed_pattern().captures(title) {
        return caps[1].trim().to_string();
    }
    title.to_string()
}

/// Derives tool arguments from a `key: value key2: value2` description.
///
/// Quoted strings, booleans and numeric literals are coerced to their JSON
/// types; bare words stay strings. A description without any `key:` token is
/// returned as `{"description": <text>}`.
pub fn tool_args_from_description(description: Option<&str>) -> Value {
    let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Value::Object(Map::new());
    };

    let mut args = Map::new();
    for caps in argument_pattern().captures_iter(description) {
        args.insert(caps[1].to_string(), coerce_value(&caps[2]));
    }

    if args.is_empty() {
        json!({ "description": description })
    } else {
        Value::Object(args)
    }
}

fn coerce_value(token: &str) -> Value {
    if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
        return serde_json::from_str::<String>(token)
            .map(Value::String)
            .unwrap_or_else(|_| Value::String(token[1..token.len() - 1].to_string()));
    }
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        return Value::String(token[1..token.len() - 1].to_string());
    }
    match token {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = token.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(number) = token.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(token.to_string())
}

/// Returns true if any patch entry sets a done icon.
///
/// Entries are JSON Patch operations (`{"op", "path", "value"}`) targeting an
/// `icon` path, or plain objects carrying an `icon` field.
pub fn patch_signals_completion(patch: &[Value]) -> bool {
    patch.iter().any(|entry| {
        let icon = match entry.get("path").and_then(Value::as_str) {
            Some(path) if last_segment(path) == "icon" => entry.get("value"),
            Some(_) => None,
            None => entry.get("icon"),
        };
        icon.and_then(Value::as_str)
            .map(|icon| is_done_icon(icon.trim()))
            .unwrap_or(false)
    })
}

/// Picks a human-readable result text out of a completion patch.
pub fn result_text_from_patch(patch: &[Value]) -> Option<String> {
    RESULT_TEXT_PATHS.iter().find_map(|wanted| {
        patch.iter().find_map(|entry| {
            let path = entry.get("path").and_then(Value::as_str)?;
            if last_segment(path) != *wanted {
                return None;
            }
            entry
                .get("value")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    })
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_done_icon(icon: &str) -> bool {
    DONE_ICONS
        .iter()
        .any(|done| done.eq_ignore_ascii_case(icon))
}
