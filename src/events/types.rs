//! AG-UI style wire events describing a live agent run.
//!
//! Events arrive as JSON objects tagged by `type`. Field names are camelCase
//! on the wire. Every event may carry a `timestamp` in milliseconds since the
//! Unix epoch; timestamps are non-decreasing per sub-stream but interleaved
//! sub-streams (text, tools, thinking) can arrive out of order relative to
//! each other.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Title and description of a coarse-grained activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityContent {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single wire event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum RawEvent {
    #[serde(rename = "RUN_STARTED")]
    RunStarted {
        #[serde(default)]
        run_id: String,
        #[serde(default)]
        thread_id: String,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "RUN_FINISHED")]
    RunFinished {
        run_id: Option<String>,
        thread_id: Option<String>,
        result: Option<Value>,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "RUN_ERROR")]
    RunError {
        #[serde(default, deserialize_with = "lenient_text")]
        message: String,
        #[serde(default, deserialize_with = "lenient_opt_text")]
        code: Option<String>,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "TEXT_MESSAGE_START")]
    TextMessageStart {
        message_id: String,
        role: Option<String>,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "TEXT_MESSAGE_CONTENT")]
    TextMessageContent {
        message_id: String,
        #[serde(default, deserialize_with = "lenient_text")]
        delta: String,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "TEXT_MESSAGE_END")]
    TextMessageEnd {
        message_id: String,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "TOOL_CALL_START")]
    ToolCallStart {
        tool_call_id: String,
        tool_call_name: String,
        parent_message_id: Option<String>,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "TOOL_CALL_ARGS")]
    ToolCallArgs {
        tool_call_id: String,
        #[serde(default, deserialize_with = "lenient_text")]
        delta: String,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "TOOL_CALL_END")]
    ToolCallEnd {
        tool_call_id: String,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "TOOL_CALL_RESULT")]
    ToolCallResult {
        tool_call_id: String,
        #[serde(default, deserialize_with = "lenient_text")]
        content: String,
        message_id: Option<String>,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "ACTIVITY_SNAPSHOT")]
    ActivitySnapshot {
        message_id: String,
        activity_type: Option<String>,
        #[serde(default)]
        content: ActivityContent,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "ACTIVITY_DELTA")]
    ActivityDelta {
        message_id: String,
        activity_type: Option<String>,
        #[serde(default)]
        patch: Vec<Value>,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "THINKING_START")]
    ThinkingStart {
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "THINKING_END")]
    ThinkingEnd {
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "THINKING_TEXT_MESSAGE_START")]
    ThinkingTextStart {
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "THINKING_TEXT_MESSAGE_CONTENT")]
    ThinkingTextContent {
        #[serde(default, deserialize_with = "lenient_text")]
        delta: String,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    #[serde(rename = "THINKING_TEXT_MESSAGE_END")]
    ThinkingTextEnd {
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<i64>,
    },

    /// Any event kind the converter does not model.
    #[serde(other)]
    Unknown,
}

/// Text payloads that arrive as other JSON values keep their JSON text.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_text(deserializer)?.unwrap_or_default())
}

fn lenient_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

/// Milliseconds; fractional and numeric-string values are truncated, anything
/// else reads as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|ms| ms as i64)),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok().map(|ms| ms as i64),
        _ => None,
    })
}

impl RawEvent {
    /// Decodes a JSON record into an event.
    ///
    /// Records that carry a known `type` but are missing required fields
    /// yield `None`; unknown types decode to [`RawEvent::Unknown`]. Text
    /// payloads and timestamps of the wrong JSON type are coerced rather
    /// than rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match serde_json::from_value(value) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable agent event");
                None
            }
        }
    }

    /// The event's own timestamp, if it carried one.
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            RawEvent::RunStarted { timestamp, .. }
            | RawEvent::RunFinished { timestamp, .. }
            | RawEvent::RunError { timestamp, .. }
            | RawEvent::TextMessageStart { timestamp, .. }
            | RawEvent::TextMessageContent { timestamp, .. }
            | RawEvent::TextMessageEnd { timestamp, .. }
            | RawEvent::ToolCallStart { timestamp, .. }
            | RawEvent::ToolCallArgs { timestamp, .. }
            | RawEvent::ToolCallEnd { timestamp, .. }
            | RawEvent::ToolCallResult { timestamp, .. }
            | RawEvent::ActivitySnapshot { timestamp, .. }
            | RawEvent::ActivityDelta { timestamp, .. }
            | RawEvent::ThinkingStart { timestamp }
            | RawEvent::ThinkingEnd { timestamp }
            | RawEvent::ThinkingTextStart { timestamp }
            | RawEvent::ThinkingTextContent { timestamp, .. }
            | RawEvent::ThinkingTextEnd { timestamp } => *timestamp,
            RawEvent::Unknown => None,
        }
    }

    /// Wire name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            RawEvent::RunStarted { .. } => "RUN_STARTED",
            RawEvent::RunFinished { .. } => "RUN_FINISHED",
            RawEvent::RunError { .. } => "RUN_ERROR",
            RawEvent::TextMessageStart { .. } => "TEXT_MESSAGE_START",
            RawEvent::TextMessageContent { .. } => "TEXT_MESSAGE_CONTENT",
            RawEvent::TextMessageEnd { .. } => "TEXT_MESSAGE_END",
            RawEvent::ToolCallStart { .. } => "TOOL_CALL_START",
            RawEvent::ToolCallArgs { .. } => "TOOL_CALL_ARGS",
            RawEvent::ToolCallEnd { .. } => "TOOL_CALL_END",
            RawEvent::ToolCallResult { .. } => "TOOL_CALL_RESULT",
            RawEvent::ActivitySnapshot { .. } => "ACTIVITY_SNAPSHOT",
            RawEvent::ActivityDelta { .. } => "ACTIVITY_DELTA",
            RawEvent::ThinkingStart { .. } => "THINKING_START",
            RawEvent::ThinkingEnd { .. } => "THINKING_END",
            RawEvent::ThinkingTextStart { .. } => "THINKING_TEXT_MESSAGE_START",
            RawEvent::ThinkingTextContent { .. } => "THINKING_TEXT_MESSAGE_CONTENT",
            RawEvent::ThinkingTextEnd { .. } => "THINKING_TEXT_MESSAGE_END",
            RawEvent::Unknown => "UNKNOWN",
        }
    }
}
