//! Streaming event-to-trajectory converter.
//!
//! [`EventConverter`] is a per-run state machine that turns raw wire events
//! into [`TrajectoryStep`]s. Multi-part wire sequences collapse into single
//! steps:
//!
//! - `TOOL_CALL_START` → `TOOL_CALL_ARGS`* → `TOOL_CALL_END` → `TOOL_CALL_RESULT`
//!   becomes one `action` step and one `tool_result` step
//! - `TEXT_MESSAGE_START` → `TEXT_MESSAGE_CONTENT`* → `TEXT_MESSAGE_END`
//!   becomes one `assistant` or `response` step
//! - a thinking text message becomes one `thinking` step
//!
//! Steps are returned in emission order, which is not chronological: an
//! `action` step carries the time its call *started*, and a thinking block
//! can close after later events. Collect every step of the run and sort once
//! with [`crate::trajectory::sort_steps`] (or build a
//! [`crate::trajectory::Trajectory`]).
//!
//! The converter never fails. Malformed arguments fall back to
//! `{"_raw": ...}`, and events that reference unknown message or call ids
//! are ignored.
//!
//! # Example
//!
//! ```rust
//! use agent_eval::converter::EventConverter;
//! use agent_eval::events::RawEvent;
//! use serde_json::json;
//!
//! let mut converter = EventConverter::new();
//! let mut steps = Vec::new();
//! for value in [
//!     json!({"type": "TOOL_CALL_START", "toolCallId": "c1", "toolCallName": "search", "timestamp": 1}),
//!     json!({"type": "TOOL_CALL_ARGS", "toolCallId": "c1", "delta": "{\"q\":", "timestamp": 2}),
//!     json!({"type": "TOOL_CALL_ARGS", "toolCallId": "c1", "delta": "\"rust\"}", "timestamp": 3}),
//!     json!({"type": "TOOL_CALL_END", "toolCallId": "c1", "timestamp": 4}),
//! ] {
//!     let event = RawEvent::from_value(value).unwrap();
//!     steps.extend(converter.handle(&event));
//! }
//! assert_eq!(steps.len(), 1);
//! assert_eq!(steps[0].tool_args, Some(json!({"q": "rust"})));
//! ```

pub mod activity;

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};

use crate::events::RawEvent;
use crate::trajectory::{new_step_id, sort_steps, StepStatus, StepType, Trajectory, TrajectoryStep};

/// Which path emitted a tool call's `action` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionState {
    /// Not emitted yet.
    Pending,
    /// Emitted on `TOOL_CALL_END`.
    EmittedAtEnd,
    /// Emitted lazily on `TOOL_CALL_RESULT` because no end arrived.
    EmittedAtResult,
}

/// An in-flight tool call.
#[derive(Debug, Clone)]
struct ToolCallRecord {
    tool_name: String,
    raw_args: String,
    started_at: i64,
    step_id: String,
    emission: EmissionState,
}

/// An activity seen through `ACTIVITY_SNAPSHOT`.
#[derive(Debug, Clone)]
struct ActivityRecord {
    tool_name: String,
    title: String,
    started_at: i64,
    completed: bool,
}

/// The open plain-text message.
#[derive(Debug, Clone)]
struct OpenText {
    message_id: String,
    content: String,
    started_at: i64,
}

/// The open thinking-text message.
#[derive(Debug, Clone)]
struct ThinkingBuffer {
    content: String,
    opened_at: i64,
    first_content_at: Option<i64>,
}

/// Converts one run's wire events into trajectory steps.
///
/// Not safe to share across concurrent runs: allocate one instance per run.
/// A `RUN_STARTED` event resets all state, so sequential reuse works.
#[derive(Debug)]
pub struct EventConverter {
    run_id: Option<String>,
    text: Option<OpenText>,
    tool_calls: HashMap<String, ToolCallRecord>,
    activities: HashMap<String, ActivityRecord>,
    thinking: Option<ThinkingBuffer>,
    has_emitted_action: bool,
    run_finished: bool,
    pending_text_is_response: bool,
}

impl Default for EventConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventConverter {
    /// Creates a converter for a new run.
    pub fn new() -> Self {
        Self {
            run_id: None,
            text: None,
            tool_calls: HashMap::new(),
            activities: HashMap::new(),
            thinking: None,
            has_emitted_action: false,
            run_finished: false,
            pending_text_is_response: false,
        }
    }

    /// Clears every buffer and flag.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Run id from the last `RUN_STARTED`, if any.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Whether any `action` step has been emitted in this run.
    pub fn has_emitted_action(&self) -> bool {
        self.has_emitted_action
    }

    /// Whether `RUN_FINISHED` has been seen.
    pub fn is_run_finished(&self) -> bool {
        self.run_finished
    }

    /// Number of tool calls still awaiting a result.
    pub fn open_tool_calls(&self) -> usize {
        self.tool_calls.len()
    }

    /// Handles one event, returning the steps it completes.
    pub fn handle(&mut self, event: &RawEvent) -> Vec<TrajectoryStep> {
        let ts = event.timestamp().unwrap_or_else(now_ms);

        match event {
            RawEvent::RunStarted { run_id, .. } => {
                self.reset();
                self.run_id = Some(run_id.clone());
                tracing::debug!(run_id = %run_id, "Converter reset for new run");
                Vec::new()
            }
            RawEvent::RunFinished { .. } => {
                self.run_finished = true;
                if self.text.is_some() {
                    self.pending_text_is_response = true;
                }
                Vec::new()
            }
            RawEvent::RunError { message, code, .. } => {
                let content = if message.is_empty() {
                    code.clone().unwrap_or_else(|| "Agent run failed".to_string())
                } else {
                    message.clone()
                };
                tracing::warn!(error = %content, "Agent run reported an error");
                vec![TrajectoryStep::new(StepType::ToolResult, ts, content)
                    .with_status(StepStatus::Failure)]
            }

            RawEvent::TextMessageStart { message_id, .. } => {
                let mut steps = Vec::new();
                if let Some(open) = self.text.take() {
                    tracing::debug!(
                        open = %open.message_id,
                        next = %message_id,
                        "Text message started while another was open; closing it"
                    );
                    steps.extend(self.close_text(open));
                }
                self.text = Some(OpenText {
                    message_id: message_id.clone(),
                    content: String::new(),
                    started_at: ts,
                });
                steps
            }
            RawEvent::TextMessageContent {
                message_id, delta, ..
            } => {
                match self.text.as_mut() {
                    Some(open) if open.message_id == *message_id => open.content.push_str(delta),
                    _ => tracing::debug!(message_id = %message_id, "Content for unknown message"),
                }
                Vec::new()
            }
            RawEvent::TextMessageEnd { message_id, .. } => {
                match self.text.take() {
                    Some(open) if open.message_id == *message_id => {
                        self.close_text(open).into_iter().collect()
                    }
                    other => {
                        self.text = other;
                        tracing::debug!(message_id = %message_id, "End for unknown message");
                        Vec::new()
                    }
                }
            }

            RawEvent::ToolCallStart {
                tool_call_id,
                tool_call_name,
                ..
            } => {
                self.tool_calls.insert(
                    tool_call_id.clone(),
                    ToolCallRecord {
                        tool_name: tool_call_name.clone(),
                        raw_args: String::new(),
                        started_at: ts,
                        step_id: new_step_id(),
                        emission: EmissionState::Pending,
                    },
                );
                Vec::new()
            }
            RawEvent::ToolCallArgs {
                tool_call_id,
                delta,
                ..
            } => {
                match self.tool_calls.get_mut(tool_call_id) {
                    Some(record) => record.raw_args.push_str(delta),
                    None => tracing::debug!(call_id = %tool_call_id, "Args for unknown tool call"),
                }
                Vec::new()
            }
            RawEvent::ToolCallEnd { tool_call_id, .. } => {
                let Some(record) = self.tool_calls.get_mut(tool_call_id) else {
                    tracing::debug!(call_id = %tool_call_id, "End for unknown tool call");
                    return Vec::new();
                };
                if record.emission != EmissionState::Pending {
                    return Vec::new();
                }
                record.emission = EmissionState::EmittedAtEnd;
                let step = action_step(record);
                self.has_emitted_action = true;
                vec![step]
            }
            RawEvent::ToolCallResult {
                tool_call_id,
                content,
                ..
            } => {
                let Some(mut record) = self.tool_calls.remove(tool_call_id) else {
                    tracing::debug!(call_id = %tool_call_id, "Result for unknown tool call");
                    return Vec::new();
                };

                let mut steps = Vec::with_capacity(2);
                if record.emission == EmissionState::Pending {
                    record.emission = EmissionState::EmittedAtResult;
                    tracing::debug!(
                        call_id = %tool_call_id,
                        tool = %record.tool_name,
                        "Tool result arrived without end; emitting action lazily"
                    );
                    steps.push(action_step(&record));
                    self.has_emitted_action = true;
                }

                steps.push(
                    TrajectoryStep::new(StepType::ToolResult, ts, content.clone())
                        .with_tool_name(record.tool_name.clone())
                        .with_status(classify_tool_result(content))
                        .with_latency_ms((ts - record.started_at).max(0)),
                );
                steps
            }

            RawEvent::ActivitySnapshot {
                message_id,
                content,
                ..
            } => {
                let tool_name = activity::tool_name_from_title(&content.title);
                let args = activity::tool_args_from_description(content.description.as_deref());

                if let Some(record) = self.activities.get_mut(message_id) {
                    record.tool_name = tool_name;
                    record.title = content.title.clone();
                    return Vec::new();
                }

                self.activities.insert(
                    message_id.clone(),
                    ActivityRecord {
                        tool_name: tool_name.clone(),
                        title: content.title.clone(),
                        started_at: ts,
                        completed: false,
                    },
                );
                self.has_emitted_action = true;
                vec![TrajectoryStep::new(StepType::Action, ts, content.title.clone())
                    .with_tool_name(tool_name)
                    .with_tool_args(args)]
            }
            RawEvent::ActivityDelta {
                message_id, patch, ..
            } => {
                let Some(record) = self.activities.get_mut(message_id) else {
                    tracing::debug!(message_id = %message_id, "Delta for unknown activity");
                    return Vec::new();
                };
                if record.completed || !activity::patch_signals_completion(patch) {
                    return Vec::new();
                }
                record.completed = true;
                let content = activity::result_text_from_patch(patch)
                    .unwrap_or_else(|| format!("{} completed", record.title));
                vec![TrajectoryStep::new(StepType::ToolResult, ts, content)
                    .with_tool_name(record.tool_name.clone())
                    .with_status(StepStatus::Success)
                    .with_latency_ms((ts - record.started_at).max(0))]
            }

            RawEvent::ThinkingStart { .. } => {
                tracing::trace!("Thinking block started");
                Vec::new()
            }
            RawEvent::ThinkingTextStart { .. } => {
                let steps = self.close_thinking(ts).into_iter().collect();
                self.thinking = Some(ThinkingBuffer {
                    content: String::new(),
                    opened_at: ts,
                    first_content_at: None,
                });
                steps
            }
            RawEvent::ThinkingTextContent { delta, .. } => {
                let buffer = self.thinking.get_or_insert_with(|| ThinkingBuffer {
                    content: String::new(),
                    opened_at: ts,
                    first_content_at: None,
                });
                buffer.first_content_at.get_or_insert(ts);
                buffer.content.push_str(delta);
                Vec::new()
            }
            RawEvent::ThinkingTextEnd { .. } | RawEvent::ThinkingEnd { .. } => {
                self.close_thinking(ts).into_iter().collect()
            }

            RawEvent::Unknown => Vec::new(),
        }
    }

    /// Flushes whatever is still open when the event stream ends.
    ///
    /// An open text message is classified with the usual rules, an open
    /// thinking buffer becomes a `thinking` step, and tool calls that never
    /// emitted their `action` step emit it now. Tool calls without a result
    /// produce no `tool_result` step.
    pub fn finish(&mut self) -> Vec<TrajectoryStep> {
        let now = now_ms();
        let mut steps = Vec::new();

        if let Some(open) = self.text.take() {
            steps.extend(self.close_text(open));
        }
        steps.extend(self.close_thinking(now));

        let mut pending: Vec<ToolCallRecord> = self
            .tool_calls
            .drain()
            .map(|(_, record)| record)
            .filter(|record| record.emission == EmissionState::Pending)
            .collect();
        pending.sort_by_key(|record| record.started_at);
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "Emitting actions for unfinished tool calls");
            self.has_emitted_action = true;
        }
        steps.extend(pending.iter().map(action_step));

        steps
    }

    fn close_text(&mut self, open: OpenText) -> Option<TrajectoryStep> {
        let is_response = self.pending_text_is_response || self.run_finished;
        self.pending_text_is_response = false;

        if !is_response && open.content.trim().is_empty() {
            return None;
        }

        let step_type = if is_response {
            StepType::Response
        } else {
            StepType::Assistant
        };
        Some(TrajectoryStep::new(step_type, open.started_at, open.content))
    }

    fn close_thinking(&mut self, ended_at: i64) -> Option<TrajectoryStep> {
        let buffer = self.thinking.take()?;
        if buffer.content.trim().is_empty() {
            return None;
        }
        let started_at = buffer.first_content_at.unwrap_or(buffer.opened_at);
        Some(
            TrajectoryStep::new(StepType::Thinking, started_at, buffer.content)
                .with_latency_ms((ended_at - started_at).max(0)),
        )
    }
}

/// Converts a complete event sequence into a sorted trajectory.
pub fn convert_events<'a, I>(events: I) -> Trajectory
where
    I: IntoIterator<Item = &'a RawEvent>,
{
    let mut converter = EventConverter::new();
    let mut steps: Vec<TrajectoryStep> = events
        .into_iter()
        .flat_map(|event| converter.handle(event))
        .collect();
    steps.extend(converter.finish());
    sort_steps(&mut steps);
    Trajectory::from_steps(steps)
}

fn action_step(record: &ToolCallRecord) -> TrajectoryStep {
    TrajectoryStep::with_id(
        record.step_id.clone(),
        StepType::Action,
        record.started_at,
        format!("Calling {}", record.tool_name),
    )
    .with_tool_name(record.tool_name.clone())
    .with_tool_args(parse_tool_args(&record.raw_args))
}

/// Parses concatenated argument deltas, falling back to `{"_raw": ...}`.
pub fn parse_tool_args(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Tool arguments are not valid JSON; keeping raw text");
            json!({ "_raw": raw })
        }
    }
}

/// Classifies a tool result body as success or failure.
///
/// A JSON object carrying a non-null `error`, `isError: true`, or a
/// `status` of `error`/`failure` is a failure; anything else, including
/// non-JSON text, is a success.
pub fn classify_tool_result(content: &str) -> StepStatus {
    let Ok(Value::Object(body)) = serde_json::from_str::<Value>(content) else {
        return StepStatus::Success;
    };

    let has_error = body.get("error").is_some_and(|e| !e.is_null() && e != &json!(false));
    let is_error = body.get("isError").and_then(Value::as_bool).unwrap_or(false);
    let failed_status = body
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| s.eq_ignore_ascii_case("error") || s.eq_ignore_ascii_case("failure"));

    if has_error || is_error || failed_status {
        StepStatus::Failure
    } else {
        StepStatus::Success
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
