//! Trajectory data types for recorded agent behaviour.
//!
//! A trajectory is the time-ordered list of [`TrajectoryStep`]s produced for
//! one agent run. Steps are the converter's only output type and the judge's
//! main input.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of behaviour a step records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Extended reasoning emitted on the thinking channel.
    Thinking,
    /// Visible intermediate text that is not the final answer.
    Assistant,
    /// A tool invocation.
    Action,
    /// The outcome of a tool invocation, or a run-level failure.
    ToolResult,
    /// The agent's final answer.
    Response,
}

impl StepType {
    /// Wire name of the step type.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Thinking => "thinking",
            StepType::Assistant => "assistant",
            StepType::Action => "action",
            StepType::ToolResult => "tool_result",
            StepType::Response => "response",
        }
    }
}

/// Outcome of an action or tool result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
}

/// A single step of agent behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryStep {
    /// Opaque unique identifier.
    pub id: String,

    /// Milliseconds since the Unix epoch at which the behaviour began.
    pub timestamp: i64,

    /// Kind of step.
    #[serde(rename = "type")]
    pub step_type: StepType,

    /// Text content (message text, tool output, error text).
    pub content: String,

    /// Tool name; always present on `action` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Tool arguments, or `{"_raw": "..."}` when they did not parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
}

impl TrajectoryStep {
    /// Creates a step with a fresh id.
    pub fn new(step_type: StepType, timestamp: i64, content: impl Into<String>) -> Self {
        Self::with_id(new_step_id(), step_type, timestamp, content)
    }

    /// Creates a step with a caller-supplied id.
    pub fn with_id(
        id: impl Into<String>,
        step_type: StepType,
        timestamp: i64,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            step_type,
            content: content.into(),
            tool_name: None,
            tool_args: None,
            status: None,
            latency_ms: None,
        }
    }

    /// Sets the tool name.
    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    /// Sets the tool arguments.
    pub fn with_tool_args(mut self, args: Value) -> Self {
        self.tool_args = Some(args);
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the latency in milliseconds.
    pub fn with_latency_ms(mut self, latency_ms: i64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Returns true if this step records a failure.
    pub fn is_failure(&self) -> bool {
        self.status == Some(StepStatus::Failure)
    }
}

/// Generates an opaque step identifier.
pub fn new_step_id() -> String {
    Uuid::new_v4().to_string()
}

/// Sorts steps chronologically.
///
/// The sort is stable: steps sharing a timestamp keep their emission order,
/// so an `action` still precedes its `tool_result` when both carry the same
/// time.
pub fn sort_steps(steps: &mut [TrajectoryStep]) {
    steps.sort_by_key(|step| step.timestamp);
}

/// A complete, chronologically ordered trajectory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Trajectory {
    steps: Vec<TrajectoryStep>,
}

impl Trajectory {
    /// Builds a trajectory, sorting the collected steps by timestamp.
    pub fn from_steps(mut steps: Vec<TrajectoryStep>) -> Self {
        sort_steps(&mut steps);
        Self { steps }
    }

    /// Returns the ordered steps.
    pub fn steps(&self) -> &[TrajectoryStep] {
        &self.steps
    }

    /// Consumes the trajectory, returning the ordered steps.
    pub fn into_steps(self) -> Vec<TrajectoryStep> {
        self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterates over `action` steps.
    pub fn tool_calls(&self) -> impl Iterator<Item = &TrajectoryStep> {
        self.steps
            .iter()
            .filter(|step| step.step_type == StepType::Action)
    }

    /// Returns the last `response` step, if any.
    pub fn final_response(&self) -> Option<&TrajectoryStep> {
        self.steps
            .iter()
            .rev()
            .find(|step| step.step_type == StepType::Response)
    }

    /// Iterates over steps with a failure status.
    pub fn failed_steps(&self) -> impl Iterator<Item = &TrajectoryStep> {
        self.steps.iter().filter(|step| step.is_failure())
    }

    /// Wall-clock span between the first and last step, in milliseconds.
    pub fn span_ms(&self) -> i64 {
        match (self.steps.first(), self.steps.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0,
        }
    }
}
