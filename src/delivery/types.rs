//! Wire records and state exchanged with the evaluation server.

use serde::{Deserialize, Serialize};

use crate::evaluation::{EvaluationResult, EvaluationStatus};
use crate::trajectory::TrajectoryStep;

/// Request to run an agent against a benchmark on the evaluation server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub agent_id: String,
    pub benchmark_id: String,
    /// Restricts the run to these test cases; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_case_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<String>,
    /// Capture trajectories only, without judging.
    #[serde(default)]
    pub trace_mode: bool,
}

impl EvaluationRequest {
    pub fn new(agent_id: impl Into<String>, benchmark_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            benchmark_id: benchmark_id.into(),
            test_case_ids: Vec::new(),
            judge_model: None,
            trace_mode: false,
        }
    }
}

/// Server-side state of an evaluation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub status: EvaluationStatus,
    #[serde(default)]
    pub total_test_cases: usize,
    #[serde(default)]
    pub results: Vec<EvaluationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunState {
    /// Results that reached a terminal status.
    pub fn completed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status.is_terminal())
            .count()
    }

    /// Total test cases, falling back to the result count.
    pub fn total(&self) -> usize {
        self.total_test_cases.max(self.results.len())
    }
}

/// One record of the evaluation server's event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum StreamRecord {
    Started {
        run_id: String,
    },
    Progress {
        #[serde(default)]
        completed: Option<usize>,
        #[serde(default)]
        total: Option<usize>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        test_case_id: Option<String>,
        #[serde(default)]
        step: Option<TrajectoryStep>,
    },
    Completed {
        result: RunState,
    },
    Cancelled {
        result: RunState,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Progress notification handed to a caller-supplied sink.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub completed: Option<usize>,
    pub total: Option<usize>,
    pub message: String,
    pub test_case_id: Option<String>,
    pub step: Option<TrajectoryStep>,
}

impl ProgressUpdate {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// "Completed X of Y test cases".
    pub fn counts(completed: usize, total: usize) -> Self {
        Self {
            completed: Some(completed),
            total: Some(total),
            message: format!("Completed {} of {} test cases", completed, total),
            ..Self::default()
        }
    }
}

/// Which phase produced the final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    Live,
    Polling,
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub state: RunState,
    pub path: DeliveryPath,
    /// Polling hit its timeout; `state` is the latest known, not terminal.
    pub timed_out: bool,
    /// Steps streamed live through progress records.
    pub live_steps: Vec<TrajectoryStep>,
}
