//! Judge request and verdict types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::trajectory::TrajectoryStep;

/// Pass/fail outcome of a verdict.
///
/// Anything other than an explicit pass, including a missing or null field,
/// reads as [`PassFailStatus::Failed`].
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PassFailStatus {
    Passed,
    #[default]
    Failed,
}

impl PassFailStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, PassFailStatus::Passed)
    }
}

impl<'de> Deserialize<'de> for PassFailStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("passed") | Some("pass") => PassFailStatus::Passed,
            _ => PassFailStatus::Failed,
        })
    }
}

/// Scores attached to a verdict, each in `0.0..=1.0` by convention.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faithfulness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory_alignment_score: Option<f64>,
}

/// Structured output of the judge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    #[serde(default)]
    pub pass_fail_status: PassFailStatus,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub reasoning: String,
    /// Free-form suggestions; strings or objects depending on the judge.
    #[serde(default)]
    pub improvement_strategies: Vec<Value>,
}

impl Verdict {
    /// A failed verdict with zero metrics and the given explanation.
    pub fn failed(reasoning: impl Into<String>) -> Self {
        Self {
            pass_fail_status: PassFailStatus::Failed,
            metrics: Metrics::default(),
            reasoning: reasoning.into(),
            improvement_strategies: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.pass_fail_status.is_passed()
    }
}

/// What the agent was expected to do.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedBehavior {
    /// Outcomes the final state or answer should satisfy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_outcomes: Vec<String>,
    /// Legacy step-by-step expectation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_trajectory: Vec<String>,
}

impl ExpectedBehavior {
    pub fn is_empty(&self) -> bool {
        self.expected_outcomes.is_empty() && self.expected_trajectory.is_empty()
    }
}

/// Input to a judge call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JudgeRequest {
    /// Sorted trajectory of the run.
    pub trajectory: Vec<TrajectoryStep>,
    #[serde(flatten)]
    pub expected: ExpectedBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl JudgeRequest {
    pub fn new(trajectory: Vec<TrajectoryStep>, expected: ExpectedBehavior) -> Self {
        Self {
            trajectory,
            expected,
            logs: None,
            model: None,
        }
    }

    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = Some(logs.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}
