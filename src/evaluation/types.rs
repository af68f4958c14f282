//! Test cases, benchmarks and evaluation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::judge::{ExpectedBehavior, Verdict};
use crate::trajectory::TrajectoryStep;

/// Lifecycle status shared by single evaluations, runs and reports.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl EvaluationStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EvaluationStatus::Completed | EvaluationStatus::Failed | EvaluationStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Pending => "pending",
            EvaluationStatus::Running => "running",
            EvaluationStatus::Completed => "completed",
            EvaluationStatus::Failed => "failed",
            EvaluationStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One scenario an agent is evaluated against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// User message sent to the agent.
    pub input: String,
    #[serde(flatten)]
    pub expected: ExpectedBehavior,
    /// Extra AG-UI context forwarded with the run input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            input: input.into(),
            expected: ExpectedBehavior::default(),
            context: None,
        }
    }

    pub fn with_expected_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected.expected_outcomes.push(outcome.into());
        self
    }

    /// Name for display, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A named set of test cases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Benchmark {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// Outcome of evaluating one test case.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub test_case_id: String,
    #[serde(default)]
    pub status: EvaluationStatus,
    /// Chronologically sorted trajectory.
    #[serde(default)]
    pub trajectory: Vec<TrajectoryStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    /// Expectations the result should be judged against.
    #[serde(default, skip_serializing_if = "ExpectedBehavior::is_empty")]
    pub expected: ExpectedBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl EvaluationResult {
    pub fn new(test_case_id: impl Into<String>) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            ..Self::default()
        }
    }

    /// A failed result with a failed verdict explaining why.
    pub fn failed(test_case_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            test_case_id: test_case_id.into(),
            status: EvaluationStatus::Failed,
            verdict: Some(Verdict::failed(reason.clone())),
            error: Some(reason),
            ..Self::default()
        }
    }

    /// A result for a test case that was never started.
    pub fn cancelled(test_case_id: impl Into<String>) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            status: EvaluationStatus::Cancelled,
            ..Self::default()
        }
    }

    /// Whether the judge passed this result.
    pub fn passed(&self) -> bool {
        self.verdict.as_ref().is_some_and(Verdict::passed)
    }

    /// Failed to run, or judged and not passed. Unjudged trace-mode results
    /// are neither passed nor failed.
    pub fn is_failure(&self) -> bool {
        self.status == EvaluationStatus::Failed
            || self.verdict.as_ref().is_some_and(|v| !v.passed())
    }
}

/// Aggregate counts over a report's results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Passed over passed plus failed; unjudged results count toward neither.
    pub pass_rate: f64,
    /// Mean verdict accuracy over results that have a verdict.
    pub mean_accuracy: f64,
}

impl ReportSummary {
    pub fn from_results(results: &[EvaluationResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed()).count();
        let cancelled = results
            .iter()
            .filter(|r| r.status == EvaluationStatus::Cancelled)
            .count();
        let failed = results.iter().filter(|r| r.is_failure()).count();

        let judged = passed + failed;
        let pass_rate = if judged == 0 {
            0.0
        } else {
            passed as f64 / judged as f64
        };

        let accuracies: Vec<f64> = results
            .iter()
            .filter_map(|r| r.verdict.as_ref().map(|v| v.metrics.accuracy))
            .collect();
        let mean_accuracy = if accuracies.is_empty() {
            0.0
        } else {
            accuracies.iter().sum::<f64>() / accuracies.len() as f64
        };

        Self {
            total,
            passed,
            failed,
            cancelled,
            pass_rate,
            mean_accuracy,
        }
    }
}

/// Stored result of running a benchmark against an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    pub id: String,
    pub benchmark_id: String,
    pub agent_id: String,
    pub status: EvaluationStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trace_mode: bool,
    #[serde(default)]
    pub results: Vec<EvaluationResult>,
    #[serde(default)]
    pub summary: ReportSummary,
}

impl BenchmarkReport {
    /// Starts a new report with a fresh id.
    pub fn start(benchmark_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            benchmark_id: benchmark_id.into(),
            agent_id: agent_id.into(),
            status: EvaluationStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            trace_mode: false,
            results: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    /// Stamps the finish time and recomputes the summary.
    pub fn finish(&mut self, status: EvaluationStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.summary = ReportSummary::from_results(&self.results);
    }
}
