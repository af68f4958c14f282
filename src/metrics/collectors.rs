//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op until [`super::init_metrics`] has run, so library
//! code can record unconditionally.

use super::prometheus::{
    ACTIVE_EVALUATIONS, DELIVERY_FALLBACKS_TOTAL, EVALUATIONS_TOTAL, EVALUATION_DURATION,
    JUDGE_ATTEMPTS_TOTAL, JUDGE_LATENCY, RUN_POLLS_TOTAL, TRAJECTORY_STEPS_TOTAL,
};
use crate::trajectory::TrajectoryStep;

/// Outcome of a single judge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeOutcome {
    Success,
    /// Failed, another attempt may follow.
    Transient,
    /// Failed, no further attempt.
    Fatal,
}

impl JudgeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeOutcome::Success => "success",
            JudgeOutcome::Transient => "transient",
            JudgeOutcome::Fatal => "fatal",
        }
    }
}

/// Metrics collector for agent-eval operations.
///
/// # Example
///
/// ```ignore
/// use agent_eval::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics()?;
/// let collector = MetricsCollector::new();
/// collector.record_evaluation("support-bot", "completed", 42.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Records a finished evaluation.
    ///
    /// * `agent` - Agent identifier
    /// * `status` - Final evaluation status (`completed`, `failed`, `cancelled`)
    /// * `duration_secs` - Wall time of the evaluation
    pub fn record_evaluation(&self, agent: &str, status: &str, duration_secs: f64) {
        if let Some(total) = EVALUATIONS_TOTAL.get() {
            total.with_label_values(&[agent, status]).inc();
        }
        if let Some(duration) = EVALUATION_DURATION.get() {
            duration.with_label_values(&[agent]).observe(duration_secs);
        }

        tracing::trace!(
            agent = agent,
            status = status,
            duration_secs = duration_secs,
            "Recorded evaluation metric"
        );
    }

    pub fn evaluation_started(&self) {
        if let Some(active) = ACTIVE_EVALUATIONS.get() {
            active.inc();
        }
    }

    pub fn evaluation_finished(&self) {
        if let Some(active) = ACTIVE_EVALUATIONS.get() {
            active.dec();
        }
    }

    /// Counts converted steps by type.
    pub fn record_steps(&self, steps: &[TrajectoryStep]) {
        let Some(total) = TRAJECTORY_STEPS_TOTAL.get() else {
            return;
        };
        for step in steps {
            total.with_label_values(&[step.step_type.as_str()]).inc();
        }
    }

    /// Records one judge attempt.
    pub fn record_judge_attempt(&self, outcome: JudgeOutcome, latency_secs: f64) {
        if let Some(attempts) = JUDGE_ATTEMPTS_TOTAL.get() {
            attempts.with_label_values(&[outcome.as_str()]).inc();
        }
        if let Some(latency) = JUDGE_LATENCY.get() {
            latency.observe(latency_secs);
        }

        tracing::trace!(
            outcome = outcome.as_str(),
            latency_secs = latency_secs,
            "Recorded judge attempt"
        );
    }

    /// Records that a live stream fell back to polling.
    pub fn record_fallback(&self) {
        if let Some(fallbacks) = DELIVERY_FALLBACKS_TOTAL.get() {
            fallbacks.inc();
        }
    }

    /// Records one status poll.
    pub fn record_poll(&self, ok: bool) {
        if let Some(polls) = RUN_POLLS_TOTAL.get() {
            let result = if ok { "ok" } else { "error" };
            polls.with_label_values(&[result]).inc();
        }
    }
}
