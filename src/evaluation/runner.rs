//! Sequential benchmark runner with cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::evaluator::AgentEvaluator;
use super::types::{Benchmark, BenchmarkReport, EvaluationResult, EvaluationStatus};
use crate::delivery::ProgressUpdate;

/// Shared stop flag, checked between test cases.
///
/// Cloned into whoever may request a stop (a Ctrl-C handler, a UI action);
/// the runner only reads it.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    stop: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Runs every test case of a benchmark against one agent.
pub struct BenchmarkRunner {
    evaluator: AgentEvaluator,
}

impl BenchmarkRunner {
    pub fn new(evaluator: AgentEvaluator) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &AgentEvaluator {
        &self.evaluator
    }

    /// Evaluates test cases in order.
    ///
    /// `cancel` is checked before each test case, never mid-evaluation.
    /// Once set, results gathered so far are kept and every remaining test
    /// case is recorded as cancelled.
    pub async fn run<F>(
        &self,
        benchmark: &Benchmark,
        cancel: &CancellationFlag,
        mut progress: F,
    ) -> BenchmarkReport
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let mut report = BenchmarkReport::start(&benchmark.id, self.evaluator.agent_id());
        report.trace_mode = self.evaluator.trace_mode();
        let total = benchmark.test_cases.len();

        tracing::info!(
            benchmark = %benchmark.id,
            agent = %self.evaluator.agent_id(),
            test_cases = total,
            "Starting benchmark run"
        );

        for (index, test_case) in benchmark.test_cases.iter().enumerate() {
            if cancel.is_cancelled() {
                let remaining = total - index;
                tracing::warn!(
                    completed = index,
                    remaining = remaining,
                    "Benchmark run cancelled"
                );
                report.results.extend(
                    benchmark.test_cases[index..]
                        .iter()
                        .map(|tc| EvaluationResult::cancelled(&tc.id)),
                );
                progress(ProgressUpdate {
                    message: format!("Cancelled with {} test cases remaining", remaining),
                    ..ProgressUpdate::counts(index, total)
                });
                report.finish(EvaluationStatus::Cancelled);
                return report;
            }

            let result = self
                .evaluator
                .evaluate_with_progress(test_case, &mut progress)
                .await;
            report.results.push(result);
            progress(ProgressUpdate::counts(index + 1, total));
        }

        report.finish(EvaluationStatus::Completed);
        tracing::info!(
            benchmark = %benchmark.id,
            passed = report.summary.passed,
            failed = report.summary.failed,
            "Benchmark run finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::RecordHandler;
    use crate::error::StreamError;
    use crate::evaluation::evaluator::{AgentTransport, RunAgentInput};
    use crate::evaluation::TestCase;
    use crate::stream::StreamEnd;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Answers every run; cancels the flag after `cancel_after` runs.
    struct CountingAgent {
        runs: AtomicUsize,
        cancel_after: usize,
        flag: CancellationFlag,
    }

    #[async_trait]
    impl AgentTransport for CountingAgent {
        async fn run(
            &self,
            _input: &RunAgentInput,
            handler: &mut RecordHandler<'_>,
        ) -> Result<StreamEnd, StreamError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            handler(json!({"type": "TEXT_MESSAGE_START", "messageId": "m", "timestamp": 1}))?;
            handler(json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": "m", "delta": "done", "timestamp": 2}))?;
            handler(json!({"type": "RUN_FINISHED", "timestamp": 3}))?;
            handler(json!({"type": "TEXT_MESSAGE_END", "messageId": "m", "timestamp": 4}))?;
            if run == self.cancel_after {
                self.flag.cancel();
            }
            Ok(StreamEnd::Exhausted)
        }
    }

    fn benchmark(cases: usize) -> Benchmark {
        Benchmark {
            id: "bench".to_string(),
            name: "Bench".to_string(),
            description: String::new(),
            test_cases: (0..cases)
                .map(|i| TestCase::new(format!("tc-{}", i), "hi"))
                .collect(),
        }
    }

    fn runner(cancel_after: usize, flag: &CancellationFlag) -> (BenchmarkRunner, Arc<CountingAgent>) {
        let agent = Arc::new(CountingAgent {
            runs: AtomicUsize::new(0),
            cancel_after,
            flag: flag.clone(),
        });
        let evaluator = AgentEvaluator::new("agent", agent.clone()).with_trace_mode(true);
        (BenchmarkRunner::new(evaluator), agent)
    }

    #[test]
    fn test_flag_is_shared_between_clones() {
        let flag = CancellationFlag::new();
        let other = flag.clone();
        assert!(!flag.is_cancelled());
        other.cancel();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_runs_all_cases() {
        let flag = CancellationFlag::new();
        let (runner, agent) = runner(usize::MAX, &flag);

        let report = runner.run(&benchmark(3), &flag, |_| {}).await;

        assert_eq!(agent.runs.load(Ordering::SeqCst), 3);
        assert_eq!(report.status, EvaluationStatus::Completed);
        assert!(report.trace_mode);
        assert!(report
            .results
            .iter()
            .all(|r| r.status == EvaluationStatus::Completed));
        assert_eq!(report.results[0].trajectory[0].content, "done");
    }

    #[tokio::test]
    async fn test_cancellation_between_cases_keeps_completed_results() {
        let flag = CancellationFlag::new();
        let (runner, agent) = runner(2, &flag);
        let mut last = None;

        let report = runner
            .run(&benchmark(5), &flag, |u| last = Some(u.message))
            .await;

        assert_eq!(agent.runs.load(Ordering::SeqCst), 2);
        assert_eq!(report.status, EvaluationStatus::Cancelled);
        let statuses: Vec<EvaluationStatus> = report.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                EvaluationStatus::Completed,
                EvaluationStatus::Completed,
                EvaluationStatus::Cancelled,
                EvaluationStatus::Cancelled,
                EvaluationStatus::Cancelled,
            ]
        );
        assert_eq!(report.summary.cancelled, 3);
        assert_eq!(last.as_deref(), Some("Cancelled with 3 test cases remaining"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let flag = CancellationFlag::new();
        flag.cancel();
        let (runner, agent) = runner(usize::MAX, &flag);

        let report = runner.run(&benchmark(2), &flag, |_| {}).await;

        assert_eq!(agent.runs.load(Ordering::SeqCst), 0);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.status, EvaluationStatus::Cancelled);
    }
}
