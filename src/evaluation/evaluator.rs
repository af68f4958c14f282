//! Runs one test case against an agent and judges the trajectory.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::types::{EvaluationResult, EvaluationStatus, TestCase};
use crate::converter::EventConverter;
use crate::delivery::{ProgressUpdate, RecordHandler};
use crate::error::StreamError;
use crate::events::RawEvent;
use crate::judge::{JudgeClient, JudgeRequest};
use crate::metrics::MetricsCollector;
use crate::stream::{Flow, StreamClient, StreamEnd};
use crate::trajectory::sort_steps;

/// AG-UI run input posted to an agent endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentInput {
    pub thread_id: String,
    pub run_id: String,
    pub messages: Vec<Value>,
    pub tools: Vec<Value>,
    pub context: Vec<Value>,
    pub state: Value,
    pub forwarded_props: Value,
}

impl RunAgentInput {
    /// Builds a single-user-message run for a test case.
    pub fn for_test_case(test_case: &TestCase) -> Self {
        let context = match &test_case.context {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        };
        Self {
            thread_id: Uuid::new_v4().to_string(),
            run_id: Uuid::new_v4().to_string(),
            messages: vec![json!({
                "id": Uuid::new_v4().to_string(),
                "role": "user",
                "content": test_case.input,
            })],
            tools: Vec::new(),
            context,
            state: json!({}),
            forwarded_props: json!({}),
        }
    }
}

/// Streams an agent run's AG-UI events.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn run(
        &self,
        input: &RunAgentInput,
        handler: &mut RecordHandler<'_>,
    ) -> Result<StreamEnd, StreamError>;
}

/// Posts run input to an HTTP agent endpoint.
#[derive(Debug, Clone)]
pub struct HttpAgentTransport {
    url: String,
    client: StreamClient,
}

impl HttpAgentTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: StreamClient::new(),
        }
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn run(
        &self,
        input: &RunAgentInput,
        handler: &mut RecordHandler<'_>,
    ) -> Result<StreamEnd, StreamError> {
        self.client.post(&self.url, input, handler).await
    }
}

/// Evaluates test cases against one agent.
#[derive(Clone)]
pub struct AgentEvaluator {
    agent_id: String,
    transport: Arc<dyn AgentTransport>,
    judge: Option<JudgeClient>,
    judge_model: Option<String>,
    trace_mode: bool,
    metrics: MetricsCollector,
}

impl AgentEvaluator {
    pub fn new(agent_id: impl Into<String>, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            agent_id: agent_id.into(),
            transport,
            judge: None,
            judge_model: None,
            trace_mode: false,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_judge(mut self, judge: JudgeClient) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_judge_model(mut self, model: impl Into<String>) -> Self {
        self.judge_model = Some(model.into());
        self
    }

    /// Capture trajectories without judging them.
    pub fn with_trace_mode(mut self, trace_mode: bool) -> Self {
        self.trace_mode = trace_mode;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn trace_mode(&self) -> bool {
        self.trace_mode
    }

    pub async fn evaluate(&self, test_case: &TestCase) -> EvaluationResult {
        self.evaluate_with_progress(test_case, |_| {}).await
    }

    /// Runs `test_case`, reporting each converted step to `progress`.
    ///
    /// Never fails: transport or judge failures produce a failed result with
    /// a failed verdict and whatever trajectory was captured.
    pub async fn evaluate_with_progress<F>(&self, test_case: &TestCase, mut progress: F) -> EvaluationResult
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let started = Instant::now();
        self.metrics.evaluation_started();
        tracing::info!(
            agent = %self.agent_id,
            test_case = %test_case.display_name(),
            "Evaluating test case"
        );

        let input = RunAgentInput::for_test_case(test_case);
        let mut converter = EventConverter::new();
        let mut steps = Vec::new();

        let streamed = {
            let mut handler = |value: Value| -> Result<Flow, StreamError> {
                if let Some(event) = RawEvent::from_value(value) {
                    tracing::trace!(kind = event.kind(), "Agent event");
                    for step in converter.handle(&event) {
                        progress(ProgressUpdate {
                            message: format!("{} step", step.step_type.as_str()),
                            test_case_id: Some(test_case.id.clone()),
                            step: Some(step.clone()),
                            ..ProgressUpdate::default()
                        });
                        steps.push(step);
                    }
                }
                Ok(Flow::Continue)
            };
            self.transport.run(&input, &mut handler).await
        };

        steps.extend(converter.finish());
        sort_steps(&mut steps);
        self.metrics.record_steps(&steps);

        let mut result = EvaluationResult::new(&test_case.id);
        result.expected = test_case.expected.clone();

        if let Err(e) = streamed {
            tracing::error!(agent = %self.agent_id, error = %e, "Agent run failed");
            let mut failed = EvaluationResult::failed(&test_case.id, format!("Agent run failed: {}", e));
            failed.expected = result.expected;
            failed.trajectory = steps;
            return self.finish(failed, started);
        }

        result.trajectory = steps;
        result.status = EvaluationStatus::Completed;

        let judge = match &self.judge {
            Some(judge) if !self.trace_mode => judge,
            _ => return self.finish(result, started),
        };

        let mut request = JudgeRequest::new(result.trajectory.clone(), result.expected.clone());
        if let Some(model) = &self.judge_model {
            request = request.with_model(model.clone());
        }
        let test_case_id = test_case.id.clone();
        let on_complete = |reasoning: &str| {
            progress(ProgressUpdate {
                message: format!("Judge: {}", reasoning),
                test_case_id: Some(test_case_id),
                ..ProgressUpdate::default()
            })
        };

        match judge.judge_with_progress(&request, Some(on_complete)).await {
            Ok(verdict) => result.verdict = Some(verdict),
            Err(e) => {
                tracing::error!(agent = %self.agent_id, error = %e, "Judging failed");
                let mut failed = EvaluationResult::failed(&test_case.id, e.to_string());
                failed.expected = result.expected;
                failed.trajectory = result.trajectory;
                result = failed;
            }
        }

        self.finish(result, started)
    }

    fn finish(&self, mut result: EvaluationResult, started: Instant) -> EvaluationResult {
        let elapsed = started.elapsed();
        result.duration_ms = Some(elapsed.as_millis() as u64);
        self.metrics.evaluation_finished();
        self.metrics
            .record_evaluation(&self.agent_id, result.status.as_str(), elapsed.as_secs_f64());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JudgeError;
    use crate::judge::{JudgeBackend, PassFailStatus, RetryPolicy, Verdict};
    use crate::trajectory::StepType;
    use std::time::Duration;

    /// Replays AG-UI events, optionally failing at the end.
    struct ScriptedAgent {
        events: Vec<Value>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl AgentTransport for ScriptedAgent {
        async fn run(
            &self,
            _input: &RunAgentInput,
            handler: &mut RecordHandler<'_>,
        ) -> Result<StreamEnd, StreamError> {
            for event in &self.events {
                handler(event.clone())?;
            }
            match &self.fail_with {
                Some(message) => Err(StreamError::Transport(message.clone())),
                None => Ok(StreamEnd::Exhausted),
            }
        }
    }

    struct FixedJudge(Result<PassFailStatus, u16>);

    #[async_trait]
    impl JudgeBackend for FixedJudge {
        async fn evaluate(&self, request: &JudgeRequest) -> Result<Verdict, JudgeError> {
            match self.0 {
                Ok(status) => Ok(Verdict {
                    pass_fail_status: status,
                    reasoning: format!("{} steps reviewed", request.trajectory.len()),
                    ..Verdict::default()
                }),
                Err(code) => Err(JudgeError::Api {
                    status: code,
                    message: "rejected".to_string(),
                }),
            }
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    fn agent_events() -> Vec<Value> {
        vec![
            json!({"type": "RUN_STARTED", "runId": "r", "threadId": "t", "timestamp": 1}),
            json!({"type": "TOOL_CALL_START", "toolCallId": "c1", "toolCallName": "lookup", "timestamp": 10}),
            json!({"type": "TOOL_CALL_ARGS", "toolCallId": "c1", "delta": "{\"city\": \"Paris\"}", "timestamp": 11}),
            json!({"type": "TOOL_CALL_END", "toolCallId": "c1", "timestamp": 12}),
            json!({"type": "TOOL_CALL_RESULT", "toolCallId": "c1", "content": "sunny", "timestamp": 20}),
            json!({"type": "TEXT_MESSAGE_START", "messageId": "m1", "timestamp": 30}),
            json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": "m1", "delta": "It is sunny.", "timestamp": 31}),
            json!({"type": "RUN_FINISHED", "timestamp": 40}),
            json!({"type": "TEXT_MESSAGE_END", "messageId": "m1", "timestamp": 41}),
        ]
    }

    fn judge(status: Result<PassFailStatus, u16>) -> JudgeClient {
        JudgeClient::new(Arc::new(FixedJudge(status)))
            .with_retry_policy(RetryPolicy::new(0, Duration::from_millis(1)))
    }

    fn test_case() -> TestCase {
        TestCase::new("weather", "What's the weather in Paris?").with_expected_outcome("says sunny")
    }

    #[test]
    fn test_run_input_carries_user_message() {
        let input = RunAgentInput::for_test_case(&test_case());
        let value = serde_json::to_value(&input).expect("serialize");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "What's the weather in Paris?");
        assert!(value.get("forwardedProps").is_some());
    }

    #[tokio::test]
    async fn test_trace_mode_skips_judge() {
        let agent = Arc::new(ScriptedAgent {
            events: agent_events(),
            fail_with: None,
        });
        let evaluator = AgentEvaluator::new("weather-bot", agent)
            .with_judge(judge(Err(400)))
            .with_trace_mode(true);

        let result = evaluator.evaluate(&test_case()).await;

        assert_eq!(result.status, EvaluationStatus::Completed);
        assert!(result.verdict.is_none());
        let types: Vec<StepType> = result.trajectory.iter().map(|s| s.step_type).collect();
        assert_eq!(
            types,
            vec![StepType::Action, StepType::ToolResult, StepType::Response]
        );
    }

    #[tokio::test]
    async fn test_judged_result_and_progress() {
        let agent = Arc::new(ScriptedAgent {
            events: agent_events(),
            fail_with: None,
        });
        let evaluator =
            AgentEvaluator::new("weather-bot", agent).with_judge(judge(Ok(PassFailStatus::Passed)));
        let mut updates = Vec::new();

        let result = evaluator
            .evaluate_with_progress(&test_case(), |u| updates.push(u))
            .await;

        assert!(result.passed());
        assert_eq!(
            result.verdict.as_ref().map(|v| v.reasoning.as_str()),
            Some("3 steps reviewed")
        );
        assert_eq!(updates.iter().filter(|u| u.step.is_some()).count(), 3);
        assert_eq!(
            updates.last().map(|u| u.message.as_str()),
            Some("Judge: 3 steps reviewed")
        );
        assert!(result.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_yields_failed_result() {
        let agent = Arc::new(ScriptedAgent {
            events: agent_events()[..3].to_vec(),
            fail_with: Some("connection reset".to_string()),
        });
        let evaluator =
            AgentEvaluator::new("weather-bot", agent).with_judge(judge(Ok(PassFailStatus::Passed)));

        let result = evaluator.evaluate(&test_case()).await;

        assert_eq!(result.status, EvaluationStatus::Failed);
        let verdict = result.verdict.as_ref().expect("failed verdict");
        assert_eq!(verdict.pass_fail_status, PassFailStatus::Failed);
        assert_eq!(verdict.metrics.accuracy, 0.0);
        assert!(verdict.reasoning.contains("connection reset"));
        assert_eq!(result.trajectory.len(), 1);
        assert_eq!(result.trajectory[0].step_type, StepType::Action);
    }

    #[tokio::test]
    async fn test_judge_failure_yields_failed_result() {
        let agent = Arc::new(ScriptedAgent {
            events: agent_events(),
            fail_with: None,
        });
        let evaluator = AgentEvaluator::new("weather-bot", agent).with_judge(judge(Err(401)));

        let result = evaluator.evaluate(&test_case()).await;

        assert_eq!(result.status, EvaluationStatus::Failed);
        assert!(!result.passed());
        assert_eq!(result.trajectory.len(), 3);
        assert!(result.error.as_deref().unwrap_or_default().contains("401"));
    }
}
