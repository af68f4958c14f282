//! Live-stream evaluation delivery with polling fallback.
//!
//! One delivery attempt runs up to three phases:
//!
//! 1. **Live**: POST the request and consume the server's event stream,
//!    capturing the run id from `started` and the final state from
//!    `completed`/`cancelled`.
//! 2. **Fallback**: if the stream fails or ends without a terminal record
//!    but a run id was captured, poll the run's status until it is terminal
//!    or the poll timeout elapses. A timeout returns the latest state.
//! 3. **Abort**: without a run id there is nothing to poll, so the original
//!    stream failure is returned unchanged.
//!
//! Outside trace mode, completed results that carry no verdict are then sent
//! to the judge.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::time::Instant;

use super::types::{
    DeliveryOutcome, DeliveryPath, EvaluationRequest, ProgressUpdate, RunState, StreamRecord,
};
use crate::error::{DeliveryError, StreamError};
use crate::evaluation::EvaluationStatus;
use crate::judge::{JudgeClient, JudgeRequest, Verdict};
use crate::metrics::MetricsCollector;
use crate::stream::{Flow, StreamClient, StreamEnd};
use crate::trajectory::{sort_steps, TrajectoryStep};

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on the fallback phase.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);

/// Record handler passed to a transport.
pub type RecordHandler<'a> = dyn FnMut(Value) -> Result<Flow, StreamError> + Send + 'a;

/// Opens the live evaluation stream.
#[async_trait]
pub trait EvaluationTransport: Send + Sync {
    async fn stream(
        &self,
        request: &EvaluationRequest,
        handler: &mut RecordHandler<'_>,
    ) -> Result<StreamEnd, StreamError>;
}

/// Reads the current state of a run.
#[async_trait]
pub trait RunStatusSource: Send + Sync {
    async fn fetch(&self, run_id: &str) -> Result<RunState, DeliveryError>;
}

/// Streams `POST {server}/api/evaluations`.
#[derive(Debug, Clone)]
pub struct HttpEvaluationTransport {
    url: String,
    client: StreamClient,
}

impl HttpEvaluationTransport {
    pub fn new(server: &str) -> Self {
        Self {
            url: format!("{}/api/evaluations", server.trim_end_matches('/')),
            client: StreamClient::new(),
        }
    }
}

#[async_trait]
impl EvaluationTransport for HttpEvaluationTransport {
    async fn stream(
        &self,
        request: &EvaluationRequest,
        handler: &mut RecordHandler<'_>,
    ) -> Result<StreamEnd, StreamError> {
        self.client.post(&self.url, request, handler).await
    }
}

/// Polls `GET {server}/api/runs/{id}`.
#[derive(Debug, Clone)]
pub struct HttpRunStatusSource {
    base_url: String,
    http: Client,
}

impl HttpRunStatusSource {
    pub fn new(server: &str) -> Self {
        Self {
            base_url: server.trim_end_matches('/').to_string(),
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl RunStatusSource for HttpRunStatusSource {
    async fn fetch(&self, run_id: &str) -> Result<RunState, DeliveryError> {
        let url = format!("{}/api/runs/{}", self.base_url, run_id);
        let poll_error = |message: String| DeliveryError::Poll {
            run_id: run_id.to_string(),
            message,
        };

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| poll_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(poll_error(format!("HTTP {}", status.as_u16())));
        }
        response
            .json::<RunState>()
            .await
            .map_err(|e| poll_error(format!("invalid run state: {}", e)))
    }
}

/// Timing and mode for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// Skip judging; trajectories only.
    pub trace_mode: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            trace_mode: false,
        }
    }
}

#[derive(Default)]
struct LiveCapture {
    run_id: Option<String>,
    terminal: Option<RunState>,
    steps: Vec<TrajectoryStep>,
}

/// Orchestrates one evaluation attempt against the evaluation server.
pub struct DeliveryPipeline {
    transport: Arc<dyn EvaluationTransport>,
    status: Arc<dyn RunStatusSource>,
    judge: Option<JudgeClient>,
    config: DeliveryConfig,
    metrics: MetricsCollector,
}

impl DeliveryPipeline {
    pub fn new(transport: Arc<dyn EvaluationTransport>, status: Arc<dyn RunStatusSource>) -> Self {
        Self {
            transport,
            status,
            judge: None,
            config: DeliveryConfig::default(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Pipeline talking HTTP to `server`.
    pub fn http(server: &str) -> Self {
        Self::new(
            Arc::new(HttpEvaluationTransport::new(server)),
            Arc::new(HttpRunStatusSource::new(server)),
        )
    }

    pub fn with_config(mut self, config: DeliveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Judge used for completed results that arrive without a verdict.
    pub fn with_judge(mut self, judge: JudgeClient) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Delivers one evaluation request.
    ///
    /// `progress` receives live progress records and, in the fallback phase,
    /// one "Completed X of Y test cases" update per successful poll.
    ///
    /// # Errors
    ///
    /// Returns the live-phase error when no run id was captured, or when no
    /// poll succeeded before the timeout. A silent stream end without a run
    /// id is [`DeliveryError::StreamEnded`].
    pub async fn evaluate<F>(
        &self,
        request: &EvaluationRequest,
        mut progress: F,
    ) -> Result<DeliveryOutcome, DeliveryError>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let trace_mode = self.config.trace_mode || request.trace_mode;
        let mut capture = LiveCapture::default();

        let live = {
            let mut handler = |value: Value| handle_record(value, &mut capture, &mut progress);
            self.transport.stream(request, &mut handler).await
        };

        let mut outcome = match capture.terminal.take() {
            Some(state) => {
                tracing::info!(
                    run_id = %state.run_id,
                    status = %state.status,
                    "Evaluation delivered over live stream"
                );
                DeliveryOutcome {
                    state,
                    path: DeliveryPath::Live,
                    timed_out: false,
                    live_steps: Vec::new(),
                }
            }
            None => {
                let original = match live {
                    Ok(_) => DeliveryError::StreamEnded,
                    Err(e) => DeliveryError::Stream(e),
                };
                let Some(run_id) = capture.run_id.clone() else {
                    tracing::error!(error = %original, "Live stream failed before the run started");
                    return Err(original);
                };

                tracing::warn!(
                    run_id = %run_id,
                    error = %original,
                    "Live stream ended without a result; falling back to polling"
                );
                self.metrics.record_fallback();
                self.poll_until_terminal(&run_id, original, &mut progress)
                    .await?
            }
        };

        sort_steps(&mut capture.steps);
        outcome.live_steps = capture.steps;

        if !trace_mode {
            self.judge_results(&mut outcome.state, request).await;
        }
        Ok(outcome)
    }

    async fn poll_until_terminal<F>(
        &self,
        run_id: &str,
        original: DeliveryError,
        progress: &mut F,
    ) -> Result<DeliveryOutcome, DeliveryError>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let deadline = Instant::now() + self.config.poll_timeout;
        let mut latest: Option<RunState> = None;
        let mut polls = 0u32;

        loop {
            polls += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let fetched = tokio::time::timeout(remaining, self.status.fetch(run_id))
                .await
                .unwrap_or_else(|_| {
                    Err(DeliveryError::Poll {
                        run_id: run_id.to_string(),
                        message: "status request outlived the poll timeout".to_string(),
                    })
                });
            match fetched {
                Ok(state) => {
                    self.metrics.record_poll(true);
                    progress(ProgressUpdate::counts(state.completed_count(), state.total()));

                    if state.status.is_terminal() {
                        tracing::info!(
                            run_id = %run_id,
                            status = %state.status,
                            polls = polls,
                            "Run reached terminal state via polling"
                        );
                        return Ok(DeliveryOutcome {
                            state,
                            path: DeliveryPath::Polling,
                            timed_out: false,
                            live_steps: Vec::new(),
                        });
                    }
                    latest = Some(state);
                }
                Err(e) => {
                    self.metrics.record_poll(false);
                    tracing::warn!(run_id = %run_id, poll = polls, error = %e, "Status poll failed");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }

        match latest {
            Some(state) => {
                tracing::warn!(
                    run_id = %run_id,
                    status = %state.status,
                    timeout_secs = self.config.poll_timeout.as_secs(),
                    "Polling timed out; returning latest known state"
                );
                Ok(DeliveryOutcome {
                    state,
                    path: DeliveryPath::Polling,
                    timed_out: true,
                    live_steps: Vec::new(),
                })
            }
            None => Err(original),
        }
    }

    async fn judge_results(&self, state: &mut RunState, request: &EvaluationRequest) {
        let Some(judge) = &self.judge else {
            return;
        };

        for result in state
            .results
            .iter_mut()
            .filter(|r| r.status == EvaluationStatus::Completed && r.verdict.is_none())
        {
            sort_steps(&mut result.trajectory);
            let mut judge_request =
                JudgeRequest::new(result.trajectory.clone(), result.expected.clone());
            if let Some(model) = &request.judge_model {
                judge_request = judge_request.with_model(model.clone());
            }

            match judge.judge(&judge_request).await {
                Ok(verdict) => result.verdict = Some(verdict),
                Err(e) => {
                    tracing::error!(
                        test_case_id = %result.test_case_id,
                        error = %e,
                        "Judging failed; recording failed verdict"
                    );
                    let message = e.to_string();
                    result.status = EvaluationStatus::Failed;
                    result.verdict = Some(Verdict::failed(message.clone()));
                    result.error = Some(message);
                }
            }
        }
    }
}

fn handle_record<F>(
    value: Value,
    capture: &mut LiveCapture,
    progress: &mut F,
) -> Result<Flow, StreamError>
where
    F: FnMut(ProgressUpdate),
{
    let record = match serde_json::from_value::<StreamRecord>(value) {
        Ok(record) => record,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable evaluation record");
            return Ok(Flow::Continue);
        }
    };

    match record {
        StreamRecord::Started { run_id } => {
            tracing::info!(run_id = %run_id, "Evaluation run started");
            capture.run_id = Some(run_id);
            progress(ProgressUpdate::message("Evaluation started"));
            Ok(Flow::Continue)
        }
        StreamRecord::Progress {
            completed,
            total,
            message,
            test_case_id,
            step,
        } => {
            if let Some(step) = &step {
                capture.steps.push(step.clone());
            }
            progress(ProgressUpdate {
                completed,
                total,
                message: message.unwrap_or_default(),
                test_case_id,
                step,
            });
            Ok(Flow::Continue)
        }
        StreamRecord::Completed { result } | StreamRecord::Cancelled { result } => {
            capture.terminal = Some(result);
            Ok(Flow::Stop)
        }
        StreamRecord::Error { message } => Err(StreamError::Remote(message)),
        StreamRecord::Unknown => Ok(Flow::Continue),
    }
}
