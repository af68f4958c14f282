//! Judge client with bounded retry and exponential backoff.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::backend::JudgeBackend;
use super::types::{JudgeRequest, Verdict};
use crate::error::JudgeError;
use crate::metrics::{JudgeOutcome, MetricsCollector};

/// Retries after the first attempt, so ten calls in total.
pub const DEFAULT_MAX_RETRIES: u32 = 9;

/// Delay before the second attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Retry schedule for judge calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Total number of calls, `max_retries + 1`.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before 1-based attempt `attempt`: zero for the first, then
    /// `base_delay × 2^(attempt-2)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Obtains verdicts from a [`JudgeBackend`], retrying transient failures.
#[derive(Clone)]
pub struct JudgeClient {
    backend: Arc<dyn JudgeBackend>,
    policy: RetryPolicy,
    metrics: MetricsCollector,
}

impl JudgeClient {
    pub fn new(backend: Arc<dyn JudgeBackend>) -> Self {
        Self {
            backend,
            policy: RetryPolicy::default(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Judges a trajectory without a completion callback.
    pub async fn judge(&self, request: &JudgeRequest) -> Result<Verdict, JudgeError> {
        self.judge_with_progress(request, None::<fn(&str)>).await
    }

    /// Judges a trajectory.
    ///
    /// `on_complete` fires exactly once, after a verdict has been obtained,
    /// with the verdict's reasoning. It never fires on failure.
    ///
    /// # Errors
    ///
    /// Non-transient failures are returned immediately. When every attempt
    /// fails transiently, returns [`JudgeError::RetriesExhausted`] carrying
    /// the attempt count and the last error.
    pub async fn judge_with_progress<F>(
        &self,
        request: &JudgeRequest,
        on_complete: Option<F>,
    ) -> Result<Verdict, JudgeError>
    where
        F: FnOnce(&str) + Send,
    {
        let attempts = self.policy.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.policy.delay_before(attempt);
                tracing::debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying judge after transient failure"
                );
                tokio::time::sleep(delay).await;
            }

            let started = Instant::now();
            match self.backend.evaluate(request).await {
                Ok(verdict) => {
                    self.metrics
                        .record_judge_attempt(JudgeOutcome::Success, started.elapsed().as_secs_f64());
                    tracing::info!(
                        backend = %self.backend.describe(),
                        attempt = attempt,
                        passed = verdict.passed(),
                        accuracy = verdict.metrics.accuracy,
                        "Judge returned verdict"
                    );
                    if let Some(callback) = on_complete {
                        callback(&verdict.reasoning);
                    }
                    return Ok(verdict);
                }
                Err(err) if err.is_transient() => {
                    self.metrics
                        .record_judge_attempt(JudgeOutcome::Transient, started.elapsed().as_secs_f64());
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %err,
                        "Transient judge error, will retry"
                    );
                    last_error = Some(err);
                }
                Err(err) => {
                    self.metrics
                        .record_judge_attempt(JudgeOutcome::Fatal, started.elapsed().as_secs_f64());
                    tracing::error!(error = %err, "Judge failed with non-retryable error");
                    return Err(err);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| {
            JudgeError::InvalidResponse("no judge attempt was made".to_string())
        });
        tracing::error!(attempts = attempts, error = %last, "Judge retries exhausted");
        Err(JudgeError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        })
    }
}
