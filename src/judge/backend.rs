//! Judge backends: one attempt against an external scoring service.
//!
//! Retry lives in [`super::JudgeClient`]; a backend only performs a single
//! call and classifies its failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::types::{JudgeRequest, Verdict};
use crate::error::JudgeError;
use crate::llm::{GenerationRequest, LlmProvider, Message};

/// Default request timeout for a single judge call.
pub const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(300);

/// A single-attempt judge.
#[async_trait]
pub trait JudgeBackend: Send + Sync {
    async fn evaluate(&self, request: &JudgeRequest) -> Result<Verdict, JudgeError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Judge reached over HTTP: POSTs the request, reads a JSON verdict.
#[derive(Debug, Clone)]
pub struct HttpJudgeBackend {
    url: String,
    http: Client,
}

impl HttpJudgeBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, DEFAULT_JUDGE_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            http: Client::builder().timeout(timeout).build().unwrap_or_default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Anything reqwest reports while talking to the service is network
    /// class; only a request that could not be built is a setup problem.
    fn transport_error(&self, err: reqwest::Error) -> JudgeError {
        if err.is_builder() {
            JudgeError::Configuration(format!("invalid judge request for {}: {}", self.url, err))
        } else {
            JudgeError::Connectivity {
                endpoint: self.url.clone(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl JudgeBackend for HttpJudgeBackend {
    async fn evaluate(&self, request: &JudgeRequest) -> Result<Verdict, JudgeError> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::Api {
                status: status.as_u16(),
                message: if body.is_empty() {
                    status.to_string()
                } else {
                    body
                },
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        parse_verdict(&body)
    }

    fn describe(&self) -> String {
        format!("http judge at {}", self.url)
    }
}

const JUDGE_SYSTEM_PROMPT: &str = r#"You are an impartial evaluator of AI agent runs.

You receive the agent's trajectory (thinking, assistant text, tool actions, tool results and the final response, in chronological order), the expected outcomes, and optionally execution logs.

Judge whether the agent achieved the expected outcomes. Penalize hallucinated tool results, unnecessary tool calls and answers that contradict tool output.

Respond with a single JSON object and nothing else:
{
  "passFailStatus": "passed" | "failed",
  "metrics": {
    "accuracy": <0.0-1.0>,
    "faithfulness": <0.0-1.0>,
    "latencyScore": <0.0-1.0>,
    "trajectoryAlignmentScore": <0.0-1.0>
  },
  "reasoning": "<why>",
  "improvementStrategies": ["<concrete suggestion>", ...]
}"#;

/// Judge backed by an OpenAI-compatible chat model.
pub struct LlmJudgeBackend {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmJudgeBackend {
    /// `model` may be empty to use the provider's default.
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    fn build_prompt(request: &JudgeRequest) -> Result<String, JudgeError> {
        let trajectory = serde_json::to_string_pretty(&request.trajectory)
            .map_err(|e| JudgeError::Configuration(format!("unserializable trajectory: {}", e)))?;

        let mut prompt = String::new();
        prompt.push_str("## Trajectory\n```json\n");
        prompt.push_str(&trajectory);
        prompt.push_str("\n```\n\n## Expected outcomes\n");
        if request.expected.expected_outcomes.is_empty() {
            prompt.push_str("- (none given)\n");
        }
        for outcome in &request.expected.expected_outcomes {
            prompt.push_str(&format!("- {}\n", outcome));
        }
        if !request.expected.expected_trajectory.is_empty() {
            prompt.push_str("\n## Expected steps\n");
            for (i, step) in request.expected.expected_trajectory.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, step));
            }
        }
        if let Some(logs) = request.logs.as_deref().filter(|l| !l.trim().is_empty()) {
            prompt.push_str("\n## Execution logs\n```\n");
            prompt.push_str(logs);
            prompt.push_str("\n```\n");
        }
        Ok(prompt)
    }
}

#[async_trait]
impl JudgeBackend for LlmJudgeBackend {
    async fn evaluate(&self, request: &JudgeRequest) -> Result<Verdict, JudgeError> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let generation = GenerationRequest::new(
            model,
            vec![
                Message::system(JUDGE_SYSTEM_PROMPT),
                Message::user(Self::build_prompt(request)?),
            ],
        )
        .with_temperature(0.0)
        .with_json_output();

        let response = self.provider.generate(generation).await?;
        let content = response
            .first_content()
            .ok_or_else(|| JudgeError::InvalidResponse("judge model returned no choices".to_string()))?;
        parse_verdict(content)
    }

    fn describe(&self) -> String {
        if self.model.is_empty() {
            "llm judge".to_string()
        } else {
            format!("llm judge ({})", self.model)
        }
    }
}

/// Parses a verdict from a reply that may wrap the JSON object in prose or
/// code fences.
///
/// The first complete JSON object that reads as a verdict wins; text after
/// it is ignored. A reply without `metrics` is not a verdict.
pub fn parse_verdict(text: &str) -> Result<Verdict, JudgeError> {
    let mut first_error = None;
    for (start, _) in text.match_indices('{') {
        let Some(Ok(value)) = serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<Value>()
            .next()
        else {
            continue;
        };
        match verdict_from_value(value) {
            Ok(verdict) => return Ok(verdict),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(first_error.unwrap_or_else(|| {
        JudgeError::InvalidResponse(format!("no JSON object in judge reply: {}", preview(text)))
    }))
}

fn verdict_from_value(value: Value) -> Result<Verdict, JudgeError> {
    if !value.get("metrics").is_some_and(Value::is_object) {
        return Err(JudgeError::InvalidResponse(format!(
            "verdict is missing metrics: {}",
            preview(&value.to_string())
        )));
    }
    serde_json::from_value(value)
        .map_err(|e| JudgeError::InvalidResponse(format!("malformed verdict: {}", e)))
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::judge::types::{ExpectedBehavior, PassFailStatus};
    use crate::llm::{Choice, GenerationResponse, Usage};
    use std::sync::Mutex;

    struct CannedProvider {
        reply: Result<String, u16>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            self.seen.lock().expect("lock").push(request);
            match &self.reply {
                Ok(content) => Ok(GenerationResponse {
                    id: "r".to_string(),
                    model: "m".to_string(),
                    choices: vec![Choice {
                        index: 0,
                        message: Message::assistant(content.clone()),
                        finish_reason: Some("stop".to_string()),
                    }],
                    usage: Usage::default(),
                }),
                Err(code) => Err(LlmError::ApiError {
                    code: *code,
                    message: "upstream".to_string(),
                }),
            }
        }
    }

    fn request() -> JudgeRequest {
        JudgeRequest::new(
            Vec::new(),
            ExpectedBehavior {
                expected_outcomes: vec!["answer mentions Paris".to_string()],
                expected_trajectory: vec!["search the web".to_string()],
            },
        )
        .with_logs("run ok")
    }

    #[test]
    fn test_parse_verdict_from_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"passFailStatus\": \"passed\", \"metrics\": {\"accuracy\": 0.8}, \"reasoning\": \"fine\"}\n```";
        let verdict = parse_verdict(reply).expect("verdict");
        assert_eq!(verdict.pass_fail_status, PassFailStatus::Passed);
        assert_eq!(verdict.reasoning, "fine");
    }

    #[test]
    fn test_parse_verdict_without_json_is_invalid_response() {
        let err = parse_verdict("I refuse").expect_err("no json");
        assert!(matches!(err, JudgeError::InvalidResponse(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_verdict_rejects_reply_without_metrics() {
        let err = parse_verdict(r#"{"error": "model overloaded, try later"}"#)
            .expect_err("not a verdict");
        assert!(matches!(err, JudgeError::InvalidResponse(ref m) if m.contains("metrics")));
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_verdict_keeps_missing_status_as_failed() {
        let verdict = parse_verdict(r#"{"metrics": {"accuracy": 0.4}, "reasoning": "partial"}"#)
            .expect("verdict");
        assert_eq!(verdict.pass_fail_status, PassFailStatus::Failed);
        assert_eq!(verdict.metrics.accuracy, 0.4);
    }

    #[test]
    fn test_parse_verdict_ignores_braces_after_object() {
        let reply = "{\"passFailStatus\":\"passed\",\"metrics\":{\"accuracy\":1.0},\"reasoning\":\"ok\"}\nNote: the agent used {placeholders} correctly.";
        let verdict = parse_verdict(reply).expect("first object is the verdict");
        assert!(verdict.passed());
        assert_eq!(verdict.reasoning, "ok");
    }

    #[test]
    fn test_parse_verdict_skips_brace_prose_before_object() {
        let reply = "Checked {city} handling. {\"passFailStatus\": \"failed\", \"metrics\": {\"accuracy\": 0.1}, \"reasoning\": \"wrong {unit}\"}";
        let verdict = parse_verdict(reply).expect("verdict");
        assert!(!verdict.passed());
        assert_eq!(verdict.reasoning, "wrong {unit}");
    }

    #[test]
    fn test_prompt_includes_expectations_and_logs() {
        let prompt = LlmJudgeBackend::build_prompt(&request()).expect("prompt");
        assert!(prompt.contains("- answer mentions Paris"));
        assert!(prompt.contains("1. search the web"));
        assert!(prompt.contains("run ok"));
    }

    #[tokio::test]
    async fn test_llm_backend_uses_request_model() {
        let provider = Arc::new(CannedProvider {
            reply: Ok(
                r#"{"passFailStatus": "failed", "metrics": {"accuracy": 0.2}, "reasoning": "wrong city"}"#
                    .to_string(),
            ),
            seen: Mutex::new(Vec::new()),
        });
        let backend = LlmJudgeBackend::new(provider.clone(), "default-judge");

        let verdict = backend
            .evaluate(&request().with_model("override"))
            .await
            .expect("verdict");
        assert_eq!(verdict.reasoning, "wrong city");

        let seen = provider.seen.lock().expect("lock");
        assert_eq!(seen[0].model, "override");
        assert_eq!(seen[0].temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_llm_backend_maps_server_errors() {
        let provider = Arc::new(CannedProvider {
            reply: Err(502),
            seen: Mutex::new(Vec::new()),
        });
        let backend = LlmJudgeBackend::new(provider, "");
        let err = backend.evaluate(&request()).await.expect_err("502");
        assert!(matches!(err, JudgeError::Api { status: 502, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_http_backend_unreachable_is_connectivity() {
        let backend = HttpJudgeBackend::new("http://127.0.0.1:1/judge");
        let err = backend.evaluate(&request()).await.expect_err("nothing listens");
        assert!(matches!(err, JudgeError::Connectivity { .. }));
        assert!(err.to_string().contains("127.0.0.1:1"));
    }

    /// Accepts one connection, reads the request and answers with `reply`
    /// (possibly nothing) before hanging up.
    async fn one_shot_server(reply: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/judge", addr)
    }

    #[tokio::test]
    async fn test_http_backend_dropped_connection_is_connectivity() {
        let url = one_shot_server("").await;
        let err = HttpJudgeBackend::new(url.clone())
            .evaluate(&request())
            .await
            .expect_err("connection closed without a response");
        assert!(matches!(err, JudgeError::Connectivity { ref endpoint, .. } if *endpoint == url));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_http_backend_truncated_body_is_connectivity() {
        let url = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 200\r\n\r\n{\"passFailStatus\"",
        )
        .await;
        let err = HttpJudgeBackend::new(url)
            .evaluate(&request())
            .await
            .expect_err("body cut short");
        assert!(matches!(err, JudgeError::Connectivity { .. }));
    }
}
