//! Judge client retry behaviour against an HTTP judge service.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_eval::error::JudgeError;
use agent_eval::judge::{
    ExpectedBehavior, HttpJudgeBackend, JudgeClient, JudgeRequest, PassFailStatus, RetryPolicy,
};
use agent_eval::trajectory::{StepType, TrajectoryStep};
use common::{closed_server_url, json_response, spawn_server, text_response};
use serde_json::{json, Value};

fn request() -> JudgeRequest {
    JudgeRequest::new(
        vec![TrajectoryStep::new(StepType::Response, 1, "It is sunny in Paris.")],
        ExpectedBehavior {
            expected_outcomes: vec!["Reports the weather in Paris".to_string()],
            expected_trajectory: Vec::new(),
        },
    )
    .with_model("judge-model")
}

fn client(url: &str, max_retries: u32) -> JudgeClient {
    JudgeClient::new(Arc::new(HttpJudgeBackend::new(url)))
        .with_retry_policy(RetryPolicy::new(max_retries, Duration::from_millis(1)))
}

fn verdict() -> Value {
    json!({
        "passFailStatus": "passed",
        "metrics": {"accuracy": 0.9, "faithfulness": 1.0},
        "reasoning": "Correct city and conditions.",
        "improvementStrategies": ["Cite the data source"]
    })
}

#[tokio::test]
async fn test_recovers_from_unavailable_service() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let server = spawn_server(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            json_response(503, &json!({"error": "warming up"}))
        } else {
            json_response(200, &verdict())
        }
    })
    .await;

    let mut reasoning = None;
    let verdict = client(&format!("{}/judge", server), 9)
        .judge_with_progress(&request(), Some(|r: &str| reasoning = Some(r.to_string())))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(verdict.pass_fail_status, PassFailStatus::Passed);
    assert_eq!(verdict.metrics.accuracy, 0.9);
    assert_eq!(verdict.metrics.faithfulness, Some(1.0));
    assert_eq!(verdict.improvement_strategies.len(), 1);
    assert_eq!(reasoning.as_deref(), Some("Correct city and conditions."));
}

#[tokio::test]
async fn test_sends_request_body() {
    let body = Arc::new(Mutex::new(String::new()));
    let captured = body.clone();
    let server = spawn_server(move |line, request_body| {
        assert!(line.starts_with("POST /judge"));
        *captured.lock().unwrap() = request_body.to_string();
        json_response(200, &verdict())
    })
    .await;

    client(&format!("{}/judge", server), 0)
        .judge(&request())
        .await
        .unwrap();

    let sent: Value = serde_json::from_str(&body.lock().unwrap()).unwrap();
    assert_eq!(sent["expectedOutcomes"][0], "Reports the weather in Paris");
    assert_eq!(sent["trajectory"][0]["type"], "response");
    assert_eq!(sent["model"], "judge-model");
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let server = spawn_server(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        json_response(400, &json!({"error": "missing trajectory"}))
    })
    .await;

    let err = client(&server, 9).judge(&request()).await.unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, JudgeError::Api { status: 400, .. }));
}

#[tokio::test]
async fn test_garbage_then_fenced_verdict() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let server = spawn_server(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            text_response(200, "text/plain", "not a verdict")
        } else {
            let fenced = format!("Here you go:\n```json\n{}\n```", verdict());
            text_response(200, "text/plain", &fenced)
        }
    })
    .await;

    let verdict = client(&server, 3).judge(&request()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(verdict.passed());
}

#[tokio::test]
async fn test_exhaustion_reports_attempts_and_cause() {
    let url = closed_server_url().await;

    let err = client(&url, 2).judge(&request()).await.unwrap_err();

    match err {
        JudgeError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, JudgeError::Connectivity { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
