//! End-to-end conversion of recorded agent runs.

use agent_eval::converter::{convert_events, EventConverter};
use agent_eval::events::RawEvent;
use agent_eval::trajectory::{sort_steps, StepStatus, StepType, Trajectory};
use serde_json::{json, Value};

fn events(values: Vec<Value>) -> Vec<RawEvent> {
    values
        .into_iter()
        .map(|v| RawEvent::from_value(v).expect("valid event"))
        .collect()
}

fn types(trajectory: &Trajectory) -> Vec<StepType> {
    trajectory.steps().iter().map(|s| s.step_type).collect()
}

#[test]
fn test_tool_using_run() {
    let run = events(vec![
        json!({"type": "RUN_STARTED", "runId": "r1", "threadId": "t1", "timestamp": 1000}),
        json!({"type": "THINKING_TEXT_MESSAGE_START", "timestamp": 1001}),
        json!({"type": "THINKING_TEXT_MESSAGE_CONTENT", "delta": "Need the forecast.", "timestamp": 1002}),
        json!({"type": "THINKING_TEXT_MESSAGE_END", "timestamp": 1010}),
        json!({"type": "TEXT_MESSAGE_START", "messageId": "m1", "timestamp": 1011}),
        json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": "m1", "delta": "Let me check.", "timestamp": 1012}),
        json!({"type": "TEXT_MESSAGE_END", "messageId": "m1", "timestamp": 1013}),
        json!({"type": "TOOL_CALL_START", "toolCallId": "c1", "toolCallName": "get_weather", "timestamp": 1020}),
        json!({"type": "TOOL_CALL_ARGS", "toolCallId": "c1", "delta": "{\"city\":", "timestamp": 1021}),
        json!({"type": "TOOL_CALL_ARGS", "toolCallId": "c1", "delta": "\"Paris\"}", "timestamp": 1022}),
        json!({"type": "TOOL_CALL_END", "toolCallId": "c1", "timestamp": 1023}),
        json!({"type": "TOOL_CALL_RESULT", "toolCallId": "c1", "content": "{\"temp\": 18}", "timestamp": 1100}),
        json!({"type": "TEXT_MESSAGE_START", "messageId": "m2", "timestamp": 1200}),
        json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": "m2", "delta": "It is 18°C in Paris.", "timestamp": 1201}),
        json!({"type": "RUN_FINISHED", "runId": "r1", "timestamp": 1202}),
        json!({"type": "TEXT_MESSAGE_END", "messageId": "m2", "timestamp": 1203}),
    ]);

    let trajectory = convert_events(&run);

    assert_eq!(
        types(&trajectory),
        vec![
            StepType::Thinking,
            StepType::Assistant,
            StepType::Action,
            StepType::ToolResult,
            StepType::Response,
        ]
    );

    let steps = trajectory.steps();
    assert_eq!(steps[0].timestamp, 1002);
    assert_eq!(steps[0].latency_ms, Some(8));
    assert_eq!(steps[2].tool_name.as_deref(), Some("get_weather"));
    assert_eq!(steps[2].tool_args, Some(json!({"city": "Paris"})));
    assert_eq!(steps[2].timestamp, 1020);
    assert_eq!(steps[3].status, Some(StepStatus::Success));
    assert_eq!(steps[3].latency_ms, Some(80));
    assert_eq!(trajectory.final_response().map(|s| s.content.as_str()), Some("It is 18°C in Paris."));
}

#[test]
fn test_failing_tool_and_run_error() {
    let run = events(vec![
        json!({"type": "TOOL_CALL_START", "toolCallId": "c1", "toolCallName": "fetch", "timestamp": 10}),
        json!({"type": "TOOL_CALL_RESULT", "toolCallId": "c1", "content": "{\"error\": \"404\"}", "timestamp": 20}),
        json!({"type": "RUN_ERROR", "message": "", "code": "AGENT_CRASHED", "timestamp": 30}),
    ]);

    let trajectory = convert_events(&run);
    let steps = trajectory.steps();

    assert_eq!(types(&trajectory), vec![StepType::Action, StepType::ToolResult, StepType::ToolResult]);
    assert_eq!(steps[0].content, "Calling fetch");
    assert_eq!(steps[0].tool_args, Some(json!({})));
    assert_eq!(steps[1].status, Some(StepStatus::Failure));
    assert_eq!(steps[2].content, "AGENT_CRASHED");
    assert_eq!(trajectory.failed_steps().count(), 2);
}

#[test]
fn test_activity_based_agent() {
    let run = events(vec![
        json!({"type": "ACTIVITY_SNAPSHOT", "messageId": "a1", "content": {"title": "Running grep", "description": "pattern: \"TODO\" limit: 5"}, "timestamp": 100}),
        json!({"type": "ACTIVITY_SNAPSHOT", "messageId": "a1", "content": {"title": "Running grep…"}, "timestamp": 110}),
        json!({"type": "ACTIVITY_DELTA", "messageId": "a1", "patch": [{"op": "replace", "path": "/icon", "value": "✓"}, {"op": "add", "path": "/result", "value": "3 matches"}], "timestamp": 150}),
        json!({"type": "ACTIVITY_DELTA", "messageId": "a1", "patch": [{"op": "replace", "path": "/icon", "value": "✓"}], "timestamp": 160}),
        json!({"type": "ACTIVITY_DELTA", "messageId": "unknown", "patch": [{"icon": "done"}], "timestamp": 170}),
    ]);

    let trajectory = convert_events(&run);
    let steps = trajectory.steps();

    assert_eq!(types(&trajectory), vec![StepType::Action, StepType::ToolResult]);
    assert_eq!(steps[0].tool_name.as_deref(), Some("grep"));
    assert_eq!(steps[0].tool_args, Some(json!({"pattern": "TODO", "limit": 5})));
    assert_eq!(steps[1].content, "3 matches");
    assert_eq!(steps[1].latency_ms, Some(50));
}

#[test]
fn test_truncated_stream_is_flushed() {
    let run = events(vec![
        json!({"type": "TOOL_CALL_START", "toolCallId": "late", "toolCallName": "second", "timestamp": 50}),
        json!({"type": "TOOL_CALL_START", "toolCallId": "early", "toolCallName": "first", "timestamp": 40}),
        json!({"type": "TOOL_CALL_ARGS", "toolCallId": "early", "delta": "{not json", "timestamp": 41}),
        json!({"type": "TEXT_MESSAGE_START", "messageId": "m", "timestamp": 60}),
        json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": "m", "delta": "partial", "timestamp": 61}),
    ]);

    let trajectory = convert_events(&run);
    let steps = trajectory.steps();

    assert_eq!(types(&trajectory), vec![StepType::Action, StepType::Action, StepType::Assistant]);
    assert_eq!(steps[0].tool_name.as_deref(), Some("first"));
    assert_eq!(steps[0].tool_args, Some(json!({"_raw": "{not json"})));
    assert_eq!(steps[1].tool_name.as_deref(), Some("second"));
    assert_eq!(steps[2].content, "partial");
}

#[test]
fn test_incremental_handling_matches_batch() {
    let run = events(vec![
        json!({"type": "TOOL_CALL_START", "toolCallId": "c", "toolCallName": "calc", "timestamp": 5}),
        json!({"type": "TOOL_CALL_RESULT", "toolCallId": "c", "content": "42", "timestamp": 9}),
        json!({"type": "TEXT_MESSAGE_START", "messageId": "m", "timestamp": 10}),
        json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": "m", "delta": "42", "timestamp": 11}),
        json!({"type": "RUN_FINISHED", "timestamp": 12}),
        json!({"type": "TEXT_MESSAGE_END", "messageId": "m", "timestamp": 13}),
    ]);

    let mut converter = EventConverter::new();
    let mut steps = Vec::new();
    for event in &run {
        steps.extend(converter.handle(event));
    }
    assert!(converter.has_emitted_action());
    assert!(converter.is_run_finished());
    assert_eq!(converter.open_tool_calls(), 0);
    steps.extend(converter.finish());
    sort_steps(&mut steps);

    let batch = convert_events(&run);
    let incremental: Vec<(StepType, i64, String)> = steps
        .iter()
        .map(|s| (s.step_type, s.timestamp, s.content.clone()))
        .collect();
    let batched: Vec<(StepType, i64, String)> = batch
        .steps()
        .iter()
        .map(|s| (s.step_type, s.timestamp, s.content.clone()))
        .collect();
    assert_eq!(incremental, batched);
}

#[test]
fn test_trajectory_json_shape() {
    let run = events(vec![
        json!({"type": "TOOL_CALL_START", "toolCallId": "c", "toolCallName": "calc", "timestamp": 5}),
        json!({"type": "TOOL_CALL_END", "toolCallId": "c", "timestamp": 6}),
    ]);

    let value = serde_json::to_value(convert_events(&run)).unwrap();
    let step = &value[0];
    assert_eq!(step["type"], "action");
    assert_eq!(step["toolName"], "calc");
    assert_eq!(step["timestamp"], 5);
    assert!(step.get("latencyMs").is_none());
}
