// ABOUTME: End-to-end turn tests - scripted agent output streamed into a recording surface.
// ABOUTME: Checks throttled drafts, final reconciliation, and failure display.

use ferry_agent::testing::{Script, ScriptedRunner};
use ferry_core::delivery::{Delivery, DeliverySettings, DeliveryThrottler, Format};
use ferry_core::relay::{run_turn, EMPTY_ANSWER};
use ferry_core::render::PLACEHOLDER;
use ferry_core::testing::{RecordingSurface, SurfaceOp};
use ferry_core::TurnRequest;
use serde_json::json;
use std::time::Duration;

fn throttler(surface: &RecordingSurface) -> DeliveryThrottler<RecordingSurface> {
    DeliveryThrottler::new(
        surface.clone(),
        DeliverySettings {
            chunk_delay: Duration::ZERO,
            ..Default::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_short_answer_is_edited_into_placeholder() {
    let runner = ScriptedRunner::new().on_prompt(
        "hello",
        Script::new()
            .init("sess-1")
            .text("Hi")
            .text("Hi there")
            .result_ok("Hi there!"),
    );
    let surface = RecordingSurface::new();
    let report = run_turn(&runner, &throttler(&surface), TurnRequest::new("hello")).await;

    assert!(report.outcome.success);
    assert_eq!(report.outcome.session_id.as_deref(), Some("sess-1"));
    assert_eq!(report.delivery, Some(Delivery::EditedInPlace));
    assert_eq!(surface.sent_texts(), vec![PLACEHOLDER.to_string()]);
    assert_eq!(surface.edits().last().unwrap().0, "Hi there!");
}

#[tokio::test(start_paused = true)]
async fn test_fast_updates_are_throttled() {
    let mut script = Script::new();
    let mut text = String::new();
    for word in ["one", "two", "three", "four", "five"] {
        text.push_str(word);
        text.push(' ');
        script = script.text(&text);
    }
    let runner = ScriptedRunner::new().on_prompt("count", script.result_ok("done"));
    let surface = RecordingSurface::new();
    run_turn(&runner, &throttler(&surface), TurnRequest::new("count")).await;

    // one streaming edit for the burst, one final edit
    assert_eq!(surface.edit_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_updates_each_reach_the_surface() {
    let runner = ScriptedRunner::new().on_prompt(
        "slow",
        Script::new()
            .text("a")
            .text("ab")
            .text("abc")
            .result_ok("abc")
            .with_line_delay(Duration::from_millis(600)),
    );
    let surface = RecordingSurface::new();
    run_turn(&runner, &throttler(&surface), TurnRequest::new("slow")).await;

    let edits: Vec<String> = surface.edits().into_iter().map(|(t, _)| t).collect();
    assert_eq!(edits, vec!["a ▌", "ab ▌", "abc ▌", "abc"]);
}

#[tokio::test(start_paused = true)]
async fn test_progress_then_answer() {
    let runner = ScriptedRunner::new().on_prompt(
        "read",
        Script::new()
            .tool_use("Read", json!({"file_path": "/tmp/notes.md"}))
            .text("hidden while the tool runs")
            .tool_result()
            .result_ok("Notes are empty.")
            .with_line_delay(Duration::from_secs(1)),
    );
    let surface = RecordingSurface::new();
    let report = run_turn(&runner, &throttler(&surface), TurnRequest::new("read it")).await;

    let edits: Vec<String> = surface.edits().into_iter().map(|(t, _)| t).collect();
    assert_eq!(edits[0], "📖 Reading /tmp/notes.md...");
    assert_eq!(edits.last().map(String::as_str), Some("Notes are empty."));
    assert_eq!(report.outcome.output, "Notes are empty.");
}

#[tokio::test(start_paused = true)]
async fn test_long_answer_is_split_into_parts() {
    let long = "paragraph text here. ".repeat(500);
    let runner = ScriptedRunner::new().on_prompt("essay", Script::new().result_ok(&long));
    let surface = RecordingSurface::new();
    let report = run_turn(&runner, &throttler(&surface), TurnRequest::new("essay")).await;

    assert_eq!(report.delivery, Some(Delivery::Sent { parts: 3 }));
    assert_eq!(surface.deleted(), vec![1]);
    assert_eq!(surface.sent_texts().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_error_result_is_shown_plain() {
    let runner = ScriptedRunner::new().on_prompt(
        "fail",
        Script::new()
            .result_error(&["a", "b"])
            .exit_failure(1, ""),
    );
    let surface = RecordingSurface::new();
    let report = run_turn(&runner, &throttler(&surface), TurnRequest::new("fail")).await;

    assert!(!report.outcome.success);
    assert_eq!(report.outcome.error.as_deref(), Some("a; b"));
    let (text, format) = surface.edits().last().cloned().unwrap();
    assert_eq!(text, "❌ a; b");
    assert_eq!(format, Format::Plain);
}

#[tokio::test(start_paused = true)]
async fn test_spawn_failure_is_reported() {
    let runner = ScriptedRunner::new().on_prompt(
        "x",
        Script::new().spawn_error("Failed to start agent 'claude': not found"),
    );
    let surface = RecordingSurface::new();
    let report = run_turn(&runner, &throttler(&surface), TurnRequest::new("x")).await;

    assert!(!report.outcome.started);
    assert!(surface.edits().last().unwrap().0.starts_with("❌ Failed to start agent"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_success_gets_placeholder_answer() {
    let runner = ScriptedRunner::new().on_prompt("quiet", Script::new());
    let surface = RecordingSurface::new();
    run_turn(&runner, &throttler(&surface), TurnRequest::new("quiet")).await;

    assert_eq!(surface.edits().last().unwrap().0, EMPTY_ANSWER);
}

#[tokio::test(start_paused = true)]
async fn test_request_reaches_runner() {
    let runner = ScriptedRunner::new().on_prompt("hi", Script::new().result_ok("ok"));
    let surface = RecordingSurface::new();
    run_turn(
        &runner,
        &throttler(&surface),
        TurnRequest::new("hi").with_session(Some("resume-me".to_string())),
    )
    .await;

    let requests = runner.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].session_id.as_deref(), Some("resume-me"));
    assert!(matches!(surface.ops()[0], SurfaceOp::Send { .. }));
}
