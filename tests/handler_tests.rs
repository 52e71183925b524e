// ABOUTME: Handler tests - authorization, commands, rate limiting, and attachments.
// ABOUTME: Drives the handler with a scripted agent and an in-memory chat.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ferry::handler::{
    AttachmentHandler, AttachmentRef, Handler, IncomingMessage, TypingIndicator,
    DEFAULT_ATTACHMENT_PROMPT,
};
use ferry_agent::testing::{Script, ScriptedRunner};
use ferry_core::testing::RecordingSurface;
use ferry_core::{
    Config, Format, MessageRef, MessageSurface, RateLimiter, SessionStore, SurfaceError,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const USER: u64 = 42;

#[derive(Clone, Default)]
struct TestChat {
    surface: RecordingSurface,
    files: Arc<HashMap<String, Vec<u8>>>,
    typing: Arc<AtomicUsize>,
}

impl TestChat {
    fn with_file(mut self, file_id: &str, data: &[u8]) -> Self {
        let mut files = (*self.files).clone();
        files.insert(file_id.to_string(), data.to_vec());
        self.files = Arc::new(files);
        self
    }
}

#[async_trait]
impl MessageSurface for TestChat {
    async fn send(&self, text: &str, format: Format) -> Result<MessageRef, SurfaceError> {
        self.surface.send(text, format).await
    }

    async fn edit(&self, message: &MessageRef, text: &str, format: Format) -> Result<(), SurfaceError> {
        self.surface.edit(message, text, format).await
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), SurfaceError> {
        self.surface.delete(message).await
    }
}

#[async_trait]
impl TypingIndicator for TestChat {
    async fn set_typing(&self) -> Result<()> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl AttachmentHandler for TestChat {
    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {}", file_id))
    }
}

struct Fixture {
    _dir: TempDir,
    workspace: std::path::PathBuf,
    runner: ScriptedRunner,
    handler: Handler,
}

fn fixture(runner: ScriptedRunner, max_requests: u32) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().to_path_buf();

    let mut config = Config::default();
    config.telegram.allowed_users = vec![USER];
    config.workspace.path = workspace.display().to_string();
    config.delivery.chunk_delay_ms = 0;

    let sessions = SessionStore::new(&workspace).unwrap();
    let limiter = Arc::new(RateLimiter::new(max_requests, Duration::from_secs(60)));
    let handler = Handler::new(
        Arc::new(config),
        Arc::new(runner.clone()),
        sessions,
        limiter,
    )
    .with_bot_username("ferry_bot");

    Fixture {
        _dir: dir,
        workspace,
        runner,
        handler,
    }
}

fn text(body: &str) -> IncomingMessage {
    IncomingMessage {
        user_id: USER,
        chat_id: 7,
        text: body.to_string(),
        attachment: None,
    }
}

#[tokio::test]
async fn test_unauthorized_user_is_rejected() {
    let f = fixture(ScriptedRunner::new(), 10);
    let chat = TestChat::default();
    let mut msg = text("hello");
    msg.user_id = 99;

    f.handler.handle(&chat, msg).await.unwrap();

    let sent = chat.surface.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("not authorized"));
    assert!(sent[0].contains("99"));
    assert!(f.runner.requests().is_empty());
}

#[tokio::test]
async fn test_message_runs_turn_and_saves_session() {
    let runner = ScriptedRunner::new().on_prompt(
        "hello",
        Script::new()
            .init("sess-abc")
            .event(json!({
                "type": "result",
                "subtype": "success",
                "is_error": false,
                "result": "Hello back",
                "session_id": "sess-abc",
                "total_cost_usd": 0.25
            })),
    );
    let f = fixture(runner, 10);
    let chat = TestChat::default();

    f.handler.handle(&chat, text("hello")).await.unwrap();

    assert_eq!(
        f.handler.sessions().get_session_id(USER).unwrap().as_deref(),
        Some("sess-abc")
    );
    let requests = f.runner.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].session_id, None);
    assert_eq!(
        requests[0].working_dir.as_deref(),
        Some(f.workspace.join(USER.to_string()).as_path())
    );
    assert_eq!(chat.surface.edits().last().unwrap().0, "Hello back");
    let user = f.handler.sessions().get_user(USER).unwrap();
    assert_eq!(user.turns, 1);
    assert!((user.total_cost_usd - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn test_second_message_resumes_session() {
    let runner = ScriptedRunner::new()
        .on_prompt("first", Script::new().init("sess-1").result_ok("one"))
        .on_prompt("second", Script::new().init("sess-1").result_ok("two"));
    let f = fixture(runner, 10);
    let chat = TestChat::default();

    f.handler.handle(&chat, text("first")).await.unwrap();
    f.handler.handle(&chat, text("second")).await.unwrap();

    let requests = f.runner.requests();
    assert_eq!(requests[1].session_id.as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn test_new_command_clears_session() {
    let runner = ScriptedRunner::new().on_prompt("hi", Script::new().init("sess-1").result_ok("hey"));
    let f = fixture(runner, 10);
    let chat = TestChat::default();

    f.handler.handle(&chat, text("hi")).await.unwrap();
    f.handler.handle(&chat, text("/new")).await.unwrap();

    assert_eq!(f.handler.sessions().get_session_id(USER).unwrap(), None);
    assert!(chat.surface.sent_texts().last().unwrap().contains("fresh conversation"));
}

#[tokio::test]
async fn test_status_and_help_do_not_reach_agent() {
    let f = fixture(ScriptedRunner::new(), 10);
    let chat = TestChat::default();

    f.handler.handle(&chat, text("/status")).await.unwrap();
    f.handler.handle(&chat, text("/help@ferry_bot")).await.unwrap();
    f.handler.handle(&chat, text("/help@other_bot")).await.unwrap();

    let sent = chat.surface.sent_texts();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].starts_with("📊 Status"));
    assert!(sent[0].contains("Session: none"));
    assert!(f.runner.requests().is_empty());
}

#[tokio::test]
async fn test_unknown_command_is_forwarded() {
    let runner = ScriptedRunner::new().on_prompt("/compact", Script::new().result_ok("compacted"));
    let f = fixture(runner, 10);
    let chat = TestChat::default();

    f.handler.handle(&chat, text("  /compact now ")).await.unwrap();

    assert_eq!(f.runner.requests()[0].prompt, "/compact now");
}

#[tokio::test]
async fn test_rate_limit_blocks_extra_messages() {
    let runner = ScriptedRunner::new()
        .on_prompt("one", Script::new().result_ok("1"))
        .on_prompt("two", Script::new().result_ok("2"));
    let f = fixture(runner, 1);
    let chat = TestChat::default();

    f.handler.handle(&chat, text("one")).await.unwrap();
    f.handler.handle(&chat, text("two")).await.unwrap();

    assert_eq!(f.runner.requests().len(), 1);
    assert!(chat.surface.sent_texts().last().unwrap().starts_with("⏳ Slow down!"));
}

#[tokio::test]
async fn test_invalid_session_is_cleared() {
    let runner = ScriptedRunner::new()
        .on_prompt("first", Script::new().init("stale").result_ok("ok"))
        .on_prompt(
            "second",
            Script::new().exit_failure(1, "No conversation found with session ID: stale"),
        );
    let f = fixture(runner, 10);
    let chat = TestChat::default();

    f.handler.handle(&chat, text("first")).await.unwrap();
    f.handler.handle(&chat, text("second")).await.unwrap();

    assert_eq!(f.handler.sessions().get_session_id(USER).unwrap(), None);
    assert!(chat.surface.edits().last().unwrap().0.contains("could not be resumed"));
}

#[tokio::test]
async fn test_attachment_is_staged_and_referenced() {
    let runner = ScriptedRunner::new().on_prompt("[Attached file", Script::new().result_ok("got it"));
    let f = fixture(runner, 10);
    let chat = TestChat::default().with_file("file-1", b"col1,col2\n");

    let msg = IncomingMessage {
        user_id: USER,
        chat_id: 7,
        text: String::new(),
        attachment: Some(AttachmentRef {
            file_id: "file-1".to_string(),
            filename: "../report.csv".to_string(),
        }),
    };
    f.handler.handle(&chat, msg).await.unwrap();

    let staged = f
        .workspace
        .join(USER.to_string())
        .join("uploads")
        .join("report.csv");
    assert_eq!(std::fs::read(&staged).unwrap(), b"col1,col2\n");
    assert_eq!(
        f.runner.requests()[0].prompt,
        format!("{}\n\n[Attached file: uploads/report.csv]", DEFAULT_ATTACHMENT_PROMPT)
    );

    f.handler.handle(&chat, text("/files")).await.unwrap();
    assert!(chat.surface.sent_texts().last().unwrap().contains("uploads/report.csv"));
}

#[tokio::test]
async fn test_failed_download_is_reported() {
    let f = fixture(ScriptedRunner::new(), 10);
    let chat = TestChat::default();

    let msg = IncomingMessage {
        user_id: USER,
        chat_id: 7,
        text: "look".to_string(),
        attachment: Some(AttachmentRef {
            file_id: "missing".to_string(),
            filename: "a.txt".to_string(),
        }),
    };
    f.handler.handle(&chat, msg).await.unwrap();

    assert!(chat.surface.sent_texts()[0].starts_with("❌ Couldn't save your file"));
    assert!(f.runner.requests().is_empty());
}
