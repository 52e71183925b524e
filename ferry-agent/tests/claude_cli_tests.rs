// ABOUTME: Tests for the Claude CLI runner against fake agent scripts.
// ABOUTME: Covers config parsing, spawn failure, exits, and noisy stderr.

use ferry_agent::{AgentRunner, AgentUpdate, ClaudeCli, ClaudeCliConfig, TurnRequest};
use tokio::sync::mpsc;

#[test]
fn test_claude_cli_config_deserializes() {
    let config: ClaudeCliConfig = toml::from_str(
        r#"
        binary = "/usr/local/bin/claude"
        permission_mode = "acceptEdits"
        max_turns = 10
        allowed_tools = ["Read", "Grep"]
        "#,
    )
    .unwrap();
    assert_eq!(config.binary, "/usr/local/bin/claude");
    assert_eq!(config.permission_mode.as_deref(), Some("acceptEdits"));
    assert_eq!(config.max_turns, Some(10));
    assert_eq!(config.allowed_tools, vec!["Read", "Grep"]);
}

#[test]
fn test_claude_cli_config_defaults() {
    let config: ClaudeCliConfig = toml::from_str("").unwrap();
    assert_eq!(config.binary, "claude");
    assert!(config.model.is_none());
    assert!(config.extra_args.is_empty());
}

#[tokio::test]
async fn test_missing_binary_is_not_started() {
    let cli = ClaudeCli::new(ClaudeCliConfig {
        binary: "/nonexistent/ferry-test-claude".to_string(),
        ..Default::default()
    });
    let (tx, mut rx) = mpsc::channel(8);
    let outcome = cli.run(TurnRequest::new("hello"), tx).await;

    assert!(!outcome.success);
    assert!(!outcome.started);
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .contains("Failed to start agent"));
    assert!(rx.recv().await.is_none());
}

#[cfg(unix)]
mod fake_agent {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// Write an executable shell script that ignores its arguments
    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("fake-claude");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn runner(path: PathBuf) -> ClaudeCli {
        ClaudeCli::new(ClaudeCliConfig {
            binary: path.to_string_lossy().to_string(),
            ..Default::default()
        })
    }

    async fn run(cli: &ClaudeCli) -> (ferry_agent::TurnOutcome, Vec<AgentUpdate>) {
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = cli.run(TurnRequest::new("hi"), tx).await;
        let mut updates = Vec::new();
        while let Some(u) = rx.recv().await {
            updates.push(u);
        }
        (outcome, updates)
    }

    #[tokio::test]
    async fn test_full_turn_with_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            &dir,
            r#"echo '{"type":"system","subtype":"init","session_id":"sess-1"}'
echo 'diagnostic noise'
echo '{"type":"assistant","message":{"content":[{"type":"text","text":"Hel"}]}}'
echo '{"type":"assistant","message":{"content":[{"type":"text","text":"Hello"}]}}'
echo '{"type":"result","subtype":"success","is_error":false,"result":"Hello","session_id":"sess-1","total_cost_usd":0.01}'"#,
        );
        let (outcome, updates) = run(&runner(path)).await;

        assert!(outcome.success);
        assert_eq!(outcome.output, "Hello");
        assert_eq!(outcome.session_id.as_deref(), Some("sess-1"));
        assert_eq!(outcome.usage.unwrap().cost_usd, Some(0.01));
        assert_eq!(
            updates,
            vec![
                AgentUpdate::Text("Hel".to_string()),
                AgentUpdate::Text("Hello".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_clean_exit_without_result_uses_accumulated_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            &dir,
            r#"echo '{"type":"assistant","message":{"content":[{"type":"text","text":"partial answer"}]}}'
exit 0"#,
        );
        let (outcome, _) = run(&runner(path)).await;
        assert!(outcome.success);
        assert_eq!(outcome.output, "partial answer");
    }

    #[tokio::test]
    async fn test_failing_exit_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "echo 'Invalid API key' >&2\nexit 3");
        let (outcome, _) = run(&runner(path)).await;
        assert!(!outcome.success);
        assert!(outcome.started);
        assert_eq!(outcome.error.as_deref(), Some("Invalid API key"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_on_stderr_does_not_end_turn() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            &dir,
            r#"printf 'warn \377\n' >&2
for i in 1 2 3 4 5; do echo "more diagnostics $i" >&2; done
echo '{"type":"result","subtype":"success","is_error":false,"result":"still here"}'"#,
        );
        let (outcome, _) = run(&runner(path)).await;
        assert!(outcome.success, "{:?}", outcome);
        assert_eq!(outcome.output, "still here");
    }

    #[tokio::test]
    async fn test_orphaned_session_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            &dir,
            "echo 'No conversation found with session ID: abc' >&2\nexit 1",
        );
        let (outcome, _) = run(&runner(path)).await;
        assert!(!outcome.success);
        assert!(outcome.session_invalid);
    }

    #[tokio::test]
    async fn test_error_result_joins_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            &dir,
            r#"echo '{"type":"result","is_error":true,"errors":["a","b"]}'
exit 1"#,
        );
        let (outcome, _) = run(&runner(path)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("a; b"));
    }
}
