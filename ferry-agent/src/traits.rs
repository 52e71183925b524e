// ABOUTME: AgentRunner trait plus the request, update, and outcome types a turn flows through.
// ABOUTME: Runners report failures inside TurnOutcome; they never return Err for agent problems.

use crate::event::Usage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// One user prompt, plus the context to run it in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub prompt: String,
    /// Session to resume; None starts a fresh conversation
    pub session_id: Option<String>,
    pub working_dir: Option<PathBuf>,
}

impl TurnRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: None,
            working_dir: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Incremental output pushed to the delivery side while a turn runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentUpdate {
    /// Human-readable tool activity, e.g. "📖 Reading src/main.rs..."
    Progress(String),
    /// Full answer text so far (a snapshot, not a delta)
    Text(String),
}

/// How a turn ended
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub success: bool,
    pub output: String,
    pub session_id: Option<String>,
    pub error: Option<String>,
    pub usage: Option<Usage>,
    /// False when the agent process could not be spawned at all
    pub started: bool,
    /// The agent rejected the resumed session; the stored token should be dropped
    pub session_invalid: bool,
}

impl TurnOutcome {
    pub fn succeeded(output: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            session_id,
            started: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            session_id,
            started: true,
            ..Default::default()
        }
    }

    /// The agent never ran (missing binary, spawn failure)
    pub fn not_started(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            started: false,
            ..Default::default()
        }
    }

    /// Text to show the user: the answer, or the error
    pub fn display_text(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!(
                "❌ {}",
                self.error.as_deref().unwrap_or("The agent failed without an error message")
            )
        }
    }
}

/// Runs one turn against an agent.
///
/// Implementations push updates in arrival order and drop `updates` when done,
/// which is what tells the consumer the stream is over.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Runner name for logging
    fn name(&self) -> &'static str;

    async fn run(&self, request: TurnRequest, updates: mpsc::Sender<AgentUpdate>) -> TurnOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_text_success() {
        let outcome = TurnOutcome::succeeded("hello", None);
        assert_eq!(outcome.display_text(), "hello");
        assert!(outcome.started);
    }

    #[test]
    fn test_display_text_failure() {
        let outcome = TurnOutcome::failed("boom", Some("s".to_string()));
        assert_eq!(outcome.display_text(), "❌ boom");
        assert_eq!(outcome.session_id.as_deref(), Some("s"));
    }

    #[test]
    fn test_not_started_is_distinct() {
        let outcome = TurnOutcome::not_started("no binary");
        assert!(!outcome.success);
        assert!(!outcome.started);
    }

    #[test]
    fn test_request_builders() {
        let req = TurnRequest::new("hi")
            .with_session(Some("abc".to_string()))
            .with_working_dir("/tmp");
        assert_eq!(req.session_id.as_deref(), Some("abc"));
        assert_eq!(req.working_dir, Some(PathBuf::from("/tmp")));
    }
}
