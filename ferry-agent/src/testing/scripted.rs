// ABOUTME: Scripted runner for testing - replays pre-configured stream-json lines.
// ABOUTME: Allows deterministic turn tests without spawning the Claude CLI.
//!
//! # Example
//!
//! ```no_run
//! use ferry_agent::testing::{Script, ScriptedRunner};
//! use ferry_agent::{AgentRunner, TurnRequest};
//! use serde_json::json;
//!
//! # async fn example() {
//! let runner = ScriptedRunner::new().on_prompt(
//!     "read",
//!     Script::new()
//!         .init("session-1")
//!         .tool_use("Read", json!({"file_path": "/tmp/foo"}))
//!         .tool_result()
//!         .text("The file is empty.")
//!         .result_ok("The file is empty."),
//! );
//!
//! let (tx, _rx) = tokio::sync::mpsc::channel(16);
//! let outcome = runner.run(TurnRequest::new("read /tmp/foo"), tx).await;
//! assert_eq!(outcome.output, "The file is empty.");
//! # }
//! ```

use crate::backends::claude_cli::flag_orphaned_session;
use crate::reader::{read_stream, ProcessExit, StreamReader};
use crate::traits::{AgentRunner, AgentUpdate, TurnOutcome, TurnRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Canned agent output for one turn
#[derive(Debug, Clone)]
pub struct Script {
    lines: Vec<String>,
    exit: ProcessExit,
    line_delay: Option<Duration>,
    spawn_error: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            exit: ProcessExit::ok(),
            line_delay: None,
            spawn_error: None,
        }
    }

    /// Raw output line, JSON or not
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn event(self, event: Value) -> Self {
        self.line(event.to_string())
    }

    pub fn init(self, session_id: &str) -> Self {
        self.event(json!({"type": "system", "subtype": "init", "session_id": session_id}))
    }

    /// Cumulative assistant text
    pub fn text(self, text: &str) -> Self {
        self.event(json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": text}]}
        }))
    }

    pub fn tool_use(self, name: &str, input: Value) -> Self {
        self.event(json!({
            "type": "assistant",
            "message": {"content": [{"type": "tool_use", "id": "toolu_1", "name": name, "input": input}]}
        }))
    }

    pub fn tool_result(self) -> Self {
        self.event(json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "tool_use_id": "toolu_1", "content": "ok"}]}
        }))
    }

    pub fn result_ok(self, text: &str) -> Self {
        self.event(json!({"type": "result", "subtype": "success", "is_error": false, "result": text}))
    }

    pub fn result_error(self, errors: &[&str]) -> Self {
        self.event(json!({"type": "result", "subtype": "error_during_execution", "is_error": true, "errors": errors}))
    }

    /// Exit non-zero with the given diagnostic output
    pub fn exit_failure(mut self, code: i32, stderr: &str) -> Self {
        self.exit = ProcessExit::failed(Some(code), stderr);
        self
    }

    /// Pretend the process could not be spawned
    pub fn spawn_error(mut self, message: &str) -> Self {
        self.spawn_error = Some(message.to_string());
        self
    }

    /// Sleep between lines (use with paused tokio time)
    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = Some(delay);
        self
    }
}

struct Expectation {
    pattern: String,
    script: Script,
}

/// Runner that replays scripts matched by prompt substring, FIFO first
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    requests: Arc<Mutex<Vec<TurnRequest>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_prompt(self, pattern: &str, script: Script) -> Self {
        self.expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                pattern: pattern.to_string(),
                script,
            });
        self
    }

    /// Every request this runner has seen, in order
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn take_script(&self, prompt: &str) -> Option<Script> {
        let mut exp = self.expectations.lock().unwrap_or_else(|e| e.into_inner());
        let index = exp.iter().position(|e| prompt.contains(&e.pattern))?;
        exp.remove(index).map(|e| e.script)
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, request: TurnRequest, updates: mpsc::Sender<AgentUpdate>) -> TurnOutcome {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let Some(script) = self.take_script(&request.prompt) else {
            return TurnOutcome::succeeded(format!("Scripted: no script for '{}'", request.prompt), None);
        };

        if let Some(error) = script.spawn_error {
            return TurnOutcome::not_started(error);
        }

        let mut reader = StreamReader::new();
        match script.line_delay {
            None => {
                let mut bytes = script.lines.join("\n");
                bytes.push('\n');
                if let Err(e) = read_stream(bytes.as_bytes(), &mut reader, &updates).await {
                    tracing::warn!(error = %e, "Scripted stream failed");
                }
            }
            Some(delay) => {
                for line in &script.lines {
                    tokio::time::sleep(delay).await;
                    for update in reader.handle_line(line) {
                        let _ = updates.send(update).await;
                    }
                }
            }
        }

        let stderr = script.exit.stderr.clone();
        let mut outcome = reader.into_outcome(script.exit);
        flag_orphaned_session(&mut outcome, &stderr);
        outcome
    }
}
