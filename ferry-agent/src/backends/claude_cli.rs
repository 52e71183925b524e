// ABOUTME: Claude CLI runner - spawns claude with --print --output-format stream-json.
// ABOUTME: Streams stdout through the StreamReader and resolves to a TurnOutcome.

use crate::codec::LineCodec;
use crate::reader::{read_stream, ProcessExit, StreamReader};
use crate::traits::{AgentRunner, AgentUpdate, TurnOutcome, TurnRequest};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::Command as ProcessCommand;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

/// stderr marker the CLI prints when `--resume` names an unknown session
const ORPHANED_SESSION_MARKER: &str = "No conversation found with session ID";

/// Cap on collected stderr so a chatty process can't grow memory without bound
const MAX_STDERR_BYTES: usize = 16 * 1024;

/// Configuration for the Claude CLI runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeCliConfig {
    /// Path to the claude binary
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Passed as --permission-mode (e.g. "acceptEdits", "bypassPermissions")
    #[serde(default)]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
    /// Passed as --allowedTools when non-empty
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Appended verbatim before the prompt
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_binary() -> String {
    "claude".to_string()
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            permission_mode: None,
            model: None,
            max_turns: None,
            allowed_tools: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

pub struct ClaudeCli {
    config: ClaudeCliConfig,
}

impl ClaudeCli {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClaudeCliConfig {
        &self.config
    }

    pub fn build_args(&self, request: &TurnRequest) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];

        if let Some(ref session_id) = request.session_id {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }
        if let Some(ref mode) = self.config.permission_mode {
            args.push("--permission-mode".to_string());
            args.push(mode.clone());
        }
        if let Some(ref model) = self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(max_turns) = self.config.max_turns {
            args.push("--max-turns".to_string());
            args.push(max_turns.to_string());
        }
        if !self.config.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(self.config.allowed_tools.join(","));
        }
        args.extend(self.config.extra_args.iter().cloned());

        // --allowedTools is variadic; "--" keeps it from swallowing the prompt
        args.push("--".to_string());
        args.push(request.prompt.clone());
        args
    }
}

#[async_trait]
impl AgentRunner for ClaudeCli {
    fn name(&self) -> &'static str {
        "claude-cli"
    }

    async fn run(&self, request: TurnRequest, updates: mpsc::Sender<AgentUpdate>) -> TurnOutcome {
        let args = self.build_args(&request);
        tracing::debug!(
            binary = %self.config.binary,
            resume = request.session_id.is_some(),
            arg_count = args.len(),
            "Spawning Claude CLI"
        );

        let mut command = ProcessCommand::new(&self.config.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = request.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(binary = %self.config.binary, error = %e, "Failed to spawn Claude CLI");
                return TurnOutcome::not_started(format!(
                    "Failed to start agent '{}': {}",
                    self.config.binary, e
                ));
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            return TurnOutcome::not_started("Failed to capture agent output");
        };

        let mut reader = StreamReader::new();
        let (read_result, stderr_text) =
            tokio::join!(read_stream(stdout, &mut reader, &updates), collect_stderr(stderr));
        drop(updates);

        if let Err(e) = read_result {
            tracing::warn!(error = %e, "Agent stdout ended with an error");
        }

        let exit = match child.wait().await {
            Ok(status) => ProcessExit {
                success: status.success(),
                code: status.code(),
                stderr: stderr_text,
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to wait for Claude CLI");
                ProcessExit::failed(None, format!("Failed to wait for agent: {}", e))
            }
        };

        if !exit.success {
            tracing::warn!(code = ?exit.code, "Claude CLI exited unsuccessfully");
        }

        let stderr = exit.stderr.clone();
        let mut outcome = reader.into_outcome(exit);
        flag_orphaned_session(&mut outcome, &stderr);
        outcome
    }
}

/// Mark the outcome when the CLI refused to resume the requested session
pub(crate) fn flag_orphaned_session(outcome: &mut TurnOutcome, stderr: &str) {
    outcome.session_invalid = stderr.contains(ORPHANED_SESSION_MARKER);
    if outcome.session_invalid && !outcome.success {
        tracing::warn!("Requested session no longer exists");
        outcome.error = Some(
            "The previous session could not be resumed. It has been reset; please send your message again."
                .to_string(),
        );
    }
}

/// Log and collect the agent's diagnostic channel.
///
/// Reads to EOF even past the size cap; dropping the pipe early would kill
/// the agent on its next write.
async fn collect_stderr<R>(stderr: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(stderr, LineCodec::new());
    let mut collected = String::new();

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading Claude CLI stderr");
                break;
            }
        };
        if line.is_empty() {
            continue;
        }
        tracing::warn!(stderr = %line, "Claude CLI stderr");
        if collected.len() < MAX_STDERR_BYTES {
            if !collected.is_empty() {
                collected.push('\n');
            }
            collected.push_str(&line);
        }
    }

    collected
}
