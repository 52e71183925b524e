// ABOUTME: Stream reader state machine that rebuilds the answer from stream-json events.
// ABOUTME: Tracks accumulated text, the tool window, session ids, and the terminal result.

use crate::codec::LineCodec;
use crate::event::{ContentBlock, ResultEvent, StreamEvent};
use crate::progress::describe_tool;
use crate::traits::{AgentUpdate, TurnOutcome};
use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

/// How the agent process ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessExit {
    pub success: bool,
    pub code: Option<i32>,
    /// Collected diagnostic output
    pub stderr: String,
}

impl ProcessExit {
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failed(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            stderr: stderr.into(),
        }
    }
}

/// Running reconstruction of one turn.
///
/// The agent re-emits the whole answer so far in each `text` block, so a
/// strictly longer block replaces the accumulated text. If the protocol ever
/// switches to true per-token deltas this would drop text.
#[derive(Debug, Default)]
pub struct StreamReader {
    accumulated: String,
    /// Text that arrived while a tool was running
    pending: Option<String>,
    tool_active: bool,
    init_session_id: Option<String>,
    result: Option<ResultEvent>,
    lines_seen: usize,
    events_ignored: usize,
}

impl StreamReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw line. Undecodable lines produce no updates.
    pub fn handle_line(&mut self, line: &str) -> Vec<AgentUpdate> {
        self.lines_seen += 1;
        match StreamEvent::decode(line) {
            Some(event) => self.handle_event(event),
            None => Vec::new(),
        }
    }

    pub fn handle_event(&mut self, event: StreamEvent) -> Vec<AgentUpdate> {
        if self.result.is_some() {
            self.events_ignored += 1;
            tracing::trace!("Ignoring event after terminal result");
            return Vec::new();
        }

        let mut updates = Vec::new();
        match event {
            StreamEvent::System(system) => {
                if system.is_init() {
                    if let Some(session_id) = system.session_id {
                        tracing::debug!(session_id = %session_id, "Agent session initialised");
                        self.init_session_id = Some(session_id);
                    }
                }
            }
            StreamEvent::Assistant(message) => {
                for block in message.message.content {
                    match block {
                        ContentBlock::Text { text } => self.on_text(text, &mut updates),
                        ContentBlock::ToolUse { id, name, input } => {
                            tracing::info!(tool = %name, id = %id, "Tool use detected");
                            self.tool_active = true;
                            updates.push(AgentUpdate::Progress(describe_tool(&name, &input)));
                        }
                        ContentBlock::ToolResult { .. } => self.close_tool_window(&mut updates),
                        ContentBlock::Other => {}
                    }
                }
            }
            StreamEvent::User(message) => {
                let has_result = message
                    .message
                    .content
                    .iter()
                    .any(|b| matches!(b, ContentBlock::ToolResult { .. }));
                if has_result {
                    self.close_tool_window(&mut updates);
                }
            }
            StreamEvent::Result(result) => {
                tracing::debug!(
                    is_error = result.is_error,
                    subtype = ?result.subtype,
                    "Terminal result received"
                );
                self.result = Some(result);
            }
            StreamEvent::Unrecognized => {}
        }
        updates
    }

    fn on_text(&mut self, text: String, updates: &mut Vec<AgentUpdate>) {
        if self.tool_active {
            let longer_than_pending = self
                .pending
                .as_ref()
                .map_or(true, |p| text.len() > p.len());
            if longer_than_pending {
                self.pending = Some(text);
            }
            return;
        }
        self.surface(text, updates);
    }

    fn close_tool_window(&mut self, updates: &mut Vec<AgentUpdate>) {
        self.tool_active = false;
        if let Some(text) = self.pending.take() {
            self.surface(text, updates);
        }
    }

    fn surface(&mut self, text: String, updates: &mut Vec<AgentUpdate>) {
        if text.len() > self.accumulated.len() {
            self.accumulated = text;
            updates.push(AgentUpdate::Text(self.accumulated.clone()));
        }
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    pub fn tool_active(&self) -> bool {
        self.tool_active
    }

    /// Terminal event's session wins over the init event's
    pub fn session_id(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|r| r.session_id.as_deref())
            .or(self.init_session_id.as_deref())
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    pub fn lines_seen(&self) -> usize {
        self.lines_seen
    }

    /// Resolve the turn once the process has exited
    pub fn into_outcome(self, exit: ProcessExit) -> TurnOutcome {
        let session_id = self.session_id().map(str::to_string);

        if let Some(result) = self.result {
            let usage = result.usage();
            let mut outcome = if result.is_error {
                TurnOutcome::failed(result.error_message(), session_id)
            } else {
                let output = result
                    .final_text()
                    .map(str::to_string)
                    .unwrap_or(self.accumulated);
                TurnOutcome::succeeded(output, session_id)
            };
            outcome.usage = usage;
            return outcome;
        }

        if exit.success {
            tracing::warn!(
                lines = self.lines_seen,
                "Agent exited cleanly without a result event; using accumulated text"
            );
            return TurnOutcome::succeeded(self.accumulated, session_id);
        }

        let stderr = exit.stderr.trim();
        let error = if stderr.is_empty() {
            match exit.code {
                Some(code) => format!("Agent exited with status {}", code),
                None => "Agent was terminated by a signal".to_string(),
            }
        } else {
            stderr.to_string()
        };
        TurnOutcome::failed(error, session_id)
    }
}

/// Drain `source` line by line into `reader`, forwarding updates in order.
///
/// A closed receiver doesn't stop reading: the terminal result is still needed.
pub async fn read_stream<R>(
    source: R,
    reader: &mut StreamReader,
    updates: &mpsc::Sender<AgentUpdate>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(source, LineCodec::new());
    let mut receiver_open = true;

    while let Some(line) = lines.next().await {
        let line = line.context("Failed to read agent output")?;
        for update in reader.handle_line(&line) {
            if receiver_open && updates.send(update).await.is_err() {
                tracing::debug!("Update receiver closed, continuing without forwarding");
                receiver_open = false;
            }
        }
    }

    Ok(())
}
