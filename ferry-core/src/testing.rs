// ABOUTME: In-memory MessageSurface that records every operation for assertions.
// ABOUTME: Can be told to reject HTML, fail edits, or fail the first N sends.

use crate::delivery::{Format, MessageRef, MessageSurface, SurfaceError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// A successful surface operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOp {
    Send { message_id: i32, text: String, format: Format },
    Edit { message_id: i32, text: String, format: Format },
    Delete { message_id: i32 },
}

#[derive(Default)]
struct State {
    ops: Vec<SurfaceOp>,
    next_id: i32,
    edit_attempts: usize,
    sends_to_fail: usize,
}

/// Cloning shares the same recording
#[derive(Clone, Default)]
pub struct RecordingSurface {
    chat_id: i64,
    state: Arc<Mutex<State>>,
    reject_html: bool,
    fail_edits: bool,
    fail_deletes: bool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every HTML send or edit fails with FormattingRejected
    pub fn reject_html(mut self) -> Self {
        self.reject_html = true;
        self
    }

    pub fn fail_edits(mut self) -> Self {
        self.fail_edits = true;
        self
    }

    pub fn fail_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// The first `n` sends fail
    pub fn fail_sends(self, n: usize) -> Self {
        self.lock().sends_to_fail = n;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.lock().ops.clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SurfaceOp::Send { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Successful edits as (text, format)
    pub fn edits(&self) -> Vec<(String, Format)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SurfaceOp::Edit { text, format, .. } => Some((text, format)),
                _ => None,
            })
            .collect()
    }

    pub fn edit_count(&self) -> usize {
        self.edits().len()
    }

    /// Edits tried, including failures
    pub fn edit_attempts(&self) -> usize {
        self.lock().edit_attempts
    }

    pub fn deleted(&self) -> Vec<i32> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SurfaceOp::Delete { message_id } => Some(message_id),
                _ => None,
            })
            .collect()
    }

    fn check_format(&self, format: Format) -> Result<(), SurfaceError> {
        if self.reject_html && format == Format::Html {
            return Err(SurfaceError::FormattingRejected(
                "can't parse entities".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSurface for RecordingSurface {
    async fn send(&self, text: &str, format: Format) -> Result<MessageRef, SurfaceError> {
        {
            let mut state = self.lock();
            if state.sends_to_fail > 0 {
                state.sends_to_fail -= 1;
                return Err(SurfaceError::Other(anyhow::anyhow!("send failed")));
            }
        }
        self.check_format(format)?;

        let mut state = self.lock();
        state.next_id += 1;
        let message_id = state.next_id;
        state.ops.push(SurfaceOp::Send {
            message_id,
            text: text.to_string(),
            format,
        });
        Ok(MessageRef {
            chat_id: self.chat_id,
            message_id,
        })
    }

    async fn edit(
        &self,
        message: &MessageRef,
        text: &str,
        format: Format,
    ) -> Result<(), SurfaceError> {
        self.lock().edit_attempts += 1;
        if self.fail_edits {
            return Err(SurfaceError::Other(anyhow::anyhow!("edit failed")));
        }
        self.check_format(format)?;

        self.lock().ops.push(SurfaceOp::Edit {
            message_id: message.message_id,
            text: text.to_string(),
            format,
        });
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), SurfaceError> {
        if self.fail_deletes {
            return Err(SurfaceError::Other(anyhow::anyhow!("delete failed")));
        }
        self.lock().ops.push(SurfaceOp::Delete {
            message_id: message.message_id,
        });
        Ok(())
    }
}
