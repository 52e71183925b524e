// ABOUTME: Message surface that writes drafts to stderr, for running turns without Telegram
// ABOUTME: Used by `ferry prompt`; the final answer is printed to stdout by the caller

use async_trait::async_trait;
use ferry_core::{Format, MessageRef, MessageSurface, SurfaceError};
use std::io::Write;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct TerminalSurface {
    next_id: Arc<AtomicI32>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self, label: &str, text: &str) -> Result<(), SurfaceError> {
        let mut err = std::io::stderr().lock();
        writeln!(err, "\x1b[2m[{}]\x1b[0m {}", label, text)
            .map_err(|e| SurfaceError::Other(e.into()))
    }
}

#[async_trait]
impl MessageSurface for TerminalSurface {
    fn supports_html(&self) -> bool {
        false
    }

    async fn send(&self, text: &str, _format: Format) -> Result<MessageRef, SurfaceError> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.write(&format!("message {}", message_id), text)?;
        Ok(MessageRef {
            chat_id: 0,
            message_id,
        })
    }

    async fn edit(
        &self,
        message: &MessageRef,
        text: &str,
        _format: Format,
    ) -> Result<(), SurfaceError> {
        self.write(&format!("edit {}", message.message_id), text)
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), SurfaceError> {
        self.write(&format!("delete {}", message.message_id), "")
    }
}
