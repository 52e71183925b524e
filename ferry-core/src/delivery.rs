// ABOUTME: Delivery throttler - streams a growing answer into one editable message.
// ABOUTME: Rate-limits edits, falls back from HTML to plain text, and splits oversized finals.

use crate::chunking::{annotate_parts, split_message, ANNOTATION_RESERVE};
use crate::metrics;
use crate::render::{markdown_to_telegram_html, render_draft, strip_markup, PLACEHOLDER};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How a surface should interpret message text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Telegram's HTML subset
    Html,
    Plain,
}

/// Handle to a message already on the surface
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    /// The surface could not parse the markup; retrying as plain text may work
    #[error("formatting rejected: {0}")]
    FormattingRejected(String),
    /// The edit would not change the message
    #[error("message is not modified")]
    NotModified,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A chat destination that can post, edit, and delete messages
#[async_trait]
pub trait MessageSurface: Send + Sync {
    /// Surfaces that can't render HTML get raw markdown as plain text
    fn supports_html(&self) -> bool {
        true
    }

    async fn send(&self, text: &str, format: Format) -> Result<MessageRef, SurfaceError>;

    async fn edit(&self, message: &MessageRef, text: &str, format: Format)
        -> Result<(), SurfaceError>;

    async fn delete(&self, message: &MessageRef) -> Result<(), SurfaceError>;
}

#[async_trait]
impl<T: MessageSurface + ?Sized> MessageSurface for Arc<T> {
    fn supports_html(&self) -> bool {
        (**self).supports_html()
    }

    async fn send(&self, text: &str, format: Format) -> Result<MessageRef, SurfaceError> {
        (**self).send(text, format).await
    }

    async fn edit(
        &self,
        message: &MessageRef,
        text: &str,
        format: Format,
    ) -> Result<(), SurfaceError> {
        (**self).edit(message, text, format).await
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), SurfaceError> {
        (**self).delete(message).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySettings {
    pub max_message_len: usize,
    /// Chars kept free while streaming so the prefix and cursor always fit
    pub reserve: usize,
    /// Minimum gap between unforced edits
    pub edit_interval: Duration,
    /// Pause between the parts of a multi-message answer
    pub chunk_delay: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_message_len: 4096,
            reserve: 100,
            edit_interval: Duration::from_millis(500),
            chunk_delay: Duration::from_millis(300),
        }
    }
}

/// Live state for one turn's placeholder message.
///
/// Finalizing consumes the draft, so a completed draft can't be edited again.
#[derive(Debug)]
pub struct Draft {
    message: Option<MessageRef>,
    text: String,
    progress: Option<String>,
    last_rendered: String,
    last_edit: Option<Instant>,
}

impl Draft {
    /// None when the placeholder could not be posted
    pub fn message(&self) -> Option<&MessageRef> {
        self.message.as_ref()
    }

    pub fn last_rendered(&self) -> &str {
        &self.last_rendered
    }

    pub fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }
}

/// How the final answer reached the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The draft message now holds the whole answer
    EditedInPlace,
    /// The answer went out as new messages
    Sent { parts: usize },
}

pub struct DeliveryThrottler<S> {
    surface: S,
    settings: DeliverySettings,
}

impl<S: MessageSurface> DeliveryThrottler<S> {
    pub fn new(surface: S, settings: DeliverySettings) -> Self {
        Self { surface, settings }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    /// Post the placeholder that later edits will fill in
    pub async fn create(&self) -> Draft {
        let message = match self.surface.send(PLACEHOLDER, Format::Plain).await {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to post placeholder, answer will be sent at the end");
                None
            }
        };

        Draft {
            message,
            text: String::new(),
            progress: None,
            last_rendered: PLACEHOLDER.to_string(),
            last_edit: None,
        }
    }

    /// Show `text` as the draft's answer so far.
    ///
    /// Returns true when an edit reached the surface.
    pub async fn update(&self, draft: &mut Draft, text: &str, force: bool) -> bool {
        if draft.text != text {
            draft.text = text.to_string();
            // the agent moved on from whatever tool it was running
            draft.progress = None;
        }
        self.push(draft, force).await
    }

    /// Show `line` beneath the draft text
    pub async fn progress(&self, draft: &mut Draft, line: &str) -> bool {
        draft.progress = Some(line.to_string());
        self.push(draft, false).await
    }

    async fn push(&self, draft: &mut Draft, force: bool) -> bool {
        let Some(message) = draft.message.clone() else {
            return false;
        };

        if !force {
            if let Some(last) = draft.last_edit {
                if last.elapsed() < self.settings.edit_interval {
                    tracing::trace!("Edit throttled");
                    return false;
                }
            }
        }

        let rendered = render_draft(
            &draft.text,
            draft.progress.as_deref(),
            self.settings.max_message_len,
            self.settings.reserve,
        );
        if rendered == draft.last_rendered {
            return false;
        }

        if self.edit_with_fallback(&message, &rendered, Format::Html).await {
            draft.last_rendered = rendered;
            draft.last_edit = Some(Instant::now());
            metrics::record_edit();
            true
        } else {
            false
        }
    }

    /// Deliver the authoritative answer, rendered from markdown
    pub async fn finalize(&self, draft: Draft, final_text: &str) -> Result<Delivery> {
        self.reconcile(draft, final_text, Format::Html).await
    }

    /// Deliver text verbatim, e.g. an error message
    pub async fn finalize_plain(&self, draft: Draft, final_text: &str) -> Result<Delivery> {
        self.reconcile(draft, final_text, Format::Plain).await
    }

    async fn reconcile(&self, draft: Draft, final_text: &str, format: Format) -> Result<Delivery> {
        let max = self.settings.max_message_len;
        let whole = split_message(final_text, max);

        if whole.len() == 1 {
            if let Some(message) = draft.message.as_ref() {
                if self.edit_with_fallback(message, final_text, format).await {
                    metrics::record_edit();
                    return Ok(Delivery::EditedInPlace);
                }
                tracing::warn!(
                    message_id = message.message_id,
                    "Final edit failed, sending the answer as a new message"
                );
            }
            let parts = self.send_all(&whole, format).await?;
            return Ok(Delivery::Sent { parts });
        }

        if let Some(message) = draft.message.as_ref() {
            if let Err(e) = self.surface.delete(message).await {
                tracing::debug!(error = %e, message_id = message.message_id, "Failed to delete draft");
            }
        }

        let parts = annotate_parts(split_message(
            final_text,
            max.saturating_sub(ANNOTATION_RESERVE),
        ));
        tracing::info!(parts = parts.len(), chars = final_text.chars().count(), "Sending long answer in parts");
        let sent = self.send_all(&parts, format).await?;
        Ok(Delivery::Sent { parts: sent })
    }

    /// Send each part in order, pausing between them.
    ///
    /// A failed part is logged and the rest still go out; the error is
    /// reported once every part has been tried.
    async fn send_all(&self, parts: &[String], format: Format) -> Result<usize> {
        let total = parts.len();
        let mut sent = 0;

        for (i, part) in parts.iter().enumerate() {
            if i > 0 && !self.settings.chunk_delay.is_zero() {
                tokio::time::sleep(self.settings.chunk_delay).await;
            }
            match self.send_with_fallback(part, format).await {
                Ok(_) => {
                    sent += 1;
                    metrics::record_chunk_sent();
                }
                Err(e) => {
                    tracing::warn!(part = i + 1, total, error = %e, "Failed to send part");
                }
            }
        }

        if sent < total {
            anyhow::bail!("Delivered {} of {} parts", sent, total);
        }
        Ok(sent)
    }

    /// Edit with HTML, retrying once as plain text if the markup is rejected.
    /// NotModified counts as success.
    async fn edit_with_fallback(&self, message: &MessageRef, text: &str, format: Format) -> bool {
        let attempt = match self.effective(format) {
            Format::Html => {
                let html = markdown_to_telegram_html(text);
                if html.trim().is_empty() {
                    self.surface.edit(message, text, Format::Plain).await
                } else {
                    self.surface.edit(message, &html, Format::Html).await
                }
            }
            Format::Plain => self.surface.edit(message, text, Format::Plain).await,
        };

        match attempt {
            Ok(()) | Err(SurfaceError::NotModified) => true,
            Err(SurfaceError::FormattingRejected(reason)) => {
                tracing::debug!(reason = %reason, "HTML edit rejected, retrying as plain text");
                metrics::record_format_fallback();
                match self
                    .surface
                    .edit(message, &strip_markup(text), Format::Plain)
                    .await
                {
                    Ok(()) | Err(SurfaceError::NotModified) => true,
                    Err(e) => {
                        tracing::debug!(error = %e, "Plain edit failed, dropping update");
                        false
                    }
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Edit failed, dropping update");
                false
            }
        }
    }

    fn effective(&self, format: Format) -> Format {
        if self.surface.supports_html() {
            format
        } else {
            Format::Plain
        }
    }

    async fn send_with_fallback(&self, text: &str, format: Format) -> Result<MessageRef, SurfaceError> {
        let attempt = match self.effective(format) {
            Format::Html => {
                let html = markdown_to_telegram_html(text);
                if html.trim().is_empty() {
                    self.surface.send(text, Format::Plain).await
                } else {
                    self.surface.send(&html, Format::Html).await
                }
            }
            Format::Plain => self.surface.send(text, Format::Plain).await,
        };

        match attempt {
            Err(SurfaceError::FormattingRejected(reason)) => {
                tracing::debug!(reason = %reason, "HTML send rejected, retrying as plain text");
                metrics::record_format_fallback();
                self.surface.send(&strip_markup(text), Format::Plain).await
            }
            other => other,
        }
    }
}
