// ABOUTME: Telegram long-polling loop that turns updates into handler calls
// ABOUTME: Extracts text, documents, and photos; each message runs on its own task

pub mod chat;

pub use chat::TelegramChat;

use crate::handler::{AttachmentRef, Handler, IncomingMessage};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{MediaKind, MessageKind, UpdateKind};

/// Long-poll timeout passed to getUpdates, in seconds
const POLL_TIMEOUT_SECS: u32 = 30;

const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct TelegramBot {
    bot: Bot,
    bot_id: u64,
    username: String,
}

impl TelegramBot {
    /// Authenticate with the Bot API via `getMe`
    pub async fn connect(token: &str) -> Result<Self> {
        let bot = Bot::new(token);
        let me = bot.get_me().await.context("Failed to call Telegram getMe")?;
        let username = me.username().to_string();

        tracing::info!(
            bot_username = %username,
            bot_id = me.id.0,
            "Telegram bot authenticated"
        );

        Ok(Self {
            bot,
            bot_id: me.id.0,
            username,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Poll for updates until the process is stopped
    pub async fn run(&self, handler: Arc<Handler>) -> Result<()> {
        let mut offset: i32 = 0;

        loop {
            let updates = match self
                .bot
                .get_updates()
                .offset(offset)
                .timeout(POLL_TIMEOUT_SECS)
                .await
            {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "Long polling error, retrying in 5s");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = update.id.as_offset();

                let UpdateKind::Message(message) = update.kind else {
                    continue;
                };
                let Some(incoming) = self.extract(&message) else {
                    continue;
                };

                tracing::debug!(
                    user_id = incoming.user_id,
                    chat_id = incoming.chat_id,
                    has_attachment = incoming.attachment.is_some(),
                    "Received message"
                );

                let chat = TelegramChat::new(self.bot.clone(), message.chat.id);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let user_id = incoming.user_id;
                    if let Err(e) = handler.handle(&chat, incoming).await {
                        tracing::error!(user_id, error = %format!("{:#}", e), "Failed to handle message");
                    }
                });
            }
        }
    }

    fn extract(&self, message: &Message) -> Option<IncomingMessage> {
        let from = message.from.as_ref()?;
        if from.is_bot || from.id.0 == self.bot_id {
            return None;
        }

        let MessageKind::Common(common) = &message.kind else {
            return None;
        };

        let (text, attachment) = match &common.media_kind {
            MediaKind::Text(text) => (text.text.clone(), None),
            MediaKind::Document(doc) => {
                let filename = doc.document.file_name.clone().unwrap_or_else(|| {
                    let ext = doc
                        .document
                        .mime_type
                        .as_ref()
                        .and_then(|m| mime_guess::get_mime_extensions(m))
                        .and_then(|exts| exts.first())
                        .map(|ext| format!(".{}", ext))
                        .unwrap_or_default();
                    format!("document_{}{}", message.id.0, ext)
                });
                (
                    doc.caption.clone().unwrap_or_default(),
                    Some(AttachmentRef {
                        file_id: doc.document.file.id.to_string(),
                        filename,
                    }),
                )
            }
            MediaKind::Photo(photo) => {
                // Use the largest photo size
                let largest = photo.photo.last()?;
                (
                    photo.caption.clone().unwrap_or_default(),
                    Some(AttachmentRef {
                        file_id: largest.file.id.to_string(),
                        filename: format!("photo_{}.jpg", message.id.0),
                    }),
                )
            }
            _ => return None,
        };

        Some(IncomingMessage {
            user_id: from.id.0,
            chat_id: message.chat.id.0,
            text,
            attachment,
        })
    }
}
