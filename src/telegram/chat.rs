// ABOUTME: A single Telegram chat as a message surface with typing and file download
// ABOUTME: Maps Bot API errors onto the surface error kinds the throttler branches on

use crate::handler::{AttachmentHandler, TypingIndicator};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ferry_core::{Format, MessageRef, MessageSurface, SurfaceError};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};

/// One Telegram chat; cheap to clone
#[derive(Debug, Clone)]
pub struct TelegramChat {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChat {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }
}

fn map_error(error: RequestError) -> SurfaceError {
    match error {
        RequestError::Api(ApiError::MessageNotModified) => SurfaceError::NotModified,
        RequestError::Api(ApiError::CantParseEntities(reason)) => {
            SurfaceError::FormattingRejected(reason)
        }
        other => SurfaceError::Other(anyhow::Error::new(other)),
    }
}

fn message_id(message: &MessageRef) -> (ChatId, MessageId) {
    (ChatId(message.chat_id), MessageId(message.message_id))
}

#[async_trait]
impl MessageSurface for TelegramChat {
    async fn send(&self, text: &str, format: Format) -> Result<MessageRef, SurfaceError> {
        let mut req = self.bot.send_message(self.chat_id, text);
        if format == Format::Html {
            req = req.parse_mode(ParseMode::Html);
        }
        let sent = req.await.map_err(map_error)?;
        Ok(MessageRef {
            chat_id: self.chat_id.0,
            message_id: sent.id.0,
        })
    }

    async fn edit(
        &self,
        message: &MessageRef,
        text: &str,
        format: Format,
    ) -> Result<(), SurfaceError> {
        let (chat_id, message_id) = message_id(message);
        let mut req = self.bot.edit_message_text(chat_id, message_id, text);
        if format == Format::Html {
            req = req.parse_mode(ParseMode::Html);
        }
        req.await.map_err(map_error)?;
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), SurfaceError> {
        let (chat_id, message_id) = message_id(message);
        self.bot
            .delete_message(chat_id, message_id)
            .await
            .map_err(map_error)?;
        Ok(())
    }
}

#[async_trait]
impl TypingIndicator for TelegramChat {
    async fn set_typing(&self) -> Result<()> {
        // Telegram typing indicators auto-expire after about five seconds
        self.bot
            .send_chat_action(self.chat_id, ChatAction::Typing)
            .await
            .context("Failed to send typing action")?;
        Ok(())
    }
}

#[async_trait]
impl AttachmentHandler for TelegramChat {
    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .context("Failed to get file info from Telegram")?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .context("Failed to download file from Telegram")?;
        Ok(data)
    }
}
