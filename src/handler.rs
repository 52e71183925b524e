// ABOUTME: Per-message handling - authorization, commands, rate limiting, and running turns.
// ABOUTME: Platform-neutral; the Telegram loop feeds it messages and a chat handle.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ferry_core::commands::{self, BotCommand, ParseResult, HELP_TEXT, WELCOME_TEXT};
use ferry_core::metrics;
use ferry_core::paths;
use ferry_core::{
    run_turn, AgentRunner, Config, DeliveryThrottler, Format, MessageSurface, RateDecision,
    RateLimiter, SessionStore, TurnLocks, TurnRequest,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// How often the typing indicator is refreshed during a turn
pub const TYPING_REFRESH: Duration = Duration::from_secs(4);

/// Prompt used when a file arrives without a caption
pub const DEFAULT_ATTACHMENT_PROMPT: &str = "I've uploaded a file. Please take a look at it.";

const MAX_LISTED_FILES: usize = 50;

/// A file attached to an incoming message, not yet downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub file_id: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub user_id: u64,
    pub chat_id: i64,
    /// Message text, or the caption of an attachment
    pub text: String,
    pub attachment: Option<AttachmentRef>,
}

/// Chat capability for "bot is typing" hints
#[async_trait]
pub trait TypingIndicator: Send + Sync {
    async fn set_typing(&self) -> Result<()>;
}

/// Chat capability for fetching attachment bytes
#[async_trait]
pub trait AttachmentHandler: Send + Sync {
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;
}

/// Everything a chat handle must offer the handler
pub trait Chat: MessageSurface + TypingIndicator + AttachmentHandler + Clone + 'static {}

impl<T> Chat for T where T: MessageSurface + TypingIndicator + AttachmentHandler + Clone + 'static {}

pub struct Handler {
    config: Arc<Config>,
    runner: Arc<dyn AgentRunner>,
    sessions: SessionStore,
    limiter: Arc<RateLimiter>,
    locks: TurnLocks,
    bot_username: Option<String>,
}

impl Handler {
    pub fn new(
        config: Arc<Config>,
        runner: Arc<dyn AgentRunner>,
        sessions: SessionStore,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            config,
            runner,
            sessions,
            limiter,
            locks: TurnLocks::new(),
            bot_username: None,
        }
    }

    /// Lets `/cmd@username` in group chats be recognized as ours
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn workspace(&self) -> PathBuf {
        self.config.workspace_path()
    }

    pub async fn handle<C: Chat>(&self, chat: &C, msg: IncomingMessage) -> Result<()> {
        let user_id = msg.user_id;

        if !self.config.is_user_allowed(user_id) {
            tracing::warn!(user_id, chat_id = msg.chat_id, "Rejected message from unauthorized user");
            reply(
                chat,
                &format!(
                    "⛔ You are not authorized to use this bot. Your user id is {}.",
                    user_id
                ),
            )
            .await;
            return Ok(());
        }

        let prompt = if msg.attachment.is_some() {
            msg.text.trim().to_string()
        } else {
            match commands::parse_message(&msg.text, self.bot_username.as_deref()) {
                ParseResult::Ignore => return Ok(()),
                ParseResult::Message(text) => text,
                ParseResult::Command(cmd) => match BotCommand::from_name(&cmd.name) {
                    Some(command) => return self.handle_command(chat, user_id, command).await,
                    None => {
                        tracing::debug!(command = %cmd.name, "Forwarding unknown command to agent");
                        msg.text.trim().to_string()
                    }
                },
            }
        };

        if let RateDecision::Limited { retry_after } = self.limiter.check(user_id) {
            metrics::record_rate_limited();
            tracing::info!(user_id, retry_after_secs = retry_after.as_secs(), "Rate limited");
            reply(
                chat,
                &format!(
                    "⏳ Slow down! Try again in {} seconds.",
                    retry_after.as_secs().max(1)
                ),
            )
            .await;
            return Ok(());
        }

        if self.locks.is_busy(user_id) {
            reply(chat, "⌛ Still working on your previous message; this one is queued.").await;
        }
        let _turn = self.locks.acquire(user_id).await;

        let working_dir = paths::user_workspace(&self.workspace(), user_id);
        tokio::fs::create_dir_all(&working_dir)
            .await
            .with_context(|| format!("Failed to create {}", working_dir.display()))?;

        let prompt = match msg.attachment {
            Some(attachment) => match self.stage_attachment(chat, user_id, &attachment).await {
                Ok(relative) => attachment_prompt(&prompt, &relative),
                Err(e) => {
                    tracing::warn!(user_id, error = %e, file = %attachment.filename, "Failed to stage attachment");
                    reply(chat, &format!("❌ Couldn't save your file: {}", e)).await;
                    return Ok(());
                }
            },
            None => prompt,
        };

        self.run_prompt(chat, user_id, prompt, working_dir).await
    }

    async fn run_prompt<C: Chat>(
        &self,
        chat: &C,
        user_id: u64,
        prompt: String,
        working_dir: PathBuf,
    ) -> Result<()> {
        let session_id = self.sessions.get_session_id(user_id)?;
        let request = TurnRequest::new(prompt)
            .with_session(session_id)
            .with_working_dir(working_dir);

        let typing = spawn_typing(chat.clone());
        let throttler = DeliveryThrottler::new(chat.clone(), self.config.delivery.settings());
        let report = run_turn(self.runner.as_ref(), &throttler, request).await;
        typing.abort();

        let outcome = &report.outcome;
        if outcome.session_invalid {
            tracing::warn!(user_id, "Stored session was rejected by the agent, clearing it");
            self.sessions.clear_session(user_id)?;
        } else if let Some(ref session_id) = outcome.session_id {
            self.sessions.save_session_id(user_id, session_id)?;
        }

        if outcome.started {
            let cost = outcome.usage.as_ref().and_then(|u| u.cost_usd);
            self.sessions.record_turn(user_id, cost)?;
        }

        Ok(())
    }

    async fn handle_command<C: Chat>(&self, chat: &C, user_id: u64, command: BotCommand) -> Result<()> {
        tracing::info!(user_id, command = ?command, "Handling command");
        let text = match command {
            BotCommand::Start => format!("{}\n\n{}", WELCOME_TEXT, HELP_TEXT),
            BotCommand::Help => HELP_TEXT.to_string(),
            BotCommand::New => {
                let _turn = self.locks.acquire(user_id).await;
                if self.sessions.clear_session(user_id)? {
                    "🆕 Started a fresh conversation.".to_string()
                } else {
                    "🆕 No conversation to reset; your next message starts a fresh one.".to_string()
                }
            }
            BotCommand::Status => self.status_text(user_id)?,
            BotCommand::Files => self.files_text(user_id).await?,
        };
        reply(chat, &text).await;
        Ok(())
    }

    fn status_text(&self, user_id: u64) -> Result<String> {
        let user = self.sessions.get_user(user_id)?;
        let mut lines = vec!["📊 Status".to_string()];

        lines.push(match user.session_id {
            Some(ref id) => format!("Session: {}", id),
            None => "Session: none (next message starts fresh)".to_string(),
        });
        lines.push(format!(
            "Turns: {} (total cost ${:.4})",
            user.turns, user.total_cost_usd
        ));
        if let Some(at) = user.updated_at {
            lines.push(format!("Last active: {}", at.format("%Y-%m-%d %H:%M UTC")));
        }
        if self.limiter.is_enabled() {
            lines.push(format!(
                "Requests left this window: {}/{}",
                self.limiter.remaining(user_id),
                self.config.rate_limit.max_requests
            ));
        }
        lines.push(format!(
            "Working directory: {}",
            paths::user_workspace(&self.workspace(), user_id).display()
        ));
        if self.locks.is_busy(user_id) {
            lines.push("A turn is running right now.".to_string());
        }

        Ok(lines.join("\n"))
    }

    async fn files_text(&self, user_id: u64) -> Result<String> {
        let dir = paths::uploads_dir(&self.workspace(), user_id);
        let names = list_files(&dir).await?;
        if names.is_empty() {
            return Ok("📂 No uploaded files yet.".to_string());
        }

        let mut text = format!("📂 {} uploaded file(s):", names.len());
        for name in names.iter().take(MAX_LISTED_FILES) {
            text.push_str("\n• ");
            text.push_str(paths::UPLOADS_DIR);
            text.push('/');
            text.push_str(name);
        }
        if names.len() > MAX_LISTED_FILES {
            text.push_str(&format!("\n…and {} more", names.len() - MAX_LISTED_FILES));
        }
        Ok(text)
    }

    /// Download an attachment into the user's uploads dir; returns its
    /// path relative to the working directory
    async fn stage_attachment<C: Chat>(
        &self,
        chat: &C,
        user_id: u64,
        attachment: &AttachmentRef,
    ) -> Result<String> {
        let dir = paths::uploads_dir(&self.workspace(), user_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let data = chat.download(&attachment.file_id).await?;
        let name = unique_name(&dir, &paths::sanitize_filename(&attachment.filename)).await;
        let path = dir.join(&name);
        tokio::fs::write(&path, &data)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(user_id, file = %name, bytes = data.len(), "Staged attachment");
        Ok(format!("{}/{}", paths::UPLOADS_DIR, name))
    }
}

/// Build the agent prompt for an uploaded file
pub fn attachment_prompt(caption: &str, relative_path: &str) -> String {
    let caption = caption.trim();
    let caption = if caption.is_empty() {
        DEFAULT_ATTACHMENT_PROMPT
    } else {
        caption
    };
    format!("{}\n\n[Attached file: {}]", caption, relative_path)
}

/// Add -1, -2, ... before the extension until the name is free
async fn unique_name(dir: &Path, name: &str) -> String {
    if !tokio::fs::try_exists(dir.join(name)).await.unwrap_or(false) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let mut n = 1u32;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        if !tokio::fs::try_exists(dir.join(&candidate)).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}

async fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dir.display())),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Plain-text reply; failures are logged and swallowed
async fn reply<C: Chat>(chat: &C, text: &str) {
    if let Err(e) = chat.send(text, Format::Plain).await {
        tracing::warn!(error = %e, "Failed to send reply");
    }
}

/// Keep the typing indicator alive until the returned task is aborted
fn spawn_typing<C: Chat>(chat: C) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = chat.set_typing().await {
                tracing::debug!(error = %e, "Failed to send typing indicator");
            }
            tokio::time::sleep(TYPING_REFRESH).await;
        }
    })
}
