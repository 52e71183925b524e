// ABOUTME: ferry settings - Telegram access, the Claude CLI invocation, and delivery limits.
// ABOUTME: Read from config.toml, then TELEGRAM_*/CLAUDE_*/RATE_LIMIT_* env vars, then checked.
use crate::delivery::DeliverySettings;
use crate::paths;
use anyhow::{Context, Result};
use ferry_agent::ClaudeCliConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub agent: ClaudeCliConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ─── TelegramConfig ─────────────────────────────────────────────

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub allowed_users: Vec<u64>,
    /// Skip the allowlist entirely
    #[serde(default)]
    pub allow_all: bool,
}

// Custom Debug impl to redact bot_token
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("allowed_users", &self.allowed_users)
            .field("allow_all", &self.allow_all)
            .finish()
    }
}

// ─── DeliveryConfig ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    /// Characters kept free while streaming for the prefix and cursor
    #[serde(default = "default_reserve")]
    pub reserve: usize,
    #[serde(default = "default_edit_interval_ms")]
    pub edit_interval_ms: u64,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_message_len: default_max_message_len(),
            reserve: default_reserve(),
            edit_interval_ms: default_edit_interval_ms(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

impl DeliveryConfig {
    pub fn settings(&self) -> DeliverySettings {
        DeliverySettings {
            max_message_len: self.max_message_len,
            reserve: self.reserve,
            edit_interval: Duration::from_millis(self.edit_interval_ms),
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
        }
    }
}

fn default_max_message_len() -> usize {
    4096
}

fn default_reserve() -> usize {
    100
}

fn default_edit_interval_ms() -> u64 {
    500
}

fn default_chunk_delay_ms() -> u64 {
    300
}

// ─── RateLimitConfig ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window; 0 disables limiting
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// How often expired windows are swept from memory
    #[serde(default = "default_sweep_secs")]
    pub sweep_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            sweep_secs: default_sweep_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_secs)
    }
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_secs() -> u64 {
    300
}

// ─── Workspace, logging, metrics ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_path")]
    pub path: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: default_workspace_path(),
        }
    }
}

fn default_workspace_path() -> String {
    "./workspace".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write a daily rolling log file under the data dir
    #[serde(default)]
    pub file: bool,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address for the Prometheus scrape endpoint, e.g. "127.0.0.1:9000"
    #[serde(default)]
    pub listen: Option<SocketAddr>,
}

/// Expand tilde (~) to home directory in paths
/// Logs a warning if expansion fails and falls back to the original path
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        } else {
            tracing::warn!(
                path = %path,
                "Failed to expand tilde in path: could not determine home directory"
            );
        }
    } else if path == "~" {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs.home_dir().to_string_lossy().to_string();
        } else {
            tracing::warn!("Failed to expand tilde: could not determine home directory");
        }
    }
    path.to_string()
}

fn parse_env<T: std::str::FromStr>(name: &str, val: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    val.trim()
        .parse()
        .with_context(|| format!("{} must be a valid number, got: {}", name, val))
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. FERRY_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/ferry/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("FERRY_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from config.toml with environment variable overrides
    /// Searches: FERRY_CONFIG_PATH env var, ./config.toml, then ~/.config/ferry/config.toml
    pub fn load() -> Result<Self> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.workspace.path = expand_tilde(&config.workspace.path);
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = val;
        }
        if let Ok(val) = std::env::var("ALLOWED_USERS") {
            self.telegram.allowed_users = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_env("ALLOWED_USERS", s))
                .collect::<Result<_>>()?;
        }
        if let Ok(val) = std::env::var("CLAUDE_BINARY") {
            self.agent.binary = val;
        }
        if let Ok(val) = std::env::var("WORKSPACE_PATH") {
            self.workspace.path = val;
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_REQUESTS") {
            self.rate_limit.max_requests = parse_env("RATE_LIMIT_REQUESTS", &val)?;
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = parse_env("RATE_LIMIT_WINDOW_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("EDIT_INTERVAL_MS") {
            self.delivery.edit_interval_ms = parse_env("EDIT_INTERVAL_MS", &val)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.agent.binary.trim().is_empty() {
            anyhow::bail!("agent.binary must not be empty (set in config.toml or CLAUDE_BINARY env var)");
        }
        if self.delivery.max_message_len <= self.delivery.reserve {
            anyhow::bail!(
                "delivery.max_message_len ({}) must be larger than delivery.reserve ({})",
                self.delivery.max_message_len,
                self.delivery.reserve
            );
        }
        if self.delivery.max_message_len <= crate::chunking::ANNOTATION_RESERVE {
            anyhow::bail!(
                "delivery.max_message_len must be larger than {}",
                crate::chunking::ANNOTATION_RESERVE
            );
        }
        if self.rate_limit.max_requests > 0 && self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate_limit.window_secs must be positive when rate limiting is enabled");
        }
        Ok(())
    }

    /// Checks needed only when actually connecting to Telegram
    pub fn require_bot_token(&self) -> Result<&str> {
        let token = self.telegram.bot_token.trim();
        if token.is_empty() {
            anyhow::bail!("telegram.bot_token is required (set in config.toml or TELEGRAM_BOT_TOKEN env var)");
        }
        Ok(token)
    }

    pub fn is_user_allowed(&self, user_id: u64) -> bool {
        self.telegram.allow_all || self.telegram.allowed_users.contains(&user_id)
    }

    pub fn workspace_path(&self) -> PathBuf {
        PathBuf::from(&self.workspace.path)
    }
}
