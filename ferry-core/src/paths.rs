// ABOUTME: Standardized paths for config, data, and per-user workspaces
// ABOUTME: Uses ~/.config/ferry for config and ~/.local/share/ferry for data

use directories::BaseDirs;
use std::path::{Path, PathBuf};

/// Subdirectory of a user's workspace that receives uploaded files
pub const UPLOADS_DIR: &str = "uploads";

/// Get the home directory
fn home_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the config directory path: ~/.config/ferry/
pub fn config_dir() -> PathBuf {
    home_dir().join(".config").join("ferry")
}

/// Get the default config file path: ~/.config/ferry/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the data directory path: ~/.local/share/ferry/
/// Falls back to ./data if home directory unavailable
pub fn data_dir() -> PathBuf {
    let home = home_dir();
    if home == Path::new(".") {
        PathBuf::from("./data")
    } else {
        home.join(".local").join("share").join("ferry")
    }
}

/// Get the log directory path: ~/.local/share/ferry/logs/
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// The agent's working directory for one user: <workspace>/<user_id>/
pub fn user_workspace(workspace: &Path, user_id: u64) -> PathBuf {
    workspace.join(user_id.to_string())
}

pub fn uploads_dir(workspace: &Path, user_id: u64) -> PathBuf {
    user_workspace(workspace, user_id).join(UPLOADS_DIR)
}

/// Reduce an untrusted filename to a single safe path component.
///
/// Path separators and control characters become `_`, leading dots are
/// dropped (no `..`, no hidden files), and an empty result becomes `file`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(200).collect()
    }
}
