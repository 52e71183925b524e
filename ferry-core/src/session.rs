// ABOUTME: Persistent per-user session storage using SQLite database.
// ABOUTME: Maps Telegram users to agent session tokens plus running turn and cost totals.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// What /status reports about a user's conversation
#[derive(Debug, Clone, PartialEq)]
pub struct UserSession {
    pub user_id: u64,
    pub session_id: Option<String>,
    pub turns: u64,
    pub total_cost_usd: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserSession {
    fn empty(user_id: u64) -> Self {
        Self {
            user_id,
            session_id: None,
            turns: 0,
            total_cost_usd: 0.0,
            updated_at: None,
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Mutex<Connection>>,
    workspace_path: PathBuf,
}

// Telegram ids fit in 52 bits, so the i64 column is lossless
fn db_id(user_id: u64) -> i64 {
    user_id as i64
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(workspace_path: P) -> Result<Self> {
        let workspace_path = workspace_path.as_ref().to_path_buf();

        std::fs::create_dir_all(&workspace_path).context("Failed to create workspace directory")?;

        let db_path = workspace_path.join("sessions.db");
        let conn = Connection::open(&db_path).context("Failed to open SQLite database")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_sessions (
                user_id INTEGER PRIMARY KEY,
                session_id TEXT,
                turns INTEGER NOT NULL DEFAULT 0,
                total_cost_usd REAL NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        tracing::info!(
            workspace = %workspace_path.display(),
            db = %db_path.display(),
            "SessionStore initialized"
        );

        Ok(SessionStore {
            db: Arc::new(Mutex::new(conn)),
            workspace_path,
        })
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))
    }

    /// Session token to resume, if the user has one
    pub fn get_session_id(&self, user_id: u64) -> Result<Option<String>> {
        let db = self.conn()?;
        let session_id: Option<Option<String>> = db
            .query_row(
                "SELECT session_id FROM user_sessions WHERE user_id = ?1",
                params![db_id(user_id)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(session_id.flatten())
    }

    pub fn save_session_id(&self, user_id: u64, session_id: &str) -> Result<()> {
        let db = self.conn()?;
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO user_sessions (user_id, session_id, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET session_id = excluded.session_id, updated_at = excluded.updated_at",
            params![db_id(user_id), session_id, now],
        )
        .context("Failed to save session id")?;
        tracing::debug!(user_id, session_id = %session_id, "Saved session");
        Ok(())
    }

    /// Forget the session token so the next turn starts fresh.
    /// Returns true if there was one.
    pub fn clear_session(&self, user_id: u64) -> Result<bool> {
        let db = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let changed = db
            .execute(
                "UPDATE user_sessions SET session_id = NULL, updated_at = ?2
                 WHERE user_id = ?1 AND session_id IS NOT NULL",
                params![db_id(user_id), now],
            )
            .context("Failed to clear session")?;
        tracing::info!(user_id, cleared = changed > 0, "Cleared session");
        Ok(changed > 0)
    }

    /// Add one finished turn and its cost to the user's totals
    pub fn record_turn(&self, user_id: u64, cost_usd: Option<f64>) -> Result<()> {
        let db = self.conn()?;
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO user_sessions (user_id, turns, total_cost_usd, updated_at) VALUES (?1, 1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                turns = turns + 1,
                total_cost_usd = total_cost_usd + excluded.total_cost_usd,
                updated_at = excluded.updated_at",
            params![db_id(user_id), cost_usd.unwrap_or(0.0), now],
        )
        .context("Failed to record turn")?;
        Ok(())
    }

    pub fn get_user(&self, user_id: u64) -> Result<UserSession> {
        let db = self.conn()?;
        let row = db
            .query_row(
                "SELECT session_id, turns, total_cost_usd, updated_at FROM user_sessions WHERE user_id = ?1",
                params![db_id(user_id)],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((session_id, turns, total_cost_usd, updated_at)) = row else {
            return Ok(UserSession::empty(user_id));
        };

        Ok(UserSession {
            user_id,
            session_id,
            turns: turns.max(0) as u64,
            total_cost_usd,
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        })
    }
}
