//! SqliteStore: persistent users and command history backed by SQLite.
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::history::{CommandHistory, CommandStats, HistoryRepository};
use crate::user::{User, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT,
    created_at TEXT NOT NULL,
    last_login TEXT
);

CREATE TABLE IF NOT EXISTS command_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    command TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_user ON command_history(user_id);";

/// One SQLite connection shared by the user and history repositories.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// The special path `:memory:` opens a private in-memory database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            let conn = Connection::open(path)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
            conn
        };
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(Path::new(":memory:"))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

struct UserRow {
    id: i64,
    username: String,
    password_hash: Option<String>,
    created_at: String,
    last_login: Option<String>,
}

impl UserRow {
    const COLUMNS: &'static str = "id, username, password_hash, created_at, last_login";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: row.get(3)?,
            last_login: row.get(4)?,
        })
    }

    fn into_user(self) -> Result<User, StoreError> {
        Ok(User {
            id: self.id,
            username: self.username,
            password_hash: self.password_hash,
            created_at: parse_time(&self.created_at)?,
            last_login: self.last_login.as_deref().map(parse_time).transpose()?,
        })
    }
}

impl UserRepository for SqliteStore {
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", UserRow::COLUMNS),
                params![username],
                UserRow::from_row,
            )
            .optional()?;
        row.map(UserRow::into_user).transpose()
    }

    fn create_user(&self, username: &str, password_hash: Option<&str>) -> Result<User, StoreError> {
        let conn = self.conn()?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, password_hash, created_at.to_rfc3339()],
        )?;
        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.map(str::to_string),
            created_at,
            last_login: None,
        })
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY username ASC",
            UserRow::COLUMNS
        ))?;
        let rows = stmt
            .query_map([], UserRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(UserRow::into_user).collect()
    }

    fn update_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn()?.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), user_id],
        )?;
        Ok(())
    }
}

impl HistoryRepository for SqliteStore {
    fn save_command(&self, user_id: i64, command: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO command_history (user_id, command, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, command, at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn user_history(&self, user_id: i64, limit: usize) -> Result<Vec<CommandHistory>, StoreError> {
        let conn = self.conn()?;
        // SQLite treats a negative LIMIT as no limit.
        let limit = if limit == 0 { -1 } else { limit as i64 };
        let mut stmt = conn.prepare(
            "SELECT id, user_id, command, created_at FROM command_history
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, user_id, command, created_at)| {
                Ok(CommandHistory {
                    id,
                    user_id,
                    command,
                    created_at: parse_time(&created_at)?,
                })
            })
            .collect()
    }

    fn user_command_stats(&self, user_id: i64) -> Result<Vec<CommandStats>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT command, COUNT(*) FROM command_history
             WHERE user_id = ?1 GROUP BY command ORDER BY MAX(id) DESC",
        )?;
        let stats = stmt
            .query_map(params![user_id], |row| {
                Ok(CommandStats {
                    command: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }

    fn clear_user_history(&self, user_id: i64) -> Result<(), StoreError> {
        self.conn()?.execute(
            "DELETE FROM command_history WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(())
    }
}
