//! Database module for bankbot
//!
//! Persists the per-user settings record: OAuth token, target spreadsheet and
//! transaction patterns.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("User not found: {0}")]
    UserNotFound(i64),
    #[error("Invalid patterns: {0}")]
    Patterns(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

const USER_COLUMNS: &str =
    "id, bot_user_id, google_token, sheet_id, list_name, patterns, created_at, updated_at";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== User Operations ====================

    /// Get user by chat-platform id
    pub fn get_by_bot_user_id(&self, bot_user_id: i64) -> DbResult<User> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE bot_user_id = ?1"
        ))?;
        stmt.query_row(params![bot_user_id], user_from_row)
            .optional()?
            .ok_or(DbError::UserNotFound(bot_user_id))
    }

    /// Insert a blank record for a chat user
    pub fn create_user(&self, bot_user_id: i64) -> DbResult<User> {
        let mut user = User::blank(bot_user_id);
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (bot_user_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![bot_user_id, user.created_at.to_rfc3339()],
        )?;
        user.id = conn.last_insert_rowid();
        Ok(user)
    }

    /// Fetch the user's record, creating it on first contact
    pub fn get_or_create(&self, bot_user_id: i64) -> DbResult<User> {
        match self.get_by_bot_user_id(bot_user_id) {
            Err(DbError::UserNotFound(_)) => {
                tracing::info!(bot_user_id, "Creating user record");
                self.create_user(bot_user_id)
            }
            other => other,
        }
    }

    /// Persist every settings field of `user`
    pub fn update_user(&self, user: &User) -> DbResult<()> {
        let patterns = serde_json::to_string(&user.patterns)?;
        let changed = self.conn().execute(
            "UPDATE users SET google_token = ?1, sheet_id = ?2, list_name = ?3, patterns = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                user.google_token,
                user.sheet_id,
                user.list_name,
                patterns,
                Utc::now().to_rfc3339(),
                user.id
            ],
        )?;
        if changed == 0 {
            return Err(DbError::UserNotFound(user.id));
        }
        Ok(())
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let patterns_json: String = row.get(5)?;
    let patterns = serde_json::from_str(&patterns_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(User {
        id: row.get(0)?,
        bot_user_id: row.get(1)?,
        google_token: row.get(2)?,
        sheet_id: row.get(3)?,
        list_name: row.get(4)?,
        patterns,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
