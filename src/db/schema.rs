//! Database schema and types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bot_user_id INTEGER NOT NULL UNIQUE,
    google_token TEXT,
    sheet_id TEXT NOT NULL DEFAULT '',
    list_name TEXT NOT NULL DEFAULT '',
    patterns TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_sheet ON users(sheet_id);
";

/// One transaction rule, stored as JSON in `users.patterns`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrxPattern {
    pub pattern: String,
}

impl TrxPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

/// Per-user settings record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Chat-platform user id
    pub bot_user_id: i64,
    /// Serialized OAuth2 token for the spreadsheet API
    pub google_token: Option<String>,
    pub sheet_id: String,
    /// Sheet (tab) that rows are appended to
    pub list_name: String,
    pub patterns: Vec<TrxPattern>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A record that has never been stored
    pub fn blank(bot_user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            bot_user_id,
            google_token: None,
            sheet_id: String::new(),
            list_name: String::new(),
            patterns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_token(&self) -> bool {
        self.google_token.is_some()
    }

    pub fn has_sheet(&self) -> bool {
        !self.sheet_id.is_empty()
    }

    pub fn has_list(&self) -> bool {
        !self.list_name.is_empty()
    }

    pub fn has_patterns(&self) -> bool {
        !self.patterns.is_empty()
    }

    pub fn pattern_strs(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.pattern.as_str())
    }
}
