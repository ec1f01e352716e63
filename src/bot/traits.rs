//! Trait abstractions for bot I/O
//!
//! These traits enable testing the dialogue flows with mock implementations.

use super::BotError;
use crate::db::{Database, User};
use crate::extract::Transaction;
use crate::sheets::{Appended, GoogleClient};
use crate::telegram::{InlineKeyboardMarkup, TelegramClient, PARSE_MODE_MARKDOWN_V2};
use async_trait::async_trait;

/// Outbound chat messages
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send plain text
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), BotError>;

    /// Send `MarkdownV2` text with an inline keyboard
    async fn send_menu(&self, chat_id: i64, text: &str, keyboard: &InlineKeyboardMarkup) -> Result<(), BotError>;

    /// Acknowledge an inline keyboard press
    async fn answer_callback(&self, callback_id: &str) -> Result<(), BotError>;
}

/// Per-user settings storage
#[async_trait]
pub trait UserStore: Send + Sync {
    /// The user's record, or `None` before first contact
    async fn find(&self, bot_user_id: i64) -> Result<Option<User>, BotError>;

    async fn get_or_create(&self, bot_user_id: i64) -> Result<User, BotError>;

    async fn update(&self, user: &User) -> Result<(), BotError>;
}

/// Google authorization and spreadsheet writes
#[async_trait]
pub trait SheetsGateway: Send + Sync {
    fn auth_url(&self) -> Result<String, BotError>;

    /// Exchange an authorization code; returns the token serialized for storage
    async fn exchange_code(&self, code: &str) -> Result<String, BotError>;

    async fn append(&self, user: &User, trx: &Transaction) -> Result<Appended, BotError>;
}

// ============================================================================
// Production Adapters
// ============================================================================

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        Ok(self.send_message(chat_id, text, None, None).await?)
    }

    async fn send_menu(&self, chat_id: i64, text: &str, keyboard: &InlineKeyboardMarkup) -> Result<(), BotError> {
        Ok(self
            .send_message(chat_id, text, Some(keyboard), Some(PARSE_MODE_MARKDOWN_V2))
            .await?)
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), BotError> {
        Ok(self.answer_callback_query(callback_id).await?)
    }
}

/// Adapter to use Database as UserStore
#[derive(Clone)]
pub struct DatabaseUsers {
    db: Database,
}

impl DatabaseUsers {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for DatabaseUsers {
    async fn find(&self, bot_user_id: i64) -> Result<Option<User>, BotError> {
        match self.db.get_by_bot_user_id(bot_user_id) {
            Ok(user) => Ok(Some(user)),
            Err(crate::db::DbError::UserNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_or_create(&self, bot_user_id: i64) -> Result<User, BotError> {
        Ok(self.db.get_or_create(bot_user_id)?)
    }

    async fn update(&self, user: &User) -> Result<(), BotError> {
        Ok(self.db.update_user(user)?)
    }
}

#[async_trait]
impl SheetsGateway for GoogleClient {
    fn auth_url(&self) -> Result<String, BotError> {
        Ok(GoogleClient::auth_url(self)?)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, BotError> {
        Ok(GoogleClient::exchange_code(self, code).await?)
    }

    async fn append(&self, user: &User, trx: &Transaction) -> Result<Appended, BotError> {
        Ok(GoogleClient::append(self, user.google_token.as_deref(), &user.sheet_id, &user.list_name, trx).await?)
    }
}
