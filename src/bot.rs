//! Chat command layer
//!
//! Turns Telegram updates into commands and dialogue input. Multi-turn
//! commands register a dialogue with the [`Registry`]; plain text resumes it
//! or falls through to transaction parsing.

mod commands;
mod dialogs;
mod queue;
mod traits;

#[cfg(test)]
mod testing;

pub use commands::{bot_commands, Command};
pub use queue::UpdateQueues;
pub use traits::{DatabaseUsers, Messenger, SheetsGateway, UserStore};

use crate::db::{DbError, User};
use crate::dialog::{DialogError, Dispatched, Registry, Scope, StepRef, UserId};
use crate::extract::ExtractError;
use crate::sheets::SheetsError;
use crate::telegram::{escape_markdown_v2, CallbackQuery, InlineKeyboardMarkup, Message, TelegramError, Update};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on handling one inbound message
const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns the guided setup may take, each allowed one dialogue timeout
const SETUP_TURNS: u32 = 4;

#[derive(Error, Debug)]
pub enum BotError {
    #[error(transparent)]
    Telegram(#[from] TelegramError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Sheets(#[from] SheetsError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Dialog(#[from] DialogError),
    #[error("{0}")]
    Input(&'static str),
}

impl From<BotError> for DialogError {
    fn from(err: BotError) -> Self {
        DialogError::step(err)
    }
}

/// A text message as seen by dialogue steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub user_id: UserId,
    pub chat_id: i64,
    pub text: String,
}

/// Collaborators shared by every dialogue step
#[derive(Clone)]
pub struct Services {
    pub messenger: Arc<dyn Messenger>,
    pub users: Arc<dyn UserStore>,
    pub sheets: Arc<dyn SheetsGateway>,
}

pub struct Bot {
    services: Services,
    registry: Registry<Inbound>,
    /// Parent of every per-message scope; cancelled on shutdown
    root: Scope,
}

impl Bot {
    pub fn new(services: Services, dialog_timeout: Duration) -> Self {
        let registry = Registry::new(dialogs::save_transaction(&services), dialog_timeout);
        Self {
            services,
            registry,
            root: Scope::background(),
        }
    }

    pub fn registry(&self) -> &Registry<Inbound> {
        &self.registry
    }

    /// Cancel in-flight handling
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub async fn handle_update(&self, update: Update) {
        let result = if let Some(message) = update.message {
            self.handle_message(message).await
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await
        } else {
            Ok(())
        };

        if let Err(e) = result {
            tracing::error!(update_id = update.update_id, error = %e, "Failed to handle update");
        }
    }

    async fn handle_message(&self, message: Message) -> Result<(), BotError> {
        let chat_id = message.chat.id;
        if !message.chat.is_private() {
            return self.services.messenger.send_text(chat_id, "Only private message!").await;
        }
        let Some(from) = message.from.as_ref() else {
            return Ok(());
        };

        if let Some(name) = message.command() {
            let Some(command) = Command::parse(name) else {
                tracing::debug!(user_id = from.id, command = name, "Unknown command");
                return self
                    .services
                    .messenger
                    .send_text(chat_id, "Sorry. Command not found! :(")
                    .await;
            };
            return self.run_command(command, from.id, chat_id, from.display_name()).await;
        }

        let Some(text) = message.text.clone() else {
            return Ok(());
        };
        self.dispatch(Inbound {
            user_id: from.id,
            chat_id,
            text,
        })
        .await
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> Result<(), BotError> {
        self.services.messenger.answer_callback(&callback.id).await?;

        let chat_id = callback.message.as_ref().map_or(callback.from.id, |m| m.chat.id);
        match callback.data.as_deref().and_then(Command::from_callback) {
            Some(command) => {
                self.run_command(command, callback.from.id, chat_id, callback.from.display_name())
                    .await
            }
            None => {
                tracing::warn!(user_id = callback.from.id, data = ?callback.data, "Unknown callback");
                Ok(())
            }
        }
    }

    /// Execute a chat command for `user_id`
    pub async fn run_command(
        &self,
        command: Command,
        user_id: UserId,
        chat_id: i64,
        display_name: &str,
    ) -> Result<(), BotError> {
        tracing::info!(user_id, command = command.name(), "Command");
        let messenger = &self.services.messenger;
        match command {
            Command::Start | Command::Main => {
                let user = self.services.users.find(user_id).await?;
                let text = settings_text(display_name, user.as_ref());
                messenger.send_menu(chat_id, &text, &commands::settings_keyboard()).await
            }
            Command::Cancel => {
                let text = match self.registry.cancel(user_id).await {
                    Some(name) => format!("The command {name} has been cancelled"),
                    None => "There is nothing to cancel! :(".to_string(),
                };
                messenger.send_text(chat_id, &text).await
            }
            Command::AddGoogleToken => {
                let url = self.services.sheets.auth_url()?;
                messenger.send_text(chat_id, &url).await?;
                self.start(user_id, command, dialogs::add_google_token(&self.services))
                    .await;
                Ok(())
            }
            Command::SetSheet => {
                messenger.send_text(chat_id, dialogs::SHEET_PROMPT).await?;
                self.start(user_id, command, dialogs::set_sheet(&self.services)).await;
                Ok(())
            }
            Command::SetSheetList => {
                messenger.send_text(chat_id, dialogs::LIST_PROMPT).await?;
                self.start(user_id, command, dialogs::set_sheet_list(&self.services))
                    .await;
                Ok(())
            }
            Command::SetPatterns => {
                messenger.send_text(chat_id, dialogs::PATTERNS_PROMPT).await?;
                self.start(user_id, command, dialogs::set_patterns(&self.services))
                    .await;
                Ok(())
            }
            Command::Setup => {
                let url = self.services.sheets.auth_url()?;
                let text = format!(
                    "Send the authorization code from this page, or \"skip\" to keep your current token:\n{url}"
                );
                messenger.send_text(chat_id, &text).await?;
                let timeout = self.registry.timeout() * SETUP_TURNS;
                self.registry
                    .start_with_timeout(user_id, command.name(), dialogs::setup(&self.services), timeout)
                    .await;
                Ok(())
            }
        }
    }

    async fn start(&self, user_id: UserId, command: Command, step: StepRef) {
        self.registry.start(user_id, command.name(), step).await;
    }

    /// Feed plain text to the user's dialogue or the transaction parser
    pub async fn dispatch(&self, inbound: Inbound) -> Result<(), BotError> {
        let chat_id = inbound.chat_id;
        let user_id = inbound.user_id;
        let caller = self.root.child(Some(HANDLER_TIMEOUT));

        match self.registry.dispatch(&caller, user_id, inbound).await {
            Ok(Dispatched::Resumed { name, finished }) => {
                tracing::debug!(user_id, dialog = %name, finished, "Dialog input handled");
                Ok(())
            }
            Ok(Dispatched::OneShot) => Ok(()),
            Err(e @ DialogError::NothingToDo) => {
                tracing::debug!(user_id, error = %e, "Nothing to do");
                Ok(())
            }
            Err(e) if e.is_session_end() => {
                tracing::info!(user_id, error = %e, "Dialog ended mid-turn");
                self.services
                    .messenger
                    .send_text(chat_id, "The command timed out. Please start it again!")
                    .await
            }
            Err(e) if e.is_cancellation() => {
                tracing::warn!(user_id, error = %e, "Message handling interrupted");
                self.services
                    .messenger
                    .send_text(chat_id, "Sorry, that took too long. Please try again!")
                    .await
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Dialog step failed");
                let text = format!("Oops, error: {e}. Please try again!");
                self.services.messenger.send_text(chat_id, &text).await
            }
        }
    }

    /// Drop expired dialogues and tell their users
    pub async fn reap_expired(&self) {
        for (user_id, name) in self.registry.purge_expired().await {
            let text = format!("The command {name} timed out");
            // Private chats share the user's id
            if let Err(e) = self.services.messenger.send_text(user_id, &text).await {
                tracing::warn!(user_id, error = %e, "Failed to send timeout notice");
            }
        }
    }
}

/// `MarkdownV2` settings checklist
fn settings_text(display_name: &str, user: Option<&User>) -> String {
    let mark = |set: bool| if set { "✔" } else { "🚫" };
    let check = |f: fn(&User) -> bool| mark(user.is_some_and(f));
    format!(
        "__Settings for: _{}_ __:\n\n\
         \\- *Google token*: {}\n\
         \\- *Sheet ID*: {}\n\
         \\- *Sheet List*: {}\n\
         \\- *Patterns*: {}\n",
        escape_markdown_v2(display_name),
        check(User::has_token),
        check(User::has_sheet),
        check(User::has_list),
        check(User::has_patterns),
    )
}
