//! Environment-driven bot configuration

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DIALOG_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{name} is not a valid number of seconds: {value}")]
    InvalidSeconds { name: &'static str, value: String },
}

/// Settings read once at startup
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token
    pub token: String,
    /// Google OAuth client secret JSON
    pub credentials: String,
    pub db_path: PathBuf,
    /// Lifetime of a multi-turn command
    pub dialog_timeout: Duration,
    /// Long-poll timeout for `getUpdates`
    pub poll_timeout: Duration,
    pub debug: bool,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let seconds = |name: &'static str, default: Duration| match lookup(name) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidSeconds { name, value }),
        };

        let db_path = lookup("BANKBOT_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.bankbot/bankbot.db"))
            },
            PathBuf::from,
        );

        Ok(Self {
            token: required("TOKEN")?.trim().to_string(),
            credentials: required("CREDENTIALS")?,
            db_path,
            dialog_timeout: seconds("BANKBOT_DIALOG_TIMEOUT_SECS", DEFAULT_DIALOG_TIMEOUT)?,
            poll_timeout: seconds("BANKBOT_POLL_TIMEOUT_SECS", DEFAULT_POLL_TIMEOUT)?,
            debug: lookup("DEBUG").is_some_and(|v| !v.is_empty()),
        })
    }

    /// Default tracing filter directive
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "bankbot=debug"
        } else {
            "bankbot=info"
        }
    }
}
