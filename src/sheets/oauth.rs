//! Google OAuth2 installed-app flow

use super::SheetsError;
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Scopes requested at consent time
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/spreadsheets",
];

/// Opaque value echoed back by the consent screen
const STATE_TOKEN: &str = "state-token";

/// Refresh this long before the advertised expiry
const EXPIRY_MARGIN_SECS: i64 = 10;

/// OAuth client settings from the console's credentials JSON
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    /// Parse a credentials file of either the "installed" or "web" kind
    pub fn from_json(json: &str) -> Result<Self, SheetsError> {
        let file: CredentialsFile =
            serde_json::from_str(json).map_err(|e| SheetsError::Credentials(e.to_string()))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| SheetsError::Credentials("no \"installed\" or \"web\" client".to_string()))
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map_or("urn:ietf:wg:oauth:2.0:oob", String::as_str)
    }

    /// Consent page URL requesting offline access
    pub fn auth_url(&self) -> Result<Url, SheetsError> {
        let scope = SCOPES.join(" ");
        Url::parse_with_params(
            &self.auth_uri,
            [
                ("access_type", "offline"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", STATE_TOKEN),
            ],
        )
        .map_err(|e| SheetsError::Credentials(format!("bad auth_uri: {e}")))
    }

    pub(super) fn exchange_form<'a>(&'a self, code: &'a str) -> [(&'static str, &'a str); 5] {
        [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", self.redirect_uri()),
        ]
    }

    pub(super) fn refresh_form<'a>(&'a self, refresh_token: &'a str) -> [(&'static str, &'a str); 4] {
        [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ]
    }
}

/// Stored OAuth2 token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    pub fn from_json(json: &str) -> Result<Self, SheetsError> {
        serde_json::from_str(json).map_err(SheetsError::StoredToken)
    }

    pub fn to_json(&self) -> Result<String, SheetsError> {
        serde_json::to_string(self).map_err(SheetsError::StoredToken)
    }

    /// Tokens without an expiry never expire
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry - Duration::seconds(EXPIRY_MARGIN_SECS) <= now)
    }

    /// Merge a token endpoint reply into this token.
    ///
    /// Refresh replies omit the refresh token; the old one is kept.
    pub(super) fn merge(self, reply: TokenReply, now: DateTime<Utc>) -> Self {
        Self {
            access_token: reply.access_token,
            token_type: reply.token_type.unwrap_or(self.token_type),
            refresh_token: reply.refresh_token.or(self.refresh_token),
            expiry: reply.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }

    pub(super) fn from_reply(reply: TokenReply, now: DateTime<Utc>) -> Self {
        Self {
            access_token: String::new(),
            token_type: default_token_type(),
            refresh_token: None,
            expiry: None,
        }
        .merge(reply, now)
    }
}

/// Token endpoint response body
#[derive(Debug, Deserialize)]
pub(super) struct TokenReply {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}
