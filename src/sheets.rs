//! Google Sheets gateway
//!
//! Appends parsed transactions to the user's spreadsheet using the stored
//! OAuth token, refreshing it when it has expired.

mod oauth;

pub use oauth::{ClientSecret, OAuthToken};

use crate::extract::Transaction;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Error, Debug)]
pub enum SheetsError {
    #[error("bad google credentials: {0}")]
    Credentials(String),
    #[error("sheet/google: sheet ID not set")]
    SheetNotSet,
    #[error("sheet/google: sheet list not set")]
    ListNotSet,
    #[error("sheet/google: google token not set")]
    TokenNotSet,
    #[error("stored google token is invalid: {0}")]
    StoredToken(#[source] serde_json::Error),
    #[error("google token expired and can't be refreshed")]
    NoRefreshToken,
    #[error("request to google failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("google api error {status}: {message}")]
    Api { status: u16, message: String },
}

impl SheetsError {
    fn from_response(status: StatusCode, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: ErrorDetail,
        }
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ErrorDetail {
            Api { message: String },
            OAuth(String),
        }

        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                error: ErrorDetail::Api { message },
            }) => message,
            Ok(ErrorBody {
                error: ErrorDetail::OAuth(code),
            }) => code,
            Err(_) => body.trim().to_string(),
        };
        Self::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Result of an append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// Serialized token to store when the access token was refreshed
    pub refreshed_token: Option<String>,
}

/// OAuth and Sheets client
pub struct GoogleClient {
    http: Client,
    secret: ClientSecret,
    sheets_base_url: String,
}

impl GoogleClient {
    pub fn new(credentials_json: &str) -> Result<Self, SheetsError> {
        let secret = ClientSecret::from_json(credentials_json)?;
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            secret,
            sheets_base_url: SHEETS_BASE_URL.to_string(),
        })
    }

    /// Consent page the user opens to obtain an authorization code
    pub fn auth_url(&self) -> Result<String, SheetsError> {
        Ok(self.secret.auth_url()?.to_string())
    }

    /// Trade an authorization code for a token, serialized for storage
    pub async fn exchange_code(&self, code: &str) -> Result<String, SheetsError> {
        let reply = self.token_request(&self.secret.exchange_form(code)).await?;
        tracing::info!("Exchanged google authorization code");
        OAuthToken::from_reply(reply, Utc::now()).to_json()
    }

    async fn refresh(&self, token: OAuthToken) -> Result<OAuthToken, SheetsError> {
        let refresh_token = token.refresh_token.clone().ok_or(SheetsError::NoRefreshToken)?;
        let reply = self.token_request(&self.secret.refresh_form(&refresh_token)).await?;
        tracing::debug!("Refreshed google access token");
        Ok(token.merge(reply, Utc::now()))
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<oauth::TokenReply, SheetsError> {
        let response = self.http.post(&self.secret.token_uri).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SheetsError::from_response(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| SheetsError::Api {
            status: status.as_u16(),
            message: format!("unexpected token reply: {e}"),
        })
    }

    /// `values:append` endpoint for one range of one spreadsheet
    fn append_url(&self, sheet_id: &str, range: &str) -> Result<Url, SheetsError> {
        let mut url = Url::parse(&self.sheets_base_url)
            .map_err(|e| SheetsError::Credentials(format!("bad sheets url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| SheetsError::Credentials("sheets url can't have a path".to_string()))?
            .push(sheet_id)
            .push("values")
            .push(&format!("{range}:append"));
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }

    /// Append one transaction as a new row
    pub async fn append(
        &self,
        token: Option<&str>,
        sheet_id: &str,
        list_name: &str,
        trx: &Transaction,
    ) -> Result<Appended, SheetsError> {
        if sheet_id.is_empty() {
            return Err(SheetsError::SheetNotSet);
        }
        if list_name.is_empty() {
            return Err(SheetsError::ListNotSet);
        }
        let mut token = OAuthToken::from_json(token.ok_or(SheetsError::TokenNotSet)?)?;

        let mut refreshed_token = None;
        if token.is_expired(Utc::now()) {
            token = self.refresh(token).await?;
            refreshed_token = Some(token.to_json()?);
        }

        let url = self.append_url(sheet_id, list_name)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&token.access_token)
            .json(&json!({ "values": [trx.to_row()] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), sheet_id, "Sheets append failed");
            return Err(SheetsError::from_response(status, &body));
        }

        tracing::info!(sheet_id, list = list_name, "Appended transaction row");
        Ok(Appended { refreshed_token })
    }
}
