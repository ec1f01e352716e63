//! Transaction extraction from bank notification text
//!
//! A pattern is a user-supplied regex whose named groups pick out the fields
//! of a [`Transaction`]: `account`, `party`, `direction`, `amount`,
//! `currency`, `date` and `total`. Groups the pattern does not define are
//! read as empty.

use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("can't convert {0:?} to decimal")]
    InvalidAmount(String),
    #[error("can't parse date {0:?}, expected dd/mm or dd/mm/yyyy")]
    InvalidDate(String),
}

/// One parsed bank transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub account: String,
    pub party: String,
    pub direction: String,
    /// Decimal text as written in the message
    pub amount: String,
    pub currency: String,
    pub date: NaiveDate,
    pub total: Option<String>,
    /// The full message the transaction came from
    pub raw: String,
}

impl Transaction {
    /// Spreadsheet row, in column order
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.account.clone(),
            self.party.clone(),
            self.direction.clone(),
            self.amount.clone(),
            self.currency.clone(),
            self.date.format("%Y-%m-%d").to_string(),
            self.total.clone().unwrap_or_default(),
            self.raw.clone(),
        ]
    }
}

/// Check that a pattern compiles
pub fn validate(pattern: &str) -> Result<(), ExtractError> {
    Regex::new(pattern)?;
    Ok(())
}

/// Apply one pattern to `message`.
///
/// Returns `Ok(None)` when the pattern does not match. `today` supplies the
/// year for dates written as `dd/mm`.
pub fn extract(pattern: &str, message: &str, today: NaiveDate) -> Result<Option<Transaction>, ExtractError> {
    let regex = Regex::new(pattern)?;
    let Some(caps) = regex.captures(message) else {
        return Ok(None);
    };
    let field = |name: &str| group(&caps, name).to_string();

    let amount = group(&caps, "amount");
    let amount = parse_decimal(amount).ok_or_else(|| ExtractError::InvalidAmount(amount.to_string()))?;

    Ok(Some(Transaction {
        account: field("account"),
        party: field("party"),
        direction: field("direction"),
        amount,
        currency: field("currency"),
        date: parse_date(group(&caps, "date"), today)?,
        total: parse_decimal(group(&caps, "total")),
        raw: message.to_string(),
    }))
}

/// First transaction produced by `patterns`, tried in order.
///
/// An invalid or failing pattern stops the search.
pub fn extract_first<'a>(
    patterns: impl IntoIterator<Item = &'a str>,
    message: &str,
    today: NaiveDate,
) -> Result<Option<Transaction>, ExtractError> {
    for pattern in patterns {
        if let Some(trx) = extract(pattern, message, today)? {
            return Ok(Some(trx));
        }
    }
    Ok(None)
}

fn group<'h>(caps: &Captures<'h>, name: &str) -> &'h str {
    caps.name(name).map_or("", |m| m.as_str())
}

/// Normalized decimal text, or `None` if `text` is not a plain decimal number
fn parse_decimal(text: &str) -> Option<String> {
    let text = text.trim();
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int.is_empty() && frac.is_empty()) || digits.ends_with('.') {
        return None;
    }
    if !all_digits(int) || !all_digits(frac) {
        return None;
    }
    Some(text.strip_prefix('+').unwrap_or(text).to_string())
}

fn parse_date(text: &str, today: NaiveDate) -> Result<NaiveDate, ExtractError> {
    let text = text.trim();
    let full = if text.matches('/').count() == 1 {
        format!("{text}/{}", today.year())
    } else {
        text.to_string()
    };
    NaiveDate::parse_from_str(&full, "%d/%m/%Y").map_err(|_| ExtractError::InvalidDate(text.to_string()))
}
