//! Dialogue flows behind the bot commands
//!
//! Every step reads the message that triggered the current turn from
//! [`ContextKey::Inbound`] and replies through the [`Messenger`](super::Messenger).

use super::{BotError, Inbound, Services};
use crate::db::TrxPattern;
use crate::dialog::{ContextKey, DialogContext, DialogError, Step, StepRef};
use crate::extract;
use std::future::Future;

const TOKEN_KEY: ContextKey = ContextKey::Custom("google_token");
const SHEET_KEY: ContextKey = ContextKey::Custom("sheet_id");
const LIST_KEY: ContextKey = ContextKey::Custom("list_name");

pub const SHEET_PROMPT: &str = "Please set google sheet id";
pub const LIST_PROMPT: &str = "Please set google sheet list";
pub const PATTERNS_PROMPT: &str = "Please set patterns";

/// Step that hands the current inbound message to `handler`
fn on_input<F, Fut>(services: &Services, handler: F, next: Option<StepRef>) -> StepRef
where
    F: Fn(Services, DialogContext, Inbound) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BotError>> + Send + 'static,
{
    let services = services.clone();
    Step::sequential(
        move |_, ctx: DialogContext| {
            let turn = ctx
                .value::<Inbound>(ContextKey::Inbound)
                .map(|msg| handler(services.clone(), ctx, msg));
            async move { Ok::<(), DialogError>(turn?.await?) }
        },
        next,
    )
}

/// One-shot handling of plain text: parse it and append it to the sheet
pub fn save_transaction(services: &Services) -> StepRef {
    on_input(services, save_transaction_turn, None)
}

/// Receives the OAuth authorization code
pub fn add_google_token(services: &Services) -> StepRef {
    on_input(services, save_token_turn, None)
}

pub fn set_sheet(services: &Services) -> StepRef {
    on_input(services, save_sheet_turn, None)
}

pub fn set_sheet_list(services: &Services) -> StepRef {
    on_input(services, save_list_turn, None)
}

pub fn set_patterns(services: &Services) -> StepRef {
    on_input(services, save_patterns_turn, None)
}

/// Four-turn setup: token (or "skip" to keep the stored one), sheet id,
/// sheet list, patterns. Nothing but the token exchange touches storage
/// before the last turn.
pub fn setup(services: &Services) -> StepRef {
    let finish = on_input(services, setup_finish_turn, None);
    let ask_patterns = on_input(services, setup_list_turn, Some(finish));
    let ask_list = on_input(services, setup_sheet_turn, Some(ask_patterns));
    let exchange = on_input(services, setup_token_turn, Some(ask_list.clone()));
    let keep = on_input(services, setup_keep_token_turn, Some(ask_list));

    let users = services.users.clone();
    Step::conditional(
        move |_, ctx: DialogContext| {
            let users = users.clone();
            async move {
                let msg: Inbound = ctx.value(ContextKey::Inbound)?;
                if !msg.text.trim().eq_ignore_ascii_case("skip") {
                    return Ok(false);
                }
                let has_token = users
                    .find(msg.user_id)
                    .await?
                    .is_some_and(|u| u.has_token());
                if has_token {
                    Ok(true)
                } else {
                    Err(DialogError::from(BotError::Input("there is no google token to keep")))
                }
            }
        },
        Some(keep),
        Some(exchange),
    )
}

async fn save_transaction_turn(services: Services, _: DialogContext, msg: Inbound) -> Result<(), BotError> {
    let Some(mut user) = services.users.find(msg.user_id).await? else {
        tracing::debug!(user_id = msg.user_id, "Message from unknown user");
        return services.messenger.send_text(msg.chat_id, "Message skip.").await;
    };

    let today = chrono::Local::now().date_naive();
    let text = msg.text.trim();
    let Some(trx) = extract::extract_first(user.pattern_strs(), text, today)? else {
        return services.messenger.send_text(msg.chat_id, "Message skip.").await;
    };

    let appended = services.sheets.append(&user, &trx).await?;
    if let Some(token) = appended.refreshed_token {
        user.google_token = Some(token);
        services.users.update(&user).await?;
    }
    tracing::info!(user_id = msg.user_id, party = %trx.party, amount = %trx.amount, "Transaction saved");
    services.messenger.send_text(msg.chat_id, "Message save.").await
}

async fn save_token_turn(services: Services, _: DialogContext, msg: Inbound) -> Result<(), BotError> {
    let token = services.sheets.exchange_code(msg.text.trim()).await?;
    let mut user = services.users.get_or_create(msg.user_id).await?;
    user.google_token = Some(token);
    services.users.update(&user).await?;
    services.messenger.send_text(msg.chat_id, "Google token: ✔").await
}

async fn save_sheet_turn(services: Services, _: DialogContext, msg: Inbound) -> Result<(), BotError> {
    let mut user = services.users.get_or_create(msg.user_id).await?;
    user.sheet_id = msg.text.trim().to_string();
    services.users.update(&user).await?;
    services.messenger.send_text(msg.chat_id, "Sheet ID: ✔").await
}

async fn save_list_turn(services: Services, _: DialogContext, msg: Inbound) -> Result<(), BotError> {
    let mut user = services.users.get_or_create(msg.user_id).await?;
    user.list_name = msg.text.trim().to_string();
    services.users.update(&user).await?;
    services.messenger.send_text(msg.chat_id, "Sheet List: ✔").await
}

async fn save_patterns_turn(services: Services, _: DialogContext, msg: Inbound) -> Result<(), BotError> {
    let patterns = parse_patterns(&msg.text)?;
    let mut user = services.users.get_or_create(msg.user_id).await?;
    user.patterns = patterns;
    services.users.update(&user).await?;
    services.messenger.send_text(msg.chat_id, "Patterns: ✔").await
}

/// One pattern per non-blank line; every pattern must compile
fn parse_patterns(text: &str) -> Result<Vec<TrxPattern>, BotError> {
    let patterns: Vec<TrxPattern> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(TrxPattern::new)
        .collect();
    if patterns.is_empty() {
        return Err(BotError::Input("no patterns given"));
    }
    for p in &patterns {
        extract::validate(&p.pattern)?;
    }
    Ok(patterns)
}

async fn setup_token_turn(services: Services, ctx: DialogContext, msg: Inbound) -> Result<(), BotError> {
    let token = services.sheets.exchange_code(msg.text.trim()).await?;
    ctx.add_value(TOKEN_KEY, token);
    services
        .messenger
        .send_text(msg.chat_id, &format!("Google token: ✔\n{SHEET_PROMPT}"))
        .await
}

async fn setup_keep_token_turn(services: Services, _: DialogContext, msg: Inbound) -> Result<(), BotError> {
    services
        .messenger
        .send_text(msg.chat_id, &format!("Keeping the current token.\n{SHEET_PROMPT}"))
        .await
}

async fn setup_sheet_turn(services: Services, ctx: DialogContext, msg: Inbound) -> Result<(), BotError> {
    ctx.add_value(SHEET_KEY, msg.text.trim().to_string());
    services.messenger.send_text(msg.chat_id, LIST_PROMPT).await
}

async fn setup_list_turn(services: Services, ctx: DialogContext, msg: Inbound) -> Result<(), BotError> {
    ctx.add_value(LIST_KEY, msg.text.trim().to_string());
    services.messenger.send_text(msg.chat_id, PATTERNS_PROMPT).await
}

async fn setup_finish_turn(services: Services, ctx: DialogContext, msg: Inbound) -> Result<(), BotError> {
    let patterns = parse_patterns(&msg.text)?;
    let mut user = services.users.get_or_create(msg.user_id).await?;
    if ctx.contains(TOKEN_KEY) {
        user.google_token = Some(ctx.value(TOKEN_KEY)?);
    }
    user.sheet_id = ctx.value(SHEET_KEY)?;
    user.list_name = ctx.value(LIST_KEY)?;
    user.patterns = patterns;
    services.users.update(&user).await?;
    tracing::info!(user_id = msg.user_id, "Setup completed");
    services.messenger.send_text(msg.chat_id, "Setup complete ✔").await
}
