//! Mock implementations for testing
//!
//! These mocks drive the command layer and its dialogues without real I/O.

use super::traits::*;
use super::*;
use crate::db::TrxPattern;
use crate::extract::Transaction;
use crate::sheets::Appended;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// Mock Messenger
// ============================================================================

/// Records every outbound message
#[derive(Default)]
pub struct MockMessenger {
    pub sent: Mutex<Vec<(i64, String)>>,
    pub menus: Mutex<Vec<(i64, String, InlineKeyboardMarkup)>>,
    pub answered: Mutex<Vec<String>>,
}

impl MockMessenger {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, t)| t.clone())
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_menu(&self, chat_id: i64, text: &str, keyboard: &InlineKeyboardMarkup) -> Result<(), BotError> {
        self.menus
            .lock()
            .unwrap()
            .push((chat_id, text.to_string(), keyboard.clone()));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), BotError> {
        self.answered.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }
}

// ============================================================================
// Mock User Store
// ============================================================================

#[derive(Default)]
pub struct MockUsers {
    users: Mutex<HashMap<i64, User>>,
}

impl MockUsers {
    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.bot_user_id, user);
    }

    pub fn get(&self, bot_user_id: i64) -> Option<User> {
        self.users.lock().unwrap().get(&bot_user_id).cloned()
    }
}

#[async_trait]
impl UserStore for MockUsers {
    async fn find(&self, bot_user_id: i64) -> Result<Option<User>, BotError> {
        Ok(self.get(bot_user_id))
    }

    async fn get_or_create(&self, bot_user_id: i64) -> Result<User, BotError> {
        let mut users = self.users.lock().unwrap();
        let next_id = i64::try_from(users.len()).unwrap() + 1;
        Ok(users
            .entry(bot_user_id)
            .or_insert_with(|| User {
                id: next_id,
                ..User::blank(bot_user_id)
            })
            .clone())
    }

    async fn update(&self, user: &User) -> Result<(), BotError> {
        let mut users = self.users.lock().unwrap();
        match users.get_mut(&user.bot_user_id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(DbError::UserNotFound(user.id).into()),
        }
    }
}

// ============================================================================
// Mock Sheets Gateway
// ============================================================================

/// Gateway with queued code exchanges and recorded appends
#[derive(Default)]
pub struct MockSheets {
    exchanges: Mutex<VecDeque<Result<String, SheetsError>>>,
    stall: Mutex<Option<Duration>>,
    refreshed_token: Mutex<Option<String>>,
    pub codes: Mutex<Vec<String>>,
    pub appended: Mutex<Vec<(i64, Transaction)>>,
}

impl MockSheets {
    pub fn queue_exchange(&self, result: Result<String, SheetsError>) {
        self.exchanges.lock().unwrap().push_back(result);
    }

    /// Make every code exchange hang for `delay` first
    pub fn stall(&self, delay: Duration) {
        *self.stall.lock().unwrap() = Some(delay);
    }

    /// Make the next append report a refreshed token
    pub fn refresh_next(&self, token: &str) {
        *self.refreshed_token.lock().unwrap() = Some(token.to_string());
    }
}

#[async_trait]
impl SheetsGateway for MockSheets {
    fn auth_url(&self) -> Result<String, BotError> {
        Ok("https://accounts.google.com/o/oauth2/auth?state=state-token".to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<String, BotError> {
        self.codes.lock().unwrap().push(code.to_string());
        let stall = *self.stall.lock().unwrap();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        let next = self.exchanges.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| Ok(format!(r#"{{"access_token":"{code}"}}"#)))?)
    }

    async fn append(&self, user: &User, trx: &Transaction) -> Result<Appended, BotError> {
        if user.google_token.is_none() {
            return Err(SheetsError::TokenNotSet.into());
        }
        self.appended
            .lock()
            .unwrap()
            .push((user.bot_user_id, trx.clone()));
        Ok(Appended {
            refreshed_token: self.refreshed_token.lock().unwrap().take(),
        })
    }
}

// ============================================================================
// Flow tests
// ============================================================================

const USER: i64 = 42;

const CARD_PATTERN: &str = r"^(?P<currency>[A-Z]{3}?) (?P<amount>[0-9\.]+?) is (?P<direction>c?)harged on .*[Cc]ard.*(?P<account>5098?) from (?P<party>.+?) on (?P<date>[0-9\/]{5,}?)\. Combined Avail.Bal is (?P<total>[0-9]+\.[0-9]{2}?).*$";
const CARD_MESSAGE: &str = "AED 1123.33 is charged on Credit Card ending 5098 from FACEBK on 31/10. Combined Avail.Bal is 13274.59. Ref statement for exact amnt.";

struct Harness {
    bot: Arc<Bot>,
    messenger: Arc<MockMessenger>,
    users: Arc<MockUsers>,
    sheets: Arc<MockSheets>,
}

impl Harness {
    fn new() -> Self {
        Self::with_dialog_timeout(Duration::from_secs(60))
    }

    fn with_dialog_timeout(dialog_timeout: Duration) -> Self {
        let messenger = Arc::new(MockMessenger::default());
        let users = Arc::new(MockUsers::default());
        let sheets = Arc::new(MockSheets::default());
        let services = Services {
            messenger: messenger.clone(),
            users: users.clone(),
            sheets: sheets.clone(),
        };
        Self {
            bot: Arc::new(Bot::new(services, dialog_timeout)),
            messenger,
            users,
            sheets,
        }
    }

    fn configured_user(&self) -> User {
        User {
            id: 1,
            google_token: Some(r#"{"access_token":"ya29"}"#.to_string()),
            sheet_id: "1AbC".to_string(),
            list_name: "Expenses".to_string(),
            patterns: vec![TrxPattern::new(CARD_PATTERN)],
            ..User::blank(USER)
        }
    }

    async fn command(&self, command: Command) {
        self.bot.run_command(command, USER, USER, "ann").await.unwrap();
    }

    async fn say(&self, text: &str) {
        self.bot
            .dispatch(Inbound {
                user_id: USER,
                chat_id: USER,
                text: text.to_string(),
            })
            .await
            .unwrap();
    }

    async fn update(&self, json: &str) {
        self.bot.handle_update(serde_json::from_str(json).unwrap()).await;
    }
}

#[tokio::test]
async fn set_sheet_dialog_saves_the_next_message() {
    let h = Harness::new();

    h.command(Command::SetSheet).await;
    assert_eq!(h.messenger.last_text().as_deref(), Some("Please set google sheet id"));
    assert_eq!(h.bot.registry().pending(USER).await.as_deref(), Some("SetSheet"));

    h.say("  1AbC  ").await;
    assert_eq!(h.users.get(USER).unwrap().sheet_id, "1AbC");
    assert_eq!(h.messenger.last_text().as_deref(), Some("Sheet ID: ✔"));
    assert!(h.bot.registry().is_empty().await);
}

#[tokio::test]
async fn set_sheet_list_and_patterns() {
    let h = Harness::new();

    h.command(Command::SetSheetList).await;
    h.say("Expenses").await;
    h.command(Command::SetPatterns).await;
    h.say(&format!("{CARD_PATTERN}\n^USD (?P<amount>\\d+)")).await;

    let user = h.users.get(USER).unwrap();
    assert_eq!(user.list_name, "Expenses");
    assert_eq!(user.patterns.len(), 2);
    assert_eq!(
        h.messenger.texts(),
        vec![
            "Please set google sheet list",
            "Sheet List: ✔",
            "Please set patterns",
            "Patterns: ✔"
        ]
    );
}

#[tokio::test]
async fn invalid_pattern_is_reported_and_ends_the_dialog() {
    let h = Harness::new();

    h.command(Command::SetPatterns).await;
    h.say("(?P<amount").await;

    let reply = h.messenger.last_text().unwrap();
    assert!(reply.starts_with("Oops, error: invalid pattern"), "{reply}");
    assert!(reply.ends_with("Please try again!"));
    assert!(h.bot.registry().is_empty().await);
}

#[tokio::test]
async fn google_token_is_exchanged_and_stored() {
    let h = Harness::new();

    h.command(Command::AddGoogleToken).await;
    assert!(h.messenger.last_text().unwrap().starts_with("https://accounts.google.com/"));

    h.say("4/0Ad-code\n").await;
    assert_eq!(*h.sheets.codes.lock().unwrap(), vec!["4/0Ad-code"]);
    assert_eq!(
        h.users.get(USER).unwrap().google_token.as_deref(),
        Some(r#"{"access_token":"4/0Ad-code"}"#)
    );
    assert_eq!(h.messenger.last_text().as_deref(), Some("Google token: ✔"));
}

#[tokio::test]
async fn failed_exchange_reports_the_error() {
    let h = Harness::new();
    h.sheets.queue_exchange(Err(SheetsError::Api {
        status: 400,
        message: "invalid_grant".to_string(),
    }));

    h.command(Command::AddGoogleToken).await;
    h.say("expired-code").await;

    assert_eq!(
        h.messenger.last_text().as_deref(),
        Some("Oops, error: google api error 400: invalid_grant. Please try again!")
    );
    assert!(h.users.get(USER).is_none());
    assert_eq!(h.bot.registry().pending(USER).await, None);
}

#[tokio::test]
async fn cancel_reports_the_pending_command() {
    let h = Harness::new();

    h.command(Command::SetPatterns).await;
    h.command(Command::Cancel).await;
    assert_eq!(
        h.messenger.last_text().as_deref(),
        Some("The command SetPatterns has been cancelled")
    );

    h.command(Command::Cancel).await;
    assert_eq!(h.messenger.last_text().as_deref(), Some("There is nothing to cancel! :("));
}

#[tokio::test]
async fn matching_message_is_appended_to_the_sheet() {
    let h = Harness::new();
    h.users.insert(h.configured_user());

    h.say(CARD_MESSAGE).await;

    let appended = h.sheets.appended.lock().unwrap().clone();
    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].1.party, "FACEBK");
    assert_eq!(appended[0].1.amount, "1123.33");
    assert_eq!(h.messenger.last_text().as_deref(), Some("Message save."));
}

#[tokio::test]
async fn other_messages_are_skipped() {
    let h = Harness::new();

    h.say("hello").await;
    assert_eq!(h.messenger.last_text().as_deref(), Some("Message skip."));

    h.users.insert(h.configured_user());
    h.say("Your OTP is 1234").await;
    assert_eq!(h.messenger.last_text().as_deref(), Some("Message skip."));
    assert!(h.sheets.appended.lock().unwrap().is_empty());
}

#[tokio::test]
async fn match_without_token_is_an_error() {
    let h = Harness::new();
    h.users.insert(User {
        google_token: None,
        ..h.configured_user()
    });

    h.say(CARD_MESSAGE).await;
    assert_eq!(
        h.messenger.last_text().as_deref(),
        Some("Oops, error: sheet/google: google token not set. Please try again!")
    );
}

#[tokio::test]
async fn refreshed_token_is_persisted() {
    let h = Harness::new();
    h.users.insert(h.configured_user());
    h.sheets.refresh_next(r#"{"access_token":"fresh"}"#);

    h.say(CARD_MESSAGE).await;
    assert_eq!(
        h.users.get(USER).unwrap().google_token.as_deref(),
        Some(r#"{"access_token":"fresh"}"#)
    );
}

#[tokio::test]
async fn setup_collects_everything_then_saves_once() {
    let h = Harness::new();

    h.command(Command::Setup).await;
    h.say("code-1").await;
    h.say("1AbC").await;
    h.say("Expenses").await;
    assert!(h.users.get(USER).is_none());

    h.say(CARD_PATTERN).await;
    let user = h.users.get(USER).unwrap();
    assert_eq!(user.google_token.as_deref(), Some(r#"{"access_token":"code-1"}"#));
    assert_eq!(user.sheet_id, "1AbC");
    assert_eq!(user.list_name, "Expenses");
    assert_eq!(user.patterns, vec![TrxPattern::new(CARD_PATTERN)]);

    let texts = h.messenger.texts();
    assert_eq!(
        texts[1..],
        [
            "Google token: ✔\nPlease set google sheet id",
            "Please set google sheet list",
            "Please set patterns",
            "Setup complete ✔"
        ]
    );
    assert!(h.bot.registry().is_empty().await);
}

#[tokio::test]
async fn setup_skip_keeps_the_stored_token() {
    let h = Harness::new();
    h.users.insert(h.configured_user());

    h.command(Command::Setup).await;
    h.say("skip").await;
    assert!(h.sheets.codes.lock().unwrap().is_empty());
    assert_eq!(
        h.messenger.last_text().as_deref(),
        Some("Keeping the current token.\nPlease set google sheet id")
    );

    h.say("2XyZ").await;
    h.say("Income").await;
    h.say(CARD_PATTERN).await;

    let user = h.users.get(USER).unwrap();
    assert_eq!(user.google_token.as_deref(), Some(r#"{"access_token":"ya29"}"#));
    assert_eq!(user.sheet_id, "2XyZ");
}

#[tokio::test]
async fn setup_skip_without_token_fails() {
    let h = Harness::new();

    h.command(Command::Setup).await;
    h.say("skip").await;

    assert_eq!(
        h.messenger.last_text().as_deref(),
        Some("Oops, error: there is no google token to keep. Please try again!")
    );
    assert!(h.bot.registry().is_empty().await);
}

#[tokio::test]
async fn start_shows_the_settings_menu() {
    let h = Harness::new();
    h.users.insert(h.configured_user());

    h.command(Command::Start).await;

    let menus = h.messenger.menus.lock().unwrap().clone();
    assert_eq!(menus.len(), 1);
    let (chat_id, text, keyboard) = &menus[0];
    assert_eq!(*chat_id, USER);
    assert!(text.contains(r"\- *Google token*: ✔"));
    assert_eq!(keyboard.inline_keyboard.len(), 5);
}

#[tokio::test]
async fn group_messages_are_refused() {
    let h = Harness::new();

    h.update(r#"{"update_id":1,"message":{"message_id":1,"chat":{"id":-100,"type":"group"},"from":{"id":42,"first_name":"A"},"text":"hello"}}"#)
        .await;

    assert_eq!(*h.messenger.sent.lock().unwrap(), vec![(-100, "Only private message!".to_string())]);
}

#[tokio::test]
async fn unknown_command_is_reported() {
    let h = Harness::new();

    h.update(r#"{"update_id":1,"message":{"message_id":1,"chat":{"id":42,"type":"private"},"from":{"id":42,"first_name":"A"},"text":"/help","entities":[{"type":"bot_command","offset":0,"length":5}]}}"#)
        .await;

    assert_eq!(h.messenger.last_text().as_deref(), Some("Sorry. Command not found! :("));
}

#[tokio::test]
async fn command_update_starts_dialog() {
    let h = Harness::new();

    h.update(r#"{"update_id":1,"message":{"message_id":1,"chat":{"id":42,"type":"private"},"from":{"id":42,"first_name":"A"},"text":"/setsheet","entities":[{"type":"bot_command","offset":0,"length":9}]}}"#)
        .await;
    h.update(r#"{"update_id":2,"message":{"message_id":2,"chat":{"id":42,"type":"private"},"from":{"id":42,"first_name":"A"},"text":"1AbC"}}"#)
        .await;

    assert_eq!(h.users.get(USER).unwrap().sheet_id, "1AbC");
}

#[tokio::test]
async fn keyboard_press_runs_the_command() {
    let h = Harness::new();

    h.update(r#"{"update_id":3,"callback_query":{"id":"cb-1","from":{"id":42,"first_name":"A"},"data":"setSheetList"}}"#)
        .await;

    assert_eq!(*h.messenger.answered.lock().unwrap(), vec!["cb-1"]);
    assert_eq!(h.bot.registry().pending(USER).await.as_deref(), Some("SetSheetList"));
}

#[tokio::test(start_paused = true)]
async fn expired_dialog_is_reaped_with_a_notice() {
    let h = Harness::new();

    h.command(Command::SetSheet).await;
    tokio::time::advance(Duration::from_secs(61)).await;
    h.bot.reap_expired().await;

    assert_eq!(h.messenger.last_text().as_deref(), Some("The command SetSheet timed out"));
    assert!(h.bot.registry().is_empty().await);

    h.say("1AbC").await;
    assert_eq!(h.messenger.last_text().as_deref(), Some("Message skip."));
}

#[tokio::test]
async fn queued_updates_for_one_user_keep_their_order() {
    let h = Harness::new();
    let queues = UpdateQueues::new(Arc::clone(&h.bot));

    let command = r#"{"update_id":1,"message":{"message_id":1,"chat":{"id":42,"type":"private"},"from":{"id":42,"first_name":"A"},"text":"/setsheetlist","entities":[{"type":"bot_command","offset":0,"length":13}]}}"#;
    let answer = r#"{"update_id":2,"message":{"message_id":2,"chat":{"id":42,"type":"private"},"from":{"id":42,"first_name":"A"},"text":"Expenses"}}"#;
    queues.enqueue(serde_json::from_str(command).unwrap()).await;
    queues.enqueue(serde_json::from_str(answer).unwrap()).await;

    for _ in 0..100 {
        if h.messenger.texts().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.messenger.texts(), vec!["Please set google sheet list", "Sheet List: ✔"]);
    assert_eq!(h.users.get(USER).unwrap().list_name, "Expenses");
}

#[tokio::test(start_paused = true)]
async fn dialog_expiring_mid_turn_is_reported_as_timed_out() {
    let h = Harness::with_dialog_timeout(Duration::from_secs(10));
    h.sheets.stall(Duration::from_secs(3600));

    h.command(Command::AddGoogleToken).await;
    h.say("4/0AbCd").await;

    assert_eq!(
        h.messenger.last_text().as_deref(),
        Some("The command timed out. Please start it again!")
    );
    assert_eq!(h.bot.registry().pending(USER).await, None);
    assert!(h.users.get(USER).is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_turn_hits_the_handler_deadline() {
    let h = Harness::new();
    h.sheets.stall(Duration::from_secs(3600));

    h.command(Command::AddGoogleToken).await;
    h.say("4/0AbCd").await;

    assert_eq!(
        h.messenger.last_text().as_deref(),
        Some("Sorry, that took too long. Please try again!")
    );
    assert_eq!(h.bot.registry().pending(USER).await, None);
}
