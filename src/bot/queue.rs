//! Per-user update queues
//!
//! Updates from one user are handled strictly in arrival order; different
//! users are handled concurrently. A worker with nothing to do for
//! [`WORKER_IDLE`] exits and is started again on the user's next update.

use super::Bot;
use crate::dialog::UserId;
use crate::telegram::Update;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Mutex};

const WORKER_IDLE: Duration = Duration::from_secs(600);

type Senders = Arc<Mutex<HashMap<UserId, mpsc::UnboundedSender<Update>>>>;

pub struct UpdateQueues {
    bot: Arc<Bot>,
    senders: Senders,
}

/// Sender identity of an update; updates without one share queue 0
fn queue_key(update: &Update) -> UserId {
    if let Some(message) = &update.message {
        message.from.as_ref().map_or(message.chat.id, |u| u.id)
    } else if let Some(callback) = &update.callback_query {
        callback.from.id
    } else {
        0
    }
}

impl UpdateQueues {
    pub fn new(bot: Arc<Bot>) -> Self {
        Self {
            bot,
            senders: Arc::default(),
        }
    }

    pub async fn enqueue(&self, update: Update) {
        let key = queue_key(&update);
        let mut senders = self.senders.lock().await;

        let update = match senders.get(&key) {
            Some(sender) => match sender.send(update) {
                Ok(()) => return,
                // Worker is gone; start a fresh one below
                Err(err) => err.0,
            },
            None => update,
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        spawn_worker(key, receiver, Arc::clone(&self.bot), Arc::clone(&self.senders));
        if sender.send(update).is_err() {
            tracing::warn!(user_id = key, "Update queue closed before first send");
        }
        senders.insert(key, sender);
    }
}

fn spawn_worker(key: UserId, mut receiver: mpsc::UnboundedReceiver<Update>, bot: Arc<Bot>, senders: Senders) {
    tokio::spawn(async move {
        tracing::debug!(user_id = key, "Update worker started");
        loop {
            let update = match tokio::time::timeout(WORKER_IDLE, receiver.recv()).await {
                Ok(Some(update)) => update,
                Ok(None) => break,
                Err(_) => {
                    // Sends happen under this lock, so an empty queue stays empty
                    let mut senders = senders.lock().await;
                    match receiver.try_recv() {
                        Ok(update) => update,
                        Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                            senders.remove(&key);
                            tracing::debug!(user_id = key, "Update worker idle, stopping");
                            break;
                        }
                    }
                }
            };
            bot.handle_update(update).await;
        }
    });
}
