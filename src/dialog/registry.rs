//! Per-user registry of in-flight dialogues

use super::{ContextKey, DialogError, Scope, Session, StepRef};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Chat-platform user identity
pub type UserId = i64;

/// A registered multi-turn dialogue
#[derive(Debug)]
struct Pending {
    name: String,
    session: Session,
}

/// Per-user slot; holding its lock serializes everything done for that user
type Slot = Arc<Mutex<Option<Pending>>>;

/// What [`Registry::dispatch`] did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// The event advanced the user's pending dialogue
    Resumed { name: String, finished: bool },
    /// No dialogue was pending; the default step handled the event
    OneShot,
}

/// Maps each user to at most one in-flight [`Session`].
///
/// Dispatch, start and cancel for one user are atomic with respect to each
/// other; different users never wait on each other. Nothing is persisted, so
/// pending dialogues are lost on restart.
pub struct Registry<E> {
    slots: RwLock<HashMap<UserId, Slot>>,
    default_step: StepRef,
    timeout: Duration,
    _event: PhantomData<fn(E)>,
}

impl<E> Registry<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// `default_step` handles events for users with nothing pending;
    /// `timeout` bounds every dialogue started with [`Registry::start`].
    pub fn new(default_step: StepRef, timeout: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            default_step,
            timeout,
            _event: PhantomData,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The user's slot, created on first use. The clone is taken under the
    /// map lock, which keeps [`Registry::purge_expired`] from dropping it
    /// until the caller lets go.
    async fn slot(&self, user: UserId) -> Slot {
        if let Some(slot) = self.slots.read().await.get(&user) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().await.entry(user).or_default())
    }

    /// Register a dialogue for `user`, replacing and cancelling any prior one.
    ///
    /// Returns the name of the replaced dialogue.
    pub async fn start(&self, user: UserId, name: impl Into<String>, step: StepRef) -> Option<String> {
        self.start_with_timeout(user, name, step, self.timeout).await
    }

    pub async fn start_with_timeout(
        &self,
        user: UserId,
        name: impl Into<String>,
        step: StepRef,
        timeout: Duration,
    ) -> Option<String> {
        let name = name.into();
        let slot = self.slot(user).await;
        let mut guard = slot.lock().await;

        tracing::info!(user_id = user, dialog = %name, timeout_secs = timeout.as_secs(), "Dialog started");
        let replaced = guard.replace(Pending {
            name,
            session: Session::new(Scope::with_timeout(timeout), step),
        });

        replaced.map(|old| {
            old.session.scope().cancel();
            tracing::debug!(user_id = user, dialog = %old.name, "Replaced pending dialog");
            old.name
        })
    }

    /// Feed an inbound event to the user's dialogue, or to a one-shot session.
    ///
    /// The event is bound under [`ContextKey::Inbound`] before the run. A
    /// resumed dialogue is removed once it finishes or fails; an entry whose
    /// scope already ended is dropped and the event handled as one-shot.
    pub async fn dispatch(&self, caller: &Scope, user: UserId, event: E) -> Result<Dispatched, DialogError> {
        let slot = self.slot(user).await;
        let mut guard = slot.lock().await;

        let ended = guard
            .as_ref()
            .and_then(|p| p.session.scope().ended().map(|end| (p.name.clone(), end)));
        if let Some((name, end)) = ended {
            tracing::info!(user_id = user, dialog = %name, ?end, "Dropping ended dialog");
            *guard = None;
        }

        if let Some(pending) = guard.as_mut() {
            pending.session.add_value(ContextKey::Inbound, event);
            let result = pending.session.run(caller).await;
            let finished = pending.session.is_finished();
            let name = pending.name.clone();

            match &result {
                Err(e) => {
                    tracing::warn!(user_id = user, dialog = %name, error = %e, "Dialog failed");
                    *guard = None;
                }
                Ok(()) if finished => {
                    tracing::info!(user_id = user, dialog = %name, "Dialog finished");
                    *guard = None;
                }
                Ok(()) => {
                    tracing::debug!(user_id = user, dialog = %name, "Dialog awaiting more input");
                }
            }
            return result.map(|()| Dispatched::Resumed { name, finished });
        }
        drop(guard);

        let mut session = Session::one_shot(Arc::clone(&self.default_step));
        session.add_value(ContextKey::Inbound, event);
        session.run(caller).await?;
        Ok(Dispatched::OneShot)
    }

    /// Remove the user's dialogue, returning its name if one was pending
    pub async fn cancel(&self, user: UserId) -> Option<String> {
        let slot = self.slot(user).await;
        let pending = slot.lock().await.take()?;
        pending.session.scope().cancel();
        tracing::info!(user_id = user, dialog = %pending.name, "Dialog cancelled");
        Some(pending.name)
    }

    /// Name of the user's pending dialogue
    pub async fn pending(&self, user: UserId) -> Option<String> {
        let slot = self.slots.read().await.get(&user).cloned()?;
        let guard = slot.lock().await;
        guard
            .as_ref()
            .filter(|p| !p.session.scope().is_done())
            .map(|p| p.name.clone())
    }

    /// Drop dialogues whose scope has ended and forget idle users.
    ///
    /// Slots busy with a run, or held by a caller that has not locked them
    /// yet, are skipped. Returns the dropped dialogues.
    pub async fn purge_expired(&self) -> Vec<(UserId, String)> {
        let mut slots = self.slots.write().await;
        let mut expired = Vec::new();

        slots.retain(|user, slot| {
            // Someone looked the slot up and is about to lock it
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Ok(mut guard) = slot.try_lock() else {
                return true;
            };
            match guard.as_ref().map(|p| p.session.scope().is_done()) {
                None => false,
                Some(true) => {
                    if let Some(pending) = guard.take() {
                        expired.push((*user, pending.name));
                    }
                    false
                }
                Some(false) => true,
            }
        });

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Purged expired dialogs");
        }
        expired
    }

    /// Number of users with a dialogue pending or running
    pub async fn len(&self) -> usize {
        self.slots
            .read()
            .await
            .values()
            .filter(|slot| slot.try_lock().map_or(true, |guard| guard.is_some()))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
