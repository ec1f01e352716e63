//! Dialogue error types

use super::ContextKey;
use thiserror::Error;

/// Boxed error raised by an action or predicate callback
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by running a dialogue
#[derive(Debug, Error)]
pub enum DialogError {
    /// The session has no current step; the dialogue already finished
    #[error("session: nothing to do")]
    NothingToDo,
    /// The dialogue's own deadline passed before the step completed
    #[error("dialog timed out")]
    SessionTimeout,
    /// The dialogue was cancelled before the step completed
    #[error("dialog was cancelled")]
    SessionCancelled,
    /// The caller's deadline passed before the step completed
    #[error("request deadline exceeded")]
    CallerTimeout,
    /// The caller aborted the request before the step completed
    #[error("request was cancelled")]
    CallerCancelled,
    #[error("dialog context has no value for {0}")]
    ContextValueMissing(ContextKey),
    #[error("dialog context value for {key} is not a {expected}")]
    ContextValueType {
        key: ContextKey,
        expected: &'static str,
    },
    /// A run kept landing on branch steps without reaching an action
    #[error("dialog branched {0} times without reaching an action")]
    BranchLimit(usize),
    /// Failure reported by a step callback, propagated verbatim
    #[error(transparent)]
    Step(BoxError),
}

impl DialogError {
    pub fn step(err: impl Into<BoxError>) -> Self {
        Self::Step(err.into())
    }

    /// True for errors caused by either scope ending rather than by the step
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::SessionTimeout | Self::SessionCancelled | Self::CallerTimeout | Self::CallerCancelled
        )
    }

    /// True when the dialogue's own scope ended (timeout or explicit cancel)
    pub fn is_session_end(&self) -> bool {
        matches!(self, Self::SessionTimeout | Self::SessionCancelled)
    }
}
