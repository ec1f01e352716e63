//! Cancellable execution scopes

use super::DialogError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a scope ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeEnd {
    Cancelled,
    DeadlineExceeded,
}

impl ScopeEnd {
    /// Error reported when a session's own scope wins the race
    pub fn session_error(self) -> DialogError {
        match self {
            Self::Cancelled => DialogError::SessionCancelled,
            Self::DeadlineExceeded => DialogError::SessionTimeout,
        }
    }

    /// Error reported when the caller's scope wins the race
    pub fn caller_error(self) -> DialogError {
        match self {
            Self::Cancelled => DialogError::CallerCancelled,
            Self::DeadlineExceeded => DialogError::CallerTimeout,
        }
    }
}

/// A cancellation token with an optional deadline.
///
/// Cloning a scope shares the token, so cancelling any clone ends all of
/// them. Use [`Scope::child`] for a scope that ends with its parent but can
/// also be cancelled on its own.
#[derive(Debug, Clone)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Scope {
    /// A scope that only ends when cancelled
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derive a scope that ends when `self` ends, or earlier at `timeout`
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check; cancellation takes precedence over the deadline
    pub fn ended(&self) -> Option<ScopeEnd> {
        if self.token.is_cancelled() {
            return Some(ScopeEnd::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(ScopeEnd::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.ended().is_some()
    }

    /// Wait until the scope is cancelled or its deadline passes
    pub async fn done(&self) -> ScopeEnd {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => ScopeEnd::Cancelled,
                    () = tokio::time::sleep_until(deadline) => ScopeEnd::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                ScopeEnd::Cancelled
            }
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::background()
    }
}
