//! Dialogue steps
//!
//! A step either does work ([`Step::Action`], [`Step::Sequential`]) or picks
//! where to go next ([`Step::Conditional`]). Keeping the two apart lets one
//! action be reused behind different continuations.

use super::{DialogContext, DialogError, Scope};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Shared handle to an immutable step
pub type StepRef = Arc<Step>;

type ActionFn = dyn Fn(Scope, DialogContext) -> BoxFuture<'static, Result<(), DialogError>> + Send + Sync;
type PredicateFn = dyn Fn(Scope, DialogContext) -> BoxFuture<'static, Result<bool, DialogError>> + Send + Sync;

/// Side-effecting callback run by a step
#[derive(Clone)]
pub struct Action(Arc<ActionFn>);

impl Action {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Scope, DialogContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DialogError>> + Send + 'static,
    {
        Self(Arc::new(move |scope, ctx| f(scope, ctx).boxed()))
    }

    async fn call(&self, scope: Scope, ctx: DialogContext) -> Result<(), DialogError> {
        (self.0)(scope, ctx).await
    }
}

/// Boolean callback deciding a conditional branch
#[derive(Clone)]
pub struct Predicate(Arc<PredicateFn>);

impl Predicate {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Scope, DialogContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, DialogError>> + Send + 'static,
    {
        Self(Arc::new(move |scope, ctx| f(scope, ctx).boxed()))
    }

    async fn call(&self, scope: Scope, ctx: DialogContext) -> Result<bool, DialogError> {
        (self.0)(scope, ctx).await
    }
}

/// One unit of dialogue logic
pub enum Step {
    /// Run an action; never continues on its own
    Action(Action),
    /// Run an action, then continue with `next`
    Sequential {
        action: Action,
        next: Option<StepRef>,
    },
    /// Pick `on_true` or `on_false`; performs no action
    Conditional {
        predicate: Predicate,
        on_true: Option<StepRef>,
        on_false: Option<StepRef>,
    },
}

impl Step {
    pub fn action<F, Fut>(f: F) -> StepRef
    where
        F: Fn(Scope, DialogContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DialogError>> + Send + 'static,
    {
        Arc::new(Self::Action(Action::new(f)))
    }

    pub fn sequential<F, Fut>(f: F, next: Option<StepRef>) -> StepRef
    where
        F: Fn(Scope, DialogContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DialogError>> + Send + 'static,
    {
        Arc::new(Self::Sequential {
            action: Action::new(f),
            next,
        })
    }

    pub fn conditional<F, Fut>(f: F, on_true: Option<StepRef>, on_false: Option<StepRef>) -> StepRef
    where
        F: Fn(Scope, DialogContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, DialogError>> + Send + 'static,
    {
        Arc::new(Self::Conditional {
            predicate: Predicate::new(f),
            on_true,
            on_false,
        })
    }

    /// True for steps that only choose a continuation
    pub fn is_branch(&self) -> bool {
        matches!(self, Self::Conditional { .. })
    }

    /// Execute once and return the continuation.
    ///
    /// On error the continuation is dropped: a failed step abandons the
    /// dialogue.
    pub async fn execute(
        &self,
        scope: Scope,
        ctx: DialogContext,
    ) -> Result<Option<StepRef>, DialogError> {
        match self {
            Self::Action(action) => {
                action.call(scope, ctx).await?;
                Ok(None)
            }
            Self::Sequential { action, next } => {
                action.call(scope, ctx).await?;
                Ok(next.clone())
            }
            Self::Conditional {
                predicate,
                on_true,
                on_false,
            } => {
                if predicate.call(scope, ctx).await? {
                    Ok(on_true.clone())
                } else {
                    Ok(on_false.clone())
                }
            }
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(_) => f.write_str("Action"),
            Self::Sequential { next, .. } => f
                .debug_struct("Sequential")
                .field("next", next)
                .finish_non_exhaustive(),
            Self::Conditional {
                on_true, on_false, ..
            } => f
                .debug_struct("Conditional")
                .field("on_true", on_true)
                .field("on_false", on_false)
                .finish_non_exhaustive(),
        }
    }
}
