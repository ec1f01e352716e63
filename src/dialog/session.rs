//! Session: one dialogue's scope, context and current step

use super::{ContextKey, DialogContext, DialogError, Scope, StepRef};
use std::any::Any;

/// Branch hops allowed in a single run before giving up
const MAX_BRANCH_HOPS: usize = 32;

/// A dialogue in progress.
///
/// Each [`run`](Session::run) consumes one external trigger and executes
/// exactly one action. Conditional steps before and after that action are
/// resolved in the same run, so between turns the session never rests on a
/// branch.
#[derive(Debug)]
pub struct Session {
    scope: Scope,
    context: DialogContext,
    step: Option<StepRef>,
}

impl Session {
    pub fn new(scope: Scope, step: StepRef) -> Self {
        Self {
            scope,
            context: DialogContext::new(),
            step: Some(step),
        }
    }

    /// A session with no deadline of its own, for stateless one-turn handling
    pub fn one_shot(step: StepRef) -> Self {
        Self::new(Scope::background(), step)
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn context(&self) -> &DialogContext {
        &self.context
    }

    pub fn current_step(&self) -> Option<&StepRef> {
        self.step.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.step.is_none()
    }

    pub fn add_value<T: Any + Send + Sync>(&self, key: ContextKey, value: T) {
        self.context.add_value(key, value);
    }

    pub fn value<T: Any + Send + Sync + Clone>(&self, key: ContextKey) -> Result<T, DialogError> {
        self.context.value(key)
    }

    /// Advance the dialogue by one turn.
    ///
    /// The step runs on its own task, raced against the session scope and
    /// `caller`. If a scope ends first its error is returned, the current step
    /// is left in place and the step task is detached; whatever it eventually
    /// produces is dropped.
    pub async fn run(&mut self, caller: &Scope) -> Result<(), DialogError> {
        let Some(step) = self.step.clone() else {
            return Err(DialogError::NothingToDo);
        };

        let task = tokio::spawn(advance(step, caller.clone(), self.context.clone()));

        tokio::select! {
            biased;
            end = self.scope.done() => Err(end.session_error()),
            end = caller.done() => Err(end.caller_error()),
            joined = task => {
                let result = joined.unwrap_or_else(|e| Err(DialogError::step(e)));
                match result {
                    Ok(next) => {
                        self.step = next;
                        Ok(())
                    }
                    Err(err) => {
                        self.step = None;
                        Err(err)
                    }
                }
            }
        }
    }
}

/// Execute one action-bearing step, resolving branches on either side of it.
///
/// Branches before the action pick which action runs. Branches after it are
/// evaluated against the context the action just produced, so the session
/// rests on the chosen branch's root.
async fn advance(
    mut step: StepRef,
    scope: Scope,
    context: DialogContext,
) -> Result<Option<StepRef>, DialogError> {
    let mut acted = false;
    for _ in 0..=MAX_BRANCH_HOPS {
        acted |= !step.is_branch();
        let next = step.execute(scope.clone(), context.clone()).await?;
        match next {
            Some(next) if !acted || next.is_branch() => step = next,
            other => return Ok(other),
        }
    }
    Err(DialogError::BranchLimit(MAX_BRANCH_HOPS))
}
