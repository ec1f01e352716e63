//! Multi-turn dialogue engine
//!
//! A dialogue is a chain of [`Step`]s driven one turn at a time by a
//! [`Session`]. The [`Registry`] keeps at most one in-flight session per user
//! and feeds every inbound event into it, falling back to a one-shot session
//! when nothing is pending.

mod context;
mod error;
mod registry;
mod scope;
mod session;
mod step;

#[cfg(test)]
mod proptests;

pub use context::{ContextKey, DialogContext};
pub use error::DialogError;
pub use registry::{Dispatched, Registry, UserId};
pub use scope::{Scope, ScopeEnd};
pub use session::Session;
pub use step::{Step, StepRef};
