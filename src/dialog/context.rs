//! Key-value context shared by the steps of one session

use super::DialogError;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Keys for values stored in a [`DialogContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// The inbound event that triggered the current run
    Inbound,
    /// Free-form key for values private to a dialogue
    Custom(&'static str),
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

type Slot = Arc<dyn Any + Send + Sync>;

/// Dialogue context handle.
///
/// Clones share the same storage. Each [`Session`](super::Session) owns a
/// fresh context, so values never leak across sessions.
#[derive(Clone, Default)]
pub struct DialogContext {
    values: Arc<Mutex<HashMap<ContextKey, Slot>>>,
}

impl DialogContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value; last write wins
    pub fn add_value<T: Any + Send + Sync>(&self, key: ContextKey, value: T) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(value));
    }

    /// Typed read. Missing keys and type mismatches are errors, never defaults.
    pub fn value<T: Any + Send + Sync + Clone>(&self, key: ContextKey) -> Result<T, DialogError> {
        let slot = self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or(DialogError::ContextValueMissing(key))?;
        slot.downcast_ref::<T>()
            .cloned()
            .ok_or(DialogError::ContextValueType {
                key,
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, key: ContextKey) -> bool {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }
}

impl fmt::Debug for DialogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("DialogContext")
            .field("keys", &values.keys().collect::<Vec<_>>())
            .finish()
    }
}
