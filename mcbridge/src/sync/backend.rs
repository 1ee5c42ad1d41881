//! Session backends that mirror committed state.

use crate::error::StateResult;
use crate::handler::StateDelta;
use crate::sync::path::{delete_path, set_path};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// An external store that receives every committed delta.
///
/// Errors returned by [`SessionBackend::apply`] are logged by the
/// synchronizer and never undo the local commit.
pub trait SessionBackend: Send + Sync + 'static {
    /// Applies a committed delta.
    fn apply(&self, delta: &StateDelta) -> BoxFuture<'_, StateResult<()>>;

    /// Reads the backend's full state.
    fn read(&self) -> BoxFuture<'_, StateResult<Map<String, Value>>>;
}

/// A backend holding state in memory.
#[derive(Debug, Default)]
pub struct InMemorySession {
    state: Mutex<Map<String, Value>>,
    applied: AtomicU64,
}

impl InMemorySession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session holding the given state.
    pub fn with_state(state: Map<String, Value>) -> Self {
        Self {
            state: Mutex::new(state),
            applied: AtomicU64::new(0),
        }
    }

    /// Returns the number of deltas applied.
    pub fn applied_count(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Returns a copy of the session state.
    pub fn state(&self) -> Map<String, Value> {
        self.state.lock().clone()
    }
}

impl SessionBackend for InMemorySession {
    fn apply(&self, delta: &StateDelta) -> BoxFuture<'_, StateResult<()>> {
        {
            let mut state = self.state.lock();
            for (key, value) in delta {
                if value.is_null() {
                    delete_path(&mut state, key);
                } else {
                    set_path(&mut state, key, value.clone());
                }
            }
        }
        self.applied.fetch_add(1, Ordering::Relaxed);
        futures::future::ready(Ok(())).boxed()
    }

    fn read(&self) -> BoxFuture<'_, StateResult<Map<String, Value>>> {
        futures::future::ready(Ok(self.state())).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_session() {
        let session = InMemorySession::new();
        let mut delta = StateDelta::new();
        delta.insert("minecraft.spawned".to_string(), json!(true));
        delta.insert("minecraft.bot.health".to_string(), json!(20));
        session.apply(&delta).await.unwrap();

        let mut removal = StateDelta::new();
        removal.insert("minecraft.bot.health".to_string(), Value::Null);
        session.apply(&removal).await.unwrap();

        let state = session.read().await.unwrap();
        assert_eq!(Value::Object(state), json!({"minecraft": {"spawned": true, "bot": {}}}));
        assert_eq!(session.applied_count(), 2);
    }
}
