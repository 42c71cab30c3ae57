//! Pluggable load/save hooks behind the state cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dbot_core::{Result, UserId};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::warn;

/// State of one user: a JSON object.
pub type StateValue = Map<String, Value>;

/// Durable side of the store. Called without any cache lock held, so implementations may do I/O.
#[async_trait]
pub trait StatePersistence: Send + Sync {
    async fn load(&self, user_id: UserId) -> Result<StateValue>;
    async fn save(&self, user_id: UserId, value: &StateValue) -> Result<()>;
}

/// Loads nothing and keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPersistence;

#[async_trait]
impl StatePersistence for NoopPersistence {
    async fn load(&self, _user_id: UserId) -> Result<StateValue> {
        Ok(StateValue::new())
    }

    async fn save(&self, user_id: UserId, _value: &StateValue) -> Result<()> {
        warn!(user_id = user_id, "state save not implemented, state is not durable");
        Ok(())
    }
}

/// Process-local persistence, for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    values: Arc<RwLock<HashMap<UserId, StateValue>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stored(&self, user_id: UserId) -> Option<StateValue> {
        self.values.read().await.get(&user_id).cloned()
    }

    pub async fn insert(&self, user_id: UserId, value: StateValue) {
        self.values.write().await.insert(user_id, value);
    }
}

#[async_trait]
impl StatePersistence for InMemoryPersistence {
    async fn load(&self, user_id: UserId) -> Result<StateValue> {
        Ok(self.stored(user_id).await.unwrap_or_default())
    }

    async fn save(&self, user_id: UserId, value: &StateValue) -> Result<()> {
        self.insert(user_id, value.clone()).await;
        Ok(())
    }
}
