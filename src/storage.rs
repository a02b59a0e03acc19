use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::event::ChatKey;

/// Persisted FSM state keyed by chat and user.
#[async_trait]
pub trait StateStorage: Send + Sync {
  async fn get_state(&self, key: ChatKey) -> Result<Option<String>, StorageError>;

  async fn set_state(&self, key: ChatKey, state: &str) -> Result<(), StorageError>;

  async fn reset_state(&self, key: ChatKey) -> Result<(), StorageError>;
}

/// Process-local storage, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  states: Mutex<HashMap<ChatKey, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn shared() -> Arc<Self> {
    Arc::new(Self::new())
  }
}

#[async_trait]
impl StateStorage for MemoryStorage {
  async fn get_state(&self, key: ChatKey) -> Result<Option<String>, StorageError> {
    Ok(self.states.lock().await.get(&key).cloned())
  }

  async fn set_state(&self, key: ChatKey, state: &str) -> Result<(), StorageError> {
    self.states.lock().await.insert(key, state.to_string());
    Ok(())
  }

  async fn reset_state(&self, key: ChatKey) -> Result<(), StorageError> {
    self.states.lock().await.remove(&key);
    Ok(())
  }
}
