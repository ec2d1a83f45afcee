//! Local persistence for named collections
//!
//! A [`Store`] holds whole collections (never single records) under string
//! keys. Where they physically live is decided once at startup by picking a
//! [`Substrate`].

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::{Backend, StorageConfig};

mod file;
mod memory;
mod sqlite;

pub use file::FileSubstrate;
pub use memory::MemorySubstrate;
pub use sqlite::SqliteSubstrate;

/// Storage keys for every persisted collection
pub mod keys {
    pub const TASKS: &str = "tasks";
    pub const CURRENT_TASK: &str = "currentTask";
    pub const TASK_HISTORY: &str = "taskHistory";
    pub const SETTINGS: &str = "settings";
    pub const STREAKS: &str = "streaks";
    pub const PENDING_TASKS: &str = "pendingTasks";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// Key-value capability backing a [`Store`]
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

/// Open the substrate named in the config
pub fn open_substrate(config: &StorageConfig) -> Result<Arc<dyn Substrate>, StoreError> {
    let path = config.resolved_path();
    let substrate: Arc<dyn Substrate> = match config.backend {
        Backend::Sqlite => Arc::new(SqliteSubstrate::open(&path)?),
        Backend::File => Arc::new(FileSubstrate::open(&path)?),
        Backend::Memory => Arc::new(MemorySubstrate::default()),
    };
    tracing::debug!(substrate = substrate.name(), path = %path.display(), "Storage opened");
    Ok(substrate)
}

/// Old and new value of one key
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

pub type StorageChanges = BTreeMap<String, StorageChange>;

type Listener = Arc<dyn Fn(&StorageChanges) + Send + Sync>;

struct Inner {
    substrate: Arc<dyn Substrate>,
    listeners: Mutex<Vec<Listener>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Typed access to the substrate plus change notifications.
///
/// Cloning is cheap; clones share the substrate, listeners and locks.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    pub fn new(substrate: Arc<dyn Substrate>) -> Self {
        Self {
            inner: Arc::new(Inner {
                substrate,
                listeners: Mutex::new(Vec::new()),
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySubstrate::default()))
    }

    pub fn substrate_name(&self) -> &'static str {
        self.inner.substrate.name()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.inner.substrate.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        let old_value = self.old_value_if_watched(key).await?;
        self.inner.substrate.set(key, value.clone()).await?;
        self.notify(key, old_value, Some(value));
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let old_value = self.old_value_if_watched(key).await?;
        self.inner.substrate.remove(key).await?;
        self.notify(key, old_value, None);
        Ok(())
    }

    /// Drop every key
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut changes = StorageChanges::new();
        if self.has_listeners() {
            for key in self.inner.substrate.keys().await? {
                let old_value = self.inner.substrate.get(&key).await?;
                changes.insert(
                    key,
                    StorageChange {
                        old_value,
                        new_value: None,
                    },
                );
            }
        }
        self.inner.substrate.clear().await?;
        if !changes.is_empty() {
            self.dispatch(&changes);
        }
        Ok(())
    }

    /// Register a callback invoked after every write, with the changed keys
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&StorageChanges) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Serialize read-modify-write cycles on one collection
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .inner
                .locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    fn has_listeners(&self) -> bool {
        !self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    async fn old_value_if_watched(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if self.has_listeners() {
            self.inner.substrate.get(key).await
        } else {
            Ok(None)
        }
    }

    fn notify(&self, key: &str, old_value: Option<Value>, new_value: Option<Value>) {
        if !self.has_listeners() {
            return;
        }
        let mut changes = StorageChanges::new();
        changes.insert(
            key.to_string(),
            StorageChange {
                old_value,
                new_value,
            },
        );
        self.dispatch(&changes);
    }

    fn dispatch(&self, changes: &StorageChanges) {
        // Snapshot so callbacks may register further listeners
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(changes);
        }
    }
}

/// Keys end up as file names and SQL parameters
fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
