//! Record repository: per-entity CRUD over the local store with a
//! best-effort remote mirror
//!
//! Every public operation reports failure as `None`, `false` or an empty
//! list and logs the cause. Local writes finish before any mirror call is
//! dispatched; mirror calls run as background jobs that the caller never
//! waits on (see [`Repository::settle`]).

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinSet;

use crate::models::RemoteId;
use crate::remote::{MirrorClient, Mirrored, RemotePatch, Table};
use crate::store::{Store, StoreError};

mod current;
mod history;
mod pending;
mod settings;
mod streaks;
mod tasks;
mod transfer;

pub use settings::setting_u64;

/// A record kept in a named collection and mirrored remotely
pub trait Record: Mirrored + Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Storage key of the collection
    const KEY: &'static str;

    type Patch: Patch<Self>;

    fn id(&self) -> &str;

    fn remote_id(&self) -> Option<&RemoteId>;

    fn set_remote_id(&mut self, remote_id: RemoteId);
}

/// Why a locked update was not written
#[derive(Debug)]
enum Refused<E> {
    NotFound,
    Storage,
    Rejected(E),
}

/// Shallow merge of a partial update into a stored record
pub trait Patch<R>: RemotePatch + Send + Sync + 'static {
    fn apply_to(&self, record: &mut R);
}

pub struct Repository {
    store: Store,
    mirror: Option<MirrorClient>,
    jobs: Mutex<JoinSet<()>>,
}

impl Repository {
    pub fn new(store: Store, mirror: Option<MirrorClient>) -> Self {
        Self {
            store,
            mirror,
            jobs: Mutex::new(JoinSet::new()),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror.is_some()
    }

    /// Wait for every dispatched mirror call to finish
    pub async fn settle(&self) {
        loop {
            let mut jobs =
                std::mem::take(&mut *self.jobs.lock().unwrap_or_else(PoisonError::into_inner));
            if jobs.is_empty() {
                break;
            }
            while let Some(result) = jobs.join_next().await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Mirror job aborted");
                }
            }
        }
    }

    async fn load<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        Ok(self.store.get::<Vec<R>>(R::KEY).await?.unwrap_or_default())
    }

    /// Whole collection in insertion order, empty on any fault
    async fn all<R: Record>(&self) -> Vec<R> {
        match self.load::<R>().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(key = R::KEY, error = %e, "Failed to read collection");
                Vec::new()
            }
        }
    }

    async fn find<R: Record>(&self, id: &str) -> Option<R> {
        self.all::<R>().await.into_iter().find(|r| r.id() == id)
    }

    async fn insert<R: Record>(&self, record: R) -> Option<R> {
        {
            let _guard = self.store.lock(R::KEY).await;
            let mut records = match self.load::<R>().await {
                Ok(records) => records,
                Err(e) => {
                    tracing::error!(key = R::KEY, error = %e, "Failed to read collection");
                    return None;
                }
            };
            records.push(record.clone());
            if let Err(e) = self.store.set(R::KEY, &records).await {
                tracing::error!(key = R::KEY, error = %e, "Failed to save collection");
                return None;
            }
        }

        tracing::info!(key = R::KEY, id = record.id(), "Record added");
        self.mirror_create(&record);
        Some(record)
    }

    async fn modify<R: Record>(&self, id: &str, patch: R::Patch) -> Option<R> {
        self.modify_with::<R, Infallible>(id, move |_| Ok(patch))
            .await
            .ok()
    }

    /// Update a record with a patch derived from its stored state.
    ///
    /// The read, `derive` and the write all happen under the collection
    /// lock, so checks made by `derive` hold when the patch lands.
    async fn modify_with<R, E>(
        &self,
        id: &str,
        derive: impl FnOnce(&R) -> Result<R::Patch, E>,
    ) -> Result<R, Refused<E>>
    where
        R: Record,
    {
        let (updated, patch) = {
            let _guard = self.store.lock(R::KEY).await;
            let mut records = match self.load::<R>().await {
                Ok(records) => records,
                Err(e) => {
                    tracing::error!(key = R::KEY, error = %e, "Failed to read collection");
                    return Err(Refused::Storage);
                }
            };
            let Some(record) = records.iter_mut().find(|r| r.id() == id) else {
                tracing::error!(key = R::KEY, id, "Record not found");
                return Err(Refused::NotFound);
            };
            let patch = derive(&*record).map_err(Refused::Rejected)?;
            patch.apply_to(record);
            let updated = record.clone();
            if let Err(e) = self.store.set(R::KEY, &records).await {
                tracing::error!(key = R::KEY, error = %e, "Failed to save collection");
                return Err(Refused::Storage);
            }
            (updated, patch)
        };

        if let Some(remote_id) = updated.remote_id() {
            self.mirror_update(R::TABLE, remote_id.clone(), patch);
        }
        Ok(updated)
    }

    async fn discard<R: Record>(&self, id: &str) -> bool {
        let _guard = self.store.lock(R::KEY).await;
        let mut records = match self.load::<R>().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(key = R::KEY, error = %e, "Failed to read collection");
                return false;
            }
        };
        let Some(position) = records.iter().position(|r| r.id() == id) else {
            tracing::warn!(key = R::KEY, id, "Record not found");
            return false;
        };

        let record = records.remove(position);
        if let Err(e) = self.store.set(R::KEY, &records).await {
            tracing::error!(key = R::KEY, error = %e, "Failed to save collection");
            return false;
        }
        if let Some(remote_id) = record.remote_id() {
            self.mirror_delete(R::TABLE, remote_id.clone());
        }
        tracing::info!(key = R::KEY, id, "Record deleted");
        true
    }

    fn spawn_mirror<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(job);
    }

    fn mirror_create<R: Record>(&self, record: &R) {
        let Some(mirror) = self.mirror.clone() else {
            return;
        };
        let store = self.store.clone();
        let record = record.clone();
        self.spawn_mirror(async move {
            if let Some(remote_id) = mirror.create(&record).await {
                attach_remote_id::<R>(&store, record.id(), remote_id).await;
            }
        });
    }

    fn mirror_update<P>(&self, table: Table, remote_id: RemoteId, patch: P)
    where
        P: RemotePatch + Send + Sync + 'static,
    {
        let Some(mirror) = self.mirror.clone() else {
            return;
        };
        self.spawn_mirror(async move {
            mirror.update(table, &remote_id, &patch).await;
        });
    }

    fn mirror_delete(&self, table: Table, remote_id: RemoteId) {
        let Some(mirror) = self.mirror.clone() else {
            return;
        };
        self.spawn_mirror(async move {
            mirror.delete(table, &remote_id).await;
        });
    }
}

/// Store the backend's id on the local record, if it still exists
async fn attach_remote_id<R: Record>(store: &Store, id: &str, remote_id: RemoteId) {
    let _guard = store.lock(R::KEY).await;
    let mut records: Vec<R> = match store.get(R::KEY).await {
        Ok(records) => records.unwrap_or_default(),
        Err(e) => {
            tracing::error!(key = R::KEY, error = %e, "Failed to read collection");
            return;
        }
    };
    let Some(record) = records.iter_mut().find(|r| r.id() == id) else {
        tracing::debug!(key = R::KEY, id, "Record gone before remote id arrived");
        return;
    };
    record.set_remote_id(remote_id.clone());
    match store.set(R::KEY, &records).await {
        Ok(()) => tracing::debug!(key = R::KEY, id, remote_id = %remote_id, "Remote id attached"),
        Err(e) => tracing::error!(key = R::KEY, error = %e, "Failed to save collection"),
    }
}

/// Current time in millis plus a random base-36 suffix.
///
/// Unique with high probability, not guaranteed.
fn generate_id(now_ms: i64) -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();

    format!("{}{}", now_ms, suffix)
}

#[cfg(test)]
mod test_support {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::store::{FileSubstrate, MemorySubstrate, Substrate};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use wiremock::MockServer;

    pub fn local_repo() -> Repository {
        Repository::new(Store::in_memory(), None)
    }

    pub fn file_repo(dir: &Path) -> Repository {
        let files = FileSubstrate::open(dir).unwrap();
        Repository::new(Store::new(Arc::new(files)), None)
    }

    fn mirror_for(server: &MockServer) -> MirrorClient {
        let config = RemoteConfig {
            enabled: true,
            url: server.uri(),
            api_key: "test-key".into(),
            timeout_secs: 2,
            ..Default::default()
        };
        MirrorClient::new(config).unwrap()
    }

    pub fn mirrored_repo(server: &MockServer) -> Repository {
        Repository::new(Store::in_memory(), Some(mirror_for(server)))
    }

    pub fn mirrored_repo_on(server: &MockServer, substrate: Arc<dyn Substrate>) -> Repository {
        Repository::new(Store::new(substrate), Some(mirror_for(server)))
    }

    /// Memory substrate whose writes start failing once frozen
    #[derive(Default)]
    pub struct FreezableSubstrate {
        inner: MemorySubstrate,
        frozen: AtomicBool,
    }

    impl FreezableSubstrate {
        pub fn freeze(&self) {
            self.frozen.store(true, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.frozen.load(Ordering::SeqCst) {
                Err(StoreError::Io(std::io::Error::other("read-only")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Substrate for FreezableSubstrate {
        fn name(&self) -> &'static str {
            "freezable"
        }

        async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
            self.check()?;
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.remove(key).await
        }

        async fn keys(&self) -> Result<Vec<String>, StoreError> {
            self.inner.keys().await
        }

        async fn clear(&self) -> Result<(), StoreError> {
            self.check()?;
            self.inner.clear().await
        }
    }
}
