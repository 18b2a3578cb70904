use async_trait::async_trait;

use crate::error::StoreResult;

/// A value paired with the monotonic version it was read at, for optimistic
/// compare-and-set (spec.md §4.3: "multi-key updates must go through a documented
/// read-modify-write with optimistic retry").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Persistent key-value interface backing the Store component (spec.md §4.3 / §6). All
/// mutations are single-key atomic; there are no cross-key transactions. Concrete backends
/// (the persistence choice is an external collaborator per spec.md §1) only need to provide
/// single-key atomicity and, optionally, pub/sub notifications — hence this being a trait
/// rather than a concrete database type.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_raw(&self, key: &str) -> StoreResult<Option<(Vec<u8>, u64)>>;

    /// Compare-and-set: succeeds only if the key's current version equals `expected_version`
    /// (or the key doesn't exist yet and `expected_version == 0`). Returns the new version.
    async fn set_if_version_raw(
        &self,
        key: &str,
        expected_version: u64,
        value: Vec<u8>,
    ) -> StoreResult<u64>;

    async fn push_raw(&self, queue_key: &str, value: Vec<u8>) -> StoreResult<()>;

    async fn pop_n_raw(&self, queue_key: &str, n: usize) -> StoreResult<Vec<Vec<u8>>>;

    /// Hint-only notification channel. Correctness never depends on these firing
    /// (spec.md §4.3, §9): the authoritative loop is the Orchestrator tick.
    fn subscribe(&self, key: &str) -> tokio::sync::broadcast::Receiver<()>;
}

/// Typed convenience wrapper around [`Store`]'s raw byte interface, used by every component
/// so callers never hand-roll `serde_json` calls at the edges.
#[async_trait]
pub trait StoreExt: Store {
    async fn get<T: serde::de::DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> StoreResult<Option<Versioned<T>>> {
        match self.get_raw(key).await? {
            Some((bytes, version)) => {
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(Versioned { value, version }))
            }
            None => Ok(None),
        }
    }

    async fn set_if_version<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        expected_version: u64,
        value: &T,
    ) -> StoreResult<u64> {
        let bytes = serde_json::to_vec(value)?;
        self.set_if_version_raw(key, expected_version, bytes).await
    }

    async fn push<T: serde::Serialize + Sync>(&self, queue_key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.push_raw(queue_key, bytes).await
    }

    async fn pop_n<T: serde::de::DeserializeOwned>(
        &self,
        queue_key: &str,
        n: usize,
    ) -> StoreResult<Vec<T>> {
        let raw = self.pop_n_raw(queue_key, n).await?;
        raw.into_iter()
            .map(|bytes| serde_json::from_slice(&bytes).map_err(Into::into))
            .collect()
    }
}

impl<T: Store + ?Sized> StoreExt for T {}
