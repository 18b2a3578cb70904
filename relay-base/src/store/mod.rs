use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use relay_core::{Store, StoreError, StoreResult};
use tokio::sync::{broadcast, Mutex};

struct Entry {
    bytes: Vec<u8>,
    version: u64,
}

/// In-process, dependency-free implementation of the Store contract (spec.md §4.3).
/// Single-key atomicity comes from `DashMap`'s per-shard locking; optimistic
/// compare-and-set is a read-check-write under that same per-key lock entry, so there is no
/// separate lock needed. The concrete persistence backend is an external collaborator per
/// spec.md §1 — this implementation is the one used by tests and by single-process
/// deployments; a durable backend only needs to satisfy the same `Store` trait.
pub struct InMemoryStore {
    kv: DashMap<String, Entry>,
    queues: DashMap<String, Mutex<VecDeque<Vec<u8>>>>,
    subscribers: DashMap<String, broadcast::Sender<()>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            kv: DashMap::new(),
            queues: DashMap::new(),
            subscribers: DashMap::new(),
        }
    }

    fn notify(&self, key: &str) {
        if let Some(tx) = self.subscribers.get(key) {
            // Hint-only: nobody needs to be listening (spec.md §4.3).
            let _ = tx.send(());
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_raw(&self, key: &str) -> StoreResult<Option<(Vec<u8>, u64)>> {
        Ok(self.kv.get(key).map(|e| (e.bytes.clone(), e.version)))
    }

    async fn set_if_version_raw(
        &self,
        key: &str,
        expected_version: u64,
        value: Vec<u8>,
    ) -> StoreResult<u64> {
        let new_version = {
            let mut entry = self.kv.entry(key.to_string());
            match &entry {
                dashmap::mapref::entry::Entry::Occupied(occ) => {
                    let current = occ.get().version;
                    if current != expected_version {
                        return Err(StoreError::VersionConflict {
                            key: key.to_string(),
                            expected: expected_version,
                            found: current,
                        });
                    }
                }
                dashmap::mapref::entry::Entry::Vacant(_) => {
                    if expected_version != 0 {
                        return Err(StoreError::VersionConflict {
                            key: key.to_string(),
                            expected: expected_version,
                            found: 0,
                        });
                    }
                }
            }
            let new_version = expected_version + 1;
            entry.insert(Entry {
                bytes: value,
                version: new_version,
            });
            new_version
        };
        self.notify(key);
        Ok(new_version)
    }

    async fn push_raw(&self, queue_key: &str, value: Vec<u8>) -> StoreResult<()> {
        let queue = self
            .queues
            .entry(queue_key.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        queue.lock().await.push_back(value);
        drop(queue);
        self.notify(queue_key);
        Ok(())
    }

    async fn pop_n_raw(&self, queue_key: &str, n: usize) -> StoreResult<Vec<Vec<u8>>> {
        let Some(queue) = self.queues.get(queue_key) else {
            return Ok(Vec::new());
        };
        let mut guard = queue.lock().await;
        let count = n.min(guard.len());
        Ok(guard.drain(..count).collect())
    }

    fn subscribe(&self, key: &str) -> broadcast::Receiver<()> {
        self.subscribers
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .subscribe()
    }
}

pub type SharedStore = Arc<dyn Store>;

#[cfg(test)]
mod tests {
    use relay_core::StoreExt;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        value: u64,
    }

    #[tokio::test]
    async fn set_get_round_trip_preserves_large_integers() {
        let store = InMemoryStore::new();
        let big = ethers_core::types::U256::from_dec_str(
            "115792089237316195423570985008687907853269984665640564039457584007913129639935",
        )
        .unwrap();
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct WithU256 {
            value: ethers_core::types::U256,
        }
        store
            .set_if_version("k", 0, &WithU256 { value: big })
            .await
            .unwrap();
        let got: relay_core::Versioned<WithU256> = store.get("k").await.unwrap().unwrap();
        assert_eq!(got.value.value, big);
    }

    #[tokio::test]
    async fn cas_rejects_stale_version() {
        let store = InMemoryStore::new();
        let v1 = store.set_if_version("k", 0, &Dummy { value: 1 }).await.unwrap();
        assert_eq!(v1, 1);
        // Writing again at the now-stale version 0 must fail.
        let err = store.set_if_version("k", 0, &Dummy { value: 2 }).await;
        assert!(err.is_err());
        // Writing at the correct version succeeds.
        let v2 = store.set_if_version("k", v1, &Dummy { value: 2 }).await.unwrap();
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn push_pop_n_is_fifo() {
        let store = InMemoryStore::new();
        for i in 0..5u32 {
            store.push("q", &i).await.unwrap();
        }
        let popped: Vec<u32> = store.pop_n("q", 3).await.unwrap();
        assert_eq!(popped, vec![0, 1, 2]);
        let rest: Vec<u32> = store.pop_n("q", 10).await.unwrap();
        assert_eq!(rest, vec![3, 4]);
    }
}
