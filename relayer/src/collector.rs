use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use relay_core::{pending_orders_key, AmbAdapter, ChainId, QueuedCandidate, RawLog, RelayState, Store, StoreExt, StoreResult};
use tracing::{debug, instrument, warn};

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Decodes raw logs into `BountyEvent`s and folds them into the shared Store
/// (spec.md §4.2 "Collector"). AMB-specific; every other component only ever sees the
/// resulting `RelayState`.
pub struct Collector {
    adapter: Arc<dyn AmbAdapter>,
    /// The chain whose delivery/ack orders this worker's Evaluator should be notified of via
    /// `pending_orders:<chainId>` (its own chain and its escrow counterparty).
    own_chain: ChainId,
    counterparty_chain: ChainId,
}

impl Collector {
    pub fn new(adapter: Arc<dyn AmbAdapter>, own_chain: ChainId, counterparty_chain: ChainId) -> Self {
        Self {
            adapter,
            own_chain,
            counterparty_chain,
        }
    }

    /// Processes one batch of logs from the Getter, returning the MIDs whose `RelayState`
    /// changed (spec.md §4.2, §9 "at-least-once observation, idempotent per MID").
    #[instrument(skip(self, store, logs), fields(chain = %self.own_chain))]
    pub async fn collect(&self, store: &dyn Store, logs: Vec<RawLog>) -> StoreResult<Vec<relay_core::MessageId>> {
        let mut touched = Vec::new();
        for log in logs {
            let event = match self.adapter.decode(&log) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(err) => {
                    // spec.md §7 taxonomy item 5: invalid/undecodable event, log and skip.
                    warn!(?err, block = log.block_number, log_index = log.log_index, "skipping undecodable log");
                    continue;
                }
            };
            self.merge_event(store, &event).await?;
            touched.push(event.mid());
        }
        Ok(touched)
    }

    /// Merge a single event into the Store with optimistic-CAS retry
    /// (spec.md §4.3 "compare-and-set on a monotonic version").
    async fn merge_event(&self, store: &dyn Store, event: &relay_core::BountyEvent) -> StoreResult<()> {
        let key = event.mid().store_key();
        loop {
            match store.get::<RelayState>(&key).await? {
                Some(existing) => {
                    let mut state = existing.value;
                    let status_before = state.status;
                    state.merge(event);
                    match store.set_if_version(&key, existing.version, &state).await {
                        Ok(_) => {
                            if state.status != status_before {
                                self.notify_pending_evaluation(store, &state).await?;
                            }
                            return Ok(());
                        }
                        Err(relay_core::StoreError::VersionConflict { .. }) => continue,
                        Err(other) => return Err(other),
                    }
                }
                None => {
                    let relay_core::BountyEvent::BountyPlaced(placed) = event else {
                        // Any state must be created by a BountyPlaced first (spec.md §3
                        // "A RelayState exists for every MID for which a BountyPlaced has
                        // been persisted"). An out-of-order non-Placed event for an unknown
                        // MID is skipped; the Getter's at-least-once replay will eventually
                        // deliver the BountyPlaced too.
                        debug!(mid = %event.mid(), "non-Placed event observed before BountyPlaced, skipping for now");
                        return Ok(());
                    };
                    let state = RelayState::new(placed.clone());
                    match store.set_if_version(&key, 0, &state).await {
                        Ok(_) => {
                            self.notify_pending_evaluation(store, &state).await?;
                            return Ok(());
                        }
                        Err(relay_core::StoreError::VersionConflict { .. }) => continue,
                        Err(other) => return Err(other),
                    }
                }
            }
        }
    }

    /// Pushes the MID onto the relevant chain's evaluation queue so the Orchestrator's next
    /// tick picks it up (spec.md §4.3 "secondary index `pending_orders:<chainId>`").
    async fn notify_pending_evaluation(&self, store: &dyn Store, state: &RelayState) -> StoreResult<()> {
        let candidate = QueuedCandidate::new(state.mid, now_unix_ms());
        if state.needs_delivery() {
            store.push(&pending_orders_key(self.counterparty_chain), &candidate).await?;
        }
        if state.needs_ack() {
            // `MessageDelivered` is observed on the destination, i.e. `self.own_chain` here,
            // but the ack is claimed on the origin — the counterparty from this collector's
            // point of view (spec.md §4.5 "status=1 ... candidate AckOrder on the origin
            // chain").
            store.push(&pending_orders_key(self.counterparty_chain), &candidate).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chain_ethereum::EthereumAmbAdapter;
    use ethers_core::types::{Bytes, H160, H256, U256};
    use relay_base::InMemoryStore;
    use relay_core::MessageId;

    use super::*;

    fn placed_log(mid: H256) -> RawLog {
        let data = ethers_core::abi::encode(&[
            ethers_core::abi::Token::Uint(U256::from(1u64)),
            ethers_core::abi::Token::FixedBytes(H256::random().as_bytes().to_vec()),
            ethers_core::abi::Token::Uint(U256::from(2_000_000u64)),
            ethers_core::abi::Token::Uint(U256::from(200_000u64)),
            ethers_core::abi::Token::FixedBytes(H256::random().as_bytes().to_vec()),
            ethers_core::abi::Token::Uint(U256::from(50_000_000_000u64)),
            ethers_core::abi::Token::Uint(U256::from(50_000_000_000u64)),
            ethers_core::abi::Token::Uint(U256::zero()),
            ethers_core::abi::Token::Bytes(vec![9, 9]),
        ]);
        RawLog {
            address: H160::zero(),
            topics: vec![*chain_ethereum::abi::BOUNTY_PLACED_TOPIC, mid],
            data: Bytes::from(data),
            block_number: 10,
            block_hash: H256::random(),
            log_index: 0,
            tx_hash: H256::random(),
        }
    }

    #[tokio::test]
    async fn bounty_placed_creates_relay_state_and_enqueues_delivery() {
        let store = InMemoryStore::default();
        let collector = Collector::new(Arc::new(EthereumAmbAdapter::new(HashMap::new())), ChainId(1), ChainId(2));
        let mid = H256::random();

        let touched = collector.collect(&store, vec![placed_log(mid)]).await.unwrap();
        assert_eq!(touched, vec![MessageId(mid)]);

        let state = store.get::<RelayState>(&MessageId(mid).store_key()).await.unwrap().unwrap();
        assert_eq!(state.value.status, relay_core::RelayStatus::Placed);

        let queued: Vec<relay_core::QueuedCandidate> = store.pop_n(&pending_orders_key(ChainId(2)), 10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].mid, MessageId(mid));
    }

    #[tokio::test]
    async fn unknown_topic_does_not_touch_any_mid() {
        let store = InMemoryStore::default();
        let collector = Collector::new(Arc::new(EthereumAmbAdapter::new(HashMap::new())), ChainId(1), ChainId(2));
        let mut log = placed_log(H256::random());
        log.topics[0] = H256::random();

        let touched = collector.collect(&store, vec![log]).await.unwrap();
        assert!(touched.is_empty());
    }
}
