use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chain_ethereum::EthereumProvider;
use ethers_core::types::U256;
use relay_base::{CachedPricing, GasUnit, GetterTick};
use relay_core::{ChainId, RelayState, Store, StoreExt};
use submitter::{Candidate, Evaluator, PricingInputs};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::collector::Collector;
use crate::metrics::RelayerMetrics;
use crate::worker::ChainWorker;

/// Drives one chain's tick loop: pull logs, decode into the Store, evaluate changed MIDs,
/// dispatch profitable orders, poll confirmations, emit status (spec.md §4.8
/// "Orchestrator").
pub struct Orchestrator<P: EthereumProvider + ?Sized> {
    worker: ChainWorker<P>,
    collector: Collector,
    evaluator: Evaluator,
    store: Arc<dyn Store>,
    pricing: Arc<CachedPricing>,
    chain_id: ChainId,
    counterparty_chain_id: ChainId,
    processing_interval: Duration,
    metrics: Arc<RelayerMetrics>,
    chain_label: String,
}

impl<P: EthereumProvider + ?Sized> Orchestrator<P> {
    pub fn new(
        worker: ChainWorker<P>,
        collector: Collector,
        evaluator: Evaluator,
        store: Arc<dyn Store>,
        pricing: Arc<CachedPricing>,
        chain_id: ChainId,
        counterparty_chain_id: ChainId,
        processing_interval: Duration,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        let chain_label = chain_id.0.to_string();
        Self {
            worker,
            collector,
            evaluator,
            store,
            pricing,
            chain_id,
            counterparty_chain_id,
            processing_interval,
            metrics,
            chain_label,
        }
    }

    /// Runs until `shutdown` is cancelled or a fatal error is hit, draining in-flight work
    /// before returning either way (SPEC_FULL.md §3 "graceful shutdown", spec.md §7 taxonomy
    /// item 6 "signing key lost, Store unreachable > grace period").
    #[instrument(skip(self, shutdown), fields(chain = %self.chain_id))]
    pub async fn run(&mut self, shutdown: CancellationToken) -> WorkerExit {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, draining in-flight orders");
                    self.drain_until_idle().await;
                    return WorkerExit::Shutdown;
                }
                _ = sleep(self.processing_interval) => {
                    if let Err(err) = self.tick().await {
                        if is_fatal(err.as_ref()) {
                            error!(?err, "fatal worker error, exiting");
                            self.drain_until_idle().await;
                            return WorkerExit::Fatal(err.to_string());
                        }
                        error!(?err, "orchestrator tick failed");
                    }
                }
            }
        }
    }

    async fn drain_until_idle(&mut self) {
        let deadline = Instant::now() + self.worker.confirmation_timeout();
        while self.worker.pending_count() > 0 && Instant::now() < deadline {
            if let Err(err) = self.worker.poll_all_confirmations(self.store.as_ref()).await {
                warn!(?err, "error polling confirmations during shutdown drain");
            }
            sleep(Duration::from_millis(200)).await;
        }
    }

    #[instrument(skip(self), fields(chain = %self.chain_id))]
    async fn tick(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self.worker.getter_tick().await? {
            GetterTick::Logs { logs, new_cursor } => {
                self.collector.collect(self.store.as_ref(), logs).await?;
                self.worker.persist_checkpoint(self.store.as_ref(), new_cursor).await?;
            }
            GetterTick::Stalled => {}
            GetterTick::Stopped => return Ok(()),
        }

        self.evaluate_and_dispatch().await?;
        self.worker.poll_all_confirmations(self.store.as_ref()).await?;
        self.worker.maybe_refresh_balance().await?;
        self.worker.report_pending_gauge();
        Ok(())
    }

    async fn evaluate_and_dispatch(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let queued: Vec<relay_core::QueuedCandidate> = self
            .store
            .pop_n(&relay_core::pending_orders_key(self.chain_id), 256)
            .await?;
        if queued.is_empty() {
            return Ok(());
        }

        let now_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut candidates = Vec::with_capacity(queued.len());
        for entry in queued {
            let Some(versioned) = self.store.get::<RelayState>(&entry.mid.store_key()).await? else {
                continue;
            };
            let state = versioned.value;
            let kind = if state.needs_delivery() {
                relay_core::OrderKind::Delivery
            } else {
                relay_core::OrderKind::Ack
            };
            let (gas_estimate, local_gas_price) = self.worker.estimate_for_evaluation(entry.mid, kind, &state).await;
            let reward_chain_price = self
                .pricing
                .price_of(ChainId(state.placed.as_ref().map(|p| p.from_chain_id.0).unwrap_or(self.chain_id.0)), GasUnit::Native)
                .await
                .unwrap_or(U256::from(1));
            let cost_chain_price = self.pricing.price_of(self.chain_id, GasUnit::Native).await.unwrap_or(U256::from(1));

            // `state.placed` is always `Some` — every `RelayState` is created from a
            // `BountyPlaced` (spec.md §3 "A RelayState exists for every MID for which a
            // BountyPlaced has been persisted").
            let placed_position = state.placed.as_ref().expect("relay state always has a placed event").position;
            let triggering_position = if state.needs_ack() {
                state.delivered.as_ref().map(|d| d.position).unwrap_or(placed_position)
            } else {
                placed_position
            };

            let age = Duration::from_millis(now_unix_ms.saturating_sub(entry.enqueued_at_unix_ms));
            candidates.push(Candidate {
                // Every candidate popped here is dispatched through this orchestrator's own
                // worker/wallet, which is bound to `self.chain_id` (main.rs builds one
                // provider/wallet per own chain) — `target_chain` is only read by
                // `worker::requeue`, which must re-enqueue onto this same chain's queue, not
                // the counterparty's.
                target_chain: self.chain_id,
                first_observed: Instant::now().checked_sub(age).unwrap_or_else(Instant::now),
                triggering_position,
                pricing: PricingInputs {
                    gas_estimate,
                    local_gas_price,
                    reward_chain_price,
                    cost_chain_price,
                },
                state,
            });
        }

        for order in self.evaluator.evaluate_batch(candidates) {
            self.metrics
                .orders_evaluated
                .with_label_values(&[&self.chain_label, order.kind.as_str()])
                .inc();
            if let Err(err) = self.worker.dispatch(order, self.store.as_ref()).await {
                warn!(?err, "failed to dispatch order, will be retried next time it's re-enqueued");
            }
        }
        Ok(())
    }
}

/// Why an [`Orchestrator::run`] call returned, so `main` can decide whether the whole
/// process should exit non-zero or just mark this one chain inactive and keep the rest
/// running (spec.md §7 "No failure in one chain brings down another").
#[derive(Debug)]
pub enum WorkerExit {
    Shutdown,
    Fatal(String),
}

/// A tick error is fatal only if it's a non-retryable `ChainCommunicationError`
/// (spec.md §7 taxonomy item 6); anything else — including errors this process doesn't
/// recognize — is treated as transient and simply logged by the caller.
fn is_fatal(err: &(dyn std::error::Error + 'static)) -> bool {
    err.downcast_ref::<relay_core::ChainCommunicationError>()
        .map(|e| !e.is_retryable())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use relay_core::ChainCommunicationError;

    use super::*;

    #[test]
    fn signer_unavailable_is_fatal() {
        let err = ChainCommunicationError::SignerUnavailable("key file missing".into());
        assert!(is_fatal(&err));
    }

    #[test]
    fn provider_error_is_retryable_not_fatal() {
        let err = ChainCommunicationError::ProviderError("connection reset".into());
        assert!(!is_fatal(&err));
    }

    #[test]
    fn timeout_is_retryable_not_fatal() {
        let err = ChainCommunicationError::Timeout(Duration::from_secs(5));
        assert!(!is_fatal(&err));
    }

    #[test]
    fn an_unrecognized_error_type_is_treated_as_transient() {
        #[derive(Debug)]
        struct Opaque;
        impl std::fmt::Display for Opaque {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "opaque")
            }
        }
        impl std::error::Error for Opaque {}

        assert!(!is_fatal(&Opaque));
    }
}
