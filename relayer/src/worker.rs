use std::sync::Arc;
use std::time::Duration;

use chain_ethereum::EthereumProvider;
use ethers_core::types::{Address, U256};
use relay_base::{ChainSettings, Getter, GetterTick};
use relay_core::{ChainId, MessageId, OrderKind, RelayState, Store, StoreError, StoreExt, SubmitOrder};
use submitter::{Dispatcher, SubmitterError, WalletError};
use tracing::warn;

use crate::metrics::RelayerMetrics;

/// Everything a single chain needs wired together to run its half of the pipeline: the log
/// fetcher, the transaction dispatcher and the book-keeping the Orchestrator drives each tick
/// (spec.md §2 per-chain worker).
pub struct ChainWorker<P: EthereumProvider + ?Sized> {
    getter: Getter<P>,
    dispatcher: Dispatcher<P>,
    settings: ChainSettings,
    chain_id: ChainId,
    chain_label: String,
    escrow_address: Address,
    ticks_since_balance_refresh: u64,
    metrics: Arc<RelayerMetrics>,
}

impl<P: EthereumProvider + ?Sized> ChainWorker<P> {
    pub fn new(
        getter: Getter<P>,
        dispatcher: Dispatcher<P>,
        settings: ChainSettings,
        escrow_address: Address,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        let chain_id = ChainId(settings.chain_id);
        let chain_label = chain_id.0.to_string();
        Self {
            getter,
            dispatcher,
            settings,
            chain_id,
            chain_label,
            escrow_address,
            ticks_since_balance_refresh: 0,
            metrics,
        }
    }

    pub async fn getter_tick(&mut self) -> Result<GetterTick, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.getter.tick().await?)
    }

    pub async fn persist_checkpoint(&self, store: &dyn Store, cursor: u64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let key = format!("checkpoint:{}", self.chain_id);
        let existing_version = store.get::<u64>(&key).await?.map(|v| v.version).unwrap_or(0);
        store.set_if_version(&key, existing_version, &cursor).await?;
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.dispatcher.wallet().pending_count()
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.confirmation_timeout_ms)
    }

    pub async fn dispatch(&mut self, order: SubmitOrder, store: &dyn Store) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.dispatcher.has_capacity() {
            // Backpressure: the Submitter stops pulling from the Evaluator once the Wallet's
            // pending set reaches `maxPendingTransactions` (spec.md §9 "Within a worker").
            self.requeue(order, store).await?;
            return Ok(());
        }
        let key = order.mid.store_key();
        let Some(versioned) = store.get::<RelayState>(&key).await? else {
            return Ok(());
        };
        match self.dispatcher.dispatch(order.clone(), &versioned.value).await {
            Ok(()) => {
                self.metrics
                    .orders_submitted
                    .with_label_values(&[&self.chain_label, order.kind.as_str()])
                    .inc();
            }
            Err(SubmitterError::MaxTriesExceeded(attempts, reason)) => {
                // spec.md §4.6 "Failed after maxTries increments the Store's attempt counter
                // and surfaces the error": recorded, not re-enqueued — the Evaluator will
                // naturally offer it again once the underlying state changes (e.g. a
                // BountyIncreased), per spec.md §7 taxonomy item 4.
                warn!(mid = %order.mid, attempts, reason = %reason, "order abandoned after max tries");
                self.record_attempt(store, order.mid, order.kind).await?;
            }
            Err(err) => {
                warn!(?err, mid = %order.mid, "dispatch failed, re-enqueuing for the next tick");
                self.requeue(order, store).await?;
            }
        }
        Ok(())
    }

    async fn record_attempt(
        &self,
        store: &dyn Store,
        mid: MessageId,
        kind: OrderKind,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let key = mid.store_key();
        loop {
            let Some(versioned) = store.get::<RelayState>(&key).await? else {
                return Ok(());
            };
            let mut state = versioned.value;
            state.increment_attempts(kind);
            match store.set_if_version(&key, versioned.version, &state).await {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Merges a confirmed order's gas cost back into its `RelayState` and releases the
    /// Dispatcher's tracking for it (spec.md §4.7 "The receipt is merged back into the Store
    /// and the Submitter slot is released").
    async fn record_confirmation(
        &mut self,
        store: &dyn Store,
        confirmation: &submitter::Confirmation,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let key = confirmation.order.mid.store_key();
        loop {
            let Some(versioned) = store.get::<RelayState>(&key).await? else {
                return Ok(());
            };
            let mut state = versioned.value;
            state.record_confirmation(confirmation.order.kind, confirmation.gas_cost);
            match store.set_if_version(&key, versioned.version, &state).await {
                Ok(_) => break,
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        self.dispatcher.drop_order(confirmation.order.mid, confirmation.order.kind);
        self.metrics.confirmations.with_label_values(&[&self.chain_label]).inc();
        Ok(())
    }

    async fn requeue(&self, order: SubmitOrder, store: &dyn Store) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let queue_chain = order.target_chain;
        let candidate = relay_core::QueuedCandidate::new(
            order.mid,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        );
        store.push(&relay_core::pending_orders_key(queue_chain), &candidate).await?;
        Ok(())
    }

    /// Polls the lowest in-flight nonce only, so the Store observes confirmations in nonce
    /// order even though receipts may arrive out of order (spec.md §5 "the Wallet holds back
    /// later results until earlier nonces resolve").
    pub async fn poll_all_confirmations(&mut self, store: &dyn Store) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Some(nonce) = self.dispatcher.wallet().lowest_in_flight_nonce() else {
            return Ok(());
        };
        match self.dispatcher.wallet_mut().poll_confirmation(nonce).await {
            Ok(Some(confirmation)) => {
                self.record_confirmation(store, &confirmation).await?;
                self.dispatcher.wallet_mut().remove_terminal(nonce);
            }
            Ok(None) => {}
            // Persistent stall: the Wallet already cancelled the nonce by self-send
            // (spec.md §4.7 "on persistent stall, cancel by self-send"); surface the
            // abandonment the same way a dispatch that exhausted maxTries does.
            Err(WalletError::ConfirmationTimeout(timeout)) => {
                if let Some(pending) = self.dispatcher.wallet().get_pending(nonce) {
                    let (mid, kind) = (pending.order.mid, pending.order.kind);
                    warn!(mid = %mid, ?kind, ?timeout, "order abandoned after persistent confirmation stall");
                    self.record_attempt(store, mid, kind).await?;
                    self.dispatcher.drop_order(mid, kind);
                }
                self.dispatcher.wallet_mut().remove_terminal(nonce);
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    pub async fn maybe_refresh_balance(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.ticks_since_balance_refresh += 1;
        if self.ticks_since_balance_refresh >= self.settings.balance_update_interval {
            self.ticks_since_balance_refresh = 0;
            let balance = self.dispatcher.wallet_mut().refresh_balance().await?;
            self.metrics
                .wallet_balance
                .with_label_values(&[&self.chain_label])
                .set(saturating_i64(balance));
        }
        Ok(())
    }

    /// Refreshes the `/metrics` pending-transaction gauge to the Wallet's current in-flight
    /// count, called once per tick so it never drifts from reality between confirmations.
    pub fn report_pending_gauge(&self) {
        self.metrics
            .pending_transactions
            .with_label_values(&[&self.chain_label])
            .set(self.pending_count() as i64);
    }

    /// Gas estimate and current local gas price for the Evaluator's profitability test
    /// (spec.md §4.5); the Dispatcher re-derives both precisely at dispatch time
    /// (spec.md §4.6), this is only ever used to decide whether to submit.
    pub async fn estimate_for_evaluation(&self, mid: MessageId, kind: OrderKind, state: &RelayState) -> (U256, U256) {
        self.dispatcher.estimate_for_evaluation(mid, kind, state).await
    }

    pub fn escrow_address(&self) -> Address {
        self.escrow_address
    }
}

/// `U256` wallet balances routinely exceed `i64::MAX` wei; the gauge only needs to track
/// order-of-magnitude trends, so clamp rather than panic on overflow.
fn saturating_i64(value: U256) -> i64 {
    if value > U256::from(i64::MAX as u64) {
        i64::MAX
    } else {
        value.as_u64() as i64
    }
}
