use std::collections::HashMap;
use std::sync::Arc;

use chain_ethereum::EthereumProvider;
use ethers_core::types::{Address, U256};
use relay_base::ChainSettings;
use relay_core::{AmbAdapter, MessageId, OrderKind, RelayState, SubmitOrder};
use tracing::{info, warn};

use crate::error::{SubmitterError, WalletError};
use crate::gas_policy;
use crate::wallet::Wallet;

/// Key an in-flight attempt count by MID and order kind: delivery and ack for the same
/// message are tracked independently (spec.md §4.5 "deliver/ack").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct OrderKey(MessageId, OrderKind);

/// Accepts orders from the Evaluator, attaches a gas policy, and hands them to the Wallet,
/// enforcing the bounded in-flight set and the per-order retry cap (spec.md §4.6
/// "Submitter").
pub struct Dispatcher<P: EthereumProvider + ?Sized> {
    provider: Arc<P>,
    wallet: Wallet<P>,
    settings: ChainSettings,
    adapter: Arc<dyn AmbAdapter>,
    escrow_address: Address,
    attempts: HashMap<OrderKey, u32>,
    /// Nonce each currently-dispatched order is tracked under, so retries and confirmation
    /// polling can find their `PendingTx`.
    in_flight: HashMap<OrderKey, U256>,
}

impl<P: EthereumProvider + ?Sized> Dispatcher<P> {
    pub fn new(
        provider: Arc<P>,
        wallet: Wallet<P>,
        settings: ChainSettings,
        adapter: Arc<dyn AmbAdapter>,
        escrow_address: Address,
    ) -> Self {
        Self {
            provider,
            wallet,
            settings,
            adapter,
            escrow_address,
            attempts: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn wallet(&self) -> &Wallet<P> {
        &self.wallet
    }

    pub fn wallet_mut(&mut self) -> &mut Wallet<P> {
        &mut self.wallet
    }

    pub fn has_capacity(&self) -> bool {
        self.wallet.pending_count() < self.settings.max_pending_transactions
    }

    /// Builds calldata and gas policy for `order` against the current `state`, and hands it
    /// to the Wallet for signing and broadcast (spec.md §4.6 "accept orders, attach gas
    /// policy, hand to Wallet").
    pub async fn dispatch(&mut self, order: SubmitOrder, state: &RelayState) -> Result<(), SubmitterError> {
        if !self.has_capacity() {
            return Err(SubmitterError::PendingCapReached(self.settings.max_pending_transactions));
        }
        let key = OrderKey(order.mid, order.kind);
        let attempt = *self.attempts.get(&key).unwrap_or(&0);
        if attempt >= self.settings.max_tries {
            return Err(SubmitterError::MaxTriesExceeded(attempt, order.mid.to_string()));
        }

        let data = self.build_calldata(order.mid, order.kind, state)?;
        let (base_fee, suggested_priority) = self.provider.fee_history(1).await?;
        let gas_estimate = self
            .provider
            .estimate_gas(self.escrow_address, data.clone(), self.wallet.address())
            .await
            .unwrap_or_else(|_| fallback_gas_estimate(state, order.kind));
        let gas_price = gas_policy::compute_gas_price(base_fee, suggested_priority, attempt, None, &self.settings);
        let gas_limit = gas_policy::compute_gas_limit(gas_estimate, order.kind, &self.settings);

        // spec.md §4.7 "at balance < minOperationalBalance, refuse new submissions until
        // replenished" — checked against the worst-case fee for the transaction about to be
        // built, not the last-observed gas price, so a spike can't slip one more order through.
        let min_operational = Wallet::<P>::min_operational_balance(
            self.settings.max_pending_transactions,
            gas_price.max_fee(),
            gas_limit,
        );
        if !self.wallet.has_sufficient_balance(min_operational) {
            return Err(WalletError::InsufficientBalance.into());
        }

        let nonce = self
            .wallet
            .submit(order, self.escrow_address, data, gas_limit, gas_price)
            .await?;
        self.attempts.insert(key, attempt + 1);
        self.in_flight.insert(key, nonce);
        info!(?key, nonce = %nonce, "order dispatched to wallet");
        Ok(())
    }

    fn build_calldata(
        &self,
        mid: MessageId,
        kind: OrderKind,
        state: &RelayState,
    ) -> Result<ethers_core::types::Bytes, SubmitterError> {
        Ok(match kind {
            OrderKind::Delivery => {
                let payload = state.placed.as_ref().map(|p| p.payload.as_slice()).unwrap_or(&[]);
                self.adapter.encode_delivery(mid, payload)?
            }
            OrderKind::Ack => self.adapter.encode_ack(mid)?,
        })
    }

    /// A cheap gas estimate and current destination gas price for the Evaluator's
    /// profitability test (spec.md §4.5), ahead of (and independent from) the precise
    /// estimate `dispatch` re-derives when an order actually gets submitted.
    pub async fn estimate_for_evaluation(
        &self,
        mid: MessageId,
        kind: OrderKind,
        state: &RelayState,
    ) -> (U256, U256) {
        let Ok(data) = self.build_calldata(mid, kind, state) else {
            return (fallback_gas_estimate(state, kind), U256::zero());
        };
        let (base_fee, suggested_priority) = self.provider.fee_history(1).await.unwrap_or_default();
        let gas_estimate = self
            .provider
            .estimate_gas(self.escrow_address, data, self.wallet.address())
            .await
            .unwrap_or_else(|_| fallback_gas_estimate(state, kind));
        (gas_estimate, base_fee.saturating_add(suggested_priority))
    }

    /// Drops bookkeeping for an order that will be re-enqueued by the Evaluator next tick,
    /// per spec.md §4.6 "Dropped orders are re-enqueued by the Evaluator on the next tick
    /// (source of truth is the Store)" — the Dispatcher itself holds no order state beyond
    /// the attempt counter.
    pub fn drop_order(&mut self, mid: MessageId, kind: OrderKind) {
        self.in_flight.remove(&OrderKey(mid, kind));
    }

    pub fn attempts_so_far(&self, mid: MessageId, kind: OrderKind) -> u32 {
        *self.attempts.get(&OrderKey(mid, kind)).unwrap_or(&0)
    }

    pub fn nonce_for(&self, mid: MessageId, kind: OrderKind) -> Option<U256> {
        self.in_flight.get(&OrderKey(mid, kind)).copied()
    }
}

/// `maxGas* × 1.1` (spec.md §4.5 "fallback") when `eth_estimateGas` itself fails.
fn fallback_gas_estimate(state: &RelayState, kind: OrderKind) -> U256 {
    let max_gas = match (kind, &state.placed) {
        (OrderKind::Delivery, Some(p)) => p.max_gas_delivery,
        (OrderKind::Ack, Some(p)) => p.max_gas_ack,
        _ => U256::zero(),
    };
    max_gas.saturating_mul(U256::from(11)) / U256::from(10)
}
