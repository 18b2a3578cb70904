use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chain_ethereum::{gas, EthereumProvider, GasPrice};
use ethers_core::types::{Address, Bytes, TxHash, U256};
use ethers_signers::LocalWallet;
use relay_core::{ChainId, SubmitOrder};
use tracing::{info, instrument, warn};

use crate::error::WalletError;
use crate::nonce::NonceManager;
use crate::transaction::PendingTx;

/// What a confirmed order leaves behind for the caller to merge back into the Store
/// (spec.md §4.7 "The receipt is merged back into the Store").
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub order: SubmitOrder,
    pub gas_cost: U256,
}

/// Owns the signer and nonce sequence for one chain, and tracks every in-flight transaction
/// through broadcast, confirmation and replacement (spec.md §4.7 "Wallet").
pub struct Wallet<P: EthereumProvider + ?Sized> {
    provider: Arc<P>,
    signer: LocalWallet,
    address: Address,
    chain_id: ChainId,
    nonce_manager: NonceManager,
    pending: HashMap<U256, PendingTx>,
    balance: U256,
    low_balance_warning: Option<U256>,
    /// whether the last balance check already emitted the low-balance warning, so we only
    /// warn once per crossing (spec.md §8 "emits the warning exactly once per crossing").
    low_balance_warned: bool,
    confirmations: u64,
    confirmation_timeout: Duration,
}

impl<P: EthereumProvider + ?Sized> Wallet<P> {
    pub async fn new(
        provider: Arc<P>,
        signer: LocalWallet,
        chain_id: ChainId,
        low_balance_warning: Option<U256>,
        confirmations: u64,
        confirmation_timeout: Duration,
    ) -> Result<Self, WalletError> {
        use ethers_signers::Signer as _;
        let address = signer.address();
        let next_nonce = provider.get_transaction_count(address, true).await?;
        let balance = provider.get_balance(address).await?;
        Ok(Self {
            provider,
            signer,
            address,
            chain_id,
            nonce_manager: NonceManager::new(next_nonce),
            pending: HashMap::new(),
            balance,
            low_balance_warning,
            low_balance_warned: false,
            confirmations,
            confirmation_timeout,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Minimum balance below which new submissions are refused
    /// (spec.md §4.7 "Balance watchdog"): `maxPendingTransactions × worst-case-fee × gasLimit`.
    pub fn min_operational_balance(max_pending: usize, worst_case_fee: U256, gas_limit: U256) -> U256 {
        worst_case_fee.saturating_mul(gas_limit) * U256::from(max_pending as u64)
    }

    /// Refreshes `balance` and emits the low-balance warning on the transition into the
    /// warning band, not on every tick already below it.
    pub async fn refresh_balance(&mut self) -> Result<U256, WalletError> {
        self.balance = self.provider.get_balance(self.address).await?;
        let below_warning = self
            .low_balance_warning
            .map(|threshold| self.balance < threshold)
            .unwrap_or(false);
        if below_warning && !self.low_balance_warned {
            warn!(chain = %self.chain_id, balance = %self.balance, "wallet balance below low-balance warning threshold");
            self.low_balance_warned = true;
        } else if !below_warning {
            self.low_balance_warned = false;
        }
        Ok(self.balance)
    }

    pub fn balance(&self) -> U256 {
        self.balance
    }

    pub fn has_sufficient_balance(&self, min_operational: U256) -> bool {
        self.balance >= min_operational
    }

    /// Signs, assigns a nonce and broadcasts a new transaction for `order`
    /// (spec.md §4.7 "submit").
    #[instrument(skip(self, data), fields(chain = %self.chain_id, mid = %order.mid))]
    pub async fn submit(
        &mut self,
        order: SubmitOrder,
        to: Address,
        data: Bytes,
        gas_limit: U256,
        gas_price: GasPrice,
    ) -> Result<U256, WalletError> {
        let nonce = self.nonce_manager.assign_next_nonce();
        let tx = gas::build_eip1559_tx(to, data.clone(), U256::zero(), self.chain_id.0 as u64, nonce, gas_limit, gas_price)?;
        let signed = gas::sign_and_encode(&tx, &self.signer).await?;

        let mut pending = PendingTx::new(nonce, order, to, data, gas_limit, signed.clone(), gas_price);
        let tx_hash = self.provider.send_raw_transaction(signed).await?;
        pending.mark_broadcast(tx_hash);
        self.pending.insert(nonce, pending);
        info!(nonce = %nonce, tx_hash = %tx_hash, "broadcast transaction");
        Ok(nonce)
    }

    /// Re-signs and rebroadcasts the transaction at `nonce` with a bumped fee
    /// (spec.md §4.7 "Replacement": at least a 12.5% bump on both fee fields).
    #[instrument(skip(self), fields(chain = %self.chain_id))]
    pub async fn replace(&mut self, nonce: U256) -> Result<(), WalletError> {
        let current = self
            .pending
            .get(&nonce)
            .ok_or(WalletError::UntrackedNonce(nonce))?
            .clone();
        let bumped_price = current.fee_policy.at_least_bumped_over(1, 8);
        let tx = gas::build_eip1559_tx(
            current.to,
            current.data.clone(),
            U256::zero(),
            self.chain_id.0 as u64,
            nonce,
            current.gas_limit,
            bumped_price,
        )?;
        let signed = gas::sign_and_encode(&tx, &self.signer).await?;
        let tx_hash = self.provider.send_raw_transaction(signed.clone()).await?;

        let entry = self.pending.get_mut(&nonce).ok_or(WalletError::UntrackedNonce(nonce))?;
        entry.mark_replaced(signed, bumped_price);
        entry.mark_broadcast(tx_hash);
        Ok(())
    }

    /// Cancels a persistently stalled transaction by self-sending zero value at the same
    /// nonce with an aggressive fee bump, so the blocked nonce clears without ever needing the
    /// original payload to land (spec.md §4.7 "cancel-by-self-send after persistent stall").
    #[instrument(skip(self), fields(chain = %self.chain_id))]
    pub async fn cancel(&mut self, nonce: U256) -> Result<(), WalletError> {
        let current = self
            .pending
            .get(&nonce)
            .ok_or(WalletError::UntrackedNonce(nonce))?
            .clone();
        let bumped_price = current.fee_policy.bumped(2, 1);
        let tx = gas::build_eip1559_tx(
            self.address,
            Bytes::default(),
            U256::zero(),
            self.chain_id.0 as u64,
            nonce,
            U256::from(21_000),
            bumped_price,
        )?;
        let signed = gas::sign_and_encode(&tx, &self.signer).await?;
        let tx_hash = self.provider.send_raw_transaction(signed.clone()).await?;

        let entry = self.pending.get_mut(&nonce).ok_or(WalletError::UntrackedNonce(nonce))?;
        entry.mark_replaced(signed, bumped_price);
        entry.mark_broadcast(tx_hash);
        Ok(())
    }

    /// Polls the receipt for `nonce` and, once it has enough confirmations, marks the
    /// transaction confirmed and computes the gas actually spent
    /// (spec.md §4.7 "`currentBlock − txBlock + 1 ≥ confirmations`", "The receipt is merged
    /// back into the Store"). The caller is responsible for writing the returned
    /// [`Confirmation`] into the Store and releasing the Submitter's tracking for the order.
    pub async fn poll_confirmation(&mut self, nonce: U256) -> Result<Option<Confirmation>, WalletError> {
        let tx_hash = match self.pending.get(&nonce).and_then(|p| p.tx_hash) {
            Some(h) => h,
            None => return Ok(None),
        };
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        let Some(receipt) = receipt else {
            self.check_timeout(nonce).await?;
            return Ok(None);
        };
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };
        let current_block = self.provider.block_number().await?;
        let confirmations = current_block.saturating_sub(block_number.as_u64()) + 1;
        if confirmations >= self.confirmations {
            let entry = self.pending.get_mut(&nonce).ok_or(WalletError::UntrackedNonce(nonce))?;
            entry.mark_confirmed(block_number.as_u64());
            let gas_used = receipt.gas_used.unwrap_or_default();
            let effective_price = receipt.effective_gas_price.unwrap_or_else(|| entry.fee_policy.max_fee());
            let confirmation = Confirmation {
                order: entry.order.clone(),
                gas_cost: gas_used.saturating_mul(effective_price),
            };
            self.nonce_manager.finalize(nonce);
            return Ok(Some(confirmation));
        }
        Ok(None)
    }

    /// On timeout since the last broadcast, rebroadcasts with a bumped fee at the same nonce;
    /// after three such rounds treats the nonce as persistently stalled and cancels it by
    /// self-send (spec.md §4.7 "Nonce discipline").
    async fn check_timeout(&mut self, nonce: U256) -> Result<(), WalletError> {
        let Some(entry) = self.pending.get(&nonce) else {
            return Ok(());
        };
        if entry.last_submitted.elapsed() <= self.confirmation_timeout {
            return Ok(());
        }
        if entry.attempt < 3 {
            self.replace(nonce).await
        } else {
            self.cancel(nonce).await?;
            let entry = self.pending.get_mut(&nonce).ok_or(WalletError::UntrackedNonce(nonce))?;
            entry.mark_failed("persistent confirmation stall, cancelled by self-send");
            self.nonce_manager.finalize(nonce);
            Err(WalletError::ConfirmationTimeout(self.confirmation_timeout))
        }
    }

    pub fn get_pending(&self, nonce: U256) -> Option<&PendingTx> {
        self.pending.get(&nonce)
    }

    /// The lowest in-flight nonce, i.e. the one blocking every higher nonce from confirming if
    /// it is itself stalled (spec.md §4.7).
    pub fn lowest_in_flight_nonce(&self) -> Option<U256> {
        self.nonce_manager.lowest_assigned()
    }

    pub fn remove_terminal(&mut self, nonce: U256) -> Option<PendingTx> {
        self.pending.remove(&nonce)
    }

    pub fn elapsed_since_last_submission(&self, nonce: U256) -> Option<Duration> {
        self.pending.get(&nonce).map(|p| p.last_submitted.elapsed())
    }

    pub fn broadcast_tx_hash(&self, nonce: U256) -> Option<TxHash> {
        self.pending.get(&nonce).and_then(|p| p.tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use chain_ethereum::MockEthereumProvider;
    use ethers_core::types::{TransactionReceipt, H256, U64};
    use relay_core::{EventPosition, MessageId, OrderKind};

    use crate::transaction::TransactionStatus;

    use super::*;

    fn signer() -> LocalWallet {
        "0x0000000000000000000000000000000000000000000000000000000000000001"
            .parse()
            .unwrap()
    }

    fn order() -> SubmitOrder {
        SubmitOrder::new(
            MessageId(H256::random()),
            OrderKind::Delivery,
            ChainId(1),
            EventPosition::new(1, H256::random(), 0, H256::random()),
        )
    }

    #[tokio::test]
    async fn submit_assigns_contiguous_nonces_across_orders() {
        let mut provider = MockEthereumProvider::new();
        provider.expect_get_transaction_count().returning(|_, _| Ok(U256::from(7)));
        provider.expect_get_balance().returning(|_| Ok(U256::from(u64::MAX)));
        provider
            .expect_send_raw_transaction()
            .returning(|_| Ok(H256::random()));
        provider.expect_chain_id().returning(|| 1);

        let mut wallet = Wallet::new(
            Arc::new(provider),
            signer(),
            ChainId(1),
            None,
            1,
            Duration::from_secs(600),
        )
        .await
        .unwrap();

        let n0 = wallet
            .submit(order(), Address::zero(), Bytes::default(), U256::from(100_000), GasPrice::Eip1559 {
                max_fee: U256::from(10),
                max_priority_fee: U256::from(1),
            })
            .await
            .unwrap();
        let n1 = wallet
            .submit(order(), Address::zero(), Bytes::default(), U256::from(100_000), GasPrice::Eip1559 {
                max_fee: U256::from(10),
                max_priority_fee: U256::from(1),
            })
            .await
            .unwrap();

        assert_eq!(n0, U256::from(7));
        assert_eq!(n1, U256::from(8));
        assert_eq!(wallet.pending_count(), 2);
    }

    #[tokio::test]
    async fn low_balance_warning_fires_once_per_crossing() {
        let mut provider = MockEthereumProvider::new();
        provider.expect_get_transaction_count().returning(|_, _| Ok(U256::zero()));
        let mut call = 0u32;
        provider.expect_get_balance().returning(move |_| {
            call += 1;
            // starts above the threshold, then drops below, then rises back above.
            Ok(match call {
                1 => U256::from(100),
                2 => U256::from(5),
                3 => U256::from(5),
                _ => U256::from(100),
            })
        });

        let mut wallet = Wallet::new(
            Arc::new(provider),
            signer(),
            ChainId(1),
            Some(U256::from(10)),
            1,
            Duration::from_secs(600),
        )
        .await
        .unwrap();

        wallet.refresh_balance().await.unwrap();
        assert!(!wallet.low_balance_warned);
        wallet.refresh_balance().await.unwrap();
        assert!(wallet.low_balance_warned);
        wallet.refresh_balance().await.unwrap();
        assert!(wallet.low_balance_warned, "still below threshold, stays warned");
        wallet.refresh_balance().await.unwrap();
        assert!(!wallet.low_balance_warned, "recovered above threshold, clears");
    }

    #[tokio::test]
    async fn poll_confirmation_waits_for_required_confirmation_depth() {
        let mut provider = MockEthereumProvider::new();
        provider.expect_get_transaction_count().returning(|_, _| Ok(U256::zero()));
        provider.expect_get_balance().returning(|_| Ok(U256::from(u64::MAX)));
        let tx_hash = H256::random();
        provider
            .expect_send_raw_transaction()
            .returning(move |_| Ok(tx_hash));
        provider.expect_get_transaction_receipt().returning(move |_| {
            let mut receipt = TransactionReceipt::default();
            receipt.block_number = Some(U64::from(10));
            Ok(Some(receipt))
        });
        provider.expect_block_number().returning(|| Ok(10));

        let mut wallet = Wallet::new(
            Arc::new(provider),
            signer(),
            ChainId(1),
            None,
            3,
            Duration::from_secs(600),
        )
        .await
        .unwrap();

        let nonce = wallet
            .submit(order(), Address::zero(), Bytes::default(), U256::from(21_000), GasPrice::Eip1559 {
                max_fee: U256::from(10),
                max_priority_fee: U256::from(1),
            })
            .await
            .unwrap();

        // Only 1 confirmation so far (block 10, current 10): not enough for confirmations=3.
        assert!(wallet.poll_confirmation(nonce).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn poll_confirmation_computes_gas_cost_from_receipt() {
        let mut provider = MockEthereumProvider::new();
        provider.expect_get_transaction_count().returning(|_, _| Ok(U256::zero()));
        provider.expect_get_balance().returning(|_| Ok(U256::from(u64::MAX)));
        let tx_hash = H256::random();
        provider
            .expect_send_raw_transaction()
            .returning(move |_| Ok(tx_hash));
        provider.expect_get_transaction_receipt().returning(move |_| {
            let mut receipt = TransactionReceipt::default();
            receipt.block_number = Some(U64::from(10));
            receipt.gas_used = Some(U256::from(21_000));
            receipt.effective_gas_price = Some(U256::from(7));
            Ok(Some(receipt))
        });
        provider.expect_block_number().returning(|| Ok(10));

        let mut wallet = Wallet::new(Arc::new(provider), signer(), ChainId(1), None, 1, Duration::from_secs(600))
            .await
            .unwrap();

        let submitted = order();
        let mid = submitted.mid;
        let nonce = wallet
            .submit(
                submitted,
                Address::zero(),
                Bytes::default(),
                U256::from(21_000),
                GasPrice::Eip1559 {
                    max_fee: U256::from(10),
                    max_priority_fee: U256::from(1),
                },
            )
            .await
            .unwrap();

        let confirmation = wallet.poll_confirmation(nonce).await.unwrap().unwrap();
        assert_eq!(confirmation.gas_cost, U256::from(21_000 * 7));
        assert_eq!(confirmation.order.mid, mid);
    }

    #[tokio::test]
    async fn poll_confirmation_rebroadcasts_with_bumped_fee_after_timeout() {
        let mut provider = MockEthereumProvider::new();
        provider.expect_get_transaction_count().returning(|_, _| Ok(U256::zero()));
        provider.expect_get_balance().returning(|_| Ok(U256::from(u64::MAX)));
        provider
            .expect_send_raw_transaction()
            .returning(|_| Ok(H256::random()));
        provider.expect_get_transaction_receipt().returning(|_| Ok(None));

        let mut wallet = Wallet::new(Arc::new(provider), signer(), ChainId(1), None, 1, Duration::from_millis(1))
            .await
            .unwrap();

        let nonce = wallet
            .submit(
                order(),
                Address::zero(),
                Bytes::default(),
                U256::from(21_000),
                GasPrice::Eip1559 { max_fee: U256::from(10), max_priority_fee: U256::from(1) },
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(wallet.poll_confirmation(nonce).await.unwrap().is_none());

        let entry = wallet.get_pending(nonce).unwrap();
        assert_eq!(entry.attempt, 1, "first timeout rebroadcasts with a bumped fee");
        assert_eq!(entry.status, TransactionStatus::Broadcast, "replace re-enters Signed then is rebroadcast, not Failed");
        let GasPrice::Eip1559 { max_fee, .. } = entry.fee_policy else { panic!("expected eip1559") };
        assert!(max_fee > U256::from(10), "replacement must bump the fee, not resend the original");
    }

    #[tokio::test]
    async fn persistent_stall_cancels_by_self_send_after_three_replacements() {
        let mut provider = MockEthereumProvider::new();
        provider.expect_get_transaction_count().returning(|_, _| Ok(U256::zero()));
        provider.expect_get_balance().returning(|_| Ok(U256::from(u64::MAX)));
        provider
            .expect_send_raw_transaction()
            .returning(|_| Ok(H256::random()));
        provider.expect_get_transaction_receipt().returning(|_| Ok(None));

        let mut wallet = Wallet::new(Arc::new(provider), signer(), ChainId(1), None, 1, Duration::from_millis(1))
            .await
            .unwrap();

        let nonce = wallet
            .submit(
                order(),
                Address::zero(),
                Bytes::default(),
                U256::from(21_000),
                GasPrice::Eip1559 { max_fee: U256::from(10), max_priority_fee: U256::from(1) },
            )
            .await
            .unwrap();

        // Three timeouts just rebroadcast with a bumped fee.
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(wallet.poll_confirmation(nonce).await.unwrap().is_none());
        }

        // The fourth finds the nonce persistently stalled: cancel by self-send, terminal.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let err = wallet.poll_confirmation(nonce).await.unwrap_err();
        assert!(matches!(err, WalletError::ConfirmationTimeout(_)));

        let entry = wallet.get_pending(nonce).unwrap();
        assert!(entry.is_terminal());
        assert!(matches!(entry.status, TransactionStatus::Failed(_)));
        assert!(!wallet.nonce_manager.is_assigned(nonce), "stalled nonce must be released from tracking");
    }
}
