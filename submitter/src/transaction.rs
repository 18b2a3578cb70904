use std::time::Instant;

use chain_ethereum::GasPrice;
use ethers_core::types::{Address, Bytes, H256, U256};
use relay_core::SubmitOrder;

/// Per-order transaction state machine (spec.md §4.6 "State machine per order").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    New,
    Signed,
    Broadcast,
    Confirmed,
    /// Re-enters `Signed` with bumped fees and the same nonce (spec.md §4.6).
    Replaced,
    Failed(String),
}

/// One in-flight (or just-resolved) transaction the Wallet is tracking
/// (spec.md §3 "Wallet state").
#[derive(Debug, Clone)]
pub struct PendingTx {
    pub nonce: U256,
    pub order: SubmitOrder,
    /// Destination address and calldata the order was built from, kept around so a
    /// replacement or cancellation can re-sign at the same nonce without the Submitter
    /// re-deriving them.
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: U256,
    pub signed_bytes: Bytes,
    pub fee_policy: GasPrice,
    pub first_submitted: Instant,
    pub last_submitted: Instant,
    pub attempt: u32,
    pub status: TransactionStatus,
    pub tx_hash: Option<H256>,
    pub included_block: Option<u64>,
}

impl PendingTx {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nonce: U256,
        order: SubmitOrder,
        to: Address,
        data: Bytes,
        gas_limit: U256,
        signed_bytes: Bytes,
        fee_policy: GasPrice,
    ) -> Self {
        let now = Instant::now();
        Self {
            nonce,
            order,
            to,
            data,
            gas_limit,
            signed_bytes,
            fee_policy,
            first_submitted: now,
            last_submitted: now,
            attempt: 0,
            status: TransactionStatus::New,
            tx_hash: None,
            included_block: None,
        }
    }

    pub fn mark_broadcast(&mut self, tx_hash: H256) {
        self.status = TransactionStatus::Broadcast;
        self.tx_hash = Some(tx_hash);
        self.last_submitted = Instant::now();
    }

    pub fn mark_replaced(&mut self, signed_bytes: Bytes, fee_policy: GasPrice) {
        self.signed_bytes = signed_bytes;
        self.fee_policy = fee_policy;
        self.attempt += 1;
        self.status = TransactionStatus::Signed;
        self.last_submitted = Instant::now();
    }

    pub fn mark_confirmed(&mut self, block: u64) {
        self.status = TransactionStatus::Confirmed;
        self.included_block = Some(block);
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = TransactionStatus::Failed(reason.into());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TransactionStatus::Confirmed | TransactionStatus::Failed(_))
    }
}
