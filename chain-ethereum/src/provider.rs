use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers_core::types::{
    Address, Block, Bytes, Filter, Log, TransactionReceipt, TxHash, H256, U256, U64,
};
use relay_core::{ChainCommunicationError, ChainResult};

use crate::metrics::EthereumProviderMetrics;

/// Everything the Getter, Submitter and Wallet need from an EVM RPC endpoint
/// (spec.md §6 "RPC"). A trait so tests can swap in a `mockall` mock the way the corpus's
/// `MockEvmProvider` does for `lander`'s Ethereum adapter.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait EthereumProvider: Send + Sync {
    async fn block_number(&self) -> ChainResult<u64>;

    async fn get_logs(&self, filter: Filter) -> ChainResult<Vec<Log>>;

    async fn get_transaction_count(&self, address: Address, pending: bool) -> ChainResult<U256>;

    async fn estimate_gas(&self, to: Address, data: Bytes, from: Address) -> ChainResult<U256>;

    /// `eth_feeHistory`-derived suggestion: `(base_fee_per_gas, suggested_priority_fee)`.
    async fn fee_history(&self, block_count: u64) -> ChainResult<(U256, U256)>;

    async fn get_block_base_fee(&self, block: u64) -> ChainResult<Option<U256>>;

    async fn send_raw_transaction(&self, raw: Bytes) -> ChainResult<TxHash>;

    async fn get_transaction_receipt(&self, hash: TxHash) -> ChainResult<Option<TransactionReceipt>>;

    async fn get_balance(&self, address: Address) -> ChainResult<U256>;

    fn chain_id(&self) -> u64;
}

/// Production implementation over `ethers::providers::Provider<Http>`.
pub struct RpcEthereumProvider {
    inner: Provider<Http>,
    chain_id: u64,
    chain_label: String,
    metrics: Option<EthereumProviderMetrics>,
}

impl RpcEthereumProvider {
    pub fn new(url: url::Url, chain_id: u64) -> Self {
        Self {
            inner: Provider::new(Http::new(url)),
            chain_id,
            chain_label: chain_id.to_string(),
            metrics: None,
        }
    }

    /// Attaches per-call RPC counters (spec.md §6 "Status endpoint" + SPEC_FULL.md §2.5),
    /// the same wrapping `ethers-prometheus` does for every provider method.
    pub fn with_metrics(mut self, metrics: EthereumProviderMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(&self, method: &str, ok: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record(&self.chain_label, method, ok);
        }
    }
}

fn map_err<E: std::fmt::Display>(e: E) -> ChainCommunicationError {
    ChainCommunicationError::ProviderError(e.to_string())
}

#[async_trait]
impl EthereumProvider for RpcEthereumProvider {
    async fn block_number(&self) -> ChainResult<u64> {
        let result = self
            .inner
            .get_block_number()
            .await
            .map(|n: U64| n.as_u64())
            .map_err(map_err);
        self.record("block_number", result.is_ok());
        result
    }

    async fn get_logs(&self, filter: Filter) -> ChainResult<Vec<Log>> {
        let result = self.inner.get_logs(&filter).await.map_err(map_err);
        self.record("get_logs", result.is_ok());
        result
    }

    async fn get_transaction_count(&self, address: Address, pending: bool) -> ChainResult<U256> {
        let block = if pending {
            ethers_core::types::BlockNumber::Pending
        } else {
            ethers_core::types::BlockNumber::Latest
        };
        let result = self
            .inner
            .get_transaction_count(address, Some(block.into()))
            .await
            .map_err(map_err);
        self.record("get_transaction_count", result.is_ok());
        result
    }

    async fn estimate_gas(&self, to: Address, data: Bytes, from: Address) -> ChainResult<U256> {
        let mut tx = ethers_core::types::transaction::eip2718::TypedTransaction::default();
        tx.set_to(to);
        tx.set_data(data);
        tx.set_from(from);
        let result = self.inner.estimate_gas(&tx, None).await.map_err(map_err);
        self.record("estimate_gas", result.is_ok());
        result
    }

    async fn fee_history(&self, block_count: u64) -> ChainResult<(U256, U256)> {
        let history = self
            .inner
            .fee_history(
                U256::from(block_count),
                ethers_core::types::BlockNumber::Latest,
                &[50.0],
            )
            .await
            .map_err(map_err);
        self.record("fee_history", history.is_ok());
        let history = history?;
        let base_fee = history
            .base_fee_per_gas
            .last()
            .copied()
            .unwrap_or_default();
        let priority_fee = history
            .reward
            .last()
            .and_then(|r| r.first())
            .copied()
            .unwrap_or_else(|| U256::from(1_500_000_000u64));
        Ok((base_fee, priority_fee))
    }

    async fn get_block_base_fee(&self, block: u64) -> ChainResult<Option<U256>> {
        let block: ChainResult<Option<Block<H256>>> = self.inner.get_block(block).await.map_err(map_err);
        self.record("get_block_base_fee", block.is_ok());
        Ok(block?.and_then(|b| b.base_fee_per_gas))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ChainResult<TxHash> {
        let pending = self
            .inner
            .send_raw_transaction(raw)
            .await
            .map_err(map_err);
        self.record("send_raw_transaction", pending.is_ok());
        Ok(pending?.tx_hash())
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> ChainResult<Option<TransactionReceipt>> {
        let result = self
            .inner
            .get_transaction_receipt(hash)
            .await
            .map_err(map_err);
        self.record("get_transaction_receipt", result.is_ok());
        result
    }

    async fn get_balance(&self, address: Address) -> ChainResult<U256> {
        let result = self.inner.get_balance(address, None).await.map_err(map_err);
        self.record("get_balance", result.is_ok());
        result
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}
