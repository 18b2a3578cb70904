use std::cmp::min;
use std::sync::Arc;
use std::time::Duration;

use chain_ethereum::EthereumProvider;
use ethers_core::types::{Filter, H160};
use relay_core::{ChainResult, RawLog};
use tracing::{debug, instrument, warn};

/// Configuration for one chain's Getter (spec.md §4.1 / §6 configuration keys).
#[derive(Debug, Clone)]
pub struct GetterConfig {
    pub addresses: Vec<H160>,
    /// `blockDelay`: how far behind the chain head to read, to tolerate shallow reorgs.
    pub block_delay: u64,
    /// `interval`: sleep duration when the cursor has caught up to the (delayed) head.
    pub interval: Duration,
    /// `retryInterval`: base backoff unit on RPC error.
    pub retry_interval: Duration,
    /// `maxBlocks`: `None` means an unbounded window (only safe on archive nodes).
    pub max_blocks: Option<u64>,
    /// `startingBlock`: rewinds the cursor at startup if set.
    pub starting_block: Option<u64>,
    /// `stoppingBlock`: terminates the worker cleanly once the cursor passes it.
    pub stopping_block: Option<u64>,
}

/// Outcome of a single `tick()`.
#[derive(Debug)]
pub enum GetterTick {
    /// Logs observed in `[from, to]`, in ascending `(blockNumber, logIndex)` order, plus the
    /// new cursor to persist as the checkpoint (spec.md §4.1 step 6, "at-least-once").
    Logs {
        logs: Vec<RawLog>,
        new_cursor: u64,
    },
    /// The delayed chain head hasn't advanced past the cursor yet; caller should sleep
    /// `interval` (spec.md §4.1 step 1).
    Stalled,
    /// `stoppingBlock` reached; the worker should shut down cleanly.
    Stopped,
}

/// Block-range log fetcher with backpressure and reorg tolerance (spec.md §4.1).
pub struct Getter<P: EthereumProvider + ?Sized> {
    provider: Arc<P>,
    config: GetterConfig,
    cursor: u64,
}

impl<P: EthereumProvider + ?Sized> Getter<P> {
    pub fn new(provider: Arc<P>, config: GetterConfig, checkpoint: u64) -> Self {
        let cursor = config.starting_block.unwrap_or(checkpoint);
        Self {
            provider,
            config,
            cursor,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    #[instrument(skip(self), fields(cursor = self.cursor))]
    pub async fn tick(&mut self) -> ChainResult<GetterTick> {
        if let Some(stop) = self.config.stopping_block {
            if self.cursor > stop {
                return Ok(GetterTick::Stopped);
            }
        }

        let chain_head = fetch_block_number_with_backoff(&*self.provider, self.config.retry_interval).await?;
        let head = chain_head.saturating_sub(self.config.block_delay);

        if head < self.cursor {
            debug!(head, cursor = self.cursor, "getter stalled, waiting for chain head");
            return Ok(GetterTick::Stalled);
        }

        let upper = match self.config.max_blocks {
            Some(max_blocks) => min(head, self.cursor + max_blocks.saturating_sub(1)),
            None => head,
        };
        let upper = if let Some(stop) = self.config.stopping_block {
            min(upper, stop)
        } else {
            upper
        };

        let filter = Filter::new()
            .address(self.config.addresses.clone())
            .from_block(self.cursor)
            .to_block(upper);

        let logs = fetch_logs_with_backoff(&*self.provider, filter, self.config.retry_interval).await?;
        let mut raw_logs: Vec<RawLog> = logs
            .into_iter()
            .map(|log| RawLog {
                address: log.address,
                topics: log.topics,
                data: log.data,
                block_number: log.block_number.map(|b| b.as_u64()).unwrap_or(self.cursor),
                block_hash: log.block_hash.unwrap_or_default(),
                log_index: log.log_index.map(|i| i.as_u64()).unwrap_or(0),
                tx_hash: log.transaction_hash.unwrap_or_default(),
            })
            .collect();
        raw_logs.sort_by_key(|l| (l.block_number, l.log_index));

        let new_cursor = upper + 1;
        self.cursor = new_cursor;
        Ok(GetterTick::Logs {
            logs: raw_logs,
            new_cursor,
        })
    }
}

/// Exponential backoff capped at `retryInterval × 2^5` (spec.md §4.1 step 4). Retries
/// indefinitely on transient RPC errors — the Getter contract never gives up, it just keeps
/// the worker from making progress until the endpoint recovers.
async fn fetch_block_number_with_backoff<P: EthereumProvider + ?Sized>(
    provider: &P,
    retry_interval: Duration,
) -> ChainResult<u64> {
    with_backoff(retry_interval, || provider.block_number()).await
}

async fn fetch_logs_with_backoff<P: EthereumProvider + ?Sized>(
    provider: &P,
    filter: Filter,
    retry_interval: Duration,
) -> ChainResult<Vec<ethers_core::types::Log>> {
    with_backoff(retry_interval, || provider.get_logs(filter.clone())).await
}

async fn with_backoff<T, F, Fut>(retry_interval: Duration, mut f: F) -> ChainResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ChainResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let k = attempt.min(5);
                let delay = retry_interval * 2u32.pow(k);
                warn!(error = %e, attempt, ?delay, "RPC call failed, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use chain_ethereum::MockEthereumProvider;
    use ethers_core::types::Log;

    use super::*;

    fn base_config() -> GetterConfig {
        GetterConfig {
            addresses: vec![H160::zero()],
            block_delay: 0,
            interval: Duration::from_millis(1),
            retry_interval: Duration::from_millis(1),
            max_blocks: Some(10),
            starting_block: Some(0),
            stopping_block: None,
        }
    }

    #[tokio::test]
    async fn max_blocks_one_still_makes_forward_progress() {
        let mut provider = MockEthereumProvider::new();
        provider.expect_block_number().returning(|| Ok(100));
        provider.expect_get_logs().returning(|_| Ok(vec![]));
        let mut config = base_config();
        config.max_blocks = Some(1);

        let mut getter = Getter::new(Arc::new(provider), config, 0);
        match getter.tick().await.unwrap() {
            GetterTick::Logs { new_cursor, .. } => assert_eq!(new_cursor, 1),
            other => panic!("expected progress, got {other:?}"),
        }
        assert_eq!(getter.cursor(), 1);
    }

    #[tokio::test]
    async fn block_delay_at_or_above_head_stalls_without_error() {
        let mut provider = MockEthereumProvider::new();
        provider.expect_block_number().returning(|| Ok(5));
        let mut config = base_config();
        config.block_delay = 10;
        config.starting_block = Some(0);

        let mut getter = Getter::new(Arc::new(provider), config, 0);
        match getter.tick().await.unwrap() {
            GetterTick::Stalled => {}
            other => panic!("expected stall, got {other:?}"),
        }
        assert_eq!(getter.cursor(), 0, "cursor must not advance while stalled");
    }

    #[tokio::test]
    async fn stopping_block_terminates_cleanly() {
        let provider = MockEthereumProvider::new();
        let mut config = base_config();
        config.stopping_block = Some(5);
        config.starting_block = Some(6);

        let mut getter = Getter::new(Arc::new(provider), config, 0);
        match getter.tick().await.unwrap() {
            GetterTick::Stopped => {}
            other => panic!("expected stop, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_error_retries_with_capped_backoff_then_succeeds() {
        let mut provider = MockEthereumProvider::new();
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = calls.clone();
        provider.expect_block_number().returning(move || {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(relay_core::ChainCommunicationError::ProviderError("boom".into()))
            } else {
                Ok(50)
            }
        });
        provider.expect_get_logs().returning(|_| Ok(vec![] as Vec<Log>));

        let mut config = base_config();
        config.retry_interval = Duration::from_millis(1);
        let mut getter = Getter::new(Arc::new(provider), config, 0);

        let result = getter.tick().await.unwrap();
        assert!(matches!(result, GetterTick::Logs { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn logs_are_emitted_in_ascending_block_and_log_index_order() {
        let mut provider = MockEthereumProvider::new();
        provider.expect_block_number().returning(|| Ok(100));
        provider.expect_get_logs().returning(|_| {
            Ok(vec![
                make_log(5, 1),
                make_log(3, 0),
                make_log(3, 2),
                make_log(3, 1),
            ])
        });
        let mut getter = Getter::new(Arc::new(provider), base_config(), 0);
        match getter.tick().await.unwrap() {
            GetterTick::Logs { logs, .. } => {
                let ordered: Vec<(u64, u64)> = logs.iter().map(|l| (l.block_number, l.log_index)).collect();
                assert_eq!(ordered, vec![(3, 0), (3, 1), (3, 2), (5, 1)]);
            }
            other => panic!("expected logs, got {other:?}"),
        }
    }

    fn make_log(block_number: u64, log_index: u64) -> Log {
        let mut log = Log::default();
        log.block_number = Some(block_number.into());
        log.log_index = Some(log_index.into());
        log
    }
}
