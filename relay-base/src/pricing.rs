use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers_core::types::U256;
use relay_core::{ChainCommunicationError, ChainId, ChainResult};
use tokio::sync::RwLock;
use tracing::warn;

/// A single unit of gas, priced in a chain's native denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GasUnit {
    Native,
}

/// Upstream price feed. Implementors fetch a fresh value; the caching/fallback behavior in
/// spec.md §4.4 is layered on top by [`CachedPricing`], not duplicated by every feed.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch(&self, chain: ChainId, unit: GasUnit) -> ChainResult<U256>;
}

struct CacheEntry {
    value: U256,
    fetched_at: std::time::Instant,
}

/// Pricing oracle (spec.md §4.4): caches `priceOf(chainId, gasUnit)` for `cacheDuration`,
/// falls through to the last-known value on provider failure, and reports unavailability
/// only after `maxTries` consecutive failures.
pub struct CachedPricing {
    feed: Arc<dyn PriceFeed>,
    cache_duration: Duration,
    max_tries: u32,
    cache: RwLock<HashMap<(ChainId, GasUnit), CacheEntry>>,
    consecutive_failures: RwLock<HashMap<(ChainId, GasUnit), u32>>,
}

impl CachedPricing {
    pub fn new(feed: Arc<dyn PriceFeed>, cache_duration: Duration, max_tries: u32) -> Self {
        Self {
            feed,
            cache_duration,
            max_tries,
            cache: RwLock::new(HashMap::new()),
            consecutive_failures: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `Ok(price)` or `Err` only once pricing has been unavailable for `maxTries`
    /// consecutive attempts (spec.md §4.4 "the Evaluator treats pricing as unavailable").
    pub async fn price_of(&self, chain: ChainId, unit: GasUnit) -> ChainResult<U256> {
        let key = (chain, unit);

        match self.feed.fetch(chain, unit).await {
            Ok(price) => {
                self.consecutive_failures.write().await.remove(&key);
                self.cache.write().await.insert(
                    key,
                    CacheEntry {
                        value: price,
                        fetched_at: std::time::Instant::now(),
                    },
                );
                Ok(price)
            }
            Err(e) => {
                let mut failures = self.consecutive_failures.write().await;
                let count = failures.entry(key).or_insert(0);
                *count += 1;
                warn!(chain = %chain, attempt = *count, "price feed failure, falling back to cache");

                if let Some(entry) = self.cache.read().await.get(&key) {
                    if *count < self.max_tries {
                        return Ok(entry.value);
                    }
                }
                Err(e)
            }
        }
    }

    /// Whether a cached value less than `cacheDuration` old exists, letting callers skip the
    /// network round trip entirely when it's still fresh.
    pub async fn cached_if_fresh(&self, chain: ChainId, unit: GasUnit) -> Option<U256> {
        let cache = self.cache.read().await;
        cache.get(&(chain, unit)).and_then(|entry| {
            if entry.fetched_at.elapsed() < self.cache_duration {
                Some(entry.value)
            } else {
                None
            }
        })
    }
}

/// A feed returning a fixed price, used in tests and as a stand-in when no external price
/// source is configured.
pub struct StaticPriceFeed {
    price: U256,
}

impl StaticPriceFeed {
    pub fn new(price: U256) -> Self {
        Self { price }
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn fetch(&self, _chain: ChainId, _unit: GasUnit) -> ChainResult<U256> {
        Ok(self.price)
    }
}

/// A feed that always fails, used to test the fallback/unavailability behavior.
pub struct FailingPriceFeed;

#[async_trait]
impl PriceFeed for FailingPriceFeed {
    async fn fetch(&self, _chain: ChainId, _unit: GasUnit) -> ChainResult<U256> {
        Err(ChainCommunicationError::Custom("price feed unreachable".into()))
    }
}

/// Fetches native-token USD prices from a CoinGecko-shaped HTTP endpoint
/// (`GET {base}/simple/price?ids=<symbol>&vs_currencies=usd`), the same API the corpus's
/// `abacus`/`relayer` gas payment policies poll. Which symbol corresponds to which chain is
/// deployment data, not protocol data, so it's supplied by the caller rather than hardcoded
/// per chain.
///
/// Prices are represented as a fixed-point integer with 1e6 precision (micro-USD) so the
/// Evaluator's profitability test never needs floating point.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    base_url: url::Url,
    symbols: HashMap<ChainId, String>,
}

const PRICE_FIXED_POINT_PRECISION: f64 = 1_000_000.0;

impl HttpPriceFeed {
    pub fn new(base_url: url::Url, symbols: HashMap<ChainId, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            symbols,
        }
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn fetch(&self, chain: ChainId, _unit: GasUnit) -> ChainResult<U256> {
        let symbol = self
            .symbols
            .get(&chain)
            .ok_or_else(|| ChainCommunicationError::Custom(format!("no price symbol configured for chain {chain}")))?;

        let mut url = self
            .base_url
            .join("simple/price")
            .map_err(|e| ChainCommunicationError::Custom(e.to_string()))?;
        url.query_pairs_mut().append_pair("ids", symbol).append_pair("vs_currencies", "usd");

        let map_err = |e: reqwest::Error| ChainCommunicationError::ProviderError(e.to_string());
        let body: serde_json::Value = self.client.get(url).send().await.map_err(map_err)?.json().await.map_err(map_err)?;

        let usd = body
            .get(symbol)
            .and_then(|v| v.get("usd"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ChainCommunicationError::Custom(format!("price response missing usd quote for {symbol}")))?;

        Ok(U256::from((usd * PRICE_FIXED_POINT_PRECISION).round() as u128))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_last_known_value_before_max_tries() {
        let good = Arc::new(StaticPriceFeed::new(U256::from(42)));
        let pricing = CachedPricing::new(good.clone(), Duration::from_secs(60), 3);
        let first = pricing.price_of(ChainId(1), GasUnit::Native).await.unwrap();
        assert_eq!(first, U256::from(42));

        // Swap in a failing feed but reuse the same cache by constructing a pricing oracle
        // that shares state conceptually: exercise the fallback path directly.
        let failing = Arc::new(FailingPriceFeed);
        let pricing2 = CachedPricing::new(failing, Duration::from_secs(60), 3);
        // Prime its cache manually by calling through a working feed first.
        pricing2
            .cache
            .write()
            .await
            .insert(
                (ChainId(1), GasUnit::Native),
                CacheEntry {
                    value: U256::from(99),
                    fetched_at: std::time::Instant::now(),
                },
            );
        let price = pricing2.price_of(ChainId(1), GasUnit::Native).await.unwrap();
        assert_eq!(price, U256::from(99));
    }

    #[tokio::test]
    async fn unavailable_after_max_tries_consecutive_failures() {
        let failing = Arc::new(FailingPriceFeed);
        let pricing = CachedPricing::new(failing, Duration::from_secs(60), 2);
        pricing.cache.write().await.insert(
            (ChainId(1), GasUnit::Native),
            CacheEntry {
                value: U256::from(1),
                fetched_at: std::time::Instant::now(),
            },
        );

        assert!(pricing.price_of(ChainId(1), GasUnit::Native).await.is_ok());
        // Second consecutive failure reaches max_tries -> unavailable.
        assert!(pricing.price_of(ChainId(1), GasUnit::Native).await.is_err());
    }
}
