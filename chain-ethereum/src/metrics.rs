use prometheus::{IntCounterVec, Opts, Registry};

/// Per-chain RPC call counters, the same shape `ethers-prometheus` wraps every provider
/// method with: one vector keyed by `(chain, method, status)`.
#[derive(Clone)]
pub struct EthereumProviderMetrics {
    calls: IntCounterVec,
}

impl EthereumProviderMetrics {
    pub fn new(registry: &Registry, _chain: &str) -> prometheus::Result<Self> {
        let calls = IntCounterVec::new(
            Opts::new(
                "relayer_rpc_requests_total",
                "Number of RPC requests made to a chain's provider",
            ),
            &["chain", "method", "status"],
        )?;
        registry.register(Box::new(calls.clone()))?;
        Ok(Self { calls })
    }

    pub fn record(&self, chain: &str, method: &str, ok: bool) {
        let status = if ok { "ok" } else { "err" };
        self.calls.with_label_values(&[chain, method, status]).inc();
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn dummy_instance() -> Self {
        let registry = Registry::new();
        Self::new(&registry, "test").expect("dummy metrics registration")
    }
}
