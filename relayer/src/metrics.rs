use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

/// Per-chain counters and gauges exposed on `/metrics` (SPEC_FULL.md §2.5), mirroring the
/// teacher's `ops_prepared`/`ops_submitted` naming convention.
pub struct RelayerMetrics {
    registry: Registry,
    pub orders_evaluated: IntCounterVec,
    pub orders_submitted: IntCounterVec,
    pub confirmations: IntCounterVec,
    pub pending_transactions: IntGaugeVec,
    pub wallet_balance: IntGaugeVec,
}

impl RelayerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let orders_evaluated = IntCounterVec::new(
            Opts::new("relayer_orders_evaluated_total", "Orders the Evaluator judged profitable"),
            &["chain", "kind"],
        )?;
        let orders_submitted = IntCounterVec::new(
            Opts::new("relayer_orders_submitted_total", "Orders handed to the Wallet for broadcast"),
            &["chain", "kind"],
        )?;
        let confirmations = IntCounterVec::new(
            Opts::new("relayer_confirmations_total", "Transactions observed as confirmed"),
            &["chain"],
        )?;
        let pending_transactions = IntGaugeVec::new(
            Opts::new("relayer_pending_transactions", "Transactions awaiting confirmation"),
            &["chain"],
        )?;
        let wallet_balance = IntGaugeVec::new(
            Opts::new("relayer_wallet_balance_wei", "Last-observed wallet balance, in wei"),
            &["chain"],
        )?;

        registry.register(Box::new(orders_evaluated.clone()))?;
        registry.register(Box::new(orders_submitted.clone()))?;
        registry.register(Box::new(confirmations.clone()))?;
        registry.register(Box::new(pending_transactions.clone()))?;
        registry.register(Box::new(wallet_balance.clone()))?;

        Ok(Self {
            registry,
            orders_evaluated,
            orders_submitted,
            confirmations,
            pending_transactions,
            wallet_balance,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        use prometheus::Encoder;
        let mut buf = Vec::with_capacity(1024 * 16);
        prometheus::TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(buf)
    }
}
