use chain_ethereum::GasPrice;
use ethers_core::types::U256;
use relay_base::ChainSettings;
use relay_core::OrderKind;

/// Convert a `U256` to `f64` for the adjustment-factor arithmetic below. Gas prices and
/// limits live comfortably inside `f64`'s 53-bit mantissa (wei-denominated fees on any real
/// chain are far below 2^53); the 256-bit precision requirement in spec.md §8 applies to the
/// Store round-trip, not to this fee math.
fn to_f64(v: U256) -> f64 {
    v.as_u128() as f64
}

fn from_f64(v: f64) -> U256 {
    U256::from(v.max(0.0).round() as u128)
}

/// `maxFeePerGas` per spec.md §4.6: the configured flat value if present, otherwise
/// `baseFee × (1 + gasPriceAdjustmentFactor) × (1 + priorityAdjustmentFactor^attempt)`,
/// capped by `maxAllowedGasPrice`.
pub fn compute_max_fee_per_gas(base_fee: U256, attempt: u32, settings: &ChainSettings) -> U256 {
    let computed = if let Some(configured) = settings.max_fee_per_gas {
        configured
    } else {
        let gas_price_adj = settings.gas_price_adjustment_factor.unwrap_or(0.0);
        let priority_adj = settings.priority_adjustment_factor.unwrap_or(0.0);
        let multiplier = (1.0 + gas_price_adj) * (1.0 + priority_adj.powi(attempt as i32));
        from_f64(to_f64(base_fee) * multiplier)
    };
    match settings.max_allowed_gas_price {
        Some(cap) => computed.min(cap),
        None => computed,
    }
}

/// `maxPriorityFeePerGas` per spec.md §4.6:
/// `max(suggestedPriority × maxPriorityFeeAdjustmentFactor, lastAttemptPriority × 1.125)`,
/// capped by `maxAllowedPriorityFeePerGas`. 1.125 is the EVM replacement floor.
pub fn compute_max_priority_fee_per_gas(
    suggested_priority: U256,
    last_attempt_priority: Option<U256>,
    settings: &ChainSettings,
) -> U256 {
    let adj = settings.max_priority_fee_adjustment_factor.unwrap_or(1.0);
    let from_suggestion = from_f64(to_f64(suggested_priority) * adj);
    let from_last_attempt = last_attempt_priority
        .map(|p| from_f64(to_f64(p) * 1.125))
        .unwrap_or(U256::zero());
    let computed = from_suggestion.max(from_last_attempt);
    match settings.max_allowed_priority_fee_per_gas {
        Some(cap) => computed.min(cap),
        None => computed,
    }
}

/// Full gas policy for one submission attempt (spec.md §4.6 "Gas policy per order").
pub fn compute_gas_price(
    base_fee: U256,
    suggested_priority: U256,
    attempt: u32,
    last_attempt_priority: Option<U256>,
    settings: &ChainSettings,
) -> GasPrice {
    GasPrice::Eip1559 {
        max_fee: compute_max_fee_per_gas(base_fee, attempt, settings),
        max_priority_fee: compute_max_priority_fee_per_gas(suggested_priority, last_attempt_priority, settings),
    }
}

/// `gasLimit = gasEstimate × (1 + gasLimitBuffer[orderKind] ?? gasLimitBuffer.default)`
/// (spec.md §4.6).
pub fn compute_gas_limit(gas_estimate: U256, kind: OrderKind, settings: &ChainSettings) -> U256 {
    let buffer = settings.gas_limit_buffer.for_kind(kind);
    from_f64(to_f64(gas_estimate) * (1.0 + buffer))
}

#[cfg(test)]
mod tests {
    use relay_base::GasLimitBuffer;

    use super::*;

    fn settings() -> ChainSettings {
        ChainSettings {
            chain_id: 1,
            counterparty_chain_id: 2,
            rpc_url: "http://localhost:8545".into(),
            escrow_address: Default::default(),
            signer_key_path: "unused".into(),
            new_orders_delay_ms: 0,
            retry_interval_ms: 2000,
            processing_interval_ms: 100,
            max_tries: 3,
            max_pending_transactions: 1000,
            confirmations: 1,
            confirmation_timeout_ms: 600_000,
            balance_update_interval: 50,
            gas_limit_buffer: GasLimitBuffer {
                default: 0.1,
                delivery: None,
                ack: Some(0.2),
            },
            max_fee_per_gas: None,
            max_priority_fee_adjustment_factor: Some(1.0),
            max_allowed_priority_fee_per_gas: None,
            gas_price_adjustment_factor: Some(0.1),
            max_allowed_gas_price: None,
            priority_adjustment_factor: Some(0.1),
            low_balance_warning: None,
            block_delay: 0,
            interval_ms: 1000,
            max_blocks: None,
            starting_block: None,
            stopping_block: None,
            min_delivery_reward: None,
            relative_min_delivery_reward: None,
            min_ack_reward: None,
            relative_min_ack_reward: None,
            price_feed_symbol: None,
        }
    }

    #[test]
    fn configured_max_fee_takes_priority_over_computed() {
        let mut s = settings();
        s.max_fee_per_gas = Some(U256::from(12345));
        assert_eq!(compute_max_fee_per_gas(U256::from(1_000_000_000u64), 0, &s), U256::from(12345));
    }

    #[test]
    fn computed_max_fee_applies_priority_adjustment_per_attempt() {
        let s = settings();
        let base_fee = U256::from(1_000_000_000u64);
        let attempt0 = compute_max_fee_per_gas(base_fee, 0, &s);
        let attempt1 = compute_max_fee_per_gas(base_fee, 1, &s);
        assert!(attempt1 > attempt0, "later attempts should escalate fees");
    }

    #[test]
    fn max_allowed_gas_price_caps_computed_value() {
        let mut s = settings();
        s.max_allowed_gas_price = Some(U256::from(1_000));
        let computed = compute_max_fee_per_gas(U256::from(1_000_000_000u64), 0, &s);
        assert_eq!(computed, U256::from(1_000));
    }

    #[test]
    fn priority_fee_uses_replacement_floor_over_fresh_suggestion() {
        let s = settings();
        let fresh = compute_max_priority_fee_per_gas(U256::from(1), Some(U256::from(1_000_000)), &s);
        // last_attempt * 1.125 should dominate a tiny fresh suggestion.
        assert_eq!(fresh, U256::from(1_125_000u64));
    }

    #[test]
    fn gas_limit_buffer_falls_back_to_default_for_delivery() {
        let s = settings();
        let limit = compute_gas_limit(U256::from(100_000), OrderKind::Delivery, &s);
        assert_eq!(limit, U256::from(110_000));
    }

    #[test]
    fn gas_limit_buffer_uses_per_kind_override_for_ack() {
        let s = settings();
        let limit = compute_gas_limit(U256::from(100_000), OrderKind::Ack, &s);
        assert_eq!(limit, U256::from(120_000));
    }
}
