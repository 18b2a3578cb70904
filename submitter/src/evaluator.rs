use std::time::{Duration, Instant};

use ethers_core::types::U256;
use relay_core::{ChainId, EventPosition, OrderKind, RelayState, SubmitOrder};

/// Per-chain tunables for the profitability test (spec.md §4.5, §6 configuration keys).
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub min_delivery_reward: U256,
    pub relative_min_delivery_reward: f64,
    pub min_ack_reward: U256,
    pub relative_min_ack_reward: f64,
    /// Grace period after first observing a candidate before it's eligible for submission,
    /// to absorb a `BountyIncreased` that arrives in the same window (spec.md §4.5
    /// "Ordering").
    pub new_orders_delay: Duration,
}

/// Everything needed to price one candidate, fetched by the caller from RPC and the Pricing
/// oracle before calling into the Evaluator (spec.md §4.4, §4.5).
#[derive(Debug, Clone, Copy)]
pub struct PricingInputs {
    /// Gas estimate from the destination (delivery) or origin (ack) RPC; falls back to
    /// `maxGas* × 1.1` when estimation itself fails (spec.md §4.5 "fallback").
    pub gas_estimate: U256,
    /// The chain the transaction will actually be sent on, i.e. where `gasEst` is spent.
    pub local_gas_price: U256,
    /// Common-denomination value of one unit of the reward chain's native token
    /// (spec.md §4.4 "common denomination").
    pub reward_chain_price: U256,
    /// Common-denomination value of one unit of the cost chain's native token.
    pub cost_chain_price: U256,
}

/// A `RelayState` not yet decided on, bundled with the context the Evaluator needs to decide
/// (spec.md §4.5).
pub struct Candidate {
    pub state: RelayState,
    pub target_chain: ChainId,
    pub first_observed: Instant,
    pub triggering_position: EventPosition,
    pub pricing: PricingInputs,
}

pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Runs the profitability test and ordering rule over a batch of candidates, returning
    /// zero-or-one `SubmitOrder` per candidate in FIFO order by triggering position
    /// (spec.md §4.5 "Ordering").
    pub fn evaluate_batch(&self, mut candidates: Vec<Candidate>) -> Vec<SubmitOrder> {
        candidates.sort_by_key(|c| c.triggering_position);
        candidates
            .into_iter()
            .filter_map(|c| self.evaluate_one(&c))
            .collect()
    }

    fn evaluate_one(&self, candidate: &Candidate) -> Option<SubmitOrder> {
        if candidate.first_observed.elapsed() < self.config.new_orders_delay {
            return None;
        }
        let state = &candidate.state;
        let kind = if state.needs_delivery() {
            OrderKind::Delivery
        } else if state.needs_ack() {
            OrderKind::Ack
        } else {
            return None;
        };

        let (price_of_gas, max_gas, min_reward, relative_min_reward) = match kind {
            OrderKind::Delivery => (
                state.effective_price_of_delivery_gas()?,
                state.placed.as_ref()?.max_gas_delivery,
                self.config.min_delivery_reward,
                self.config.relative_min_delivery_reward,
            ),
            OrderKind::Ack => (
                state.effective_price_of_ack_gas()?,
                state.placed.as_ref()?.max_gas_ack,
                self.config.min_ack_reward,
                self.config.relative_min_ack_reward,
            ),
        };

        if !is_profitable(price_of_gas, max_gas, &candidate.pricing, min_reward, relative_min_reward) {
            return None;
        }

        Some(SubmitOrder::new(
            state.mid,
            kind,
            candidate.target_chain,
            candidate.triggering_position,
        ))
    }
}

/// `valueIn ≥ costOut × (1 + relativeMinReward) + minReward` (spec.md §4.5 "Profitability
/// test"), both sides converted into the common denomination before comparison.
fn is_profitable(
    price_of_gas: U256,
    max_gas: U256,
    pricing: &PricingInputs,
    min_reward: U256,
    relative_min_reward: f64,
) -> bool {
    let gas_used = pricing.gas_estimate.min(max_gas);
    let value_in = price_of_gas
        .saturating_mul(gas_used)
        .saturating_mul(pricing.reward_chain_price);
    let cost_out = pricing
        .gas_estimate
        .saturating_mul(pricing.local_gas_price)
        .saturating_mul(pricing.cost_chain_price);

    // relative_min_reward is a fraction (e.g. 0.1 == 10%); represent it as a
    // millionths-precision integer multiplier to stay in U256 arithmetic throughout.
    const PRECISION: u128 = 1_000_000;
    let relative_scaled = U256::from(PRECISION) + U256::from((relative_min_reward * PRECISION as f64).round() as u128);
    let threshold = (cost_out.saturating_mul(relative_scaled) / U256::from(PRECISION))
        .saturating_add(min_reward.saturating_mul(pricing.reward_chain_price));

    value_in >= threshold
}

#[cfg(test)]
mod tests {
    use ethers_core::types::H256;
    use relay_core::{BountyPlaced, MessageId};

    use super::*;

    fn pos(block: u64, idx: u64) -> EventPosition {
        EventPosition::new(block, H256::random(), idx, H256::random())
    }

    fn placed_state(mid: MessageId, price_of_delivery_gas: U256, max_gas_delivery: U256) -> RelayState {
        RelayState::new(BountyPlaced {
            mid,
            from_chain_id: ChainId(1),
            incentives_address: H256::random(),
            max_gas_delivery,
            max_gas_ack: U256::from(200_000),
            refund_gas_to: H256::random(),
            price_of_delivery_gas,
            price_of_ack_gas: U256::from(1),
            target_delta: U256::zero(),
            payload: vec![],
            position: pos(1, 0),
        })
    }

    fn config() -> EvaluatorConfig {
        EvaluatorConfig {
            min_delivery_reward: U256::zero(),
            relative_min_delivery_reward: 0.1,
            min_ack_reward: U256::zero(),
            relative_min_ack_reward: 0.1,
            new_orders_delay: Duration::ZERO,
        }
    }

    fn candidate(state: RelayState) -> Candidate {
        Candidate {
            state,
            target_chain: ChainId(2),
            first_observed: Instant::now() - Duration::from_secs(10),
            triggering_position: pos(1, 0),
            pricing: PricingInputs {
                gas_estimate: U256::from(100_000),
                local_gas_price: U256::from(10),
                reward_chain_price: U256::from(1),
                cost_chain_price: U256::from(1),
            },
        }
    }

    #[test]
    fn emits_delivery_order_when_reward_clears_cost_and_margin() {
        let mid = MessageId(H256::random());
        let state = placed_state(mid, U256::from(1_000), U256::from(2_000_000));
        let evaluator = Evaluator::new(config());
        let orders = evaluator.evaluate_batch(vec![candidate(state)]);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].kind, OrderKind::Delivery);
        assert_eq!(orders[0].mid, mid);
    }

    #[test]
    fn withholds_order_when_unprofitable() {
        let mid = MessageId(H256::random());
        let state = placed_state(mid, U256::zero(), U256::from(2_000_000));
        let evaluator = Evaluator::new(config());
        let orders = evaluator.evaluate_batch(vec![candidate(state)]);
        assert!(orders.is_empty());
    }

    #[test]
    fn withholds_order_still_within_new_orders_delay() {
        let mid = MessageId(H256::random());
        let state = placed_state(mid, U256::from(1_000), U256::from(2_000_000));
        let mut c = candidate(state);
        c.first_observed = Instant::now();
        let mut cfg = config();
        cfg.new_orders_delay = Duration::from_secs(3600);
        let evaluator = Evaluator::new(cfg);
        assert!(evaluator.evaluate_batch(vec![c]).is_empty());
    }

    #[test]
    fn emits_orders_in_ascending_triggering_position_order() {
        let mid_a = MessageId(H256::random());
        let mid_b = MessageId(H256::random());
        let mut a = candidate(placed_state(mid_a, U256::from(1_000), U256::from(2_000_000)));
        a.triggering_position = pos(9, 0);
        let mut b = candidate(placed_state(mid_b, U256::from(1_000), U256::from(2_000_000)));
        b.triggering_position = pos(2, 0);

        let evaluator = Evaluator::new(config());
        let orders = evaluator.evaluate_batch(vec![a, b]);
        assert_eq!(orders[0].mid, mid_b);
        assert_eq!(orders[1].mid, mid_a);
    }
}
