use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

use crate::event::{BountyClaimed, BountyEvent, BountyIncreased, BountyPlaced, MessageDelivered};
use crate::ids::MessageId;
use crate::order::OrderKind;

/// Lifecycle status of a `RelayState`. Monotonically non-decreasing (spec.md §3 Invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum RelayStatus {
    Placed = 0,
    Delivered = 1,
    Claimed = 2,
}

impl RelayStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RelayStatus::Placed,
            1 => RelayStatus::Delivered,
            _ => RelayStatus::Claimed,
        }
    }
}

/// Per-MID aggregate lifecycle state (spec.md §3). Created on first `BountyPlaced`, mutated
/// by the Collector (event merge) and the Wallet (confirmation result, costs), never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayState {
    pub mid: MessageId,
    pub status: RelayStatus,
    pub placed: Option<BountyPlaced>,
    pub increased: Option<BountyIncreased>,
    pub delivered: Option<MessageDelivered>,
    pub claimed: Option<BountyClaimed>,
    pub delivery_gas_cost: Option<U256>,
    pub ack_gas_cost: Option<U256>,
    pub delivery_attempts: u32,
    pub ack_attempts: u32,
}

impl RelayState {
    /// Construct the initial aggregate from a `BountyPlaced`, the only event kind allowed to
    /// create a `RelayState` (spec.md §3 "Created on first BountyPlaced").
    pub fn new(placed: BountyPlaced) -> Self {
        Self {
            mid: placed.mid,
            status: RelayStatus::Placed,
            placed: Some(placed),
            increased: None,
            delivered: None,
            claimed: None,
            delivery_gas_cost: None,
            ack_gas_cost: None,
            delivery_attempts: 0,
            ack_attempts: 0,
        }
    }

    /// Apply a single event on top of this state, per the merge rule in spec.md §4.2:
    /// the matching slot is filled with whichever observation has the larger
    /// `(blockNumber, logIndex)`, and `status = max(status, statusOf(event))`. The result is
    /// independent of the order events are merged in (spec.md §8 "commutative merge").
    pub fn merge(&mut self, event: &BountyEvent) {
        debug_assert_eq!(event.mid(), self.mid, "event for wrong MID merged");
        match event {
            BountyEvent::BountyPlaced(p) => {
                if later(self.placed.as_ref().map(|e| e.position), p.position) {
                    self.placed = Some(p.clone());
                }
            }
            BountyEvent::BountyIncreased(i) => {
                if later(self.increased.as_ref().map(|e| e.position), i.position) {
                    self.increased = Some(i.clone());
                }
            }
            BountyEvent::MessageDelivered(d) => {
                if later(self.delivered.as_ref().map(|e| e.position), d.position) {
                    self.delivered = Some(d.clone());
                }
            }
            BountyEvent::BountyClaimed(c) => {
                if later(self.claimed.as_ref().map(|e| e.position), c.position) {
                    self.claimed = Some(c.clone());
                }
            }
        }
        let incoming = RelayStatus::from_u8(event.status_of());
        if incoming > self.status {
            self.status = incoming;
        }
    }

    /// `max(original, latest BountyIncreased)` per spec.md §3 Invariants.
    pub fn effective_price_of_delivery_gas(&self) -> Option<U256> {
        let original = self.placed.as_ref().map(|p| p.price_of_delivery_gas);
        let increased = self.increased.as_ref().map(|i| i.new_price_of_delivery_gas);
        max_opt(original, increased)
    }

    pub fn effective_price_of_ack_gas(&self) -> Option<U256> {
        let original = self.placed.as_ref().map(|p| p.price_of_ack_gas);
        let increased = self.increased.as_ref().map(|i| i.new_price_of_ack_gas);
        max_opt(original, increased)
    }

    pub fn is_terminal(&self) -> bool {
        self.status == RelayStatus::Claimed
            && self.delivery_gas_cost.is_some()
            && self.ack_gas_cost.is_some()
    }

    pub fn needs_delivery(&self) -> bool {
        self.status == RelayStatus::Placed && self.delivered.is_none()
    }

    pub fn needs_ack(&self) -> bool {
        self.status == RelayStatus::Delivered && self.claimed.is_none()
    }

    /// Records the gas actually spent confirming `kind`'s transaction
    /// (spec.md §3 "gas costs observed at delivery and ack"), written by the Wallet once a
    /// receipt clears the confirmation depth.
    pub fn record_confirmation(&mut self, kind: OrderKind, gas_cost: U256) {
        match kind {
            OrderKind::Delivery => self.delivery_gas_cost = Some(gas_cost),
            OrderKind::Ack => self.ack_gas_cost = Some(gas_cost),
        }
    }

    /// Increments the attempt counter for `kind` (spec.md §4.6 "Failed after maxTries
    /// increments the Store's attempt counter and surfaces the error").
    pub fn increment_attempts(&mut self, kind: OrderKind) {
        match kind {
            OrderKind::Delivery => self.delivery_attempts += 1,
            OrderKind::Ack => self.ack_attempts += 1,
        }
    }
}

fn later(existing: Option<crate::event::EventPosition>, candidate: crate::event::EventPosition) -> bool {
    match existing {
        None => true,
        Some(pos) => candidate > pos,
    }
}

fn max_opt(a: Option<U256>, b: Option<U256>) -> Option<U256> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPosition;
    use crate::ids::ChainId;
    use ethers_core::types::H256;

    fn pos(block: u64, idx: u64) -> EventPosition {
        EventPosition::new(block, H256::random(), idx, H256::random())
    }

    fn placed(mid: MessageId, position: EventPosition) -> BountyPlaced {
        BountyPlaced {
            mid,
            from_chain_id: ChainId(1),
            incentives_address: H256::random(),
            max_gas_delivery: U256::from(2_000_000),
            max_gas_ack: U256::from(200_000),
            refund_gas_to: H256::random(),
            price_of_delivery_gas: U256::from(50_000_000_000u64),
            price_of_ack_gas: U256::from(50_000_000_000u64),
            target_delta: U256::zero(),
            payload: vec![1, 2, 3],
            position,
        }
    }

    #[test]
    fn status_is_monotonic_across_arbitrary_event_orders() {
        let mid = MessageId(H256::random());
        let mut state = RelayState::new(placed(mid, pos(1, 0)));
        assert_eq!(state.status, RelayStatus::Placed);

        let delivered = MessageDelivered {
            mid,
            to_chain_id: ChainId(2),
            position: pos(5, 0),
        };
        state.merge(&BountyEvent::MessageDelivered(delivered));
        assert_eq!(state.status, RelayStatus::Delivered);

        // Replaying an older BountyIncreased must never lower status back down.
        let increased = BountyIncreased {
            mid,
            new_price_of_delivery_gas: U256::from(60_000_000_000u64),
            new_price_of_ack_gas: U256::zero(),
            position: pos(2, 0),
        };
        state.merge(&BountyEvent::BountyIncreased(increased));
        assert_eq!(state.status, RelayStatus::Delivered);
    }

    #[test]
    fn merge_is_commutative_regardless_of_application_order() {
        let mid = MessageId(H256::random());
        let p = placed(mid, pos(1, 0));
        let delivered = MessageDelivered {
            mid,
            to_chain_id: ChainId(9),
            position: pos(3, 0),
        };
        let claimed = BountyClaimed {
            mid,
            position: pos(4, 0),
        };

        let events = [
            BountyEvent::BountyPlaced(p.clone()),
            BountyEvent::MessageDelivered(delivered.clone()),
            BountyEvent::BountyClaimed(claimed.clone()),
        ];

        // forward order
        let mut a = RelayState::new(p.clone());
        for e in events.iter().skip(1) {
            a.merge(e);
        }

        // reverse order, starting from a bootstrap that only has Placed
        let mut b = RelayState::new(p.clone());
        b.merge(&BountyEvent::BountyClaimed(claimed));
        b.merge(&BountyEvent::MessageDelivered(delivered));

        assert_eq!(a.status, b.status);
        assert_eq!(a.delivered, b.delivered);
        assert_eq!(a.claimed, b.claimed);
    }

    #[test]
    fn later_position_wins_same_slot() {
        let mid = MessageId(H256::random());
        let mut state = RelayState::new(placed(mid, pos(1, 0)));

        let first = BountyIncreased {
            mid,
            new_price_of_delivery_gas: U256::from(10),
            new_price_of_ack_gas: U256::zero(),
            position: pos(5, 0),
        };
        let second = BountyIncreased {
            mid,
            new_price_of_delivery_gas: U256::from(99),
            new_price_of_ack_gas: U256::zero(),
            position: pos(6, 0),
        };

        // Apply out of order; later position must still win.
        state.merge(&BountyEvent::BountyIncreased(second));
        state.merge(&BountyEvent::BountyIncreased(first));

        assert_eq!(
            state.increased.unwrap().new_price_of_delivery_gas,
            U256::from(99)
        );
    }

    #[test]
    fn confirmation_records_gas_cost_and_attempt_counters_are_per_kind() {
        let mid = MessageId(H256::random());
        let mut state = RelayState::new(placed(mid, pos(1, 0)));

        state.increment_attempts(OrderKind::Delivery);
        state.increment_attempts(OrderKind::Delivery);
        state.increment_attempts(OrderKind::Ack);
        assert_eq!(state.delivery_attempts, 2);
        assert_eq!(state.ack_attempts, 1);

        assert!(!state.is_terminal());
        state.record_confirmation(OrderKind::Delivery, U256::from(12_345));
        assert_eq!(state.delivery_gas_cost, Some(U256::from(12_345)));
        assert!(state.ack_gas_cost.is_none());

        state.status = RelayStatus::Claimed;
        assert!(!state.is_terminal(), "still missing ack_gas_cost");
        state.record_confirmation(OrderKind::Ack, U256::from(678));
        assert!(state.is_terminal());
    }

    #[test]
    fn effective_price_takes_max_of_original_and_latest_increase() {
        let mid = MessageId(H256::random());
        let mut state = RelayState::new(placed(mid, pos(1, 0)));
        assert_eq!(
            state.effective_price_of_delivery_gas(),
            Some(U256::from(50_000_000_000u64))
        );

        state.merge(&BountyEvent::BountyIncreased(BountyIncreased {
            mid,
            new_price_of_delivery_gas: U256::from(10_000_000_000u64),
            new_price_of_ack_gas: U256::zero(),
            position: pos(2, 0),
        }));
        // A lower increase must not lower the effective price.
        assert_eq!(
            state.effective_price_of_delivery_gas(),
            Some(U256::from(50_000_000_000u64))
        );
    }
}
