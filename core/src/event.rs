use ethers_core::types::{H256, U256};
use serde::{Deserialize, Serialize};

use crate::ids::{ChainId, MessageId};

/// Where in the canonical chain an event was observed. Used both to order events for a
/// single MID (spec.md §5 "Per MID: events are applied in (blockNumber, logIndex) order")
/// and, via `block_hash`, to let the Collector tell a reorged-out observation apart from its
/// replacement at the same height (spec.md §8 scenario 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventPosition {
    pub block_number: u64,
    pub block_hash: H256,
    pub log_index: u64,
    pub tx_hash: H256,
}

impl EventPosition {
    pub fn new(block_number: u64, block_hash: H256, log_index: u64, tx_hash: H256) -> Self {
        Self {
            block_number,
            block_hash,
            log_index,
            tx_hash,
        }
    }
}

impl PartialOrd for EventPosition {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventPosition {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.block_number, self.log_index).cmp(&(other.block_number, other.log_index))
    }
}

/// A single escrow-contract observation, decoded by an AMB adapter (spec.md §4.2, §6).
/// Unknown topics never reach this type — the Collector skips them before constructing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BountyEvent {
    BountyPlaced(BountyPlaced),
    BountyIncreased(BountyIncreased),
    MessageDelivered(MessageDelivered),
    BountyClaimed(BountyClaimed),
}

impl BountyEvent {
    pub fn mid(&self) -> MessageId {
        match self {
            BountyEvent::BountyPlaced(e) => e.mid,
            BountyEvent::BountyIncreased(e) => e.mid,
            BountyEvent::MessageDelivered(e) => e.mid,
            BountyEvent::BountyClaimed(e) => e.mid,
        }
    }

    pub fn position(&self) -> EventPosition {
        match self {
            BountyEvent::BountyPlaced(e) => e.position,
            BountyEvent::BountyIncreased(e) => e.position,
            BountyEvent::MessageDelivered(e) => e.position,
            BountyEvent::BountyClaimed(e) => e.position,
        }
    }

    /// `statusOf(E)` from spec.md §4.2's merge rule.
    pub fn status_of(&self) -> u8 {
        match self {
            BountyEvent::BountyPlaced(_) | BountyEvent::BountyIncreased(_) => 0,
            BountyEvent::MessageDelivered(_) => 1,
            BountyEvent::BountyClaimed(_) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyPlaced {
    pub mid: MessageId,
    pub from_chain_id: ChainId,
    pub incentives_address: H256,
    pub max_gas_delivery: U256,
    pub max_gas_ack: U256,
    pub refund_gas_to: H256,
    pub price_of_delivery_gas: U256,
    pub price_of_ack_gas: U256,
    pub target_delta: U256,
    pub payload: Vec<u8>,
    pub position: EventPosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyIncreased {
    pub mid: MessageId,
    pub new_price_of_delivery_gas: U256,
    pub new_price_of_ack_gas: U256,
    pub position: EventPosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelivered {
    pub mid: MessageId,
    pub to_chain_id: ChainId,
    pub position: EventPosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyClaimed {
    pub mid: MessageId,
    pub position: EventPosition,
}
