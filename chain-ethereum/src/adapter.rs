use std::collections::HashMap;

use ethers_core::types::{Bytes, H160};
use relay_core::{AmbAdapter, BountyEvent, ChainId, ChainResult, EventPosition, MessageId, RawLog};

use crate::abi;

/// The single concrete AMB adapter this system ships (spec.md §1 "Out of scope: ... the
/// specific AMB adapters beyond the uniform interface defined in §6"). It targets a generic
/// escrow contract deployed at a known address per chain.
pub struct EthereumAmbAdapter {
    incentives_addresses: HashMap<ChainId, H160>,
}

impl EthereumAmbAdapter {
    pub fn new(incentives_addresses: HashMap<ChainId, H160>) -> Self {
        Self {
            incentives_addresses,
        }
    }
}

impl AmbAdapter for EthereumAmbAdapter {
    fn incentives_address(&self, chain: ChainId) -> Option<H160> {
        self.incentives_addresses.get(&chain).copied()
    }

    fn decode(&self, log: &RawLog) -> ChainResult<Option<BountyEvent>> {
        let topic0 = match log.topics.first() {
            Some(t) => *t,
            None => return Ok(None),
        };
        let position = EventPosition::new(log.block_number, log.block_hash, log.log_index, log.tx_hash);
        abi::decode_bounty_event(topic0, &log.topics, &log.data, position)
    }

    fn encode_delivery(&self, mid: MessageId, payload: &[u8]) -> ChainResult<Bytes> {
        Ok(abi::encode_deliver_message(mid, payload))
    }

    fn encode_ack(&self, mid: MessageId) -> ChainResult<Bytes> {
        Ok(abi::encode_acknowledge_message(mid))
    }
}
