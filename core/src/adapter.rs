use ethers_core::types::{Bytes, H160, H256};

use crate::error::ChainResult;
use crate::event::BountyEvent;
use crate::ids::{ChainId, MessageId};

/// A raw on-chain log, already positioned, ready for an adapter to attempt decoding
/// (spec.md §6 "AMB adapter (plug-in contract)").
#[derive(Debug, Clone)]
pub struct RawLog {
    pub address: H160,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: u64,
    pub block_hash: H256,
    pub log_index: u64,
    pub tx_hash: H256,
}

/// The uniform plug-in contract every Arbitrary Message Bridge adapter implements
/// (spec.md §6). The Collector, Evaluator, Submitter and Wallet are all adapter-agnostic;
/// only this trait's implementors know a given AMB's topic set and ABI.
pub trait AmbAdapter: Send + Sync {
    /// The escrow contract address to watch on a given chain, if this adapter is deployed
    /// there.
    fn incentives_address(&self, chain: ChainId) -> Option<H160>;

    /// Decode a raw log into a semantic `BountyEvent`. Returns `None` for unrecognized
    /// topics (spec.md §4.2 "Unknown topics are ignored") or invalid events
    /// (spec.md §7 taxonomy item 5 — log and skip, slot stays empty).
    fn decode(&self, log: &RawLog) -> ChainResult<Option<BountyEvent>>;

    /// Build calldata to deliver `payload` for `mid` on the destination chain.
    fn encode_delivery(&self, mid: MessageId, payload: &[u8]) -> ChainResult<Bytes>;

    /// Build calldata to acknowledge delivery of `mid` back on the origin chain.
    fn encode_ack(&self, mid: MessageId) -> ChainResult<Bytes>;
}
