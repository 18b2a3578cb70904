use std::fmt;

use ethers_core::types::H256;
use serde::{Deserialize, Serialize};

/// Opaque 32-byte handle assigned by the escrow contract to a cross-chain message.
///
/// All Store keys derive from this. Reuses `H256`'s byte layout since every AMB we support
/// emits message ids as `bytes32` on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub H256);

impl MessageId {
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(H256::from_slice(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Key under which the aggregate `RelayState` for this MID lives in the Store.
    pub fn store_key(&self) -> String {
        format!("relay_state:{:#x}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<H256> for MessageId {
    fn from(h: H256) -> Self {
        Self(h)
    }
}

/// EVM chain id. A plain `u32` newtype so it can't be confused with a block number or a
/// domain-agnostic index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub u32);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ChainId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Key under which the FIFO queue of MIDs awaiting evaluation for a given chain lives.
pub fn pending_orders_key(chain: ChainId) -> String {
    format!("pending_orders:{chain}")
}
