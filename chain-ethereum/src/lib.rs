//! The one concrete AMB adapter target this system ships: EVM JSON-RPC chains
//! (spec.md §6). Owns the RPC transport, gas/fee primitives, and the escrow contract's ABI.

pub mod abi;
pub mod adapter;
pub mod gas;
pub mod metrics;
pub mod provider;

pub use adapter::EthereumAmbAdapter;
pub use gas::{build_eip1559_tx, sign_and_encode, GasPrice};
pub use metrics::EthereumProviderMetrics;
pub use provider::{EthereumProvider, RpcEthereumProvider};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockEthereumProvider;
