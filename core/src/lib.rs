//! Chain-agnostic types shared by every component of the relayer: message identifiers,
//! the `BountyEvent` tagged union, the `RelayState` aggregate and its merge rule, the
//! `Store` trait, order types handed from the Evaluator to the Submitter, and the AMB
//! adapter plug-in contract.

pub mod adapter;
pub mod error;
pub mod event;
pub mod ids;
pub mod order;
pub mod state;
pub mod store;

pub use adapter::{AmbAdapter, RawLog};
pub use error::{ChainCommunicationError, ChainResult, StoreError, StoreResult};
pub use event::{BountyClaimed, BountyEvent, BountyIncreased, BountyPlaced, EventPosition, MessageDelivered};
pub use ids::{pending_orders_key, ChainId, MessageId};
pub use order::{OrderKind, QueuedCandidate, SubmitOrder};
pub use state::{RelayState, RelayStatus};
pub use store::{Store, StoreExt, Versioned};

pub use ethers_core::types::{H160, H256, U256};
