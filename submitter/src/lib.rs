//! The transaction pipeline that turns a profitable `SubmitOrder` into a confirmed
//! transaction: gas policy, nonce discipline, broadcast, replacement and confirmation
//! tracking (spec.md §4.5, §4.6, §4.7).

pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod gas_policy;
pub mod nonce;
pub mod transaction;
pub mod wallet;

pub use dispatcher::Dispatcher;
pub use error::{SubmitterError, WalletError};
pub use evaluator::{Candidate, Evaluator, EvaluatorConfig, PricingInputs};
pub use nonce::NonceManager;
pub use transaction::{PendingTx, TransactionStatus};
pub use wallet::{Confirmation, Wallet};
