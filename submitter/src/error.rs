use relay_core::ChainCommunicationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Chain(#[from] ChainCommunicationError),

    #[error("nonce {0} has no tracked transaction")]
    UntrackedNonce(ethers_core::types::U256),

    #[error("balance below minimum operational threshold, refusing to submit")]
    InsufficientBalance,

    #[error("confirmation timed out after {0:?}")]
    ConfirmationTimeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum SubmitterError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Chain(#[from] ChainCommunicationError),

    #[error("pending transaction cap ({0}) reached for chain")]
    PendingCapReached(usize),

    #[error("order permanently unprofitable, abandoned")]
    Unprofitable,

    #[error("order failed after {0} attempts: {1}")]
    MaxTriesExceeded(u32, String),
}
