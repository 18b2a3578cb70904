use thiserror::Error;

/// Failures surfaced by anything that talks to an on-chain RPC endpoint.
///
/// Mirrors the corpus's `ChainCommunicationError`: most variants are transient and the
/// caller is expected to retry with backoff (§7.1 of the spec); `fatal` errors are the ones
/// that should bubble all the way up to the orchestrator and mark the chain inactive (§7.6).
#[derive(Debug, Error)]
pub enum ChainCommunicationError {
    #[error("RPC request failed: {0}")]
    ProviderError(String),

    #[error("RPC request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("log decoding failed: {0}")]
    DecodeError(String),

    #[error("contract reverted: {0}")]
    ContractError(String),

    #[error("signing key unavailable: {0}")]
    SignerUnavailable(String),

    #[error("custom error: {0}")]
    Custom(String),
}

impl ChainCommunicationError {
    /// Whether a caller should retry with backoff (taxonomy item 1 in spec.md §7) or treat
    /// this as fatal (taxonomy item 6).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ChainCommunicationError::SignerUnavailable(_))
    }
}

pub type ChainResult<T> = Result<T, ChainCommunicationError>;

/// Failures from the persistent key-value Store (§4.3).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("optimistic concurrency conflict on key {key}: expected version {expected}, found {found}")]
    VersionConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("key not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
