use thiserror::Error;

/// Top-level failure classification for `main`'s exit code (spec.md §6 "CLI": exit codes 0
/// normal, 1 config error, 2 fatal worker error).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] relay_base::ConfigError),

    #[error("fatal worker error: {0}")]
    Fatal(#[source] eyre::Report),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 1,
            AppError::Fatal(_) => 2,
        }
    }
}
