use tracing_subscriber::{fmt, EnvFilter};

/// Output format for the global subscriber, matching the `--json-logs` CLI flag /
/// `logFormat` config key described in SPEC_FULL.md §2.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Installs the global `tracing` subscriber. Call once, from the binary's `main`.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
