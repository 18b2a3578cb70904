//! The ambient runtime shared by every per-chain worker: configuration loading, the
//! persistent Store implementation, the Getter, structured logging setup, and the Pricing
//! oracle (spec.md §1 "external collaborators" + SPEC_FULL.md §2).

pub mod getter;
pub mod logging;
pub mod pricing;
pub mod settings;
pub mod store;

pub use getter::{Getter, GetterConfig, GetterTick};
pub use logging::{init_tracing, LogFormat};
pub use pricing::{CachedPricing, FailingPriceFeed, GasUnit, HttpPriceFeed, PriceFeed, StaticPriceFeed};
pub use settings::{ChainSettings, ConfigError, GasLimitBuffer, PricingSettings, Settings};
pub use store::{InMemoryStore, SharedStore};
