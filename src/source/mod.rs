// src/source/mod.rs
//! Adapter contract, per-platform configuration and the adapter registry.

pub mod defaults;
pub mod mock;
pub mod types;

pub use defaults::{default_config, default_priority, fallback_sources};
pub use types::{
    AdapterError, AdapterRegistry, DynAdapter, Filters, PlatformAdapter, RateLimitInfo, RawRecord,
    SearchStrategy, SourceConfig, SourceOverride,
};
