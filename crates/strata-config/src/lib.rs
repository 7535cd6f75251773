//! # strata-config
//!
//! Configuration for the Strata memory engine. Reads `strata.toml`, then
//! applies `STRATA_*` environment overrides.
//!
//! Supports hot-reload via filesystem watcher.

pub mod loader;
pub mod logging;
pub mod schema;

pub use loader::ConfigLoader;
pub use logging::init_tracing;
pub use schema::{ConfigWarning, LoggingConfig, MemoryConfig, StrataConfig, WarningSeverity};
