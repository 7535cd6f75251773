//! # strata-core
//!
//! Core types, traits, and primitives for the Strata hybrid memory engine.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! the [`Record`] every index stores, its typed relation data, query filters,
//! the embedding collaborator, and the unified error type.

pub mod clock;
pub mod embed;
pub mod error;
pub mod filter;
pub mod record;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use embed::Embedder;
pub use error::{Result, StrataError};
pub use filter::MemoryFilter;
pub use record::{Record, Relations};
pub use types::*;
