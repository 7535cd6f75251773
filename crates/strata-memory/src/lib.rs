//! # strata-memory
//!
//! Hybrid memory store for conversational agents:
//!
//! - **Vector index**: embeddings and cosine-similarity search ("what is this like?").
//! - **Key-value index**: short-term, TTL-bound records grouped by conversation context.
//! - **Graph index**: long-term and episodic records with tags, importance buckets, and episodes.
//!
//! [`HybridStore`] routes each record to the right substrate by memory kind, merges
//! searches across all three, and tracks model preferences and shared contexts.

pub mod graph;
pub mod scoring;
pub mod semantic;
pub mod store;
pub mod sweeper;
pub mod working;

pub use graph::{Edge, EdgeKind, GraphIndex, InMemoryGraphIndex, Node, NodeKind};
pub use semantic::{InMemoryVectorIndex, Preview, VectorIndex};
pub use store::{HybridStore, HybridStoreBuilder, StoreStats};
pub use sweeper::SweepHandle;
pub use working::{Expiry, InMemoryKeyValueIndex, KeyValueIndex};
