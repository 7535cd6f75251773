use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::record::Record;

/// Unique identifier for a record. Unique across the whole hybrid store.
pub type RecordId = String;

/// Identifier for a key-value conversation context.
pub type ContextId = String;

/// Identifier for an episode in the graph index.
pub type EpisodeId = String;

/// Identifier for a model whose preferences are tracked.
pub type ModelId = String;

/// Which substrate(s) a record is routed to on insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Ephemeral, TTL-bound: key-value index only.
    ShortTerm,
    /// Durable knowledge: graph index only.
    LongTerm,
    /// Sequenced experiences: graph index only.
    Episodic,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::ShortTerm => "short_term",
            MemoryKind::LongTerm => "long_term",
            MemoryKind::Episodic => "episodic",
        }
    }

    /// Whether records of this kind live in the graph index.
    pub fn is_graph(&self) -> bool {
        matches!(self, MemoryKind::LongTerm | MemoryKind::Episodic)
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = crate::StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short_term" => Ok(MemoryKind::ShortTerm),
            "long_term" => Ok(MemoryKind::LongTerm),
            "episodic" => Ok(MemoryKind::Episodic),
            other => Err(crate::StrataError::InvalidRecord(format!(
                "unknown memory kind '{other}'"
            ))),
        }
    }
}

/// Time-to-live for a key-value entry.
///
/// `Never` is a distinct sentinel: `After(Duration::ZERO)` expires immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ttl {
    /// Use the index's configured default.
    #[default]
    Default,
    /// Never expires.
    Never,
    /// Expires this long after insertion (or renewal).
    After(Duration),
}

impl Ttl {
    pub fn secs(secs: u64) -> Self {
        Ttl::After(Duration::from_secs(secs))
    }
}

/// A record paired with a relevance score from a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: Record,
    pub score: f64,
}

impl ScoredRecord {
    pub fn new(record: Record, score: f64) -> Self {
        Self { record, score }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }
}
