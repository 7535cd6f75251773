use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::Record;
use crate::types::MemoryKind;

/// Criteria for `list` operations.
///
/// Every category that is set must match (categories intersect). Within the
/// tag category, `match_all` selects intersection; otherwise any listed tag
/// matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryFilter {
    /// Restrict a hybrid listing to the index that owns this kind.
    pub kind: Option<MemoryKind>,
    pub tags: Vec<String>,
    pub match_all: bool,
    pub min_importance: Option<f64>,
    pub max_importance: Option<f64>,
    pub min_timestamp: Option<f64>,
    pub max_timestamp: Option<f64>,
    pub episode_id: Option<String>,
    pub context_id: Option<String>,
    pub source: Option<String>,
    /// Exact-match constraints on metadata values.
    pub metadata: Map<String, Value>,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn tags<I, S>(mut self, tags: I, match_all: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self.match_all = match_all;
        self
    }

    pub fn importance(mut self, min: f64, max: f64) -> Self {
        self.min_importance = Some(min);
        self.max_importance = Some(max);
        self
    }

    pub fn time_range(mut self, start: f64, end: f64) -> Self {
        self.min_timestamp = Some(start);
        self.max_timestamp = Some(end);
        self
    }

    pub fn episode(mut self, episode_id: impl Into<String>) -> Self {
        self.episode_id = Some(episode_id.into());
        self
    }

    pub fn context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn has_importance_range(&self) -> bool {
        self.min_importance.is_some() || self.max_importance.is_some()
    }

    pub fn has_time_range(&self) -> bool {
        self.min_timestamp.is_some() || self.max_timestamp.is_some()
    }

    /// Tag category against a record's own tag set.
    pub fn matches_tags(&self, record: &Record) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        if self.match_all {
            self.tags.iter().all(|t| record.tags.contains(t))
        } else {
            self.tags.iter().any(|t| record.tags.contains(t))
        }
    }

    pub fn matches_importance(&self, importance: f64) -> bool {
        let min = self.min_importance.unwrap_or(0.0);
        let max = self.max_importance.unwrap_or(1.0);
        min <= importance && importance <= max
    }

    pub fn matches_time(&self, timestamp: f64) -> bool {
        let min = self.min_timestamp.unwrap_or(f64::NEG_INFINITY);
        let max = self.max_timestamp.unwrap_or(f64::INFINITY);
        min <= timestamp && timestamp <= max
    }

    /// Categories that are checked against the record alone: source and metadata.
    pub fn matches_attributes(&self, record: &Record) -> bool {
        if let Some(ref source) = self.source {
            if record.source.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        self.metadata
            .iter()
            .all(|(k, v)| record.metadata.get(k) == Some(v))
    }

    /// Evaluate every category directly against a record.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(ref ctx) = self.context_id {
            if record.relations.context_id.as_deref() != Some(ctx.as_str()) {
                return false;
            }
        }
        if let Some(ref ep) = self.episode_id {
            if record.relations.episode_id.as_deref() != Some(ep.as_str()) {
                return false;
            }
        }
        self.matches_tags(record)
            && self.matches_importance(record.importance())
            && self.matches_time(record.timestamp)
            && self.matches_attributes(record)
    }
}
