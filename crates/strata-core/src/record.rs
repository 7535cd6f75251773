use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::clock::now_secs;
use crate::error::{Result, StrataError};
use crate::types::{MemoryKind, RecordId, Ttl};

/// Importance assigned when none is given.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// The universal unit of storage.
///
/// Every index stores `Record`s. Relation data (memory kind, context,
/// episode, sequence links, model preferences) lives in [`Relations`]
/// rather than in free-form metadata keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordRepr")]
pub struct Record {
    pub id: RecordId,
    /// Opaque payload.
    pub content: Value,
    pub metadata: Map<String, Value>,
    pub source: Option<String>,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Always within `[0, 1]`; use [`Record::set_importance`] to change it.
    importance: f64,
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Relations::is_empty")]
    pub relations: Relations,
}

/// Typed relation data carried by a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Relations {
    /// Routing classification. `None` routes to both key-value and graph indices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<MemoryKind>,
    /// Key-value conversation context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Cross-cutting shared context owned by the hybrid store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_context_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_to: Vec<RecordId>,
    /// Previous record in a singly linked sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Preferences merged into `model_id`'s preference map on insertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Map<String, Value>>,
    /// Expiration policy when the record lands in the key-value index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Ttl>,
}

impl Relations {
    pub fn is_empty(&self) -> bool {
        *self == Relations::default()
    }
}

/// Wire shape accepted when parsing: id, timestamp, and importance may be absent.
#[derive(Deserialize)]
struct RecordRepr {
    #[serde(default)]
    id: Option<String>,
    content: Value,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    importance: Option<f64>,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    relations: Relations,
}

impl TryFrom<RecordRepr> for Record {
    type Error = StrataError;

    fn try_from(repr: RecordRepr) -> Result<Self> {
        if let Some(ts) = repr.timestamp {
            if !ts.is_finite() {
                return Err(StrataError::InvalidRecord(format!(
                    "timestamp {ts} is not finite"
                )));
            }
        }
        let mut record = Record::new(repr.content);
        if let Some(id) = repr.id {
            if id.is_empty() {
                return Err(StrataError::InvalidRecord("empty id".into()));
            }
            record.id = id;
        }
        if let Some(ts) = repr.timestamp {
            record.timestamp = ts;
        }
        record.set_importance(repr.importance.unwrap_or(DEFAULT_IMPORTANCE));
        record.metadata = repr.metadata;
        record.source = repr.source;
        record.tags = repr.tags;
        record.embedding = repr.embedding;
        record.relations = repr.relations;
        Ok(record)
    }
}

impl Record {
    /// Create a record with a fresh id, the current time, and default importance.
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            metadata: Map::new(),
            source: None,
            timestamp: now_secs(),
            importance: DEFAULT_IMPORTANCE,
            tags: BTreeSet::new(),
            embedding: None,
            relations: Relations::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// A non-finite timestamp is ignored; the record keeps its current one.
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        if timestamp.is_finite() {
            self.timestamp = timestamp;
        }
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.set_importance(importance);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.relations.kind = Some(kind);
        self
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.relations.context_id = Some(context_id.into());
        self
    }

    pub fn with_shared_context(mut self, context_id: impl Into<String>) -> Self {
        self.relations.shared_context_id = Some(context_id.into());
        self
    }

    pub fn with_episode(mut self, episode_id: impl Into<String>) -> Self {
        self.relations.episode_id = Some(episode_id.into());
        self
    }

    pub fn with_related<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations.related_to = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_previous(mut self, previous_id: impl Into<String>) -> Self {
        self.relations.previous_id = Some(previous_id.into());
        self
    }

    pub fn with_model_preferences(
        mut self,
        model_id: impl Into<String>,
        preferences: Map<String, Value>,
    ) -> Self {
        self.relations.model_id = Some(model_id.into());
        self.relations.preferences = Some(preferences);
        self
    }

    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.relations.ttl = Some(ttl);
        self
    }

    pub fn importance(&self) -> f64 {
        self.importance
    }

    /// Set importance, clamped into `[0, 1]`. NaN becomes the default.
    pub fn set_importance(&mut self, importance: f64) {
        self.importance = if importance.is_nan() {
            DEFAULT_IMPORTANCE
        } else {
            importance.clamp(0.0, 1.0)
        };
    }

    pub fn kind(&self) -> Option<MemoryKind> {
        self.relations.kind
    }

    /// Content rendered as text: strings verbatim, anything else as JSON.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Name of the content's JSON type, recorded on graph nodes.
    pub fn content_type(&self) -> &'static str {
        match &self.content {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Serialize every field into a string-keyed map.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // Unreachable: a derived struct serializer always yields an object.
            _ => {
                let mut map = Map::new();
                map.insert("id".into(), Value::String(self.id.clone()));
                map.insert("content".into(), self.content.clone());
                map
            }
        }
    }

    /// Parse a record from a map produced by [`Record::to_map`] (or a hand-built one).
    ///
    /// Missing id and timestamp are generated, missing importance defaults to 0.5,
    /// and importance is clamped.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map))
            .map_err(|e| StrataError::InvalidRecord(e.to_string()))
    }
}
