use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use strata_core::{Record, RecordId, Result, ScoredRecord, StrataError};

use crate::scoring::{by_score_desc, cosine_similarity};

/// Default length (in chars) of cached preview summaries.
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Semantic memory contract: similarity search over record embeddings.
pub trait VectorIndex: Send + Sync {
    /// Upsert a record by id. Fails with `MissingEmbedding` when the record has no vector.
    fn add(&self, record: Record) -> Result<RecordId>;

    fn get(&self, id: &str) -> Result<Option<Record>>;

    /// Replace a stored record. A record without an embedding keeps the stored vector.
    fn update(&self, id: &str, record: Record) -> Result<bool>;

    /// Remove the vector and its cached preview.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Records by descending cosine similarity to `query`; ties keep insertion order.
    fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>>;

    /// Nearest neighbors of a stored record's own embedding, excluding the record.
    fn related_to(&self, id: &str, limit: usize) -> Result<Vec<ScoredRecord>>;

    /// Read-through cached summary of a stored record.
    fn preview(&self, id: &str) -> Result<Option<Preview>>;

    fn contains(&self, id: &str) -> Result<bool>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Embedding dimension, once known.
    fn dimensions(&self) -> Option<usize>;

    fn clear(&self) -> Result<bool>;
}

/// A lightweight summary of a stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub id: RecordId,
    pub summary: String,
    pub timestamp: f64,
    /// Similarity from the most recent search that returned this record.
    pub score: Option<f64>,
}

struct VectorEntry {
    /// Insertion order; kept across upserts.
    seq: u64,
    record: Record,
}

#[derive(Default)]
struct VectorState {
    entries: HashMap<RecordId, VectorEntry>,
    next_seq: u64,
    dims: Option<usize>,
}

impl VectorState {
    fn check_dims(&self, id: &str, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            return Err(StrataError::MissingEmbedding { id: id.to_string() });
        }
        match self.dims {
            Some(expected) if expected != embedding.len() => Err(StrataError::DimensionMismatch {
                id: id.to_string(),
                expected,
                actual: embedding.len(),
            }),
            _ => Ok(()),
        }
    }

    fn rank(&self, query: &[f32], exclude: Option<&str>, limit: usize) -> Vec<(ScoredRecord, u64)> {
        let mut scored: Vec<(ScoredRecord, u64)> = self
            .entries
            .values()
            .filter(|e| exclude != Some(e.record.id.as_str()))
            .filter_map(|e| {
                e.record.embedding.as_ref().map(|emb| {
                    let similarity = cosine_similarity(query, emb);
                    (ScoredRecord::new(e.record.clone(), f64::from(similarity)), e.seq)
                })
            })
            .collect();
        scored.sort_by(|a, b| by_score_desc((a.0.score, a.1), (b.0.score, b.1)));
        scored.truncate(limit);
        scored
    }
}

/// In-memory vector index with a preview cache.
pub struct InMemoryVectorIndex {
    state: RwLock<VectorState>,
    previews: Mutex<HashMap<RecordId, Preview>>,
    preview_chars: usize,
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVectorIndex {
    /// Dimension is fixed by the first inserted embedding.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(VectorState::default()),
            previews: Mutex::new(HashMap::new()),
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    /// Require every embedding to have exactly `dims` components.
    pub fn with_dimensions(dims: usize) -> Self {
        let index = Self::new();
        index.state.write().dims = Some(dims);
        index
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Number of previews currently cached.
    pub fn cached_previews(&self) -> usize {
        self.previews.lock().len()
    }

    fn make_preview(&self, record: &Record, score: Option<f64>) -> Preview {
        Preview {
            id: record.id.clone(),
            summary: record.text().chars().take(self.preview_chars).collect(),
            timestamp: record.timestamp,
            score,
        }
    }

    /// Callers hold the state lock so a concurrent delete cannot interleave
    /// and leave a preview behind. Lock order is always state, then previews.
    fn cache_scores(&self, results: &[ScoredRecord]) {
        let mut previews = self.previews.lock();
        for r in results {
            previews.insert(r.record.id.clone(), self.make_preview(&r.record, Some(r.score)));
        }
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn add(&self, record: Record) -> Result<RecordId> {
        let Some(ref embedding) = record.embedding else {
            return Err(StrataError::MissingEmbedding { id: record.id });
        };
        let id = record.id.clone();
        {
            let mut state = self.state.write();
            state.check_dims(&id, embedding)?;
            if state.dims.is_none() {
                state.dims = Some(embedding.len());
            }
            let seq = match state.entries.get(&id) {
                Some(existing) => existing.seq,
                None => {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    seq
                }
            };
            state.entries.insert(id.clone(), VectorEntry { seq, record });
            self.previews.lock().remove(&id);
        }
        debug!(id = %id, "vector stored");
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.state.read().entries.get(id).map(|e| e.record.clone()))
    }

    fn update(&self, id: &str, mut record: Record) -> Result<bool> {
        record.id = id.to_string();
        {
            let mut state = self.state.write();
            let Some(existing) = state.entries.get(id) else {
                return Ok(false);
            };
            if let Some(embedding) = record.embedding.as_deref() {
                state.check_dims(id, embedding)?;
            }
            if record.embedding.is_none() {
                record.embedding = existing.record.embedding.clone();
            }
            if let Some(entry) = state.entries.get_mut(id) {
                entry.record = record;
            }
            self.previews.lock().remove(id);
        }
        Ok(true)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write();
        let removed = state.entries.remove(id).is_some();
        self.previews.lock().remove(id);
        Ok(removed)
    }

    fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let state = self.state.read();
        if let Some(expected) = state.dims {
            if query.len() != expected {
                return Err(StrataError::DimensionMismatch {
                    id: "<query>".into(),
                    expected,
                    actual: query.len(),
                });
            }
        }
        let results: Vec<ScoredRecord> =
            state.rank(query, None, limit).into_iter().map(|(r, _)| r).collect();
        self.cache_scores(&results);
        Ok(results)
    }

    fn related_to(&self, id: &str, limit: usize) -> Result<Vec<ScoredRecord>> {
        let state = self.state.read();
        let Some(query) = state.entries.get(id).and_then(|e| e.record.embedding.as_deref()) else {
            return Ok(Vec::new());
        };
        let results: Vec<ScoredRecord> =
            state.rank(query, Some(id), limit).into_iter().map(|(r, _)| r).collect();
        self.cache_scores(&results);
        Ok(results)
    }

    fn preview(&self, id: &str) -> Result<Option<Preview>> {
        let state = self.state.read();
        let Some(entry) = state.entries.get(id) else {
            return Ok(None);
        };
        let mut previews = self.previews.lock();
        let preview = previews
            .entry(id.to_string())
            .or_insert_with(|| self.make_preview(&entry.record, None));
        Ok(Some(preview.clone()))
    }

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.state.read().entries.contains_key(id))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.state.read().entries.len())
    }

    fn dimensions(&self) -> Option<usize> {
        self.state.read().dims
    }

    fn clear(&self) -> Result<bool> {
        let mut state = self.state.write();
        state.entries.clear();
        state.next_seq = 0;
        self.previews.lock().clear();
        Ok(true)
    }
}
