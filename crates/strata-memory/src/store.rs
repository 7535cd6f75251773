use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use strata_config::MemoryConfig;
use strata_core::{
    Clock, Embedder, MemoryFilter, MemoryKind, Record, RecordId, Result, ScoredRecord,
    StrataError, SystemClock, Ttl,
};

use crate::graph::{GraphIndex, InMemoryGraphIndex};
use crate::scoring::by_time_asc;
use crate::semantic::{DEFAULT_PREVIEW_CHARS, InMemoryVectorIndex, VectorIndex};
use crate::working::{DEFAULT_TTL, InMemoryKeyValueIndex, KeyValueIndex};

/// Unified memory store fanning records out across the three substrates.
///
/// - **Vector index**: semantic search over embeddings (every record that has one).
/// - **Key-value index**: short-term, TTL-bound records grouped by context.
/// - **Graph index**: long-term and episodic records with tag, importance, and episode indices.
///
/// The store also owns per-model preference maps and shared-context membership.
/// Fan-out is best-effort: there are no cross-index transactions.
pub struct HybridStore {
    vector: Arc<dyn VectorIndex>,
    working: Arc<dyn KeyValueIndex>,
    graph: Arc<dyn GraphIndex>,
    embedder: Option<Arc<dyn Embedder>>,
    models: RwLock<HashMap<String, Map<String, Value>>>,
    shared: RwLock<SharedContexts>,
}

/// Shared-context membership. Each member carries its join sequence number,
/// kept across re-joins, for a stable order among equal timestamps.
#[derive(Default)]
struct SharedContexts {
    members: HashMap<String, HashMap<RecordId, u64>>,
    next_seq: u64,
}

/// Record counts per substrate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub vectors: usize,
    pub key_values: usize,
    pub graph_records: usize,
    pub shared_contexts: usize,
    pub models: usize,
}

/// Assembles a [`HybridStore`] from custom or default in-memory indices.
pub struct HybridStoreBuilder {
    vector: Option<Arc<dyn VectorIndex>>,
    working: Option<Arc<dyn KeyValueIndex>>,
    graph: Option<Arc<dyn GraphIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
    default_ttl: Option<Duration>,
    embedding_dims: Option<usize>,
    preview_chars: usize,
    clock: Arc<dyn Clock>,
}

impl Default for HybridStoreBuilder {
    fn default() -> Self {
        Self {
            vector: None,
            working: None,
            graph: None,
            embedder: None,
            default_ttl: Some(DEFAULT_TTL),
            embedding_dims: None,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            clock: Arc::new(SystemClock),
        }
    }
}

impl HybridStoreBuilder {
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector = Some(index);
        self
    }

    pub fn key_value_index(mut self, index: Arc<dyn KeyValueIndex>) -> Self {
        self.working = Some(index);
        self
    }

    pub fn graph_index(mut self, index: Arc<dyn GraphIndex>) -> Self {
        self.graph = Some(index);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Default TTL of the built-in key-value index. `None` = never expire.
    pub fn default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Fixed embedding dimension of the built-in vector index.
    pub fn embedding_dims(mut self, dims: usize) -> Self {
        self.embedding_dims = Some(dims);
        self
    }

    pub fn preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Time source of the built-in key-value index.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> HybridStore {
        let vector = self.vector.unwrap_or_else(|| {
            let index = match self.embedding_dims {
                Some(dims) => InMemoryVectorIndex::with_dimensions(dims),
                None => InMemoryVectorIndex::new(),
            };
            Arc::new(index.with_preview_chars(self.preview_chars))
        });
        let working = self.working.unwrap_or_else(|| {
            Arc::new(InMemoryKeyValueIndex::new(self.default_ttl).with_clock(self.clock))
        });
        let graph = self
            .graph
            .unwrap_or_else(|| Arc::new(InMemoryGraphIndex::new()));

        HybridStore {
            vector,
            working,
            graph,
            embedder: self.embedder,
            models: RwLock::new(HashMap::new()),
            shared: RwLock::new(SharedContexts::default()),
        }
    }
}

impl Default for HybridStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridStore {
    /// An in-memory store with default settings and no embedder.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HybridStoreBuilder {
        HybridStoreBuilder::default()
    }

    /// Build an in-memory store from the `[memory]` config section.
    ///
    /// The background sweep is started separately, inside a runtime, with
    /// [`HybridStore::spawn_sweeper_from_config`].
    pub fn from_config(config: &MemoryConfig, embedder: Option<Arc<dyn Embedder>>) -> Self {
        info!(
            default_ttl_secs = config.default_ttl_secs,
            embedding_dims = config.embedding_dims,
            "creating hybrid memory store"
        );
        let mut builder = Self::builder()
            .default_ttl(config.default_ttl())
            .preview_chars(config.preview_chars);
        if let Some(dims) = config.embedding_dims() {
            builder = builder.embedding_dims(dims);
        }
        if let Some(embedder) = embedder {
            builder = builder.embedder(embedder);
        }
        builder.build()
    }

    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vector
    }

    pub fn key_value_index(&self) -> &Arc<dyn KeyValueIndex> {
        &self.working
    }

    pub fn graph_index(&self) -> &Arc<dyn GraphIndex> {
        &self.graph
    }

    // ── Embedding ──────────────────────────────────────────────

    /// Stamp an embedding onto a record that lacks one. Failure only logs.
    fn ensure_embedding(&self, record: &mut Record) {
        if record.embedding.is_some() {
            return;
        }
        let Some(ref embedder) = self.embedder else {
            return;
        };
        match embedder.embed(&record.text()) {
            Ok(embedding) if embedding.is_empty() => {
                warn!(id = %record.id, provider = embedder.name(), "embedder returned an empty vector")
            }
            Ok(embedding) => match self.vector.dimensions() {
                Some(expected) if expected != embedding.len() => warn!(
                    id = %record.id,
                    provider = embedder.name(),
                    expected,
                    actual = embedding.len(),
                    "embedder dimension does not match the vector index, skipping vector index"
                ),
                _ => record.embedding = Some(embedding),
            },
            Err(e) => {
                warn!(id = %record.id, provider = embedder.name(), error = %e, "embedding failed, skipping vector index")
            }
        }
    }

    fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let Some(ref embedder) = self.embedder else {
            debug!("no embedder configured, semantic search skipped");
            return None;
        };
        match embedder.embed(query) {
            Ok(embedding) if embedding.is_empty() => None,
            Ok(embedding) => match self.vector.dimensions() {
                Some(expected) if expected != embedding.len() => {
                    warn!(
                        provider = embedder.name(),
                        expected,
                        actual = embedding.len(),
                        "query embedding dimension does not match the vector index"
                    );
                    None
                }
                _ => Some(embedding),
            },
            Err(e) => {
                warn!(provider = embedder.name(), error = %e, "query embedding failed");
                None
            }
        }
    }

    /// Reject an embedding the vector index would refuse, before anything is
    /// mutated.
    fn check_embedding(&self, record: &Record) -> Result<()> {
        let Some(ref embedding) = record.embedding else {
            return Ok(());
        };
        if embedding.is_empty() {
            return Err(StrataError::MissingEmbedding {
                id: record.id.clone(),
            });
        }
        match self.vector.dimensions() {
            Some(expected) if expected != embedding.len() => Err(StrataError::DimensionMismatch {
                id: record.id.clone(),
                expected,
                actual: embedding.len(),
            }),
            _ => Ok(()),
        }
    }

    // ── Auxiliary maps ─────────────────────────────────────────

    fn merge_model_preferences(&self, model_id: &str, preferences: &Map<String, Value>) {
        let mut models = self.models.write();
        let entry = models.entry(model_id.to_string()).or_default();
        for (k, v) in preferences {
            entry.insert(k.clone(), v.clone());
        }
    }

    fn join_shared(&self, context_id: &str, id: &str) {
        let mut guard = self.shared.write();
        let shared = &mut *guard;
        let members = shared.members.entry(context_id.to_string()).or_default();
        if !members.contains_key(id) {
            members.insert(id.to_string(), shared.next_seq);
            shared.next_seq += 1;
        }
    }

    fn leave_shared(&self, context_id: &str, id: &str) -> bool {
        let mut shared = self.shared.write();
        let Some(members) = shared.members.get_mut(context_id) else {
            return false;
        };
        let removed = members.remove(id).is_some();
        if members.is_empty() {
            shared.members.remove(context_id);
        }
        removed
    }

    fn leave_all_shared(&self, id: &str) -> bool {
        let mut shared = self.shared.write();
        let mut removed = false;
        shared.members.retain(|_, members| {
            removed |= members.remove(id).is_some();
            !members.is_empty()
        });
        removed
    }

    // ── Core operations ────────────────────────────────────────

    /// Whether any index holds `id`.
    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.working.contains(id)? || self.graph.contains(id)? || self.vector.contains(id)?)
    }

    /// Add a record, routing it by memory kind:
    ///
    /// - `short_term` → key-value index
    /// - `long_term` / `episodic` → graph index
    /// - unset → both
    ///
    /// The vector index receives every record that has (or can be given) an
    /// embedding; without one the vector step is skipped. Re-adding an existing
    /// id replaces the prior record everywhere. A record the vector index
    /// would reject fails before the prior record is touched.
    pub fn add(&self, mut record: Record) -> Result<RecordId> {
        self.ensure_embedding(&mut record);
        self.check_embedding(&record)?;
        if self.contains(&record.id)? {
            debug!(id = %record.id, "id already stored, replacing");
            self.delete(&record.id)?;
        }

        let id = record.id.clone();
        let (to_working, to_graph) = match record.kind() {
            None => (true, true),
            Some(MemoryKind::ShortTerm) => (true, false),
            Some(MemoryKind::LongTerm | MemoryKind::Episodic) => (false, true),
        };

        if record.embedding.is_some() {
            self.vector.add(record.clone())?;
        } else {
            debug!(id = %id, "no embedding, vector index skipped");
        }
        if to_working {
            let ttl = record.relations.ttl.unwrap_or_default();
            self.working.add(record.clone(), ttl)?;
        }
        if to_graph {
            self.graph.add(record.clone())?;
        }

        if let (Some(model_id), Some(preferences)) =
            (&record.relations.model_id, &record.relations.preferences)
        {
            self.merge_model_preferences(model_id, preferences);
        }
        if let Some(ref ctx) = record.relations.shared_context_id {
            self.join_shared(ctx, &id);
        }

        debug!(id = %id, kind = ?record.kind(), working = to_working, graph = to_graph, "record added");
        Ok(id)
    }

    /// Look up a record, fastest substrate first: key-value, graph, vector.
    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        if let Some(record) = self.working.get(id)? {
            return Ok(Some(record));
        }
        if let Some(record) = self.graph.get(id)? {
            return Ok(Some(record));
        }
        self.vector.get(id)
    }

    /// Update `id` in every index that currently holds it and recompute its
    /// shared-context membership. Returns true if anything changed.
    pub fn update(&self, id: &str, mut record: Record) -> Result<bool> {
        let prior = self.get(id)?;
        record.id = id.to_string();
        self.ensure_embedding(&mut record);

        let mut changed = false;
        if self.vector.contains(id)? {
            changed |= self.vector.update(id, record.clone())?;
        }
        if self.working.contains(id)? {
            changed |= self
                .working
                .update(id, record.clone(), record.relations.ttl)?;
        }
        if self.graph.contains(id)? {
            changed |= self.graph.update(id, record.clone())?;
        }

        if let (Some(model_id), Some(preferences)) =
            (&record.relations.model_id, &record.relations.preferences)
        {
            self.merge_model_preferences(model_id, preferences);
            changed = true;
        }

        if let Some(prior) = prior {
            if let Some(ref old_ctx) = prior.relations.shared_context_id {
                self.leave_shared(old_ctx, id);
            }
            if let Some(ref new_ctx) = record.relations.shared_context_id {
                self.join_shared(new_ctx, id);
            }
        }
        Ok(changed)
    }

    /// Delete `id` from every index and every shared context.
    /// Returns true if anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut removed = false;
        removed |= self.vector.delete(id)?;
        removed |= self.working.delete(id)?;
        removed |= self.graph.delete(id)?;
        removed |= self.leave_all_shared(id);
        if removed {
            debug!(id = %id, "record deleted");
        }
        Ok(removed)
    }

    /// Search every substrate and merge by id, keeping the best score.
    /// On equal scores the vector-index result wins.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredRecord>> {
        let vector_results = self.semantic_search(query, limit)?;
        let working_results = self.working.search(query, limit)?;
        let graph_results = self.graph.search(query, limit)?;

        let mut merged: Vec<ScoredRecord> = Vec::new();
        let mut positions: HashMap<RecordId, usize> = HashMap::new();
        for result in vector_results
            .into_iter()
            .chain(working_results)
            .chain(graph_results)
        {
            match positions.get(result.id()) {
                Some(&i) => {
                    if result.score > merged[i].score {
                        merged[i] = result;
                    }
                }
                None => {
                    positions.insert(result.id().to_string(), merged.len());
                    merged.push(result);
                }
            }
        }

        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(limit);
        Ok(merged)
    }

    /// List records. A filter naming one memory kind consults only the owning
    /// index; otherwise key-value and graph results are unioned by id.
    pub fn list(&self, filter: &MemoryFilter, limit: usize) -> Result<Vec<Record>> {
        match filter.kind {
            Some(MemoryKind::ShortTerm) => return self.working.list(filter, limit),
            Some(MemoryKind::LongTerm | MemoryKind::Episodic) => {
                return self.graph.list(filter, limit);
            }
            None => {}
        }

        let mut seen = std::collections::HashSet::new();
        let combined: Vec<Record> = self
            .working
            .list(filter, limit)?
            .into_iter()
            .chain(self.graph.list(filter, limit)?)
            .filter(|r| seen.insert(r.id.clone()))
            .take(limit)
            .collect();
        Ok(combined)
    }

    /// Clear every index and both auxiliary maps.
    /// Returns true only if every index reported a successful clear.
    pub fn clear(&self) -> Result<bool> {
        let vector_ok = self.vector.clear()?;
        let working_ok = self.working.clear()?;
        let graph_ok = self.graph.clear()?;
        self.models.write().clear();
        self.shared.write().members.clear();
        info!("hybrid memory cleared");
        Ok(vector_ok && working_ok && graph_ok)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            vectors: self.vector.len()?,
            key_values: self.working.len()?,
            graph_records: self.graph.len()?,
            shared_contexts: self.shared.read().members.len(),
            models: self.models.read().len(),
        })
    }

    /// Run one active TTL sweep and drop shared-context memberships of ids no
    /// index holds anymore. Returns the number of evicted key-value entries.
    pub fn sweep_expired(&self) -> Result<usize> {
        let evicted = self.working.sweep_expired()?;
        for id in &evicted {
            if !self.graph.contains(id)? && !self.vector.contains(id)? {
                self.leave_all_shared(id);
            }
        }
        Ok(evicted.len())
    }

    // ── Short-term (key-value) ─────────────────────────────────

    pub fn recent(&self, limit: usize) -> Result<Vec<Record>> {
        self.working.recent(limit)
    }

    pub fn context(&self, context_id: &str) -> Result<Vec<Record>> {
        self.working.context(context_id)
    }

    /// Add straight to the key-value index with an explicit TTL, bypassing routing.
    pub fn add_short_term(&self, mut record: Record, ttl: Ttl) -> Result<RecordId> {
        record.relations.kind = Some(MemoryKind::ShortTerm);
        record.relations.ttl = Some(ttl);
        self.add(record)
    }

    // ── Long-term / episodic (graph) ───────────────────────────

    pub fn by_importance(&self, min: f64, max: f64, limit: usize) -> Result<Vec<Record>> {
        self.graph.by_importance(min, max, limit)
    }

    pub fn by_tags(&self, tags: &[String], match_all: bool, limit: usize) -> Result<Vec<Record>> {
        self.graph.by_tags(tags, match_all, limit)
    }

    pub fn by_time_range(&self, start: f64, end: f64, limit: usize) -> Result<Vec<Record>> {
        self.graph.by_time_range(start, end, limit)
    }

    pub fn episode_members(&self, episode_id: &str) -> Result<Vec<Record>> {
        self.graph.episode_members(episode_id)
    }

    // ── Semantic (vector) ──────────────────────────────────────

    /// Embed `query` and search the vector index. Without a usable embedding
    /// the result is empty rather than an error.
    pub fn semantic_search(&self, query: &str, limit: usize) -> Result<Vec<ScoredRecord>> {
        match self.embed_query(query) {
            Some(embedding) => self.vector.search(&embedding, limit),
            None => Ok(Vec::new()),
        }
    }

    /// Search the vector index with a caller-supplied embedding.
    pub fn semantic_search_vector(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        if query.is_empty() {
            return Err(StrataError::MissingEmbedding { id: "<query>".into() });
        }
        self.vector.search(query, limit)
    }

    pub fn related_to(&self, id: &str, limit: usize) -> Result<Vec<ScoredRecord>> {
        self.vector.related_to(id, limit)
    }

    // ── Model preferences ──────────────────────────────────────

    pub fn get_model_preferences(&self, model_id: &str) -> Map<String, Value> {
        self.models.read().get(model_id).cloned().unwrap_or_default()
    }

    /// Replace a model's preference map wholesale.
    pub fn set_model_preferences(&self, model_id: &str, preferences: Map<String, Value>) -> bool {
        self.models.write().insert(model_id.to_string(), preferences);
        true
    }

    // ── Shared context ─────────────────────────────────────────

    /// Members of a shared context that are still stored, ascending by
    /// timestamp. Equal timestamps keep join order.
    pub fn get_shared_context(&self, context_id: &str) -> Result<Vec<Record>> {
        let members: Vec<(RecordId, u64)> = match self.shared.read().members.get(context_id) {
            Some(members) => members.iter().map(|(id, seq)| (id.clone(), *seq)).collect(),
            None => return Ok(Vec::new()),
        };
        let mut records = Vec::with_capacity(members.len());
        for (id, seq) in &members {
            if let Some(record) = self.get(id)? {
                records.push((record, *seq));
            }
        }
        records.sort_by(|a, b| by_time_asc((a.0.timestamp, a.1), (b.0.timestamp, b.1)));
        Ok(records.into_iter().map(|(r, _)| r).collect())
    }

    /// Stamp `context_id` onto the record and add it.
    pub fn add_to_shared_context(&self, context_id: &str, mut record: Record) -> Result<RecordId> {
        record.relations.shared_context_id = Some(context_id.to_string());
        self.add(record)
    }
}
