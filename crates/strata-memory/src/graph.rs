use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use strata_core::{EpisodeId, MemoryFilter, Record, RecordId, Result, ScoredRecord};

use crate::scoring::{
    bucket_value, by_score_desc, by_time_asc, importance_bucket, weighted_substring_score,
};

/// Long-term and episodic memory contract: a node/edge graph with tag,
/// importance-bucket, and episode indices.
///
/// No index entry or edge may reference a record the graph no longer holds.
pub trait GraphIndex: Send + Sync {
    /// Insert a record as a node and derive its edges. Re-adding an id replaces it.
    fn add(&self, record: Record) -> Result<RecordId>;

    fn get(&self, id: &str) -> Result<Option<Record>>;

    /// Retract every derived entry for `id`, replace the record, and rebuild.
    fn update(&self, id: &str, record: Record) -> Result<bool>;

    /// Remove the node, the record, every edge touching it, and all index entries.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Substring search weighted by importance.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredRecord>>;

    /// Filter categories intersect; within tags, `match_all` selects intersection.
    fn list(&self, filter: &MemoryFilter, limit: usize) -> Result<Vec<Record>>;

    /// Records with `start <= timestamp <= end`, ascending by timestamp.
    fn by_time_range(&self, start: f64, end: f64, limit: usize) -> Result<Vec<Record>>;

    /// Members of an episode, ascending by timestamp.
    fn episode_members(&self, episode_id: &str) -> Result<Vec<Record>>;

    /// Records whose importance bucket lies in `[min, max]`, most important first.
    fn by_importance(&self, min: f64, max: f64, limit: usize) -> Result<Vec<Record>>;

    /// Records carrying any (or all) of `tags`, most important first.
    fn by_tags(&self, tags: &[String], match_all: bool, limit: usize) -> Result<Vec<Record>>;

    /// Every edge touching `id`, in either direction.
    fn neighbors(&self, id: &str) -> Result<Vec<Edge>>;

    fn node(&self, id: &str) -> Result<Option<Node>>;

    fn contains(&self, id: &str) -> Result<bool>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn clear(&self) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Record → explicitly related record.
    RelatedTo,
    /// Record → its episode node.
    PartOfEpisode,
    /// Previous record → next record in a sequence.
    Next,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::RelatedTo => "RELATED_TO",
            EdgeKind::PartOfEpisode => "PART_OF_EPISODE",
            EdgeKind::Next => "NEXT",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    /// Timestamp of the record whose insertion created the edge.
    pub timestamp: f64,
}

impl Edge {
    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Record,
    Episode,
}

/// A graph node. Record nodes carry scalar properties of their record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub properties: Map<String, Value>,
}

impl Node {
    fn episode(id: &str) -> Self {
        let mut properties = Map::new();
        properties.insert("type".into(), Value::String("episode".into()));
        Self {
            id: id.to_string(),
            kind: NodeKind::Episode,
            properties,
        }
    }

    fn for_record(record: &Record) -> Self {
        let mut properties = Map::new();
        properties.insert("content_type".into(), Value::String(record.content_type().into()));
        properties.insert("timestamp".into(), Value::from(record.timestamp));
        properties.insert("importance".into(), Value::from(record.importance()));
        properties.insert(
            "source".into(),
            record.source.clone().map(Value::String).unwrap_or(Value::Null),
        );
        properties.insert(
            "tags".into(),
            Value::Array(record.tags.iter().cloned().map(Value::String).collect()),
        );
        // Only scalar metadata values become node properties.
        for (key, value) in &record.metadata {
            if !value.is_array() && !value.is_object() {
                properties.insert(format!("metadata_{key}"), value.clone());
            }
        }
        Self {
            id: record.id.clone(),
            kind: NodeKind::Record,
            properties,
        }
    }
}

struct GraphEntry {
    seq: u64,
    record: Record,
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<String, Node>,
    edges: Vec<Edge>,
    records: HashMap<RecordId, GraphEntry>,
    episodes: HashMap<EpisodeId, HashSet<RecordId>>,
    tags: HashMap<String, HashSet<RecordId>>,
    /// Importance in tenths → ids.
    importance: BTreeMap<u8, HashSet<RecordId>>,
    next_seq: u64,
}

impl GraphState {
    // ── Index maintenance ──────────────────────────────────────

    fn index(&mut self, record: &Record) {
        for tag in &record.tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(record.id.clone());
        }
        self.importance
            .entry(importance_bucket(record.importance()))
            .or_default()
            .insert(record.id.clone());
    }

    fn unindex(&mut self, record: &Record) {
        let id = record.id.as_str();
        for tag in &record.tags {
            if let Some(ids) = self.tags.get_mut(tag) {
                ids.remove(id);
                if ids.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
        let bucket = importance_bucket(record.importance());
        if let Some(ids) = self.importance.get_mut(&bucket) {
            ids.remove(id);
            if ids.is_empty() {
                self.importance.remove(&bucket);
            }
        }
    }

    // ── Edge derivation ────────────────────────────────────────

    /// Derive the edges a record's relations imply.
    fn link(&mut self, record: &Record) {
        let id = record.id.as_str();
        let relations = &record.relations;

        for related in &relations.related_to {
            if related != id && self.records.contains_key(related) {
                self.edges.push(Edge {
                    source: id.to_string(),
                    target: related.clone(),
                    kind: EdgeKind::RelatedTo,
                    timestamp: record.timestamp,
                });
            }
        }

        if let Some(ref episode) = relations.episode_id {
            self.nodes
                .entry(episode.clone())
                .or_insert_with(|| Node::episode(episode));
            self.edges.push(Edge {
                source: id.to_string(),
                target: episode.clone(),
                kind: EdgeKind::PartOfEpisode,
                timestamp: record.timestamp,
            });
            self.episodes
                .entry(episode.clone())
                .or_default()
                .insert(id.to_string());
        }

        if let Some(ref previous) = relations.previous_id {
            if previous != id && self.records.contains_key(previous) {
                self.edges.push(Edge {
                    source: previous.clone(),
                    target: id.to_string(),
                    kind: EdgeKind::Next,
                    timestamp: record.timestamp,
                });
            }
        }
    }

    /// Retract the edges and episode membership `link` derived for `record`.
    /// Edges other records created toward it are kept.
    fn unlink(&mut self, record: &Record) {
        let id = record.id.as_str();
        self.edges.retain(|e| match e.kind {
            EdgeKind::RelatedTo | EdgeKind::PartOfEpisode => e.source != id,
            EdgeKind::Next => e.target != id,
        });
        if let Some(ref episode) = record.relations.episode_id {
            self.leave_episode(id, episode);
        }
    }

    fn leave_episode(&mut self, id: &str, episode: &str) {
        let Some(members) = self.episodes.get_mut(episode) else {
            return;
        };
        members.remove(id);
        if members.is_empty() {
            self.episodes.remove(episode);
            let is_episode_node = self
                .nodes
                .get(episode)
                .is_some_and(|n| n.kind == NodeKind::Episode);
            if is_episode_node {
                self.nodes.remove(episode);
                self.edges.retain(|e| !e.touches(episode));
                debug!(episode = %episode, "pruned empty episode");
            }
        }
    }

    // ── Record lifecycle ───────────────────────────────────────

    fn insert(&mut self, record: Record, seq: u64) {
        self.nodes.insert(record.id.clone(), Node::for_record(&record));
        self.link(&record);
        self.index(&record);
        self.records.insert(record.id.clone(), GraphEntry { seq, record });
    }

    /// Retract everything derived from the stored record, returning its entry.
    fn retract(&mut self, id: &str) -> Option<GraphEntry> {
        let entry = self.records.remove(id)?;
        self.unindex(&entry.record);
        self.unlink(&entry.record);
        Some(entry)
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn entries<'a>(&'a self, ids: impl IntoIterator<Item = &'a RecordId>) -> Vec<&'a GraphEntry> {
        ids.into_iter().filter_map(|id| self.records.get(id)).collect()
    }

    fn ids_with_tags(&self, tags: &[String], match_all: bool) -> HashSet<RecordId> {
        if match_all {
            let mut sets = tags.iter().map(|t| self.tags.get(t));
            let Some(Some(first)) = sets.next() else {
                return HashSet::new();
            };
            let mut acc = first.clone();
            for set in sets {
                match set {
                    Some(ids) => acc.retain(|id| ids.contains(id)),
                    None => return HashSet::new(),
                }
            }
            acc
        } else {
            tags.iter()
                .filter_map(|t| self.tags.get(t))
                .flat_map(|ids| ids.iter().cloned())
                .collect()
        }
    }

    fn ids_in_importance(&self, min: f64, max: f64) -> HashSet<RecordId> {
        self.importance
            .iter()
            .filter(|(bucket, _)| {
                let value = bucket_value(**bucket);
                min <= value && value <= max
            })
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }
}

fn sorted_by_time(mut entries: Vec<&GraphEntry>) -> Vec<&GraphEntry> {
    entries.sort_by(|a, b| by_time_asc((a.record.timestamp, a.seq), (b.record.timestamp, b.seq)));
    entries
}

fn sorted_by_importance(mut entries: Vec<&GraphEntry>) -> Vec<&GraphEntry> {
    entries.sort_by(|a, b| {
        by_score_desc((a.record.importance(), a.seq), (b.record.importance(), b.seq))
    });
    entries
}

fn records(entries: Vec<&GraphEntry>, limit: usize) -> Vec<Record> {
    entries
        .into_iter()
        .take(limit)
        .map(|e| e.record.clone())
        .collect()
}

/// In-memory graph index.
#[derive(Default)]
pub struct InMemoryGraphIndex {
    state: RwLock<GraphState>,
}

impl InMemoryGraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of edges currently stored.
    pub fn edge_count(&self) -> usize {
        self.state.read().edges.len()
    }

    /// Ids of the episodes currently holding members.
    pub fn episodes(&self) -> Vec<EpisodeId> {
        let mut ids: Vec<EpisodeId> = self.state.read().episodes.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl GraphIndex for InMemoryGraphIndex {
    fn add(&self, record: Record) -> Result<RecordId> {
        let id = record.id.clone();
        let mut state = self.state.write();
        let seq = match state.retract(&id) {
            Some(previous) => previous.seq,
            None => state.next_seq(),
        };
        state.insert(record, seq);
        debug!(id = %id, "graph node stored");
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.state.read().records.get(id).map(|e| e.record.clone()))
    }

    fn update(&self, id: &str, mut record: Record) -> Result<bool> {
        let mut state = self.state.write();
        let Some(previous) = state.retract(id) else {
            return Ok(false);
        };
        record.id = id.to_string();
        state.insert(record, previous.seq);
        Ok(true)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write();
        if state.retract(id).is_none() {
            return Ok(false);
        }
        state.nodes.remove(id);
        state.edges.retain(|e| !e.touches(id));
        debug!(id = %id, "graph node deleted");
        Ok(true)
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredRecord>> {
        let state = self.state.read();
        let mut scored: Vec<(ScoredRecord, u64)> = state
            .records
            .values()
            .filter_map(|e| {
                weighted_substring_score(&e.record.text(), query, e.record.importance())
                    .map(|score| (ScoredRecord::new(e.record.clone(), score), e.seq))
            })
            .collect();
        scored.sort_by(|a, b| by_score_desc((a.0.score, a.1), (b.0.score, b.1)));
        Ok(scored.into_iter().take(limit).map(|(r, _)| r).collect())
    }

    fn list(&self, filter: &MemoryFilter, limit: usize) -> Result<Vec<Record>> {
        let state = self.state.read();
        let mut candidates: HashSet<RecordId> = state.records.keys().cloned().collect();

        if !filter.tags.is_empty() {
            let tagged = state.ids_with_tags(&filter.tags, filter.match_all);
            candidates.retain(|id| tagged.contains(id));
        }
        if filter.has_importance_range() {
            let bucketed = state.ids_in_importance(
                filter.min_importance.unwrap_or(0.0),
                filter.max_importance.unwrap_or(1.0),
            );
            candidates.retain(|id| bucketed.contains(id));
        }
        if let Some(ref episode) = filter.episode_id {
            match state.episodes.get(episode) {
                Some(members) => candidates.retain(|id| members.contains(id)),
                None => candidates.clear(),
            }
        }

        let matching: Vec<&GraphEntry> = state
            .entries(candidates.iter())
            .into_iter()
            .filter(|e| filter.matches_time(e.record.timestamp))
            .filter(|e| match filter.context_id {
                Some(ref ctx) => e.record.relations.context_id.as_deref() == Some(ctx.as_str()),
                None => true,
            })
            .filter(|e| filter.matches_attributes(&e.record))
            .collect();
        Ok(records(sorted_by_time(matching), limit))
    }

    fn by_time_range(&self, start: f64, end: f64, limit: usize) -> Result<Vec<Record>> {
        let state = self.state.read();
        let matching: Vec<&GraphEntry> = state
            .records
            .values()
            .filter(|e| start <= e.record.timestamp && e.record.timestamp <= end)
            .collect();
        Ok(records(sorted_by_time(matching), limit))
    }

    fn episode_members(&self, episode_id: &str) -> Result<Vec<Record>> {
        let state = self.state.read();
        let Some(members) = state.episodes.get(episode_id) else {
            return Ok(Vec::new());
        };
        let entries = state.entries(members.iter());
        Ok(records(sorted_by_time(entries), usize::MAX))
    }

    fn by_importance(&self, min: f64, max: f64, limit: usize) -> Result<Vec<Record>> {
        let state = self.state.read();
        let ids = state.ids_in_importance(min, max);
        let entries = state.entries(ids.iter());
        Ok(records(sorted_by_importance(entries), limit))
    }

    fn by_tags(&self, tags: &[String], match_all: bool, limit: usize) -> Result<Vec<Record>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        let ids = state.ids_with_tags(tags, match_all);
        let entries = state.entries(ids.iter());
        Ok(records(sorted_by_importance(entries), limit))
    }

    fn neighbors(&self, id: &str) -> Result<Vec<Edge>> {
        Ok(self
            .state
            .read()
            .edges
            .iter()
            .filter(|e| e.touches(id))
            .cloned()
            .collect())
    }

    fn node(&self, id: &str) -> Result<Option<Node>> {
        Ok(self.state.read().nodes.get(id).cloned())
    }

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.state.read().records.contains_key(id))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.state.read().records.len())
    }

    fn clear(&self) -> Result<bool> {
        *self.state.write() = GraphState::default();
        Ok(true)
    }
}
