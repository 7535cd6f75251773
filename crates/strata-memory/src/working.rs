use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use strata_core::{
    Clock, ContextId, MemoryFilter, Record, RecordId, Result, ScoredRecord, SystemClock, Ttl,
};

use crate::scoring::{by_score_desc, by_time_asc, substring_score};

/// Default time-to-live for working memory: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// Short-term memory contract: TTL-governed entries grouped by context.
///
/// An expired entry is unobservable by every read, whether or not a sweep
/// has removed it yet.
pub trait KeyValueIndex: Send + Sync {
    /// Store a record. `Ttl::Default` uses the index default.
    fn add(&self, record: Record, ttl: Ttl) -> Result<RecordId>;

    fn get(&self, id: &str) -> Result<Option<Record>>;

    /// Replace a live entry. `ttl: None` keeps the current expiration.
    /// Returns false when the entry is absent or expired.
    fn update(&self, id: &str, record: Record, ttl: Option<Ttl>) -> Result<bool>;

    /// Returns true only if a live entry was removed.
    fn delete(&self, id: &str) -> Result<bool>;

    fn list(&self, filter: &MemoryFilter, limit: usize) -> Result<Vec<Record>>;

    /// Substring search; score is occurrences over content length.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredRecord>>;

    /// Live records, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<Record>>;

    /// Live members of a context in conversation (ascending timestamp) order.
    fn context(&self, context_id: &str) -> Result<Vec<Record>>;

    /// Active sweep: evict every expired entry, returning the evicted ids.
    fn sweep_expired(&self) -> Result<Vec<RecordId>>;

    /// Whether a live entry exists.
    fn contains(&self, id: &str) -> Result<bool>;

    /// Expiration of a live entry.
    fn expires_at(&self, id: &str) -> Result<Option<Expiry>>;

    /// Number of live entries.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Raw entry count, including expired entries not yet swept.
    fn stored_len(&self) -> Result<usize>;

    fn clear(&self) -> Result<bool>;
}

/// When an entry stops being observable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    Never,
    /// Seconds since the Unix epoch.
    At(f64),
}

impl Expiry {
    pub fn is_expired(&self, now: f64) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(at) => now >= *at,
        }
    }
}

struct WorkingEntry {
    seq: u64,
    record: Record,
    expiry: Expiry,
}

#[derive(Default)]
struct WorkingState {
    entries: HashMap<RecordId, WorkingEntry>,
    contexts: HashMap<ContextId, HashSet<RecordId>>,
    next_seq: u64,
}

impl WorkingState {
    fn live(&self, id: &str, now: f64) -> Option<&WorkingEntry> {
        self.entries.get(id).filter(|e| !e.expiry.is_expired(now))
    }

    fn join_context(&mut self, id: &str, context_id: Option<&str>) {
        if let Some(ctx) = context_id {
            self.contexts
                .entry(ctx.to_string())
                .or_default()
                .insert(id.to_string());
        }
    }

    fn leave_context(&mut self, id: &str, context_id: Option<&str>) {
        let Some(ctx) = context_id else { return };
        if let Some(members) = self.contexts.get_mut(ctx) {
            members.remove(id);
            if members.is_empty() {
                self.contexts.remove(ctx);
            }
        }
    }

    /// The single removal path used by delete, lazy expiry, and the sweeper.
    fn remove(&mut self, id: &str) -> Option<WorkingEntry> {
        let entry = self.entries.remove(id)?;
        self.leave_context(id, entry.record.relations.context_id.as_deref());
        Some(entry)
    }
}

/// In-memory working memory with lazy and active expiry.
pub struct InMemoryKeyValueIndex {
    state: RwLock<WorkingState>,
    /// `None` means entries added with `Ttl::Default` never expire.
    default_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryKeyValueIndex {
    fn default() -> Self {
        Self::new(Some(DEFAULT_TTL))
    }
}

impl InMemoryKeyValueIndex {
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            state: RwLock::new(WorkingState::default()),
            default_ttl,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a custom time source for expiry decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    fn expiry_for(&self, ttl: Ttl, now: f64) -> Expiry {
        let after = match ttl {
            Ttl::Never => None,
            Ttl::Default => self.default_ttl,
            Ttl::After(d) => Some(d),
        };
        match after {
            Some(d) => Expiry::At(now + d.as_secs_f64()),
            None => Expiry::Never,
        }
    }

    /// Evict `id` if it has expired, under the write lock.
    fn evict_if_expired(&self, id: &str) {
        let mut state = self.state.write();
        let now = self.clock.now();
        let expired = state
            .entries
            .get(id)
            .is_some_and(|e| e.expiry.is_expired(now));
        if expired {
            state.remove(id);
            debug!(id = %id, "evicted expired entry on read");
        }
    }
}

impl KeyValueIndex for InMemoryKeyValueIndex {
    fn add(&self, record: Record, ttl: Ttl) -> Result<RecordId> {
        let id = record.id.clone();
        let mut state = self.state.write();
        let now = self.clock.now();
        let expiry = self.expiry_for(ttl, now);
        let seq = match state.remove(&id) {
            Some(previous) => previous.seq,
            None => {
                let seq = state.next_seq;
                state.next_seq += 1;
                seq
            }
        };
        state.join_context(&id, record.relations.context_id.as_deref());
        state.entries.insert(id.clone(), WorkingEntry { seq, record, expiry });
        debug!(id = %id, ?expiry, "working entry stored");
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<Record>> {
        {
            let state = self.state.read();
            let now = self.clock.now();
            match state.entries.get(id) {
                None => return Ok(None),
                Some(e) if !e.expiry.is_expired(now) => return Ok(Some(e.record.clone())),
                Some(_) => {}
            }
        }
        // Expired: the read lock is released before evicting under the write lock.
        self.evict_if_expired(id);
        Ok(None)
    }

    fn update(&self, id: &str, mut record: Record, ttl: Option<Ttl>) -> Result<bool> {
        let mut state = self.state.write();
        let now = self.clock.now();
        let Some(current) = state.entries.get(id) else {
            return Ok(false);
        };
        if current.expiry.is_expired(now) {
            state.remove(id);
            return Ok(false);
        }
        let expiry = match ttl {
            Some(ttl) => self.expiry_for(ttl, now),
            None => current.expiry,
        };
        let seq = current.seq;
        let old_context = current.record.relations.context_id.clone();
        record.id = id.to_string();
        let new_context = record.relations.context_id.clone();
        if old_context != new_context {
            state.leave_context(id, old_context.as_deref());
            state.join_context(id, new_context.as_deref());
        }
        state
            .entries
            .insert(id.to_string(), WorkingEntry { seq, record, expiry });
        Ok(true)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write();
        let now = self.clock.now();
        Ok(state
            .remove(id)
            .is_some_and(|e| !e.expiry.is_expired(now)))
    }

    fn list(&self, filter: &MemoryFilter, limit: usize) -> Result<Vec<Record>> {
        let state = self.state.read();
        let now = self.clock.now();
        let mut matches: Vec<&WorkingEntry> = state
            .entries
            .values()
            .filter(|e| !e.expiry.is_expired(now))
            .filter(|e| filter.matches(&e.record))
            .collect();
        matches.sort_by(|a, b| by_time_asc((a.record.timestamp, a.seq), (b.record.timestamp, b.seq)));
        Ok(matches
            .into_iter()
            .take(limit)
            .map(|e| e.record.clone())
            .collect())
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredRecord>> {
        let state = self.state.read();
        let now = self.clock.now();
        let mut scored: Vec<(ScoredRecord, u64)> = state
            .entries
            .values()
            .filter(|e| !e.expiry.is_expired(now))
            .filter_map(|e| {
                substring_score(&e.record.text(), query)
                    .map(|score| (ScoredRecord::new(e.record.clone(), score), e.seq))
            })
            .collect();
        scored.sort_by(|a, b| by_score_desc((a.0.score, a.1), (b.0.score, b.1)));
        Ok(scored.into_iter().take(limit).map(|(r, _)| r).collect())
    }

    fn recent(&self, limit: usize) -> Result<Vec<Record>> {
        let state = self.state.read();
        let now = self.clock.now();
        let mut live: Vec<&WorkingEntry> = state
            .entries
            .values()
            .filter(|e| !e.expiry.is_expired(now))
            .collect();
        live.sort_by(|a, b| by_time_asc((b.record.timestamp, b.seq), (a.record.timestamp, a.seq)));
        Ok(live.into_iter().take(limit).map(|e| e.record.clone()).collect())
    }

    fn context(&self, context_id: &str) -> Result<Vec<Record>> {
        let state = self.state.read();
        let now = self.clock.now();
        let Some(members) = state.contexts.get(context_id) else {
            return Ok(Vec::new());
        };
        let mut live: Vec<&WorkingEntry> = members
            .iter()
            .filter_map(|id| state.live(id, now))
            .collect();
        live.sort_by(|a, b| by_time_asc((a.record.timestamp, a.seq), (b.record.timestamp, b.seq)));
        Ok(live.into_iter().map(|e| e.record.clone()).collect())
    }

    fn sweep_expired(&self) -> Result<Vec<RecordId>> {
        let mut state = self.state.write();
        let now = self.clock.now();
        let expired: Vec<RecordId> = state
            .entries
            .iter()
            .filter(|(_, e)| e.expiry.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            state.remove(id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "swept expired working entries");
        }
        Ok(expired)
    }

    fn contains(&self, id: &str) -> Result<bool> {
        let state = self.state.read();
        Ok(state.live(id, self.clock.now()).is_some())
    }

    fn expires_at(&self, id: &str) -> Result<Option<Expiry>> {
        let state = self.state.read();
        Ok(state.live(id, self.clock.now()).map(|e| e.expiry))
    }

    fn len(&self) -> Result<usize> {
        let state = self.state.read();
        let now = self.clock.now();
        Ok(state
            .entries
            .values()
            .filter(|e| !e.expiry.is_expired(now))
            .count())
    }

    fn stored_len(&self) -> Result<usize> {
        Ok(self.state.read().entries.len())
    }

    fn clear(&self) -> Result<bool> {
        let mut state = self.state.write();
        state.entries.clear();
        state.contexts.clear();
        state.next_seq = 0;
        Ok(true)
    }
}
