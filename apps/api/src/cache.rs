//! Short-TTL cache for work-item list queries.
//!
//! One instance lives in `AppState` and is handed to whoever needs it —
//! reads check it before storage, every mutation for a user throws that
//! user's entries away wholesale. Entries expire lazily on access; with a
//! 10-second TTL a background sweeper would be more code than the memory
//! it frees.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::item::WorkItem;

const DEFAULT_TTL: Duration = Duration::from_secs(10);

struct CacheEntry {
    items: Vec<WorkItem>,
    stored_at: Instant,
}

/// Process-wide list-query cache. Scoped to this server instance; staleness
/// across instances is bounded by the TTL and covered by the push channel.
pub struct QueryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic key for one list query. Starts with the user prefix so
    /// `invalidate_user` can match on it.
    pub fn key(
        user_id: i64,
        limit: i64,
        offset: i64,
        classification: Option<&str>,
        is_completed: Option<bool>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> String {
        let iso = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_else(|| "-".to_string())
        };
        format!(
            "{}{}:{}:{}:{}:{}:{}",
            Self::user_prefix(user_id),
            limit,
            offset,
            classification.unwrap_or("-"),
            is_completed.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            iso(start),
            iso(end),
        )
    }

    fn user_prefix(user_id: i64) -> String {
        format!("user:{user_id}:")
    }

    /// Returns the cached payload if present and younger than the TTL.
    /// An expired entry is removed on the way out.
    pub fn get(&self, key: &str) -> Option<Vec<WorkItem>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.items.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, items: Vec<WorkItem>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CacheEntry {
                items,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops every cached query for one user. Called after any write that
    /// touches that user's items.
    pub fn invalidate_user(&self, user_id: i64) {
        let prefix = Self::user_prefix(user_id);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|key, _| !key.starts_with(&prefix));
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}
