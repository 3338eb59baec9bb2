//! Compiled metadata cache
//!
//! Entries are keyed by the statement source (registered id or the exact
//! raw SQL) plus the type-tagged serialized parameter list. There is no eviction; entries
//! only leave when their source is re-registered or unregistered.

use crate::metadata::Metadata;
use crate::params::Param;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Cache key for compiled statements
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: String,
    pub params: String,
}

impl CacheKey {
    /// Returns `None` when the parameters have no faithful key.
    ///
    /// Non-finite floats all serialize as `null`, so they are never cached.
    pub fn new(source: &str, params: &[Param]) -> Option<Self> {
        if params.iter().any(Param::has_non_finite) {
            return None;
        }
        let params = serde_json::to_string(params).ok()?;
        Some(Self {
            source: source.to_string(),
            params,
        })
    }
}

#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: Mutex<HashMap<CacheKey, Metadata>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Metadata> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, metadata: Metadata) {
        self.lock().insert(key, metadata);
    }

    /// Drop every entry compiled from `source`
    pub fn invalidate(&self, source: &str) {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| key.source != source);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(source, removed, "invalidated cached metadata");
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Metadata>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
