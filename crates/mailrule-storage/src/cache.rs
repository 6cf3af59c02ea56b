//! Lookup result cache
//!
//! [`CachedStore`] wraps any [`LookupStore`] and remembers answers for a
//! bounded time: found members for the positive TTL, misses for the
//! negative TTL. Backend errors are never cached.

use crate::error::StoreResult;
use crate::lookup::{LookupQuery, LookupStore, StoreFormat, StoreKind};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Cache sizing and lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Entries kept per cache (positive and negative each)
    pub entries: NonZeroUsize,
    /// Lifetime of a found member
    pub ttl_positive: Duration,
    /// Lifetime of a miss
    pub ttl_negative: Duration,
}

/// Positive and negative LRU caches with expiry
#[derive(Debug)]
pub struct LookupCache {
    positive: LruCache<LookupQuery, (String, Instant)>,
    negative: LruCache<LookupQuery, Instant>,
    ttl_positive: Duration,
    ttl_negative: Duration,
}

impl LookupCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            positive: LruCache::new(settings.entries),
            negative: LruCache::new(settings.entries),
            ttl_positive: settings.ttl_positive,
            ttl_negative: settings.ttl_negative,
        }
    }

    /// `Some(Some(member))` for a cached hit, `Some(None)` for a cached
    /// miss, `None` when the query must go to the store.
    pub fn get(&mut self, query: &LookupQuery) -> Option<Option<String>> {
        let now = Instant::now();

        if let Some((member, valid_until)) = self.positive.get(query) {
            if *valid_until >= now {
                return Some(Some(member.clone()));
            }
            self.positive.pop(query);
        }

        let valid_until = *self.negative.get(query)?;
        if valid_until >= now {
            Some(None)
        } else {
            self.negative.pop(query);
            None
        }
    }

    pub fn insert(&mut self, query: LookupQuery, member: Option<String>) {
        match member {
            Some(member) => {
                self.negative.pop(&query);
                self.positive
                    .put(query, (member, Instant::now() + self.ttl_positive));
            }
            None => {
                self.positive.pop(&query);
                self.negative.put(query, Instant::now() + self.ttl_negative);
            }
        }
    }

    pub fn clear(&mut self) {
        self.positive.clear();
        self.negative.clear();
    }
}

/// Store decorator answering repeated queries from a [`LookupCache`]
pub struct CachedStore {
    inner: Arc<dyn LookupStore>,
    cache: Mutex<LookupCache>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn LookupStore>, settings: CacheSettings) -> Self {
        Self {
            inner,
            cache: Mutex::new(LookupCache::new(settings)),
        }
    }

    /// Drop every cached answer
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }
}

#[async_trait]
impl LookupStore for CachedStore {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn kind(&self) -> StoreKind {
        self.inner.kind()
    }

    fn format(&self) -> StoreFormat {
        self.inner.format()
    }

    async fn query(&self, query: &LookupQuery) -> StoreResult<Option<String>> {
        // The guard must be released before awaiting the backend
        let cached = self.cache.lock().get(query);
        if let Some(member) = cached {
            debug!(store = %self.id(), ?query, found = member.is_some(), "Lookup cache hit");
            return Ok(member);
        }

        let member = self.inner.query(query).await?;
        self.cache.lock().insert(query.clone(), member.clone());
        Ok(member)
    }
}

impl std::fmt::Debug for CachedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedStore")
            .field("store", &self.inner.id())
            .finish()
    }
}
