//! In-memory list store

use crate::error::StoreResult;
use crate::lookup::{LookupQuery, LookupStore, StoreFormat, StoreKind};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

/// In-memory list store.
///
/// Membership ignores declaration order; the order is kept so that
/// `LookupQuery::Any` and iteration stay deterministic.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    id: String,
    values: Vec<String>,
    index: HashSet<String>,
}

impl MemoryStore {
    /// Create a new list store
    pub fn new(id: impl Into<String>, values: Vec<String>) -> Self {
        let mut index = HashSet::with_capacity(values.len());
        let mut ordered = Vec::with_capacity(values.len());
        for value in values {
            if index.insert(value.clone()) {
                ordered.push(value);
            }
        }

        Self {
            id: id.into(),
            values: ordered,
            index,
        }
    }

    /// Members in declaration order, duplicates removed
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn lookup(&self, query: &LookupQuery) -> Option<String> {
        match query {
            // Deterministic, not meaningful: see `LookupQuery::Any`
            LookupQuery::Any => self.values.first().cloned(),
            LookupQuery::Key(key) => self.index.get(key.as_str()).cloned(),
        }
    }
}

#[async_trait]
impl LookupStore for MemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn format(&self) -> StoreFormat {
        StoreFormat::List
    }

    async fn query(&self, query: &LookupQuery) -> StoreResult<Option<String>> {
        let result = self.lookup(query);
        debug!(store = %self.id, ?query, found = result.is_some(), "Memory store lookup");
        Ok(result)
    }
}
