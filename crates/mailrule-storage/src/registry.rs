//! Store registry

use crate::backend::memory::MemoryStore;
use crate::error::{StoreError, StoreResult};
use crate::lookup::{LookupStore, StoreFormat, StoreKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Resolves store identifiers to stores
pub trait StoreResolver: Send + Sync {
    /// Find the store declared under `id`
    fn resolve(&self, id: &str) -> Option<Arc<dyn LookupStore>>;
}

/// Immutable-after-load table of declared stores
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn LookupStore>>,
}

impl StoreRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store under its own identifier
    pub fn insert(&mut self, store: Arc<dyn LookupStore>) -> StoreResult<()> {
        let id = store.id().to_string();
        if self.stores.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }

        debug!(store = %id, kind = %store.kind(), format = %store.format(), "Registered store");
        self.stores.insert(id, store);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stores.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.stores.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl StoreResolver for StoreRegistry {
    fn resolve(&self, id: &str) -> Option<Arc<dyn LookupStore>> {
        self.stores.get(id).cloned()
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.ids())
            .finish()
    }
}

/// Create a store from its declared type and format
pub fn create_store(
    id: &str,
    kind: &str,
    format: &str,
    values: Vec<String>,
) -> StoreResult<Arc<dyn LookupStore>> {
    let unsupported = || StoreError::Unsupported {
        kind: kind.to_string(),
        format: format.to_string(),
    };

    let kind: StoreKind = kind.parse().map_err(|_| unsupported())?;
    let format: StoreFormat = format.parse().map_err(|_| unsupported())?;

    match (kind, format) {
        (StoreKind::Memory, StoreFormat::List) => Ok(Arc::new(MemoryStore::new(id, values))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupQuery;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_and_resolve() {
        let mut registry = StoreRegistry::new();
        registry
            .insert(create_store("list_mx/domains", "memory", "list", vec!["mx".to_string()]).unwrap())
            .unwrap();

        assert!(registry.contains("list_mx/domains"));
        assert_eq!(registry.ids(), vec!["list_mx/domains"]);

        let store = registry.resolve("list_mx/domains").unwrap();
        assert_eq!(store.kind(), StoreKind::Memory);
        assert_eq!(
            store.query(&LookupQuery::Any).await.unwrap(),
            Some("mx".to_string())
        );
        assert!(registry.resolve("list_mx").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = StoreRegistry::new();
        registry.insert(Arc::new(MemoryStore::new("a", Vec::new()))).unwrap();
        let result = registry.insert(Arc::new(MemoryStore::new("a", Vec::new())));
        assert!(matches!(result, Err(StoreError::Duplicate(id)) if id == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unsupported_backend() {
        let result = create_store("x", "sql", "list", Vec::new());
        assert!(matches!(
            result,
            Err(StoreError::Unsupported { ref kind, .. }) if kind == "sql"
        ));
        assert!(create_store("x", "memory", "glob", Vec::new()).is_err());
    }
}
