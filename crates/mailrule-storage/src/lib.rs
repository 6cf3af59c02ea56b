//! MailRule Storage - Lookup store abstraction
//!
//! Stores are named, typed collections consulted by rules. Every backend
//! implements [`LookupStore`]; the rule engine only sees that trait and the
//! [`StoreResolver`] that maps identifiers to stores.

pub mod backend;
pub mod cache;
pub mod error;
pub mod lookup;
pub mod registry;

pub use backend::memory::MemoryStore;
pub use cache::{CacheSettings, CachedStore, LookupCache};
pub use error::{StoreError, StoreResult};
pub use lookup::{LookupQuery, LookupStore, StoreFormat, StoreKind};
pub use registry::{StoreRegistry, StoreResolver};
