//! Lookup store trait

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Values held in process memory
    Memory,
}

/// Layout of the values held by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFormat {
    /// Plain list of members
    List,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
        }
    }
}

impl StoreFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreFormat::List => "list",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for StoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StoreKind::Memory),
            other => Err(StoreError::Unsupported {
                kind: other.to_string(),
                format: String::new(),
            }),
        }
    }
}

impl FromStr for StoreFormat {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(StoreFormat::List),
            other => Err(StoreError::Unsupported {
                kind: String::new(),
                format: other.to_string(),
            }),
        }
    }
}

/// Query issued against a store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupQuery {
    /// Any member of the store.
    ///
    /// This is what a `maybe-eval` rule without a `key` asks for. List
    /// backends answer with the first member in declaration order, which
    /// only makes the answer deterministic: membership never depends on
    /// order, so rules over multi-member lists should declare a `key`.
    Any,
    /// The member equal to the given key
    Key(String),
}

/// Lookup store trait.
///
/// Queries return the stored member by value (`Some`) or `None` when
/// nothing matches. Backends that perform I/O must return promptly when
/// the future is dropped; callers bound every query with a timeout.
#[async_trait]
pub trait LookupStore: Send + Sync {
    /// Store identifier
    fn id(&self) -> &str;

    /// Backend type
    fn kind(&self) -> StoreKind;

    /// Value layout
    fn format(&self) -> StoreFormat;

    /// Run a query
    async fn query(&self, query: &LookupQuery) -> StoreResult<Option<String>>;

    /// Check whether `key` is a member
    async fn contains(&self, key: &str) -> StoreResult<bool> {
        self.query(&LookupQuery::Key(key.to_string()))
            .await
            .map(|member| member.is_some())
    }
}
