//! Core Adapter Traits
//!
//! The per-operation contract every storage adapter implements, and the raw
//! error shape adapters report. Raw errors are translated into
//! [`OrmError::Adapter`](crate::error::OrmError) by the dispatcher before
//! reaching callers.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::datastore::Datastore;
use crate::query::{PhysicalQuery, QueryMethod};

/// Structured hint describing what kind of failure an adapter hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Footprint {
    /// A uniqueness constraint was violated; `keys` are column names
    NotUnique { keys: Vec<String> },
    /// Anything else
    Catchall,
}

/// Raw error reported by an adapter
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct AdapterError {
    pub message: String,
    pub footprint: Option<Footprint>,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            footprint: None,
        }
    }

    /// A uniqueness violation on the given columns
    pub fn not_unique(message: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            message: message.into(),
            footprint: Some(Footprint::NotUnique { keys }),
        }
    }

    pub fn with_footprint(mut self, footprint: Footprint) -> Self {
        self.footprint = Some(footprint);
        self
    }
}

/// Uniform storage adapter contract
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapter identity used in logs and translated errors
    fn identity(&self) -> &str;

    /// Whether the adapter implements `method`
    fn supports(&self, method: QueryMethod) -> bool;

    /// Concurrency bound the adapter imposes on per-record hook fan-out
    fn max_concurrency(&self) -> Option<usize> {
        None
    }

    /// Execute a physical query against `datastore`
    ///
    /// Create-type methods return the persisted record(s) only when
    /// `query.meta.fetch` is set. `find` returns an array, `findOne` a record
    /// or nothing, and `count` a number.
    async fn execute(
        &self,
        datastore: &Datastore,
        query: &PhysicalQuery,
    ) -> Result<Option<Value>, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_error_constructors() {
        let plain = AdapterError::new("connection reset");
        assert_eq!(plain.to_string(), "connection reset");
        assert!(plain.footprint.is_none());

        let unique = AdapterError::not_unique("duplicate", vec!["pet_name".to_string()]);
        assert_eq!(
            unique.footprint,
            Some(Footprint::NotUnique {
                keys: vec!["pet_name".to_string()]
            })
        );

        let tagged = AdapterError::new("boom").with_footprint(Footprint::Catchall);
        assert_eq!(tagged.footprint, Some(Footprint::Catchall));
    }
}
