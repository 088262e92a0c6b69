//! Query Context - Call-site context captured when a query is issued
//!
//! Every model call captures a `QueryContext` before any asynchronous work
//! starts. The context travels with the query through normalization, hooks,
//! forging and dispatch, and is attached to every error the call settles with,
//! so a failure raised deep inside an adapter can be attributed to the call
//! that caused it.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::query::QueryMethod;

/// Structured context for a single model call
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    /// Unique id of this call
    pub request_id: Uuid,
    /// Operation requested by the caller
    pub method: QueryMethod,
    /// Identity of the model the call was issued against
    pub identity: String,
    /// Datastore the model is bound to
    pub datastore: String,
    /// When the call was made
    pub initiated_at: DateTime<Utc>,
}

impl QueryContext {
    /// Capture the context for a call that is being made right now
    pub fn capture(
        method: QueryMethod,
        identity: impl Into<String>,
        datastore: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method,
            identity: identity.into(),
            datastore: datastore.into(),
            initiated_at: Utc::now(),
        }
    }

    /// Milliseconds elapsed since the call was made
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.initiated_at).num_milliseconds()
    }

    /// Tracing span covering the lifetime of the call
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "orm_query",
            request_id = %self.request_id,
            method = %self.method,
            model = %self.identity,
            datastore = %self.datastore,
        )
    }
}

impl fmt::Display for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}() [request {}]",
            self.identity, self.method, self.request_id
        )
    }
}
