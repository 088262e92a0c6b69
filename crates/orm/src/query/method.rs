//! Query Methods - Operations a model call can request, and their typed kinds
//!
//! Each call kind is a zero-sized marker type implementing [`QueryKind`]. The
//! modifier traits (`Filtered`, `Paginated`, ...) decide at compile time which
//! chainable methods a [`Deferred`](super::Deferred) builder exposes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lifecycle::HookKind;

/// Operations understood by the pipeline and by adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryMethod {
    Find,
    FindOne,
    Count,
    Create,
    CreateEach,
    NormalizeEach,
    Update,
    Destroy,
    /// Replace the members of a to-many association; issued internally when
    /// collection resets are applied after a create
    ReplaceCollection,
}

impl QueryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMethod::Find => "find",
            QueryMethod::FindOne => "findOne",
            QueryMethod::Count => "count",
            QueryMethod::Create => "create",
            QueryMethod::CreateEach => "createEach",
            QueryMethod::NormalizeEach => "normalizeEach",
            QueryMethod::Update => "update",
            QueryMethod::Destroy => "destroy",
            QueryMethod::ReplaceCollection => "replaceCollection",
        }
    }

    /// Methods that carry new records
    pub fn creates_records(&self) -> bool {
        matches!(
            self,
            QueryMethod::Create | QueryMethod::CreateEach | QueryMethod::NormalizeEach
        )
    }

    /// Methods that take a sequence of new records rather than a single one
    pub fn takes_record_batch(&self) -> bool {
        matches!(self, QueryMethod::CreateEach | QueryMethod::NormalizeEach)
    }

    /// Methods that accept criteria
    pub fn takes_criteria(&self) -> bool {
        matches!(
            self,
            QueryMethod::Find
                | QueryMethod::FindOne
                | QueryMethod::Count
                | QueryMethod::Update
                | QueryMethod::Destroy
                | QueryMethod::ReplaceCollection
        )
    }

    /// The "before" lifecycle callback relevant to this method
    pub fn before_hook(&self) -> Option<HookKind> {
        match self {
            QueryMethod::Create | QueryMethod::CreateEach | QueryMethod::NormalizeEach => {
                Some(HookKind::BeforeCreate)
            }
            QueryMethod::Update => Some(HookKind::BeforeUpdate),
            QueryMethod::Destroy => Some(HookKind::BeforeDestroy),
            _ => None,
        }
    }
}

impl fmt::Display for QueryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call kind with a fixed method
pub trait QueryKind: Send + Sync + 'static {
    const METHOD: QueryMethod;
}

/// Kinds accepting a `where` clause
pub trait Filtered: QueryKind {}

/// Kinds accepting `limit`, `skip` and `sort`
pub trait Paginated: QueryKind {}

/// Kinds accepting `select` and `omit`
pub trait Projected: QueryKind {}

/// Kinds whose result depends on the `fetch` meta flag
pub trait Fetchable: QueryKind {}

/// Kinds accepting values to set
pub trait Settable: QueryKind {}

/// Marker types for each call kind
pub mod kind {
    use super::*;

    macro_rules! query_kind {
        ($name:ident => $method:ident: $($modifier:ident),*) => {
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $name;

            impl QueryKind for $name {
                const METHOD: QueryMethod = QueryMethod::$method;
            }

            $(impl $modifier for $name {})*
        };
    }

    query_kind!(Find => Find: Filtered, Paginated, Projected);
    query_kind!(FindOne => FindOne: Filtered, Projected);
    query_kind!(Count => Count: Filtered);
    query_kind!(Create => Create: Fetchable);
    query_kind!(CreateEach => CreateEach: Fetchable);
    query_kind!(NormalizeEach => NormalizeEach: Fetchable);
    query_kind!(Update => Update: Filtered, Fetchable, Settable);
    query_kind!(Destroy => Destroy: Filtered, Fetchable);
}
