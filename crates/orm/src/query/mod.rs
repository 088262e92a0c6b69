//! Query Pipeline - From a loose request to an adapter-ready physical query
//!
//! A call flows through value-consuming stages:
//!
//! 1. `stage_two::normalize`: [`QueryRequest`] → [`LogicalQuery`] (or a no-op)
//! 2. `lifecycle::run_before`: "before" hooks on the logical query
//! 3. `stage_three::forge`: [`LogicalQuery`] → [`PhysicalQuery`]
//! 4. `dispatch::dispatch`: adapter execution and error translation
//!
//! [`Deferred`] wraps the pipeline so each call executes exactly once.

pub mod criteria;
pub mod deferred;
pub mod method;
pub mod pipeline;
pub mod request;
pub mod stage_three;
pub mod stage_two;

pub use criteria::{Criteria, SortClause, SortDirection, CRITERIA_CLAUSES};
pub use deferred::{Callback, Deferred, ExecutionMode, Invocation};
pub use method::{kind, Fetchable, Filtered, Paginated, Projected, QueryKind, QueryMethod, Settable};
pub use request::{Meta, QueryRequest, BOOLEAN_META_KEYS};
pub use stage_three::{forge, CollectionReset, PhysicalQuery};
pub use stage_two::{noop_result, normalize, LogicalQuery, NoOpOutcome, Normalized};
