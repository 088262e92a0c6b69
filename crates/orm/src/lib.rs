//! # elif-graph-orm: Validation and query compilation for graph-aware models
//!
//! Model definitions are validated once at startup into resolved models bound
//! to a datastore. Each model call is then compiled in stages (normalize,
//! lifecycle hooks, forge) into an adapter-ready physical query, dispatched to
//! the datastore's adapter, and any adapter failure is translated into the
//! crate's error taxonomy.
//!
//! ```ignore
//! let orm = Orm::builder()
//!     .datastore("default", Arc::new(MemoryAdapter::new()))
//!     .model(ModelDefinition::new("pet").with_attribute("name", json!({"type": "string"})))
//!     .initialize()?;
//!
//! let pets = orm.model("pet")?;
//! let created = pets.create(json!({"name": "Rex"})).fetch().await?;
//! let found = pets.find(json!({"name": "Rex"})).limit(1).await?;
//! ```

pub mod adapters;
pub mod config;
pub mod context;
pub mod datastore;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod orm;
pub mod query;

// Re-export core traits and types
pub use adapters::{Adapter, AdapterError, Footprint, MemoryAdapter};
pub use config::{ConfigError, OrmConfig};
pub use context::QueryContext;
pub use datastore::{CollectionIndex, Datastore, DatastoreRegistry};
pub use error::{AdapterErrorKind, OrmError, OrmResult, UsageCode};
pub use lifecycle::{hook_fn, HookError, HookKind, LifecycleCallbacks, LifecycleHook, Record};
pub use model::{LiveModel, ModelBuilder, ModelDefinition, ResolvedModel, Schema};
pub use orm::{Orm, OrmBuilder};
pub use query::{
    kind, Deferred, ExecutionMode, Invocation, LogicalQuery, Normalized, PhysicalQuery,
    QueryMethod, QueryRequest,
};
