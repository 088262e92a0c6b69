//! Lifecycle Callbacks - "before" hooks run between normalization and forging
//!
//! Hooks receive each record (or the values to set, or the destroy `where`
//! clause) by mutable reference and may rewrite it in place. Invocations run
//! concurrently up to a bound; the first failure aborts the rest.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{OrmError, OrmResult};
use crate::query::LogicalQuery;

/// Mutable record handed to hooks
pub type Record = Map<String, Value>;

/// "Before" callbacks a model may define
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    BeforeCreate,
    BeforeUpdate,
    BeforeDestroy,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::BeforeCreate => "beforeCreate",
            HookKind::BeforeUpdate => "beforeUpdate",
            HookKind::BeforeDestroy => "beforeDestroy",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a lifecycle hook
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HookError {
    /// The hook refused the operation
    #[error("Rejected: {message}{}", hint_suffix(.hint))]
    Rejected {
        message: String,
        hint: Option<String>,
    },
    /// The hook itself failed
    #[error("Hook failed: {message}")]
    Failed { message: String },
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|hint| format!(" (hint: {})", hint))
        .unwrap_or_default()
}

impl HookError {
    pub fn rejected(message: &str) -> Self {
        Self::Rejected {
            message: message.to_string(),
            hint: None,
        }
    }

    pub fn rejected_with_hint(message: &str, hint: &str) -> Self {
        Self::Rejected {
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    pub fn failed(message: &str) -> Self {
        Self::Failed {
            message: message.to_string(),
        }
    }
}

/// A "before" lifecycle callback
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn call(&self, record: &mut Record) -> Result<(), HookError>;
}

/// Hook backed by a synchronous closure
pub struct FnHook<F>(F);

#[async_trait]
impl<F> LifecycleHook for FnHook<F>
where
    F: Fn(&mut Record) -> Result<(), HookError> + Send + Sync,
{
    async fn call(&self, record: &mut Record) -> Result<(), HookError> {
        (self.0)(record)
    }
}

/// Wrap a synchronous closure as a lifecycle hook
pub fn hook_fn<F>(hook: F) -> Arc<dyn LifecycleHook>
where
    F: Fn(&mut Record) -> Result<(), HookError> + Send + Sync + 'static,
{
    Arc::new(FnHook(hook))
}

/// The hooks registered for one model
#[derive(Clone, Default)]
pub struct LifecycleCallbacks {
    hooks: HashMap<HookKind, Arc<dyn LifecycleHook>>,
}

impl LifecycleCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook, replacing any previous hook of the same kind
    pub fn register(&mut self, kind: HookKind, hook: Arc<dyn LifecycleHook>) {
        self.hooks.insert(kind, hook);
    }

    pub fn with(mut self, kind: HookKind, hook: Arc<dyn LifecycleHook>) -> Self {
        self.register(kind, hook);
        self
    }

    pub fn get(&self, kind: HookKind) -> Option<&Arc<dyn LifecycleHook>> {
        self.hooks.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for LifecycleCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCallbacks")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Run the "before" hook relevant to the query's method
pub async fn run_before(
    mut query: LogicalQuery,
    callbacks: &LifecycleCallbacks,
    concurrency: usize,
) -> OrmResult<LogicalQuery> {
    if query.meta.skip_all_lifecycle_callbacks {
        tracing::debug!(method = %query.method, "Skipping lifecycle callbacks");
        return Ok(query);
    }
    let Some(kind) = query.method.before_hook() else {
        return Ok(query);
    };
    let Some(hook) = callbacks.get(kind).cloned() else {
        return Ok(query);
    };

    let failed = |source: HookError| OrmError::Lifecycle {
        hook: kind,
        source,
        context: None,
    };

    match kind {
        HookKind::BeforeCreate => {
            let records = std::mem::take(&mut query.new_records);
            query.new_records = run_each(&hook, records, concurrency.max(1))
                .await
                .map_err(failed)?;
        }
        HookKind::BeforeUpdate => {
            if let Some(values) = query.values_to_set.as_mut() {
                hook.call(values).await.map_err(failed)?;
            }
        }
        HookKind::BeforeDestroy => {
            if let Some(criteria) = query.criteria.as_mut() {
                hook.call(&mut criteria.where_clause).await.map_err(failed)?;
            }
        }
    }

    tracing::debug!(hook = %kind, "Lifecycle callback completed");
    Ok(query)
}

async fn run_each(
    hook: &Arc<dyn LifecycleHook>,
    records: Vec<Record>,
    concurrency: usize,
) -> Result<Vec<Record>, HookError> {
    let mut settled: Vec<(usize, Record)> = stream::iter(records.into_iter().enumerate())
        .map(|(position, mut record)| {
            let hook = Arc::clone(hook);
            async move {
                hook.call(&mut record).await?;
                Ok::<_, HookError>((position, record))
            }
        })
        .buffer_unordered(concurrency)
        .try_collect()
        .await?;

    settled.sort_by_key(|(position, _)| *position);
    Ok(settled.into_iter().map(|(_, record)| record).collect())
}
