//! Deferred Execution - Typed, single-shot query builders
//!
//! A model call eagerly captures its request and [`QueryContext`] and returns
//! a [`Deferred`] builder. Modifiers consume and return the builder, and only
//! the modifiers valid for the call kind `K` exist. Execution consumes the
//! builder, so a query runs at most once.

use std::fmt;
use std::future::IntoFuture;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::method::{Fetchable, Filtered, Paginated, Projected, QueryKind, Settable};
use super::pipeline;
use super::request::QueryRequest;
use crate::context::QueryContext;
use crate::error::{OrmError, OrmResult};
use crate::model::LiveModel;

/// Completion callback receiving the settled result
pub type Callback = Box<dyn FnOnce(OrmResult<Option<Value>>) + Send + 'static>;

/// How an explicit-request call should run
pub enum ExecutionMode {
    /// Return a builder; nothing runs until it is executed
    Deferred,
    /// Run now on the tokio runtime and hand the result to the callback
    Callback(Callback),
}

impl fmt::Debug for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Deferred => write!(f, "Deferred"),
            ExecutionMode::Callback(_) => write!(f, "Callback"),
        }
    }
}

/// What an explicit-request call produced: exactly one of a builder or a
/// dispatched call
pub enum Invocation<K: QueryKind> {
    Deferred(Deferred<K>),
    /// Callback mode; the handle is absent when the callback already settled
    /// without a runtime
    Dispatched(Option<JoinHandle<()>>),
}

impl<K: QueryKind> Invocation<K> {
    pub fn into_deferred(self) -> Option<Deferred<K>> {
        match self {
            Invocation::Deferred(deferred) => Some(deferred),
            Invocation::Dispatched(_) => None,
        }
    }

    pub fn into_handle(self) -> Option<JoinHandle<()>> {
        match self {
            Invocation::Dispatched(handle) => handle,
            Invocation::Deferred(_) => None,
        }
    }
}

/// A captured model call awaiting execution
pub struct Deferred<K: QueryKind> {
    model: Arc<LiveModel>,
    request: QueryRequest,
    context: QueryContext,
    _kind: PhantomData<K>,
}

impl<K: QueryKind> Deferred<K> {
    pub(crate) fn new(model: Arc<LiveModel>, request: QueryRequest) -> Self {
        let context = QueryContext::capture(
            K::METHOD,
            model.resolved().identity(),
            model.datastore().name(),
        );
        Self {
            model,
            request,
            context,
            _kind: PhantomData,
        }
    }

    /// The request accumulated so far
    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    /// Context captured when the call was made
    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    /// Set an arbitrary meta key
    pub fn meta(mut self, key: &str, value: Value) -> Self {
        self.request.set_meta_key(key, value);
        self
    }

    /// Skip every "before" lifecycle callback for this call
    pub fn skip_lifecycle_callbacks(self) -> Self {
        self.meta("skipAllLifecycleCallbacks", Value::Bool(true))
    }

    /// Run the pipeline
    pub async fn execute(self) -> OrmResult<Option<Value>> {
        pipeline::run(&self.model, K::METHOD, self.request, self.context).await
    }

    /// Run the pipeline on the current tokio runtime and hand the result to `callback`
    ///
    /// Outside a runtime nothing is spawned: the callback receives a
    /// configuration error immediately and `None` is returned.
    pub fn exec<F>(self, callback: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(OrmResult<Option<Value>>) + Send + 'static,
    {
        match Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(async move {
                let result = self.execute().await;
                callback(result);
            })),
            Err(error) => {
                tracing::error!(context = %self.context, error = %error, "No tokio runtime for callback execution");
                callback(Err(OrmError::configuration(format!(
                    "Callback execution of {} requires a running tokio runtime",
                    self.context
                ))));
                None
            }
        }
    }
}

impl<K: Filtered> Deferred<K> {
    /// Replace the `where` clause
    pub fn where_(mut self, clause: Value) -> Self {
        self.request.set_criteria_clause("where", clause);
        self
    }
}

impl<K: Paginated> Deferred<K> {
    pub fn limit(mut self, limit: u64) -> Self {
        self.request.set_criteria_clause("limit", Value::from(limit));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.request.set_criteria_clause("skip", Value::from(skip));
        self
    }

    /// Sort by `"attribute ASC|DESC"`, a `{attribute: direction}` mapping, or a list of either
    pub fn sort(mut self, sort: Value) -> Self {
        self.request.set_criteria_clause("sort", sort);
        self
    }
}

impl<K: Projected> Deferred<K> {
    pub fn select<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.set_criteria_clause("select", names(attributes));
        self
    }

    pub fn omit<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.set_criteria_clause("omit", names(attributes));
        self
    }
}

impl<K: Fetchable> Deferred<K> {
    /// Return the affected records
    pub fn fetch(self) -> Self {
        self.meta("fetch", Value::Bool(true))
    }
}

impl<K: Settable> Deferred<K> {
    /// Values to set on matching records
    pub fn set(mut self, values: Value) -> Self {
        self.request.values_to_set = Some(values);
        self
    }
}

impl<K: QueryKind> IntoFuture for Deferred<K> {
    type Output = OrmResult<Option<Value>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}

impl<K: QueryKind> fmt::Debug for Deferred<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("method", &K::METHOD)
            .field("request", &self.request)
            .field("context", &self.context)
            .finish()
    }
}

fn names<I, S>(attributes: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::Array(
        attributes
            .into_iter()
            .map(|name| Value::String(name.into()))
            .collect(),
    )
}
