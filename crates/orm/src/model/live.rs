//! Live Models - The call surface application code issues queries against

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::builder::ResolvedModel;
use super::schema::Schema;
use crate::config::OrmConfig;
use crate::datastore::Datastore;
use crate::lifecycle::LifecycleCallbacks;
use crate::query::kind;
use crate::query::{Deferred, ExecutionMode, Invocation, QueryKind, QueryRequest};

/// A resolved model bound to its datastore, read-only after startup
pub struct LiveModel {
    model: Arc<ResolvedModel>,
    datastore: Arc<Datastore>,
    schema: Arc<Schema>,
    callbacks: LifecycleCallbacks,
    config: Arc<OrmConfig>,
}

impl LiveModel {
    pub(crate) fn new(
        model: Arc<ResolvedModel>,
        datastore: Arc<Datastore>,
        schema: Arc<Schema>,
        callbacks: LifecycleCallbacks,
        config: Arc<OrmConfig>,
    ) -> Self {
        Self {
            model,
            datastore,
            schema,
            callbacks,
            config,
        }
    }

    pub fn identity(&self) -> &str {
        self.model.identity()
    }

    pub fn resolved(&self) -> &ResolvedModel {
        &self.model
    }

    pub fn datastore(&self) -> &Datastore {
        &self.datastore
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn callbacks(&self) -> &LifecycleCallbacks {
        &self.callbacks
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    /// Issue a call from an explicit request
    ///
    /// The context is captured immediately. With [`ExecutionMode::Callback`]
    /// the pipeline is spawned on the current tokio runtime right away (see
    /// [`Deferred::exec`]); with [`ExecutionMode::Deferred`] a builder is
    /// returned instead.
    pub fn invoke<K: QueryKind>(self: &Arc<Self>, request: QueryRequest, mode: ExecutionMode) -> Invocation<K> {
        let deferred = Deferred::<K>::new(Arc::clone(self), request);
        match mode {
            ExecutionMode::Deferred => Invocation::Deferred(deferred),
            ExecutionMode::Callback(callback) => Invocation::Dispatched(deferred.exec(callback)),
        }
    }

    /// Find records matching `criteria`
    pub fn find(self: &Arc<Self>, criteria: Value) -> Deferred<kind::Find> {
        Deferred::new(Arc::clone(self), QueryRequest::new().with_criteria(criteria))
    }

    /// Find the single record matching `criteria`
    pub fn find_one(self: &Arc<Self>, criteria: Value) -> Deferred<kind::FindOne> {
        Deferred::new(Arc::clone(self), QueryRequest::new().with_criteria(criteria))
    }

    pub fn count(self: &Arc<Self>, criteria: Value) -> Deferred<kind::Count> {
        Deferred::new(Arc::clone(self), QueryRequest::new().with_criteria(criteria))
    }

    pub fn create(self: &Arc<Self>, record: Value) -> Deferred<kind::Create> {
        Deferred::new(Arc::clone(self), QueryRequest::new().with_new_record(record))
    }

    pub fn create_each(self: &Arc<Self>, records: Value) -> Deferred<kind::CreateEach> {
        Deferred::new(Arc::clone(self), QueryRequest::new().with_new_records(records))
    }

    pub fn normalize_each(self: &Arc<Self>, records: Value) -> Deferred<kind::NormalizeEach> {
        Deferred::new(Arc::clone(self), QueryRequest::new().with_new_records(records))
    }

    /// Update records matching `criteria`; chain [`Deferred::set`] for the values
    pub fn update(self: &Arc<Self>, criteria: Value) -> Deferred<kind::Update> {
        Deferred::new(Arc::clone(self), QueryRequest::new().with_criteria(criteria))
    }

    pub fn destroy(self: &Arc<Self>, criteria: Value) -> Deferred<kind::Destroy> {
        Deferred::new(Arc::clone(self), QueryRequest::new().with_criteria(criteria))
    }
}

impl fmt::Debug for LiveModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveModel")
            .field("identity", &self.model.identity())
            .field("datastore", &self.datastore.name())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
