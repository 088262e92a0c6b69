//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use elif_graph_orm::{
    Adapter, AdapterError, Datastore, MemoryAdapter, ModelDefinition, Orm, OrmBuilder,
    PhysicalQuery, QueryMethod,
};
use serde_json::{json, Value};

/// Adapter that records every physical query before delegating to memory
pub struct RecordingAdapter {
    inner: MemoryAdapter,
    calls: Mutex<Vec<PhysicalQuery>>,
    unsupported: HashSet<QueryMethod>,
    failure: Option<AdapterError>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::wrapping(MemoryAdapter::new())
    }

    pub fn wrapping(inner: MemoryAdapter) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            unsupported: HashSet::new(),
            failure: None,
        }
    }

    pub fn without(mut self, method: QueryMethod) -> Self {
        self.unsupported.insert(method);
        self
    }

    pub fn failing_with(mut self, error: AdapterError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<PhysicalQuery> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<QueryMethod> {
        self.calls().iter().map(|call| call.method).collect()
    }

    pub fn inner(&self) -> &MemoryAdapter {
        &self.inner
    }
}

#[async_trait]
impl Adapter for RecordingAdapter {
    fn identity(&self) -> &str {
        "recording"
    }

    fn supports(&self, method: QueryMethod) -> bool {
        !self.unsupported.contains(&method)
    }

    fn max_concurrency(&self) -> Option<usize> {
        self.inner.max_concurrency()
    }

    async fn execute(
        &self,
        datastore: &Datastore,
        query: &PhysicalQuery,
    ) -> Result<Option<Value>, AdapterError> {
        self.calls.lock().unwrap().push(query.clone());
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.inner.execute(datastore, query).await
    }
}

pub fn pet_definition() -> ModelDefinition {
    ModelDefinition::new("Pet")
        .with_table_name("pets")
        .with_attribute("id", json!({"type": "number"}))
        .with_attribute("name", json!({"type": "string", "required": true, "columnName": "pet_name"}))
        .with_attribute("age", json!({"type": "number", "defaultsTo": 1}))
        .with_attribute("owner", json!({"model": "person"}))
        .with_attribute("toys", json!({"collection": "toy", "via": "owner"}))
}

pub fn toy_definition() -> ModelDefinition {
    ModelDefinition::new("toy").with_attribute("name", json!({"type": "string"}))
}

pub fn person_definition() -> ModelDefinition {
    ModelDefinition::new("person").with_attribute("name", json!({"type": "string"}))
}

pub fn owns_definition() -> ModelDefinition {
    ModelDefinition::new("Owns")
        .with_class_type("Edge")
        .with_edge_definition(json!({"from": ["Person"], "to": ["Pet"]}))
        .with_indexes(json!([{"fields": ["_from"]}]))
}

/// Builder with the pet/toy/person/owns models on a single default datastore
pub fn builder(adapter: Arc<RecordingAdapter>) -> OrmBuilder {
    Orm::builder()
        .datastore("default", adapter)
        .model(pet_definition())
        .model(toy_definition())
        .model(person_definition())
        .model(owns_definition())
}

pub fn orm(adapter: Arc<RecordingAdapter>) -> Orm {
    builder(adapter).initialize().unwrap()
}
