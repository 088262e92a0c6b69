//! Datastores - Registered storage targets and the model ↔ datastore linking pass
//!
//! Datastores are registered before any model is built. Once every model
//! definition has been resolved, a single linking pass builds the
//! [`CollectionIndex`], a many-to-many relation between datastores and model
//! identities. A model bound to the `"default"` datastore is linked into every
//! registered datastore; any other model only into the datastore it names.
//! After linking, datastores are frozen together with their collection sets.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::adapters::Adapter;
use crate::model::ResolvedModel;

/// A datastore registration awaiting the linking pass
#[derive(Clone)]
pub struct DatastoreConfig {
    pub name: String,
    pub adapter: Arc<dyn Adapter>,
    pub settings: Map<String, Value>,
}

impl fmt::Debug for DatastoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatastoreConfig")
            .field("name", &self.name)
            .field("adapter", &self.adapter.identity())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Datastores registered by the application bootstrap
#[derive(Debug, Clone, Default)]
pub struct DatastoreRegistry {
    datastores: BTreeMap<String, DatastoreConfig>,
}

impl DatastoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a datastore with no adapter settings
    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.register_with_settings(name, adapter, Map::new());
    }

    /// Register a datastore with adapter-specific settings
    pub fn register_with_settings(
        &mut self,
        name: impl Into<String>,
        adapter: Arc<dyn Adapter>,
        settings: Map<String, Value>,
    ) {
        let name = name.into();
        tracing::debug!(datastore = %name, adapter = %adapter.identity(), "Registered datastore");
        self.datastores.insert(
            name.clone(),
            DatastoreConfig {
                name,
                adapter,
                settings,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datastores.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&DatastoreConfig> {
        self.datastores.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datastores.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.datastores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datastores.is_empty()
    }

    /// Freeze every registration together with its linked collections
    pub fn freeze(&self, index: &CollectionIndex) -> BTreeMap<String, Arc<Datastore>> {
        self.datastores
            .values()
            .map(|config| {
                let datastore = Datastore {
                    name: config.name.clone(),
                    adapter: config.adapter.clone(),
                    settings: config.settings.clone(),
                    collections: index.collections(&config.name).cloned().unwrap_or_default(),
                };
                (config.name.clone(), Arc::new(datastore))
            })
            .collect()
    }
}

/// Many-to-many relation between datastores and model identities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionIndex {
    by_datastore: BTreeMap<String, BTreeSet<String>>,
    by_model: BTreeMap<String, BTreeSet<String>>,
}

impl CollectionIndex {
    /// Link every resolved model into its datastore(s)
    pub fn link<'a>(
        registry: &DatastoreRegistry,
        models: impl IntoIterator<Item = &'a ResolvedModel>,
    ) -> Self {
        let mut index = Self::default();
        for name in registry.names() {
            index.by_datastore.entry(name.to_string()).or_default();
        }

        for model in models {
            if model.uses_default_datastore() {
                for name in registry.names() {
                    index.insert(name, model.identity());
                }
            } else {
                index.insert(model.datastore(), model.identity());
            }
        }

        tracing::debug!(
            datastores = index.by_datastore.len(),
            models = index.by_model.len(),
            "Linked models into datastores"
        );
        index
    }

    fn insert(&mut self, datastore: &str, identity: &str) {
        self.by_datastore
            .entry(datastore.to_string())
            .or_default()
            .insert(identity.to_string());
        self.by_model
            .entry(identity.to_string())
            .or_default()
            .insert(datastore.to_string());
    }

    /// Identities linked into a datastore
    pub fn collections(&self, datastore: &str) -> Option<&BTreeSet<String>> {
        self.by_datastore.get(datastore)
    }

    /// Datastores a model is linked into
    pub fn datastores_for(&self, identity: &str) -> Option<&BTreeSet<String>> {
        self.by_model.get(identity)
    }
}

/// A frozen datastore handed to adapters with every physical query
#[derive(Clone)]
pub struct Datastore {
    name: String,
    adapter: Arc<dyn Adapter>,
    settings: Map<String, Value>,
    collections: BTreeSet<String>,
}

impl Datastore {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    /// Identities of the models stored in this datastore
    pub fn collections(&self) -> &BTreeSet<String> {
        &self.collections
    }
}

impl fmt::Debug for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datastore")
            .field("name", &self.name)
            .field("adapter", &self.adapter.identity())
            .field("collections", &self.collections)
            .finish()
    }
}
