//! ORM Bootstrap - Builds every model once and hands out live models
//!
//! Initialization runs in a fixed order: every definition is resolved by the
//! [`ModelBuilder`], association targets are checked against the complete
//! schema, one linking pass builds the [`CollectionIndex`], and datastores are
//! frozen. Nothing built here changes afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::adapters::Adapter;
use crate::config::OrmConfig;
use crate::datastore::{CollectionIndex, Datastore, DatastoreRegistry};
use crate::error::{OrmError, OrmResult};
use crate::lifecycle::{HookKind, LifecycleCallbacks, LifecycleHook};
use crate::model::{LiveModel, ModelBuilder, ModelDefinition, Schema};

/// Collects datastores, definitions and hooks ahead of initialization
#[derive(Default)]
pub struct OrmBuilder {
    config: OrmConfig,
    datastores: DatastoreRegistry,
    definitions: Vec<ModelDefinition>,
    hooks: HashMap<String, LifecycleCallbacks>,
}

impl OrmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn datastore(mut self, name: impl Into<String>, adapter: Arc<dyn Adapter>) -> Self {
        self.datastores.register(name, adapter);
        self
    }

    pub fn datastore_with_settings(
        mut self,
        name: impl Into<String>,
        adapter: Arc<dyn Adapter>,
        settings: Map<String, Value>,
    ) -> Self {
        self.datastores.register_with_settings(name, adapter, settings);
        self
    }

    pub fn model(mut self, definition: ModelDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Register a "before" hook for the model `identity`
    pub fn hook(mut self, identity: &str, kind: HookKind, hook: Arc<dyn LifecycleHook>) -> Self {
        self.hooks
            .entry(identity.to_lowercase())
            .or_default()
            .register(kind, hook);
        self
    }

    /// Resolve, link and freeze everything
    pub fn initialize(self) -> OrmResult<Orm> {
        let OrmBuilder {
            config,
            datastores,
            definitions,
            mut hooks,
        } = self;

        config.validate()?;

        let builder = ModelBuilder::new(&datastores);
        let mut schema = Schema::new();
        for definition in &definitions {
            schema.insert(builder.build(definition)?)?;
        }
        schema.check_associations()?;

        if let Some(identity) = hooks.keys().find(|identity| !schema.contains(identity)) {
            return Err(OrmError::configuration(format!(
                "Lifecycle callbacks were registered for unknown model `{}`",
                identity
            )));
        }

        let index = CollectionIndex::link(&datastores, schema.models());
        let frozen = datastores.freeze(&index);
        let schema = Arc::new(schema);
        let config = Arc::new(config);

        let mut models = BTreeMap::new();
        for model in schema.iter() {
            let datastore = frozen.get(model.datastore()).cloned().ok_or_else(|| {
                OrmError::configuration(format!(
                    "Datastore `{}` of model `{}` disappeared during linking",
                    model.datastore(),
                    model.identity()
                ))
            })?;
            let live = LiveModel::new(
                Arc::clone(model),
                datastore,
                Arc::clone(&schema),
                hooks.remove(model.identity()).unwrap_or_default(),
                Arc::clone(&config),
            );
            models.insert(model.identity().to_string(), Arc::new(live));
        }

        tracing::info!(
            models = models.len(),
            datastores = frozen.len(),
            "ORM initialized"
        );

        Ok(Orm {
            config,
            schema,
            datastores: frozen,
            index,
            models,
        })
    }
}

/// Initialized ORM: every live model and frozen datastore
#[derive(Debug)]
pub struct Orm {
    config: Arc<OrmConfig>,
    schema: Arc<Schema>,
    datastores: BTreeMap<String, Arc<Datastore>>,
    index: CollectionIndex,
    models: BTreeMap<String, Arc<LiveModel>>,
}

impl Orm {
    pub fn builder() -> OrmBuilder {
        OrmBuilder::new()
    }

    /// Live model by identity (case-insensitive)
    pub fn model(&self, identity: &str) -> OrmResult<Arc<LiveModel>> {
        self.models
            .get(&identity.to_lowercase())
            .cloned()
            .ok_or_else(|| OrmError::configuration(format!("Unknown model `{}`", identity)))
    }

    pub fn datastore(&self, name: &str) -> Option<&Arc<Datastore>> {
        self.datastores.get(name)
    }

    /// Identities linked into a datastore
    pub fn collections(&self, datastore: &str) -> Option<&BTreeSet<String>> {
        self.index.collections(datastore)
    }

    pub fn index(&self) -> &CollectionIndex {
        &self.index
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryAdapter;
    use crate::error::UsageCode;
    use crate::lifecycle::hook_fn;
    use serde_json::json;

    #[test]
    fn test_initialize_links_and_freezes() {
        let adapter = Arc::new(MemoryAdapter::new());
        let orm = Orm::builder()
            .datastore("default", adapter.clone())
            .datastore("graph", adapter)
            .model(ModelDefinition::new("Pet"))
            .model(ModelDefinition::new("person").with_datastore("graph"))
            .initialize()
            .unwrap();

        assert!(orm.collections("default").unwrap().contains("pet"));
        assert!(orm.collections("graph").unwrap().contains("pet"));
        assert!(orm.collections("graph").unwrap().contains("person"));
        assert!(orm.datastore("graph").unwrap().collections().contains("person"));
        assert_eq!(orm.model("PET").unwrap().datastore().name(), "default");
        assert_eq!(orm.model("person").unwrap().datastore().name(), "graph");
        assert!(orm.model("ghost").unwrap_err().is_configuration());
    }

    #[test]
    fn test_duplicate_identity_fails_initialization() {
        let error = Orm::builder()
            .datastore("default", Arc::new(MemoryAdapter::new()))
            .model(ModelDefinition::new("pet"))
            .model(ModelDefinition::new("Pet"))
            .initialize()
            .unwrap_err();
        assert_eq!(error.usage_code(), Some(UsageCode::InvalidModelDefinition));
    }

    #[test]
    fn test_hooks_for_unknown_models_rejected() {
        let error = Orm::builder()
            .datastore("default", Arc::new(MemoryAdapter::new()))
            .model(ModelDefinition::new("pet"))
            .hook("ghost", HookKind::BeforeCreate, hook_fn(|_| Ok(())))
            .initialize()
            .unwrap_err();
        assert!(error.is_configuration());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let error = Orm::builder()
            .config(OrmConfig::default().with_hook_concurrency(0))
            .datastore("default", Arc::new(MemoryAdapter::new()))
            .initialize()
            .unwrap_err();
        assert!(error.is_configuration());
    }

    #[test]
    fn test_unknown_association_target_rejected() {
        let error = Orm::builder()
            .datastore("default", Arc::new(MemoryAdapter::new()))
            .model(ModelDefinition::new("pet").with_attribute("owner", json!({"model": "person"})))
            .initialize()
            .unwrap_err();
        assert_eq!(error.usage_code(), Some(UsageCode::InvalidAttribute));
    }
}
