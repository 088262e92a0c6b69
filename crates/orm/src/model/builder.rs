//! Model Builder - Validates and normalizes model definitions
//!
//! Turns a raw [`ModelDefinition`] into an immutable [`ResolvedModel`]:
//! defaults are applied, the graph role and edge shape are checked, indexes are
//! validated against the declared attributes, and the datastore binding is
//! resolved against the registered datastores. Registering the model into its
//! datastores' collection sets happens afterwards, in one linking pass over
//! every resolved model (see [`crate::datastore::CollectionIndex`]).

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::attribute::AttributeDefinition;
use super::definition::{
    ClassType, EdgeDefinition, ModelDefinition, DEFAULT_DATASTORE, DEFAULT_TENANT,
    EDGE_ATTRIBUTES,
};
use super::index::IndexDescriptor;
use super::transformer::ColumnTransformer;
use crate::datastore::DatastoreRegistry;
use crate::error::{OrmError, OrmResult, UsageCode};

/// Primary key attribute used when a definition does not name one
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// A validated model definition bound to a resolved datastore name
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    identity: String,
    table_name: String,
    datastore: String,
    class_type: ClassType,
    tenant_type: Vec<String>,
    edge_definition: Option<EdgeDefinition>,
    indexes: Vec<IndexDescriptor>,
    attributes: BTreeMap<String, AttributeDefinition>,
    primary_key: String,
    bindings: Option<Map<String, Value>>,
    transformer: ColumnTransformer,
}

impl ResolvedModel {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn datastore(&self) -> &str {
        &self.datastore
    }

    /// True when the model is replicated into every datastore
    pub fn uses_default_datastore(&self) -> bool {
        self.datastore == DEFAULT_DATASTORE
    }

    pub fn class_type(&self) -> ClassType {
        self.class_type
    }

    pub fn tenant_type(&self) -> &[String] {
        &self.tenant_type
    }

    pub fn edge_definition(&self) -> Option<&EdgeDefinition> {
        self.edge_definition.as_ref()
    }

    pub fn indexes(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeDefinition> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.get(name)
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Column holding the primary key
    pub fn primary_key_column(&self) -> &str {
        self.transformer.column(&self.primary_key)
    }

    /// Query-scoped variable bindings declared by the model
    pub fn bindings(&self) -> Option<&Map<String, Value>> {
        self.bindings.as_ref()
    }

    pub fn transformer(&self) -> &ColumnTransformer {
        &self.transformer
    }

    /// To-many association attributes
    pub fn collection_attributes(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.attributes.values().filter(|attribute| attribute.is_collection())
    }

    /// Whether `name` may appear as a key on records and in criteria
    ///
    /// Declared attributes, the primary key, and the implicit `_from`/`_to`
    /// attributes of edge collections are recognized.
    pub fn recognizes(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
            || name == self.primary_key
            || (self.class_type.is_edge() && EDGE_ATTRIBUTES.contains(&name))
    }
}

/// Validates raw definitions against the registered datastores
pub struct ModelBuilder<'a> {
    datastores: &'a DatastoreRegistry,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(datastores: &'a DatastoreRegistry) -> Self {
        Self { datastores }
    }

    /// Validate and normalize one model definition
    pub fn build(&self, definition: &ModelDefinition) -> OrmResult<ResolvedModel> {
        let identity_source = present(&definition.identity);
        let table_source = present(&definition.table_name);

        let (identity, table_name) = match (identity_source, table_source) {
            (None, None) => {
                return Err(OrmError::usage(
                    UsageCode::InvalidModelDefinition,
                    "A tableName or identity property must be set.",
                ))
            }
            (Some(identity), table) => (identity.to_lowercase(), table.unwrap_or(identity).to_string()),
            (None, Some(table)) => (table.to_lowercase(), table.to_string()),
        };

        let datastore = match present(&definition.datastore) {
            Some(datastore) => datastore.to_string(),
            None => {
                if !self.datastores.contains(DEFAULT_DATASTORE) {
                    return Err(OrmError::configuration(format!(
                        "No `datastore` was specified in the definition for model `{}`, and there is no default datastore (i.e. defined as \"{}\") to fall back to. (Usually, if the \"{}\" datastore is missing, it means the ORM is not set up correctly.)",
                        identity, DEFAULT_DATASTORE, DEFAULT_DATASTORE
                    )));
                }
                DEFAULT_DATASTORE.to_string()
            }
        };

        let class_type = match definition.class_type.as_deref() {
            None => ClassType::default(),
            Some(raw) => raw.parse::<ClassType>().map_err(|_| {
                OrmError::configuration(format!(
                    "Unrecognized classType (`{}`) specified in the definition for model `{}`. (Usually, it should be one of Vertex, or Edge)",
                    raw, identity
                ))
            })?,
        };

        let tenant_type = resolve_tenant_type(&identity, definition.tenant_type.as_ref())?;

        let edge_definition = if class_type.is_edge() {
            Some(resolve_edge_definition(&table_name, definition.edge_definition.as_ref())?)
        } else {
            None
        };

        let mut attributes = BTreeMap::new();
        for (name, raw) in &definition.attributes {
            attributes.insert(name.clone(), AttributeDefinition::parse(&identity, name, raw)?);
        }

        let indexes = resolve_indexes(&table_name, class_type, &attributes, definition.indexes.as_ref())?;

        if !self.datastores.contains(&datastore) {
            let hint = if datastore == DEFAULT_DATASTORE {
                "(Usually, if the \"default\" datastore is missing, it means the ORM is not set up correctly.)"
            } else {
                "Please make sure it exists. (If you're unsure, use \"default\".)"
            };
            return Err(OrmError::configuration(format!(
                "Unrecognized datastore (`{}`) specified in the definition for model `{}`. {}",
                datastore, identity, hint
            )));
        }

        let primary_key = present(&definition.primary_key)
            .unwrap_or(DEFAULT_PRIMARY_KEY)
            .to_string();
        let transformer = ColumnTransformer::new(attributes.values());

        tracing::info!(
            model = %identity,
            datastore = %datastore,
            class_type = %class_type,
            indexes = indexes.len(),
            "Resolved model definition"
        );

        Ok(ResolvedModel {
            identity,
            table_name,
            datastore,
            class_type,
            tenant_type,
            edge_definition,
            indexes,
            attributes,
            primary_key,
            bindings: definition.bindings.clone(),
            transformer,
        })
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

fn resolve_tenant_type(identity: &str, raw: Option<&Value>) -> OrmResult<Vec<String>> {
    let Some(raw) = raw else {
        return Ok(vec![DEFAULT_TENANT.to_string()]);
    };

    let invalid = || {
        OrmError::usage(
            UsageCode::InvalidTenantType,
            format!(
                "The `tenantType` specified in the definition for model `{}` must be an array of strings.",
                identity
            ),
        )
    };

    raw.as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|tag| tag.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

fn resolve_edge_definition(table_name: &str, raw: Option<&Value>) -> OrmResult<EdgeDefinition> {
    let invalid = || {
        OrmError::usage(
            UsageCode::InvalidEdgeDefinition,
            format!(
                "Unrecognized edgeDefinition for model `{}`. Edge definitions need non-empty `from` and `to` arrays of collection names.",
                table_name
            ),
        )
    };

    let side = |key: &str| -> OrmResult<Vec<String>> {
        let names = raw
            .and_then(|definition| definition.get(key))
            .and_then(Value::as_array)
            .ok_or_else(invalid)?;
        if names.is_empty() {
            return Err(invalid());
        }
        names
            .iter()
            .map(|name| name.as_str().map(str::to_string).ok_or_else(invalid))
            .collect()
    };

    Ok(EdgeDefinition {
        from: side("from")?,
        to: side("to")?,
    })
}

fn resolve_indexes(
    table_name: &str,
    class_type: ClassType,
    attributes: &BTreeMap<String, AttributeDefinition>,
    raw: Option<&Value>,
) -> OrmResult<Vec<IndexDescriptor>> {
    let entries = match raw {
        None => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            tracing::warn!(
                model = %table_name,
                indexes = %other,
                "Ignoring `indexes` that is not an array"
            );
            return Ok(Vec::new());
        }
    };

    let mut known: Vec<&str> = Vec::with_capacity(attributes.len() + EDGE_ATTRIBUTES.len());
    if class_type.is_edge() {
        known.extend(EDGE_ATTRIBUTES);
    }
    known.extend(attributes.keys().map(String::as_str));

    entries
        .iter()
        .map(|entry| IndexDescriptor::parse(table_name, entry, &known))
        .collect()
}
