//! Stage Three - Forges a logical query into an adapter-addressed physical query
//!
//! Forging consumes the logical query. To-many association values are split
//! out of every new record into per-record collection resets, `fetch` is
//! forced when any reset is non-empty (the resets can only be applied once the
//! persisted primary keys are known), and finally every attribute name is
//! lowered to its column name.

use std::collections::BTreeMap;

use serde_json::Value;

use super::method::QueryMethod;
use super::request::Meta;
use super::stage_two::LogicalQuery;
use crate::error::{OrmError, OrmResult, UsageCode};
use crate::lifecycle::Record;
use crate::model::{ResolvedModel, Schema};

/// To-many association values extracted from one record, by attribute name
pub type CollectionReset = BTreeMap<String, Vec<Value>>;

/// Adapter-facing query
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalQuery {
    pub method: QueryMethod,
    /// Table name
    pub using: String,
    /// Identity of the model the query was issued against
    pub identity: String,
    /// Primary key column
    pub primary_key: String,
    /// New records in column names, without to-many values
    pub new_records: Vec<Record>,
    /// Criteria in column names (`where`, `limit`, `skip`, `sort`, `select`, `omit`, `let`)
    pub criteria: Option<Value>,
    pub values_to_set: Option<Record>,
    /// Effective meta; `fetch` may have been forced on
    pub meta: Meta,
    /// Whether the caller asked for `fetch` before any escalation
    pub fetch_requested: bool,
    /// One entry per new record, aligned with `new_records`
    pub collection_resets: Vec<CollectionReset>,
}

impl PhysicalQuery {
    /// True when at least one record carries to-many values to apply
    pub fn has_resets(&self) -> bool {
        self.collection_resets.iter().any(|reset| !reset.is_empty())
    }
}

/// Lower a logical query for the model `identity`
pub fn forge(query: LogicalQuery, identity: &str, schema: &Schema) -> OrmResult<PhysicalQuery> {
    let model = schema.get(identity).ok_or_else(|| {
        OrmError::configuration(format!(
            "Cannot forge a query for unknown model `{}`",
            identity
        ))
    })?;

    let LogicalQuery {
        method,
        new_records,
        criteria,
        values_to_set,
        meta,
        ..
    } = query;

    let mut records = Vec::with_capacity(new_records.len());
    let mut collection_resets = Vec::with_capacity(new_records.len());
    for record in new_records {
        let (record, reset) = split_collections(model, record)?;
        records.push(record);
        collection_resets.push(reset);
    }

    let fetch_requested = meta.fetch;
    let meta = if collection_resets.iter().any(|reset| !reset.is_empty()) && !meta.fetch {
        tracing::debug!(model = %identity, "Forcing fetch to apply collection resets");
        meta.with_fetch()
    } else {
        meta
    };

    let transformer = model.transformer();
    Ok(PhysicalQuery {
        method,
        using: model.table_name().to_string(),
        identity: model.identity().to_string(),
        primary_key: model.primary_key_column().to_string(),
        new_records: records
            .into_iter()
            .map(|record| transformer.serialize_record(record))
            .collect(),
        criteria: criteria.map(|criteria| criteria.into_physical(transformer)),
        values_to_set: values_to_set.map(|values| transformer.serialize_record(values)),
        meta,
        fetch_requested,
        collection_resets,
    })
}

fn split_collections(model: &ResolvedModel, mut record: Record) -> OrmResult<(Record, CollectionReset)> {
    let mut reset = CollectionReset::new();
    for attribute in model.collection_attributes() {
        match record.remove(&attribute.name) {
            None | Some(Value::Null) => {}
            Some(Value::Array(members)) => {
                if !members.is_empty() {
                    reset.insert(attribute.name.clone(), members);
                }
            }
            Some(other) => {
                return Err(OrmError::usage(
                    UsageCode::InvalidNewRecords,
                    format!(
                        "To-many association `{}` of model `{}` must be an array, got {}",
                        attribute.name,
                        model.identity(),
                        other
                    ),
                ))
            }
        }
    }
    Ok((record, reset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryAdapter;
    use crate::datastore::DatastoreRegistry;
    use crate::model::{ModelBuilder, ModelDefinition};
    use crate::query::Criteria;
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> Schema {
        let mut registry = DatastoreRegistry::new();
        registry.register("default", Arc::new(MemoryAdapter::new()));
        let builder = ModelBuilder::new(&registry);
        let mut schema = Schema::new();
        for definition in [
            ModelDefinition::new("Pet")
                .with_table_name("pets")
                .with_attribute("id", json!({"type": "number", "columnName": "_key"}))
                .with_attribute("name", json!({"type": "string", "columnName": "pet_name"}))
                .with_attribute("toys", json!({"collection": "toy"})),
            ModelDefinition::new("toy"),
        ] {
            schema.insert(builder.build(&definition).unwrap()).unwrap();
        }
        schema
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn create_each(records: Vec<Record>) -> LogicalQuery {
        LogicalQuery {
            method: QueryMethod::CreateEach,
            using: "pet".to_string(),
            new_records: records,
            criteria: None,
            values_to_set: None,
            meta: Meta::default(),
        }
    }

    #[test]
    fn test_to_many_values_become_resets_and_force_fetch() {
        let query = create_each(vec![record(json!({"name": "Rex", "toys": ["ball", "bone"]}))]);

        let physical = forge(query, "pet", &schema()).unwrap();

        assert_eq!(physical.new_records, vec![record(json!({"pet_name": "Rex"}))]);
        assert_eq!(
            physical.collection_resets,
            vec![CollectionReset::from([(
                "toys".to_string(),
                vec![json!("ball"), json!("bone")]
            )])]
        );
        assert!(physical.meta.fetch);
        assert!(!physical.fetch_requested);
        assert!(physical.has_resets());
    }

    #[test]
    fn test_empty_collections_are_dropped_without_forcing_fetch() {
        let query = create_each(vec![
            record(json!({"name": "Rex", "toys": []})),
            record(json!({"name": "Fido"})),
        ]);

        let physical = forge(query, "pet", &schema()).unwrap();

        assert!(physical.new_records.iter().all(|r| !r.contains_key("toys")));
        assert!(!physical.has_resets());
        assert!(!physical.meta.fetch);
        assert_eq!(physical.collection_resets.len(), 2);
    }

    #[test]
    fn test_malformed_collection_fails_whole_query() {
        let query = create_each(vec![
            record(json!({"name": "Rex", "toys": ["ball"]})),
            record(json!({"name": "Fido", "toys": "bone"})),
        ]);
        let error = forge(query, "pet", &schema()).unwrap_err();
        assert_eq!(error.usage_code(), Some(UsageCode::InvalidNewRecords));
    }

    #[test]
    fn test_unknown_identity_is_configuration_error() {
        let error = forge(create_each(Vec::new()), "ghost", &schema()).unwrap_err();
        assert!(error.is_configuration());
    }

    #[test]
    fn test_criteria_and_values_lowered_to_columns() {
        let schema = schema();
        let model = schema.get("pet").unwrap().clone();
        let criteria = Criteria::normalize(
            QueryMethod::Update,
            Some(json!({"or": [{"id": 1}, {"name": "Rex"}]})),
            &model,
        )
        .unwrap();
        let query = LogicalQuery {
            method: QueryMethod::Update,
            criteria: Some(criteria),
            values_to_set: Some(record(json!({"name": "Max"}))),
            ..create_each(Vec::new())
        };

        let physical = forge(query, "pet", &schema).unwrap();

        assert_eq!(physical.using, "pets");
        assert_eq!(physical.primary_key, "_key");
        assert_eq!(
            physical.criteria,
            Some(json!({"where": {"or": [{"_key": 1}, {"pet_name": "Rex"}]}}))
        );
        assert_eq!(physical.values_to_set, Some(record(json!({"pet_name": "Max"}))));
    }
}
