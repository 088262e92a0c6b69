//! Stage Two - Normalizes a raw request into a logical query
//!
//! The normalizer validates every part of a [`QueryRequest`] against the
//! resolved model, fills in defaults and timestamps, and detects requests that
//! can never affect a record. Those short-circuit as [`Normalized::NoOp`]
//! without reaching hooks or the adapter.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::criteria::Criteria;
use super::method::QueryMethod;
use super::request::{Meta, QueryRequest};
use crate::config::OrmConfig;
use crate::error::{OrmError, OrmResult, UsageCode};
use crate::lifecycle::Record;
use crate::model::{AttributeDefinition, AttributeType, ResolvedModel, Schema, EDGE_ATTRIBUTES};

/// Canonical, store-agnostic form of one model call
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalQuery {
    pub method: QueryMethod,
    /// Identity of the model the query targets
    pub using: String,
    /// Normalized new records; empty for methods that do not create
    pub new_records: Vec<Record>,
    pub criteria: Option<Criteria>,
    pub values_to_set: Option<Record>,
    pub meta: Meta,
}

/// A request that completes without touching the adapter
#[derive(Debug, Clone, PartialEq)]
pub struct NoOpOutcome {
    pub reason: &'static str,
    /// Value the call settles with
    pub result: Option<Value>,
}

/// Outcome of stage two
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Ready(LogicalQuery),
    NoOp(NoOpOutcome),
}

impl Normalized {
    fn noop(method: QueryMethod, meta: &Meta, reason: &'static str) -> Self {
        Normalized::NoOp(NoOpOutcome {
            reason,
            result: noop_result(method, meta.fetch),
        })
    }
}

/// Value a no-op settles with
pub fn noop_result(method: QueryMethod, fetch: bool) -> Option<Value> {
    match method {
        QueryMethod::Find => Some(Value::Array(Vec::new())),
        QueryMethod::Count => Some(Value::from(0)),
        QueryMethod::FindOne => None,
        _ if fetch => Some(Value::Array(Vec::new())),
        _ => None,
    }
}

/// Validate and normalize a raw request
pub fn normalize(
    method: QueryMethod,
    request: QueryRequest,
    model: &ResolvedModel,
    schema: &Schema,
    config: &OrmConfig,
    now: DateTime<Utc>,
) -> OrmResult<Normalized> {
    let meta = Meta::from_value(request.meta)?;
    let normalizer = RecordNormalizer {
        model,
        schema,
        strict: config.strict_attributes,
        now,
    };

    let mut query = LogicalQuery {
        method,
        using: model.identity().to_string(),
        new_records: Vec::new(),
        criteria: None,
        values_to_set: None,
        meta,
    };

    match method {
        QueryMethod::Create => {
            let record = match request.new_record {
                Some(Value::Object(record)) => record,
                other => {
                    return Err(invalid_records(format!(
                        "Expected a single record dictionary, got {}",
                        describe(other.as_ref())
                    )))
                }
            };
            query.new_records = vec![normalizer.new_record(record)?];
        }
        QueryMethod::CreateEach | QueryMethod::NormalizeEach => {
            let records = match request.new_records {
                Some(Value::Array(records)) => records,
                other => {
                    return Err(invalid_records(format!(
                        "Expected an array of record dictionaries, got {}",
                        describe(other.as_ref())
                    )))
                }
            };
            if records.is_empty() {
                return Ok(Normalized::noop(method, &query.meta, "no new records"));
            }
            query.new_records = records
                .into_iter()
                .enumerate()
                .map(|(position, record)| match record {
                    Value::Object(record) => normalizer.new_record(record),
                    other => Err(invalid_records(format!(
                        "Record at index {} is not a dictionary: {}",
                        position, other
                    ))),
                })
                .collect::<OrmResult<_>>()?;
        }
        QueryMethod::Find | QueryMethod::FindOne | QueryMethod::Count | QueryMethod::Destroy => {
            let criteria = Criteria::normalize(method, request.criteria, model)?;
            if criteria.is_noop() {
                return Ok(Normalized::noop(method, &query.meta, "criteria can never match"));
            }
            query.criteria = Some(criteria);
        }
        QueryMethod::Update => {
            let criteria = Criteria::normalize(method, request.criteria, model)?;
            let values = normalizer.values_to_set(request.values_to_set)?;
            if criteria.is_noop() {
                return Ok(Normalized::noop(method, &query.meta, "criteria can never match"));
            }
            query.criteria = Some(criteria);
            query.values_to_set = Some(values);
        }
        QueryMethod::ReplaceCollection => {
            return Err(OrmError::configuration(
                "`replaceCollection` is issued by the dispatcher and cannot be called directly",
            ))
        }
    }

    if let Some(criteria) = query.criteria.as_mut() {
        criteria.merge_bindings(model.bindings());
    }

    Ok(Normalized::Ready(query))
}

fn invalid_records(message: String) -> OrmError {
    OrmError::usage(UsageCode::InvalidNewRecords, message)
}

fn invalid_values(message: String) -> OrmError {
    OrmError::usage(UsageCode::InvalidValuesToSet, message)
}

fn describe(value: Option<&Value>) -> String {
    value.map(Value::to_string).unwrap_or_else(|| "nothing".to_string())
}

struct RecordNormalizer<'a> {
    model: &'a ResolvedModel,
    schema: &'a Schema,
    strict: bool,
    now: DateTime<Utc>,
}

impl RecordNormalizer<'_> {
    fn new_record(&self, mut record: Record) -> OrmResult<Record> {
        let identity = self.model.identity();

        for (key, value) in &record {
            self.check_value(key, value, invalid_records)?;
        }

        if self.model.class_type().is_edge() {
            for endpoint in EDGE_ATTRIBUTES {
                if !record.get(endpoint).map(Value::is_string).unwrap_or(false) {
                    return Err(invalid_records(format!(
                        "Records of edge model `{}` need a string `{}`",
                        identity, endpoint
                    )));
                }
            }
        }

        for attribute in self.model.attributes().values() {
            if record.contains_key(&attribute.name) {
                if attribute.required && record[&attribute.name].is_null() {
                    return Err(invalid_records(format!(
                        "`{}` is required on `{}` records and cannot be null",
                        attribute.name, identity
                    )));
                }
                continue;
            }
            if let Some(value) = self.missing_value(attribute)? {
                record.insert(attribute.name.clone(), value);
            }
        }

        Ok(record)
    }

    fn missing_value(&self, attribute: &AttributeDefinition) -> OrmResult<Option<Value>> {
        if attribute.is_collection() {
            return Ok(Some(Value::Array(Vec::new())));
        }
        if attribute.auto_created_at || attribute.auto_updated_at {
            return Ok(Some(self.timestamp(attribute)));
        }
        if let Some(default) = &attribute.default_value {
            return Ok(Some(default.clone()));
        }
        if attribute.required {
            return Err(invalid_records(format!(
                "Missing value for required attribute `{}` of model `{}`",
                attribute.name,
                self.model.identity()
            )));
        }
        Ok(None)
    }

    fn values_to_set(&self, raw: Option<Value>) -> OrmResult<Record> {
        let mut values = match raw {
            Some(Value::Object(values)) if !values.is_empty() => values,
            other => {
                return Err(invalid_values(format!(
                    "Expected a non-empty dictionary of values to set, got {}",
                    describe(other.as_ref())
                )))
            }
        };

        for (key, value) in &values {
            if self.model.attribute(key).map(|a| a.is_collection()).unwrap_or(false) {
                return Err(invalid_values(format!(
                    "Cannot set to-many association `{}` with update; replace the collection instead",
                    key
                )));
            }
            self.check_value(key, value, invalid_values)?;
            if value.is_null() && self.model.attribute(key).map(|a| a.required).unwrap_or(false) {
                return Err(invalid_values(format!("`{}` is required and cannot be null", key)));
            }
        }

        for attribute in self.model.attributes().values() {
            if attribute.auto_updated_at && !values.contains_key(&attribute.name) {
                values.insert(attribute.name.clone(), self.timestamp(attribute));
            }
        }
        Ok(values)
    }

    fn check_value(
        &self,
        key: &str,
        value: &Value,
        fail: fn(String) -> OrmError,
    ) -> OrmResult<()> {
        let identity = self.model.identity();

        let Some(attribute) = self.model.attribute(key) else {
            if self.model.recognizes(key) {
                return Ok(());
            }
            if self.strict {
                return Err(fail(format!(
                    "`{}` is not a recognized attribute of model `{}`",
                    key, identity
                )));
            }
            tracing::debug!(model = %identity, attribute = %key, "Passing through unrecognized attribute");
            return Ok(());
        };

        if value.is_null() {
            if attribute.accepts_null() || attribute.required {
                // required-but-null is reported with a dedicated message by the caller
                return Ok(());
            }
            return Err(fail(format!(
                "`{}` of model `{}` does not allow null",
                key, identity
            )));
        }

        match &attribute.association {
            Some(association) if attribute.is_collection() => {
                let members = value.as_array().ok_or_else(|| {
                    fail(format!(
                        "To-many association `{}` expects an array of primary key values, got {}",
                        key, value
                    ))
                })?;
                if let Some(bad) = members
                    .iter()
                    .find(|member| !self.schema.is_primary_key_value(association.target(), member))
                {
                    return Err(fail(format!(
                        "`{}` contains {}, which is not a valid `{}` primary key",
                        key,
                        bad,
                        association.target()
                    )));
                }
            }
            Some(association) => {
                if !self.schema.is_primary_key_value(association.target(), value) {
                    return Err(fail(format!(
                        "Singular association `{}` expects a `{}` primary key, got {}",
                        key,
                        association.target(),
                        value
                    )));
                }
            }
            None => {
                if let Some(kind) = attribute.kind {
                    if !kind.accepts(value) {
                        return Err(fail(format!(
                            "`{}` of model `{}` expects a {}, got {}",
                            key, identity, kind, value
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn timestamp(&self, attribute: &AttributeDefinition) -> Value {
        match attribute.kind {
            Some(AttributeType::Number) => Value::from(self.now.timestamp_millis()),
            _ => Value::String(self.now.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryAdapter;
    use crate::datastore::DatastoreRegistry;
    use crate::model::{ModelBuilder, ModelDefinition};
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> Schema {
        let mut registry = DatastoreRegistry::new();
        registry.register("default", Arc::new(MemoryAdapter::new()));
        let builder = ModelBuilder::new(&registry);
        let mut schema = Schema::new();
        for definition in [
            ModelDefinition::new("pet")
                .with_attribute("id", json!({"type": "number"}))
                .with_attribute("name", json!({"type": "string", "required": true}))
                .with_attribute("species", json!({"type": "string", "defaultsTo": "dog"}))
                .with_attribute("nickname", json!({"type": "string", "allowNull": true}))
                .with_attribute("owner", json!({"model": "person"}))
                .with_attribute("toys", json!({"collection": "toy"}))
                .with_attribute("createdAt", json!({"type": "number", "autoCreatedAt": true}))
                .with_attribute("updatedAt", json!({"type": "string", "autoUpdatedAt": true}))
                .with_bindings(json!({"tenant": "acme"}).as_object().cloned().unwrap()),
            ModelDefinition::new("person"),
            ModelDefinition::new("toy").with_attribute("id", json!({"type": "string"})),
            ModelDefinition::new("owns")
                .with_class_type("Edge")
                .with_edge_definition(json!({"from": ["person"], "to": ["pet"]})),
        ] {
            schema.insert(builder.build(&definition).unwrap()).unwrap();
        }
        schema
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn run(identity: &str, method: QueryMethod, request: QueryRequest) -> OrmResult<Normalized> {
        let schema = schema();
        let model = schema.get(identity).unwrap().clone();
        normalize(method, request, &model, &schema, &OrmConfig::default(), now())
    }

    fn ready(result: OrmResult<Normalized>) -> LogicalQuery {
        match result.unwrap() {
            Normalized::Ready(query) => query,
            Normalized::NoOp(outcome) => panic!("Unexpected no-op: {:?}", outcome),
        }
    }

    #[test]
    fn test_create_fills_defaults_and_timestamps() {
        let query = ready(run(
            "pet",
            QueryMethod::Create,
            QueryRequest::new().with_new_record(json!({"name": "Rex", "toys": ["ball"]})),
        ));

        let record = &query.new_records[0];
        assert_eq!(record["species"], json!("dog"));
        assert_eq!(record["toys"], json!(["ball"]));
        assert_eq!(record["createdAt"], json!(now().timestamp_millis()));
        assert_eq!(record["updatedAt"], json!(now().to_rfc3339()));
        assert!(!record.contains_key("nickname"));
        assert!(!record.contains_key("owner"));
    }

    #[test]
    fn test_missing_collections_become_empty() {
        let query = ready(run(
            "pet",
            QueryMethod::CreateEach,
            QueryRequest::new().with_new_records(json!([{"name": "Rex"}, {"name": "Fido"}])),
        ));
        assert!(query.new_records.iter().all(|record| record["toys"] == json!([])));
    }

    #[test]
    fn test_invalid_records_rejected() {
        for (method, request) in [
            (QueryMethod::Create, QueryRequest::new()),
            (QueryMethod::Create, QueryRequest::new().with_new_record(json!([{"name": "Rex"}]))),
            (QueryMethod::CreateEach, QueryRequest::new().with_new_records(json!({"name": "Rex"}))),
            (QueryMethod::CreateEach, QueryRequest::new().with_new_records(json!([{"name": "Rex"}, 4]))),
            (QueryMethod::Create, QueryRequest::new().with_new_record(json!({}))),
            (QueryMethod::Create, QueryRequest::new().with_new_record(json!({"name": null}))),
            (QueryMethod::Create, QueryRequest::new().with_new_record(json!({"name": 4}))),
            (QueryMethod::Create, QueryRequest::new().with_new_record(json!({"name": "Rex", "color": "brown"}))),
            (QueryMethod::Create, QueryRequest::new().with_new_record(json!({"name": "Rex", "species": null}))),
            (QueryMethod::Create, QueryRequest::new().with_new_record(json!({"name": "Rex", "toys": "ball"}))),
            (QueryMethod::Create, QueryRequest::new().with_new_record(json!({"name": "Rex", "toys": [1]}))),
            (QueryMethod::Create, QueryRequest::new().with_new_record(json!({"name": "Rex", "owner": {"id": 1}}))),
        ] {
            let error = run("pet", method, request.clone()).unwrap_err();
            assert_eq!(error.usage_code(), Some(UsageCode::InvalidNewRecords), "{:?}", request);
        }
    }

    #[test]
    fn test_nullable_values_accepted() {
        let query = ready(run(
            "pet",
            QueryMethod::Create,
            QueryRequest::new().with_new_record(json!({"name": "Rex", "nickname": null, "owner": null})),
        ));
        assert_eq!(query.new_records[0]["nickname"], Value::Null);
    }

    #[test]
    fn test_lenient_mode_passes_unknown_attributes_through() {
        let schema = schema();
        let model = schema.get("pet").unwrap().clone();
        let config = OrmConfig::default().with_strict_attributes(false);
        let normalized = normalize(
            QueryMethod::Create,
            QueryRequest::new().with_new_record(json!({"name": "Rex", "color": "brown"})),
            &model,
            &schema,
            &config,
            now(),
        )
        .unwrap();
        match normalized {
            Normalized::Ready(query) => assert_eq!(query.new_records[0]["color"], json!("brown")),
            other => panic!("Expected ready query, got {:?}", other),
        }
    }

    #[test]
    fn test_edge_records_need_endpoints() {
        let error = run(
            "owns",
            QueryMethod::Create,
            QueryRequest::new().with_new_record(json!({"_from": "person/1"})),
        )
        .unwrap_err();
        assert_eq!(error.usage_code(), Some(UsageCode::InvalidNewRecords));

        let query = ready(run(
            "owns",
            QueryMethod::Create,
            QueryRequest::new().with_new_record(json!({"_from": "person/1", "_to": "pet/2"})),
        ));
        assert_eq!(query.new_records[0]["_to"], json!("pet/2"));
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let outcome = run(
            "pet",
            QueryMethod::CreateEach,
            QueryRequest::new().with_new_records(json!([])),
        )
        .unwrap();
        assert_eq!(
            outcome,
            Normalized::NoOp(NoOpOutcome {
                reason: "no new records",
                result: None
            })
        );

        let fetched = run(
            "pet",
            QueryMethod::CreateEach,
            QueryRequest::new()
                .with_new_records(json!([]))
                .with_meta(json!({"fetch": true})),
        )
        .unwrap();
        match fetched {
            Normalized::NoOp(outcome) => assert_eq!(outcome.result, Some(json!([]))),
            other => panic!("Expected no-op, got {:?}", other),
        }
    }

    #[test]
    fn test_noop_results_per_method() {
        assert_eq!(noop_result(QueryMethod::Find, false), Some(json!([])));
        assert_eq!(noop_result(QueryMethod::Count, true), Some(json!(0)));
        assert_eq!(noop_result(QueryMethod::FindOne, true), None);
        assert_eq!(noop_result(QueryMethod::Destroy, true), Some(json!([])));
        assert_eq!(noop_result(QueryMethod::Update, false), None);

        let outcome = run(
            "pet",
            QueryMethod::Destroy,
            QueryRequest::new().with_criteria(json!({"id": {"in": []}})),
        )
        .unwrap();
        assert!(matches!(outcome, Normalized::NoOp(_)));
    }

    #[test]
    fn test_invalid_meta_checked_first() {
        let error = run(
            "pet",
            QueryMethod::CreateEach,
            QueryRequest::new().with_new_records(json!([])).with_meta(json!(true)),
        )
        .unwrap_err();
        assert_eq!(error.usage_code(), Some(UsageCode::InvalidMeta));
    }

    #[test]
    fn test_update_values_validated_and_stamped() {
        let query = ready(run(
            "pet",
            QueryMethod::Update,
            QueryRequest::new()
                .with_criteria(json!({"name": "Rex"}))
                .with_values_to_set(json!({"species": "cat"})),
        ));
        let values = query.values_to_set.unwrap();
        assert_eq!(values["species"], json!("cat"));
        assert_eq!(values["updatedAt"], json!(now().to_rfc3339()));

        for values in [json!({}), json!("cat"), json!({"toys": []}), json!({"name": null}), json!({"color": 1})] {
            let error = run(
                "pet",
                QueryMethod::Update,
                QueryRequest::new().with_values_to_set(values.clone()),
            )
            .unwrap_err();
            assert_eq!(error.usage_code(), Some(UsageCode::InvalidValuesToSet), "{}", values);
        }
    }

    #[test]
    fn test_model_bindings_merged_into_criteria() {
        let query = ready(run(
            "pet",
            QueryMethod::Find,
            QueryRequest::new().with_criteria(json!({"where": {"name": "Rex"}, "let": {"region": "eu"}})),
        ));
        assert_eq!(
            Value::Object(query.criteria.unwrap().bindings.unwrap()),
            json!({"tenant": "acme", "region": "eu"})
        );
    }

    #[test]
    fn test_replace_collection_not_callable() {
        let error = run("pet", QueryMethod::ReplaceCollection, QueryRequest::new()).unwrap_err();
        assert!(error.is_configuration());
    }
}
