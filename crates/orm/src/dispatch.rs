//! Adapter Dispatch - Runs physical queries and translates adapter failures
//!
//! Callers never see adapter-native errors: every [`AdapterError`] is turned
//! into [`OrmError::Adapter`] carrying the translated kind, the adapter
//! identity and the captured [`QueryContext`]. Returned records are mapped back
//! from column names to attribute names, and collection resets extracted by
//! the forger are applied with one `replaceCollection` call per reset entry.

use serde_json::{Map, Value};

use crate::adapters::{AdapterError, Footprint};
use crate::context::QueryContext;
use crate::datastore::Datastore;
use crate::error::{AdapterErrorKind, OrmError, OrmResult};
use crate::model::ResolvedModel;
use crate::query::{CollectionReset, Meta, PhysicalQuery, QueryMethod};

/// Execute a forged query and settle it into the caller-facing result
pub async fn dispatch(
    model: &ResolvedModel,
    datastore: &Datastore,
    query: PhysicalQuery,
    context: &QueryContext,
) -> OrmResult<Option<Value>> {
    let adapter = datastore.adapter();
    ensure_supported(adapter.identity(), adapter.supports(query.method), query.method)?;
    if query.has_resets() {
        ensure_supported(
            adapter.identity(),
            adapter.supports(QueryMethod::ReplaceCollection),
            QueryMethod::ReplaceCollection,
        )?;
    }

    tracing::debug!(
        adapter = %adapter.identity(),
        table = %query.using,
        method = %query.method,
        "Dispatching query to adapter"
    );

    let raw = adapter
        .execute(datastore, &query)
        .await
        .map_err(|error| translate(error, adapter.identity(), model, context))?;

    if query.has_resets() {
        apply_resets(model, datastore, &query, raw.as_ref(), context).await?;
    }

    if query.method.creates_records() && !query.fetch_requested {
        return Ok(None);
    }
    Ok(raw.map(|value| unserialize(model, value)))
}

fn ensure_supported(adapter: &str, supported: bool, method: QueryMethod) -> OrmResult<()> {
    if supported {
        return Ok(());
    }
    tracing::error!(adapter = %adapter, method = %method, "Adapter does not implement method");
    Err(OrmError::configuration(format!(
        "The adapter used by this model (`{}`) doesn't support the `{}` method.",
        adapter, method
    )))
}

/// Translate a raw adapter error into the ORM taxonomy
pub fn translate(
    error: AdapterError,
    adapter: &str,
    model: &ResolvedModel,
    context: &QueryContext,
) -> OrmError {
    let kind = match &error.footprint {
        Some(Footprint::NotUnique { keys }) => AdapterErrorKind::NotUnique {
            attributes: keys
                .iter()
                .map(|column| model.transformer().attribute(column).to_string())
                .collect(),
        },
        Some(Footprint::Catchall) | None => AdapterErrorKind::Catchall,
    };

    tracing::warn!(
        adapter = %adapter,
        code = kind.code(),
        request_id = %context.request_id,
        error = %error,
        "Adapter reported a failure"
    );

    OrmError::Adapter {
        kind,
        adapter: adapter.to_string(),
        message: error.message.clone(),
        context: context.clone(),
        source: error,
    }
}

async fn apply_resets(
    model: &ResolvedModel,
    datastore: &Datastore,
    query: &PhysicalQuery,
    raw: Option<&Value>,
    context: &QueryContext,
) -> OrmResult<()> {
    let adapter = datastore.adapter();
    let persisted: Vec<&Map<String, Value>> = match raw {
        Some(Value::Object(record)) => vec![record],
        Some(Value::Array(records)) => records.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    };
    if persisted.len() != query.collection_resets.len() {
        let error = AdapterError::new(format!(
            "Expected {} persisted record(s) to apply collection resets, adapter returned {}",
            query.collection_resets.len(),
            persisted.len()
        ));
        return Err(translate(error, adapter.identity(), model, context));
    }

    for (record, reset) in persisted.into_iter().zip(&query.collection_resets) {
        if reset.is_empty() {
            continue;
        }
        let Some(primary_key) = record.get(&query.primary_key).filter(|id| !id.is_null()) else {
            let error = AdapterError::new(format!(
                "Persisted record is missing its primary key `{}`",
                query.primary_key
            ));
            return Err(translate(error, adapter.identity(), model, context));
        };

        let replace = replace_collection_query(model, query, primary_key.clone(), reset);
        adapter
            .execute(datastore, &replace)
            .await
            .map_err(|error| translate(error, adapter.identity(), model, context))?;
        tracing::debug!(
            table = %query.using,
            primary_key = %primary_key,
            associations = reset.len(),
            "Applied collection reset"
        );
    }
    Ok(())
}

fn replace_collection_query(
    model: &ResolvedModel,
    query: &PhysicalQuery,
    primary_key: Value,
    reset: &CollectionReset,
) -> PhysicalQuery {
    let mut clause = Map::new();
    clause.insert(query.primary_key.clone(), primary_key);
    let mut criteria = Map::new();
    criteria.insert("where".to_string(), Value::Object(clause));

    let values_to_set = reset
        .iter()
        .map(|(attribute, members)| {
            (
                model.transformer().column(attribute).to_string(),
                Value::Array(members.clone()),
            )
        })
        .collect();

    PhysicalQuery {
        method: QueryMethod::ReplaceCollection,
        using: query.using.clone(),
        identity: query.identity.clone(),
        primary_key: query.primary_key.clone(),
        new_records: Vec::new(),
        criteria: Some(Value::Object(criteria)),
        values_to_set: Some(values_to_set),
        meta: Meta::default(),
        fetch_requested: false,
        collection_resets: Vec::new(),
    }
}

fn unserialize(model: &ResolvedModel, value: Value) -> Value {
    let transformer = model.transformer();
    match value {
        Value::Object(record) => Value::Object(transformer.unserialize_record(record)),
        Value::Array(records) => Value::Array(
            records
                .into_iter()
                .map(|record| match record {
                    Value::Object(record) => Value::Object(transformer.unserialize_record(record)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}
