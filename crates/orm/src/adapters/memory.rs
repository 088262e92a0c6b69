//! In-memory reference adapter
//!
//! Keeps every table in process memory, keyed by datastore and table name.
//! Useful for tests and for exercising the pipeline without a real store.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::core::{Adapter, AdapterError};
use crate::datastore::Datastore;
use crate::query::{PhysicalQuery, QueryMethod};

type Record = Map<String, Value>;
type TableKey = (String, String);

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<TableKey, Vec<Record>>,
    /// (datastore, table, primary key, column) → associated primary keys
    links: HashMap<(String, String, String, String), Vec<Value>>,
}

/// Reference adapter storing records in memory
#[derive(Debug)]
pub struct MemoryAdapter {
    state: RwLock<MemoryState>,
    unique: HashSet<TableKey>,
    next_id: AtomicU64,
    max_concurrency: Option<usize>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            unique: HashSet::new(),
            next_id: AtomicU64::new(1),
            max_concurrency: None,
        }
    }

    /// Enforce uniqueness of `column` within `table`
    pub fn with_unique(mut self, table: &str, column: &str) -> Self {
        self.unique.insert((table.to_string(), column.to_string()));
        self
    }

    /// Bound the lifecycle hook fan-out for models stored here
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    /// Snapshot of every record stored in a table
    pub async fn records(&self, datastore: &str, table: &str) -> Vec<Record> {
        let state = self.state.read().await;
        state
            .tables
            .get(&(datastore.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Members of a to-many association written by `replaceCollection`
    pub async fn links(
        &self,
        datastore: &str,
        table: &str,
        primary_key: &Value,
        column: &str,
    ) -> Option<Vec<Value>> {
        let state = self.state.read().await;
        state
            .links
            .get(&(
                datastore.to_string(),
                table.to_string(),
                primary_key.to_string(),
                column.to_string(),
            ))
            .cloned()
    }

    fn stage_records(
        &self,
        existing: &[Record],
        query: &PhysicalQuery,
    ) -> Result<Vec<Record>, AdapterError> {
        let mut staged: Vec<Record> = Vec::with_capacity(query.new_records.len());
        for record in &query.new_records {
            let mut record = record.clone();
            let missing_key = record
                .get(&query.primary_key)
                .map(Value::is_null)
                .unwrap_or(true);
            if missing_key {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                record.insert(query.primary_key.clone(), Value::from(id));
            }

            self.check_unique(&query.using, &record, existing.iter().chain(staged.iter()))?;
            staged.push(record);
        }
        Ok(staged)
    }

    /// Fail when `record` shares a unique column value with any of `others`
    fn check_unique<'a, I>(&self, table: &str, record: &Record, others: I) -> Result<(), AdapterError>
    where
        I: Iterator<Item = &'a Record> + Clone,
    {
        for (unique_table, column) in &self.unique {
            if unique_table != table {
                continue;
            }
            let Some(value) = record.get(column).filter(|value| !value.is_null()) else {
                continue;
            };
            if others.clone().any(|other| other.get(column) == Some(value)) {
                return Err(AdapterError::not_unique(
                    format!(
                        "Would violate uniqueness constraint: a record already exists with conflicting value for `{}`",
                        column
                    ),
                    vec![column.clone()],
                ));
            }
        }
        Ok(())
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn identity(&self) -> &str {
        "memory"
    }

    fn supports(&self, _method: QueryMethod) -> bool {
        true
    }

    fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    async fn execute(
        &self,
        datastore: &Datastore,
        query: &PhysicalQuery,
    ) -> Result<Option<Value>, AdapterError> {
        let key = (datastore.name().to_string(), query.using.clone());
        let clause = where_clause(query);

        match query.method {
            QueryMethod::Create | QueryMethod::CreateEach | QueryMethod::NormalizeEach => {
                let mut state = self.state.write().await;
                let table = state.tables.entry(key).or_default();

                if query.method == QueryMethod::NormalizeEach {
                    let incoming: Vec<&Value> = query
                        .new_records
                        .iter()
                        .filter_map(|record| record.get(&query.primary_key))
                        .filter(|id| !id.is_null())
                        .collect();
                    table.retain(|row| {
                        row.get(&query.primary_key)
                            .map(|id| !incoming.contains(&id))
                            .unwrap_or(true)
                    });
                }

                let staged = self.stage_records(table, query)?;
                table.extend(staged.iter().cloned());

                if !query.meta.fetch {
                    return Ok(None);
                }
                let mut staged = staged.into_iter().map(Value::Object);
                if query.method == QueryMethod::Create {
                    Ok(staged.next())
                } else {
                    Ok(Some(Value::Array(staged.collect())))
                }
            }
            QueryMethod::Find => {
                let state = self.state.read().await;
                let mut rows: Vec<Record> = state
                    .tables
                    .get(&key)
                    .map(|rows| rows.iter().filter(|row| matches(row, &clause)).cloned().collect())
                    .unwrap_or_default();
                sort_rows(&mut rows, query);
                let skip = criteria_number(query, "skip").unwrap_or(0) as usize;
                let limit = criteria_number(query, "limit").map(|n| n as usize).unwrap_or(usize::MAX);
                let rows = rows
                    .into_iter()
                    .skip(skip)
                    .take(limit)
                    .map(|row| Value::Object(project(row, query)))
                    .collect();
                Ok(Some(Value::Array(rows)))
            }
            QueryMethod::FindOne => {
                let state = self.state.read().await;
                let found: Vec<&Record> = state
                    .tables
                    .get(&key)
                    .map(|rows| rows.iter().filter(|row| matches(row, &clause)).collect())
                    .unwrap_or_default();
                match found.as_slice() {
                    [] => Ok(None),
                    [row] => Ok(Some(Value::Object(project((*row).clone(), query)))),
                    _ => Err(AdapterError::new(format!(
                        "More than one matching record found for findOne ({} matches)",
                        found.len()
                    ))),
                }
            }
            QueryMethod::Count => {
                let state = self.state.read().await;
                let count = state
                    .tables
                    .get(&key)
                    .map(|rows| rows.iter().filter(|row| matches(row, &clause)).count())
                    .unwrap_or(0);
                Ok(Some(Value::from(count)))
            }
            QueryMethod::Update => {
                let values = query.values_to_set.clone().unwrap_or_default();
                let mut state = self.state.write().await;
                let Some(rows) = state.tables.get_mut(&key) else {
                    return Ok(query.meta.fetch.then(|| Value::Array(Vec::new())));
                };

                // Applied to a copy so a constraint failure leaves the table untouched
                let mut next = rows.clone();
                let mut touched = Vec::new();
                for (position, row) in next.iter_mut().enumerate() {
                    if matches(row, &clause) {
                        for (column, value) in &values {
                            row.insert(column.clone(), value.clone());
                        }
                        touched.push(position);
                    }
                }
                for &position in &touched {
                    let others = next
                        .iter()
                        .enumerate()
                        .filter(move |(other, _)| *other != position)
                        .map(|(_, row)| row);
                    self.check_unique(&query.using, &next[position], others)?;
                }

                let updated = touched
                    .iter()
                    .map(|&position| Value::Object(next[position].clone()))
                    .collect();
                *rows = next;
                Ok(query.meta.fetch.then(|| Value::Array(updated)))
            }
            QueryMethod::Destroy => {
                let mut state = self.state.write().await;
                let mut destroyed = Vec::new();
                if let Some(rows) = state.tables.get_mut(&key) {
                    let (gone, kept): (Vec<Record>, Vec<Record>) =
                        rows.drain(..).partition(|row| matches(row, &clause));
                    *rows = kept;
                    destroyed = gone.into_iter().map(Value::Object).collect();
                }
                Ok(query.meta.fetch.then(|| Value::Array(destroyed)))
            }
            QueryMethod::ReplaceCollection => {
                let values = query.values_to_set.clone().unwrap_or_default();
                let mut state = self.state.write().await;
                let owners: Vec<Value> = state
                    .tables
                    .get(&key)
                    .map(|rows| {
                        rows.iter()
                            .filter(|row| matches(row, &clause))
                            .filter_map(|row| row.get(&query.primary_key).cloned())
                            .collect()
                    })
                    .unwrap_or_default();

                for owner in owners {
                    for (column, members) in &values {
                        let members = members.as_array().cloned().unwrap_or_default();
                        state.links.insert(
                            (key.0.clone(), key.1.clone(), owner.to_string(), column.clone()),
                            members,
                        );
                    }
                }
                Ok(None)
            }
        }
    }
}

fn where_clause(query: &PhysicalQuery) -> Map<String, Value> {
    query
        .criteria
        .as_ref()
        .and_then(|criteria| criteria.get("where"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn criteria_number(query: &PhysicalQuery, clause: &str) -> Option<u64> {
    query
        .criteria
        .as_ref()
        .and_then(|criteria| criteria.get(clause))
        .and_then(Value::as_u64)
}

fn matches(row: &Record, clause: &Map<String, Value>) -> bool {
    let branches = |value: &Value| -> Vec<Map<String, Value>> {
        value
            .as_array()
            .map(|branches| branches.iter().filter_map(|b| b.as_object().cloned()).collect())
            .unwrap_or_default()
    };

    clause.iter().all(|(key, constraint)| match key.as_str() {
        "and" => branches(constraint).iter().all(|branch| matches(row, branch)),
        "or" => branches(constraint).iter().any(|branch| matches(row, branch)),
        column => matches_constraint(row.get(column).unwrap_or(&Value::Null), constraint),
    })
}

fn matches_constraint(actual: &Value, constraint: &Value) -> bool {
    let Value::Object(modifiers) = constraint else {
        return actual == constraint;
    };
    modifiers.iter().all(|(modifier, operand)| match modifier.as_str() {
        "in" => operand.as_array().map(|list| list.contains(actual)).unwrap_or(false),
        "nin" => operand.as_array().map(|list| !list.contains(actual)).unwrap_or(true),
        "!=" => actual != operand,
        ">" => compare(actual, operand) == CmpOrdering::Greater,
        ">=" => compare(actual, operand) != CmpOrdering::Less,
        "<" => compare(actual, operand) == CmpOrdering::Less,
        "<=" => compare(actual, operand) != CmpOrdering::Greater,
        "contains" => string_op(actual, operand, |a, b| a.contains(b)),
        "startsWith" => string_op(actual, operand, |a, b| a.starts_with(b)),
        "endsWith" => string_op(actual, operand, |a, b| a.ends_with(b)),
        _ => false,
    })
}

fn string_op(actual: &Value, operand: &Value, op: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), operand.as_str()) {
        (Some(actual), Some(operand)) => op(actual, operand),
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> CmpOrdering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => CmpOrdering::Equal,
        (Value::Null, _) => CmpOrdering::Less,
        (_, Value::Null) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}

fn sort_rows(rows: &mut [Record], query: &PhysicalQuery) {
    let Some(keys) = query
        .criteria
        .as_ref()
        .and_then(|criteria| criteria.get("sort"))
        .and_then(Value::as_array)
    else {
        return;
    };
    let keys: Vec<(String, bool)> = keys
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|entry| {
            entry
                .iter()
                .map(|(column, direction)| (column.clone(), direction.as_str() == Some("DESC")))
        })
        .collect();

    rows.sort_by(|a, b| {
        for (column, descending) in &keys {
            let ordering = compare(
                a.get(column).unwrap_or(&Value::Null),
                b.get(column).unwrap_or(&Value::Null),
            );
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != CmpOrdering::Equal {
                return ordering;
            }
        }
        CmpOrdering::Equal
    });
}

fn project(row: Record, query: &PhysicalQuery) -> Record {
    let names = |clause: &str| -> Option<Vec<String>> {
        query
            .criteria
            .as_ref()
            .and_then(|criteria| criteria.get(clause))
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(|n| n.as_str().map(str::to_string)).collect())
    };

    if let Some(select) = names("select").filter(|select| !select.iter().any(|n| n == "*")) {
        return row
            .into_iter()
            .filter(|(column, _)| column == &query.primary_key || select.contains(column))
            .collect();
    }
    if let Some(omit) = names("omit") {
        return row.into_iter().filter(|(column, _)| !omit.contains(column)).collect();
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Footprint;
    use crate::datastore::{CollectionIndex, DatastoreRegistry};
    use crate::model::ResolvedModel;
    use crate::query::Meta;
    use serde_json::json;
    use std::sync::Arc;

    fn datastore(adapter: Arc<MemoryAdapter>) -> Arc<Datastore> {
        let mut registry = DatastoreRegistry::new();
        registry.register("default", adapter);
        let index = CollectionIndex::link(&registry, std::iter::empty::<&ResolvedModel>());
        registry.freeze(&index).remove("default").unwrap()
    }

    fn query(method: QueryMethod) -> PhysicalQuery {
        PhysicalQuery {
            method,
            using: "pets".to_string(),
            identity: "pet".to_string(),
            primary_key: "id".to_string(),
            new_records: Vec::new(),
            criteria: None,
            values_to_set: None,
            meta: Meta::default(),
            fetch_requested: false,
            collection_resets: Vec::new(),
        }
    }

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|record| record.as_object().cloned().unwrap())
            .collect()
    }

    async fn seed(adapter: &MemoryAdapter, store: &Datastore) {
        let mut create = query(QueryMethod::CreateEach);
        create.new_records = records(json!([
            {"name": "Rex", "age": 3},
            {"name": "Fido", "age": 5},
            {"name": "Tom", "age": 1}
        ]));
        adapter.execute(store, &create).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_assigns_keys_and_honours_fetch() {
        let adapter = Arc::new(MemoryAdapter::new());
        let store = datastore(adapter.clone());

        let mut create = query(QueryMethod::Create);
        create.new_records = records(json!([{"name": "Rex"}]));
        assert_eq!(adapter.execute(&store, &create).await.unwrap(), None);

        create.meta.fetch = true;
        let created = adapter.execute(&store, &create).await.unwrap().unwrap();
        assert_eq!(created["name"], json!("Rex"));
        assert!(created["id"].is_number());
        assert_eq!(adapter.records("default", "pets").await.len(), 2);
    }

    #[tokio::test]
    async fn test_find_filters_sorts_and_projects() {
        let adapter = Arc::new(MemoryAdapter::new());
        let store = datastore(adapter.clone());
        seed(&adapter, &store).await;

        let mut find = query(QueryMethod::Find);
        find.criteria = Some(json!({
            "where": {"or": [{"age": {">": 2}}, {"name": "Tom"}]},
            "sort": [{"age": "DESC"}],
            "select": ["name"],
            "limit": 2
        }));
        let found = adapter.execute(&store, &find).await.unwrap().unwrap();
        let names: Vec<_> = found.as_array().unwrap().iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("Fido"), json!("Rex")]);
        assert!(found[0].get("age").is_none());
        assert!(found[0].get("id").is_some());

        let mut count = query(QueryMethod::Count);
        count.criteria = Some(json!({"where": {"name": {"in": ["Rex", "Tom"]}}}));
        assert_eq!(adapter.execute(&store, &count).await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_unique_violation_reports_footprint() {
        let adapter = Arc::new(MemoryAdapter::new().with_unique("pets", "name"));
        let store = datastore(adapter.clone());
        seed(&adapter, &store).await;

        let mut create = query(QueryMethod::Create);
        create.new_records = records(json!([{"name": "Rex"}]));
        let error = adapter.execute(&store, &create).await.unwrap_err();
        assert_eq!(
            error.footprint,
            Some(Footprint::NotUnique {
                keys: vec!["name".to_string()]
            })
        );
        assert_eq!(adapter.records("default", "pets").await.len(), 3);
    }

    #[tokio::test]
    async fn test_update_enforces_unique_columns_atomically() {
        let adapter = Arc::new(MemoryAdapter::new().with_unique("pets", "name"));
        let store = datastore(adapter.clone());
        seed(&adapter, &store).await;

        let mut update = query(QueryMethod::Update);
        update.criteria = Some(json!({"where": {"name": "Tom"}}));
        update.values_to_set = json!({"name": "Rex"}).as_object().cloned();
        let error = adapter.execute(&store, &update).await.unwrap_err();
        assert_eq!(
            error.footprint,
            Some(Footprint::NotUnique {
                keys: vec!["name".to_string()]
            })
        );

        update.criteria = Some(json!({"where": {"age": {">": 2}}}));
        update.values_to_set = json!({"name": "Twin"}).as_object().cloned();
        assert!(adapter.execute(&store, &update).await.is_err());

        let names: Vec<Value> = adapter
            .records("default", "pets")
            .await
            .iter()
            .map(|row| row["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("Rex"), json!("Fido"), json!("Tom")]);

        update.criteria = Some(json!({"where": {"name": "Tom"}}));
        update.values_to_set = json!({"name": "Tom", "age": 2}).as_object().cloned();
        adapter.execute(&store, &update).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_destroy_and_replace_collection() {
        let adapter = Arc::new(MemoryAdapter::new());
        let store = datastore(adapter.clone());
        seed(&adapter, &store).await;

        let mut update = query(QueryMethod::Update);
        update.criteria = Some(json!({"where": {"name": "Rex"}}));
        update.values_to_set = json!({"age": 4}).as_object().cloned();
        update.meta.fetch = true;
        let updated = adapter.execute(&store, &update).await.unwrap().unwrap();
        assert_eq!(updated[0]["age"], json!(4));
        let rex_id = updated[0]["id"].clone();

        let mut replace = query(QueryMethod::ReplaceCollection);
        replace.criteria = Some(json!({"where": {"id": rex_id.clone()}}));
        replace.values_to_set = json!({"toys": ["ball", "bone"]}).as_object().cloned();
        assert_eq!(adapter.execute(&store, &replace).await.unwrap(), None);
        assert_eq!(
            adapter.links("default", "pets", &rex_id, "toys").await,
            Some(vec![json!("ball"), json!("bone")])
        );

        let mut destroy = query(QueryMethod::Destroy);
        destroy.criteria = Some(json!({"where": {"age": {"<": 4}}}));
        assert_eq!(adapter.execute(&store, &destroy).await.unwrap(), None);
        assert_eq!(adapter.records("default", "pets").await.len(), 2);
    }

    #[tokio::test]
    async fn test_find_one_rejects_ambiguous_matches() {
        let adapter = Arc::new(MemoryAdapter::new());
        let store = datastore(adapter.clone());
        seed(&adapter, &store).await;

        let mut find_one = query(QueryMethod::FindOne);
        find_one.criteria = Some(json!({"where": {"age": {">": 0}}}));
        assert!(adapter.execute(&store, &find_one).await.is_err());

        find_one.criteria = Some(json!({"where": {"name": "Nobody"}}));
        assert_eq!(adapter.execute(&store, &find_one).await.unwrap(), None);
    }
}
