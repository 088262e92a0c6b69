//! Criteria - Normalization of filter, pagination and projection clauses

use std::fmt;

use serde_json::{Map, Value};

use super::method::QueryMethod;
use crate::error::{OrmError, OrmResult, UsageCode};
use crate::model::{ColumnTransformer, ResolvedModel};

/// Clause names recognized in a structured criteria dictionary
pub const CRITERIA_CLAUSES: &[&str] = &["where", "limit", "skip", "sort", "select", "omit", "let"];

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn parse(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(direction) => match direction.to_ascii_uppercase().as_str() {
                "ASC" => Some(Self::Asc),
                "DESC" => Some(Self::Desc),
                _ => None,
            },
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(Self::Asc),
                Some(-1) => Some(Self::Desc),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "ASC"),
            Self::Desc => write!(f, "DESC"),
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortClause {
    pub attribute: String,
    pub direction: SortDirection,
}

/// Normalized criteria, expressed in attribute names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub where_clause: Map<String, Value>,
    pub limit: Option<u64>,
    pub skip: u64,
    pub sort: Vec<SortClause>,
    pub select: Option<Vec<String>>,
    pub omit: Vec<String>,
    /// Query-scoped variable bindings (`let`)
    pub bindings: Option<Map<String, Value>>,
}

impl Criteria {
    /// Normalize raw criteria for `method` against `model`
    pub fn normalize(method: QueryMethod, raw: Option<Value>, model: &ResolvedModel) -> OrmResult<Self> {
        let mut criteria = Self::default();

        let map = match raw {
            None | Some(Value::Null) => return Ok(criteria),
            Some(Value::Object(map)) if map.keys().any(|key| CRITERIA_CLAUSES.contains(&key.as_str())) => map,
            Some(Value::Object(map)) => {
                validate_where(&map, model)?;
                criteria.where_clause = map;
                return Ok(criteria);
            }
            Some(shorthand) => {
                criteria.where_clause = primary_key_shorthand(shorthand, model)?;
                return Ok(criteria);
            }
        };

        if let Some(unknown) = map.keys().find(|key| !CRITERIA_CLAUSES.contains(&key.as_str())) {
            return Err(invalid(format!(
                "Unrecognized clause `{}` in criteria (if it is an attribute, put it inside `where`)",
                unknown
            )));
        }
        check_clauses_allowed(method, &map)?;

        for (clause, value) in map {
            match clause.as_str() {
                "where" => {
                    criteria.where_clause = match value {
                        Value::Null => Map::new(),
                        Value::Object(clause) => {
                            validate_where(&clause, model)?;
                            clause
                        }
                        shorthand => primary_key_shorthand(shorthand, model)?,
                    }
                }
                "limit" => criteria.limit = Some(non_negative("limit", &value)?),
                "skip" => criteria.skip = non_negative("skip", &value)?,
                "sort" => criteria.sort = parse_sort(&value, model)?,
                "select" => criteria.select = Some(parse_names("select", &value, model)?),
                "omit" => criteria.omit = parse_names("omit", &value, model)?,
                "let" => match value {
                    Value::Object(bindings) => criteria.bindings = Some(bindings),
                    Value::Null => {}
                    other => return Err(invalid(format!("`let` must be a dictionary, got {}", other))),
                },
                _ => {}
            }
        }

        if criteria.select.is_some() && !criteria.omit.is_empty() {
            return Err(invalid("`select` and `omit` cannot be used together"));
        }

        Ok(criteria)
    }

    /// True when these criteria can never match a record
    pub fn is_noop(&self) -> bool {
        self.limit == Some(0) || where_is_noop(&self.where_clause)
    }

    /// Merge model-level bindings under `let`; entries already present on the
    /// criteria keep their value
    ///
    /// The merge is per key. A call-level `let` does not discard the model's
    /// other bindings, it only overrides the keys it names.
    pub fn merge_bindings(&mut self, model_bindings: Option<&Map<String, Value>>) {
        let Some(model_bindings) = model_bindings else {
            return;
        };
        let mut merged = model_bindings.clone();
        if let Some(own) = self.bindings.take() {
            merged.extend(own);
        }
        self.bindings = Some(merged);
    }

    /// Lower into the adapter-facing dictionary, renaming attributes to columns
    pub fn into_physical(self, transformer: &ColumnTransformer) -> Value {
        let mut physical = Map::new();
        physical.insert(
            "where".to_string(),
            Value::Object(transformer.serialize_where(self.where_clause)),
        );
        if let Some(limit) = self.limit {
            physical.insert("limit".to_string(), Value::from(limit));
        }
        if self.skip > 0 {
            physical.insert("skip".to_string(), Value::from(self.skip));
        }
        if !self.sort.is_empty() {
            let sort = self
                .sort
                .iter()
                .map(|clause| {
                    let mut entry = Map::new();
                    entry.insert(
                        transformer.column(&clause.attribute).to_string(),
                        Value::String(clause.direction.to_string()),
                    );
                    Value::Object(entry)
                })
                .collect();
            physical.insert("sort".to_string(), Value::Array(sort));
        }
        if let Some(select) = &self.select {
            physical.insert("select".to_string(), names_value(transformer.serialize_names(select)));
        }
        if !self.omit.is_empty() {
            physical.insert("omit".to_string(), names_value(transformer.serialize_names(&self.omit)));
        }
        if let Some(bindings) = self.bindings {
            physical.insert("let".to_string(), Value::Object(bindings));
        }
        Value::Object(physical)
    }
}

fn invalid(message: impl Into<String>) -> OrmError {
    OrmError::usage(UsageCode::InvalidCriteria, message)
}

fn names_value(names: Vec<String>) -> Value {
    Value::Array(names.into_iter().map(Value::String).collect())
}

fn check_clauses_allowed(method: QueryMethod, map: &Map<String, Value>) -> OrmResult<()> {
    let forbidden: &[&str] = match method {
        QueryMethod::FindOne => &["limit", "skip", "sort"],
        QueryMethod::Count => &["select", "omit"],
        QueryMethod::Update | QueryMethod::Destroy => &["limit", "skip", "sort", "select", "omit"],
        _ => &[],
    };
    match forbidden.iter().find(|clause| map.contains_key(**clause)) {
        Some(clause) => Err(invalid(format!("`{}` cannot be used with `{}`", clause, method))),
        None => Ok(()),
    }
}

fn primary_key_shorthand(value: Value, model: &ResolvedModel) -> OrmResult<Map<String, Value>> {
    let is_key = |value: &Value| value.is_string() || value.is_number();
    let constraint = match value {
        Value::Array(keys) => {
            if !keys.iter().all(is_key) {
                return Err(invalid("A list of primary key values may only contain strings or numbers"));
            }
            let mut modifier = Map::new();
            modifier.insert("in".to_string(), Value::Array(keys));
            Value::Object(modifier)
        }
        key if is_key(&key) => key,
        other => {
            return Err(invalid(format!(
                "Criteria must be a dictionary, a primary key value, or a list of primary key values; got {}",
                other
            )))
        }
    };
    let mut clause = Map::new();
    clause.insert(model.primary_key().to_string(), constraint);
    Ok(clause)
}

fn validate_where(clause: &Map<String, Value>, model: &ResolvedModel) -> OrmResult<()> {
    for (key, value) in clause {
        match key.as_str() {
            "and" | "or" => {
                let branches = value
                    .as_array()
                    .ok_or_else(|| invalid(format!("`{}` must be an array of dictionaries", key)))?;
                for branch in branches {
                    let branch = branch
                        .as_object()
                        .ok_or_else(|| invalid(format!("Each `{}` branch must be a dictionary", key)))?;
                    validate_where(branch, model)?;
                }
            }
            attribute => {
                if !model.recognizes(attribute) {
                    return Err(invalid(format!(
                        "`{}` is not a recognized attribute of model `{}`",
                        attribute,
                        model.identity()
                    )));
                }
                if model.attribute(attribute).map(|def| def.is_collection()).unwrap_or(false) {
                    return Err(invalid(format!(
                        "Cannot filter by to-many association `{}`",
                        attribute
                    )));
                }
                if let Some(modifiers) = value.as_object() {
                    for modifier in ["in", "nin"] {
                        if let Some(list) = modifiers.get(modifier) {
                            if !list.is_array() {
                                return Err(invalid(format!(
                                    "The `{}` modifier on `{}` must be an array",
                                    modifier, attribute
                                )));
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn where_is_noop(clause: &Map<String, Value>) -> bool {
    let branch_is_noop = |branch: &Value| branch.as_object().map(where_is_noop).unwrap_or(false);

    clause.iter().any(|(key, value)| match key.as_str() {
        "and" => value
            .as_array()
            .map(|branches| branches.iter().any(branch_is_noop))
            .unwrap_or(false),
        "or" => value
            .as_array()
            .map(|branches| branches.iter().all(branch_is_noop))
            .unwrap_or(false),
        _ => value
            .get("in")
            .and_then(Value::as_array)
            .map(|members| members.is_empty())
            .unwrap_or(false),
    })
}

fn non_negative(clause: &str, value: &Value) -> OrmResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| invalid(format!("`{}` must be a non-negative integer, got {}", clause, value)))
}

fn check_sortable(attribute: &str, model: &ResolvedModel) -> OrmResult<()> {
    let collection = model.attribute(attribute).map(|def| def.is_collection()).unwrap_or(false);
    if !model.recognizes(attribute) || collection {
        return Err(invalid(format!("Cannot sort by `{}`", attribute)));
    }
    Ok(())
}

fn parse_sort(value: &Value, model: &ResolvedModel) -> OrmResult<Vec<SortClause>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(expression) => Ok(vec![parse_sort_expression(expression, model)?]),
        Value::Object(map) => map
            .iter()
            .map(|(attribute, direction)| {
                check_sortable(attribute, model)?;
                let direction = SortDirection::parse(direction).ok_or_else(|| {
                    invalid(format!("Unrecognized sort direction {} for `{}`", direction, attribute))
                })?;
                Ok(SortClause {
                    attribute: attribute.clone(),
                    direction,
                })
            })
            .collect(),
        Value::Array(entries) => {
            let mut clauses = Vec::with_capacity(entries.len());
            for entry in entries {
                if matches!(entry, Value::Array(_)) {
                    return Err(invalid("Sort entries cannot be nested arrays"));
                }
                clauses.extend(parse_sort(entry, model)?);
            }
            Ok(clauses)
        }
        other => Err(invalid(format!("Unrecognized sort clause {}", other))),
    }
}

fn parse_sort_expression(expression: &str, model: &ResolvedModel) -> OrmResult<SortClause> {
    let mut parts = expression.split_whitespace();
    let attribute = parts
        .next()
        .ok_or_else(|| invalid("Sort expression cannot be empty"))?;
    let direction = match parts.next() {
        None => SortDirection::Asc,
        Some(raw) => SortDirection::parse(&Value::String(raw.to_string()))
            .ok_or_else(|| invalid(format!("Unrecognized sort direction `{}`", raw)))?,
    };
    if parts.next().is_some() {
        return Err(invalid(format!("Malformed sort expression `{}`", expression)));
    }
    check_sortable(attribute, model)?;
    Ok(SortClause {
        attribute: attribute.to_string(),
        direction,
    })
}

fn parse_names(clause: &str, value: &Value, model: &ResolvedModel) -> OrmResult<Vec<String>> {
    let entries = value
        .as_array()
        .ok_or_else(|| invalid(format!("`{}` must be an array of attribute names", clause)))?;
    entries
        .iter()
        .map(|entry| {
            let name = entry
                .as_str()
                .ok_or_else(|| invalid(format!("`{}` entries must be strings", clause)))?;
            if name != "*" && !model.recognizes(name) {
                return Err(invalid(format!(
                    "`{}` in `{}` is not a recognized attribute",
                    name, clause
                )));
            }
            Ok(name.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryAdapter;
    use crate::datastore::DatastoreRegistry;
    use crate::model::{ModelBuilder, ModelDefinition};
    use serde_json::json;
    use std::sync::Arc;

    fn pet() -> ResolvedModel {
        let mut registry = DatastoreRegistry::new();
        registry.register("default", Arc::new(MemoryAdapter::new()));
        ModelBuilder::new(&registry)
            .build(
                &ModelDefinition::new("pet")
                    .with_attribute("id", json!({"type": "number"}))
                    .with_attribute("name", json!({"type": "string", "columnName": "pet_name"}))
                    .with_attribute("age", json!({"type": "number"}))
                    .with_attribute("toys", json!({"collection": "toy"})),
            )
            .unwrap()
    }

    #[test]
    fn test_absent_criteria_matches_everything() {
        let criteria = Criteria::normalize(QueryMethod::Find, None, &pet()).unwrap();
        assert!(criteria.where_clause.is_empty());
        assert!(!criteria.is_noop());
    }

    #[test]
    fn test_bare_dictionary_is_where_clause() {
        let criteria = Criteria::normalize(QueryMethod::Find, Some(json!({"name": "Rex"})), &pet()).unwrap();
        assert_eq!(Value::Object(criteria.where_clause), json!({"name": "Rex"}));
    }

    #[test]
    fn test_primary_key_shorthands() {
        let model = pet();
        let single = Criteria::normalize(QueryMethod::Destroy, Some(json!(7)), &model).unwrap();
        assert_eq!(Value::Object(single.where_clause), json!({"id": 7}));

        let many = Criteria::normalize(QueryMethod::Destroy, Some(json!([1, 2])), &model).unwrap();
        assert_eq!(Value::Object(many.where_clause), json!({"id": {"in": [1, 2]}}));

        let nested = Criteria::normalize(QueryMethod::Find, Some(json!({"where": 3, "limit": 1})), &model).unwrap();
        assert_eq!(Value::Object(nested.where_clause), json!({"id": 3}));
        assert_eq!(nested.limit, Some(1));
    }

    #[test]
    fn test_structured_criteria() {
        let criteria = Criteria::normalize(
            QueryMethod::Find,
            Some(json!({
                "where": {"age": {">": 2}},
                "limit": 10,
                "skip": 5,
                "sort": ["name DESC", {"age": 1}],
                "select": ["name"]
            })),
            &pet(),
        )
        .unwrap();

        assert_eq!(criteria.limit, Some(10));
        assert_eq!(criteria.skip, 5);
        assert_eq!(
            criteria.sort,
            vec![
                SortClause { attribute: "name".into(), direction: SortDirection::Desc },
                SortClause { attribute: "age".into(), direction: SortDirection::Asc },
            ]
        );
        assert_eq!(criteria.select, Some(vec!["name".to_string()]));
    }

    #[test]
    fn test_invalid_criteria_rejected() {
        let model = pet();
        for raw in [
            json!({"where": {"color": "brown"}}),
            json!({"toys": ["ball"]}),
            json!({"limit": -1}),
            json!({"skip": 1.5}),
            json!({"sort": "name sideways"}),
            json!({"select": ["name"], "omit": ["age"]}),
            json!({"where": {}, "name": "Rex"}),
            json!({"or": {"name": "Rex"}}),
            json!({"name": {"in": "Rex"}}),
            json!(true),
        ] {
            let error = Criteria::normalize(QueryMethod::Find, Some(raw.clone()), &model).unwrap_err();
            assert_eq!(error.usage_code(), Some(UsageCode::InvalidCriteria), "{}", raw);
        }
    }

    #[test]
    fn test_method_specific_clauses() {
        let model = pet();
        assert!(Criteria::normalize(QueryMethod::FindOne, Some(json!({"limit": 1})), &model).is_err());
        assert!(Criteria::normalize(QueryMethod::Count, Some(json!({"select": ["name"]})), &model).is_err());
        assert!(Criteria::normalize(QueryMethod::Destroy, Some(json!({"sort": "name"})), &model).is_err());
        assert!(Criteria::normalize(QueryMethod::Count, Some(json!({"limit": 3})), &model).is_ok());
    }

    #[test]
    fn test_noop_detection() {
        let model = pet();
        for raw in [
            json!({"limit": 0}),
            json!({"id": {"in": []}}),
            json!({"and": [{"name": "Rex"}, {"age": {"in": []}}]}),
            json!({"or": []}),
            json!({"or": [{"id": {"in": []}}, {"name": {"in": []}}]}),
            json!([]),
        ] {
            let criteria = Criteria::normalize(QueryMethod::Find, Some(raw.clone()), &model).unwrap();
            assert!(criteria.is_noop(), "{}", raw);
        }

        let partial = Criteria::normalize(
            QueryMethod::Find,
            Some(json!({"or": [{"id": {"in": []}}, {"name": "Rex"}]})),
            &model,
        )
        .unwrap();
        assert!(!partial.is_noop());
    }

    #[test]
    fn test_bindings_merge_keeps_call_level_entries() {
        let model_bindings = json!({"tenant": "acme", "region": "eu"}).as_object().cloned().unwrap();
        let mut criteria = Criteria::normalize(
            QueryMethod::Find,
            Some(json!({"where": {}, "let": {"region": "us"}})),
            &pet(),
        )
        .unwrap();

        criteria.merge_bindings(Some(&model_bindings));
        assert_eq!(
            Value::Object(criteria.bindings.unwrap()),
            json!({"tenant": "acme", "region": "us"})
        );
    }

    #[test]
    fn test_into_physical_uses_columns() {
        let model = pet();
        let criteria = Criteria::normalize(
            QueryMethod::Find,
            Some(json!({"where": {"name": "Rex"}, "sort": "name", "select": ["name", "age"], "limit": 2})),
            &model,
        )
        .unwrap();

        assert_eq!(
            criteria.into_physical(model.transformer()),
            json!({
                "where": {"pet_name": "Rex"},
                "limit": 2,
                "sort": [{"pet_name": "ASC"}],
                "select": ["pet_name", "age"]
            })
        );
    }
}
