//! Query Requests - The explicit, loosely-typed request a model call carries
//!
//! A `QueryRequest` is what application code hands to the pipeline: every
//! field is optional and untyped JSON, exactly as supplied. Stage two is
//! responsible for rejecting anything structurally invalid.

use serde::Serialize;
use serde_json::{Map, Value};

use super::criteria::CRITERIA_CLAUSES;
use crate::error::{OrmError, OrmResult, UsageCode};

/// Meta keys that must hold booleans when present
pub const BOOLEAN_META_KEYS: &[&str] = &[
    "fetch",
    "skipAllLifecycleCallbacks",
    "cascade",
    "decrypt",
    "skipRecordVerification",
];

/// Raw request for one model call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    /// Single new record (`create`)
    pub new_record: Option<Value>,
    /// Sequence of new records (`createEach`, `normalizeEach`)
    pub new_records: Option<Value>,
    /// Criteria: a dictionary, a primary key value, or a list of primary keys
    pub criteria: Option<Value>,
    /// Values to set (`update`)
    pub values_to_set: Option<Value>,
    /// Metadata flags for this call
    pub meta: Option<Value>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_new_record(mut self, record: Value) -> Self {
        self.new_record = Some(record);
        self
    }

    pub fn with_new_records(mut self, records: Value) -> Self {
        self.new_records = Some(records);
        self
    }

    pub fn with_criteria(mut self, criteria: Value) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn with_values_to_set(mut self, values: Value) -> Self {
        self.values_to_set = Some(values);
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Set one criteria clause; shorthand and bare `where` dictionaries move under `where` first
    pub(crate) fn set_criteria_clause(&mut self, clause: &str, value: Value) {
        let criteria = self
            .criteria
            .get_or_insert_with(|| Value::Object(Map::new()));
        let is_clause_map = match criteria {
            Value::Object(map) => {
                map.is_empty() || map.keys().any(|key| CRITERIA_CLAUSES.contains(&key.as_str()))
            }
            _ => false,
        };
        if !is_clause_map {
            tracing::debug!(criteria = %criteria, "Moving criteria under a `where` clause");
            let shorthand = criteria.take();
            *criteria = Value::Object(Map::from_iter([("where".to_string(), shorthand)]));
        }
        if let Value::Object(map) = criteria {
            map.insert(clause.to_string(), value);
        }
    }

    /// Set one meta key; meta that is not a dictionary is left for stage two to reject
    pub(crate) fn set_meta_key(&mut self, key: &str, value: Value) {
        let meta = self.meta.get_or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = meta {
            map.insert(key.to_string(), value);
        }
    }
}

/// Validated call metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub fetch: bool,
    pub skip_all_lifecycle_callbacks: bool,
    /// Every other key, passed through to the adapter
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Meta {
    /// Validate raw call metadata
    pub fn from_value(raw: Option<Value>) -> OrmResult<Self> {
        let map = match raw {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(OrmError::usage_with_details(
                    UsageCode::InvalidMeta,
                    "Meta must be a dictionary",
                    format!("Got: {}", other),
                ))
            }
        };

        for key in BOOLEAN_META_KEYS {
            if let Some(value) = map.get(*key) {
                if !value.is_boolean() {
                    return Err(OrmError::usage(
                        UsageCode::InvalidMeta,
                        format!("Meta key `{}` must be a boolean, got {}", key, value),
                    ));
                }
            }
        }

        let mut extra = map;
        let fetch = take_flag(&mut extra, "fetch");
        let skip_all_lifecycle_callbacks = take_flag(&mut extra, "skipAllLifecycleCallbacks");

        Ok(Self {
            fetch,
            skip_all_lifecycle_callbacks,
            extra,
        })
    }

    /// Copy of this meta with `fetch` forced on
    pub fn with_fetch(&self) -> Self {
        Self {
            fetch: true,
            ..self.clone()
        }
    }
}

fn take_flag(map: &mut Map<String, Value>, key: &str) -> bool {
    map.remove(key).and_then(|value| value.as_bool()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_meta_defaults_when_absent() {
        assert_eq!(Meta::from_value(None).unwrap(), Meta::default());
        assert_eq!(Meta::from_value(Some(Value::Null)).unwrap(), Meta::default());
    }

    #[test]
    fn test_meta_extracts_flags_and_keeps_extra() {
        let meta = Meta::from_value(Some(json!({
            "fetch": true,
            "skipAllLifecycleCallbacks": true,
            "cascade": false,
            "tenant": "acme"
        })))
        .unwrap();

        assert!(meta.fetch);
        assert!(meta.skip_all_lifecycle_callbacks);
        assert_eq!(meta.extra.len(), 2);
        assert_eq!(
            serde_json::to_value(&meta).unwrap(),
            json!({"fetch": true, "skipAllLifecycleCallbacks": true, "cascade": false, "tenant": "acme"})
        );
    }

    #[test]
    fn test_meta_rejects_non_dictionary() {
        let error = Meta::from_value(Some(json!(["fetch"]))).unwrap_err();
        assert_eq!(error.usage_code(), Some(UsageCode::InvalidMeta));
    }

    #[test]
    fn test_meta_rejects_non_boolean_flags() {
        let error = Meta::from_value(Some(json!({"fetch": "yes"}))).unwrap_err();
        assert_eq!(error.usage_code(), Some(UsageCode::InvalidMeta));
        assert!(error.to_string().contains("fetch"));
    }

    #[test]
    fn test_criteria_clause_upgrades_shorthand() {
        let mut request = QueryRequest::new().with_criteria(json!(7));
        request.set_criteria_clause("limit", json!(2));
        assert_eq!(request.criteria, Some(json!({"where": 7, "limit": 2})));
    }

    #[test]
    fn test_criteria_clause_wraps_bare_where_dictionary() {
        let mut request = QueryRequest::new().with_criteria(json!({"name": "Rex"}));
        request.set_criteria_clause("limit", json!(2));
        assert_eq!(request.criteria, Some(json!({"where": {"name": "Rex"}, "limit": 2})));

        let mut request = QueryRequest::new().with_criteria(json!({}));
        request.set_criteria_clause("skip", json!(1));
        assert_eq!(request.criteria, Some(json!({"skip": 1})));
    }

    #[test]
    fn test_meta_key_merges() {
        let mut request = QueryRequest::new().with_meta(json!({"tenant": "acme"}));
        request.set_meta_key("fetch", json!(true));
        assert_eq!(request.meta, Some(json!({"tenant": "acme", "fetch": true})));
    }
}
