//! Column Transformer - Maps attribute names to adapter column names and back

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::attribute::AttributeDefinition;

/// Bidirectional attribute ↔ column name mapping for one model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTransformer {
    to_column: BTreeMap<String, String>,
    to_attribute: BTreeMap<String, String>,
}

impl ColumnTransformer {
    /// Build the mapping from a model's attributes; only renamed columns are stored
    pub fn new<'a>(attributes: impl IntoIterator<Item = &'a AttributeDefinition>) -> Self {
        let mut transformer = Self::default();
        for attribute in attributes {
            if let Some(column) = &attribute.column_name {
                transformer
                    .to_column
                    .insert(attribute.name.clone(), column.clone());
                transformer
                    .to_attribute
                    .insert(column.clone(), attribute.name.clone());
            }
        }
        transformer
    }

    /// Column name for an attribute (unmapped names pass through)
    pub fn column<'a>(&'a self, attribute: &'a str) -> &'a str {
        self.to_column
            .get(attribute)
            .map(String::as_str)
            .unwrap_or(attribute)
    }

    /// Attribute name for a column (unmapped names pass through)
    pub fn attribute<'a>(&'a self, column: &'a str) -> &'a str {
        self.to_attribute
            .get(column)
            .map(String::as_str)
            .unwrap_or(column)
    }

    pub fn is_identity(&self) -> bool {
        self.to_column.is_empty()
    }

    /// Rename a record's keys from attribute names to column names
    pub fn serialize_record(&self, record: Map<String, Value>) -> Map<String, Value> {
        if self.is_identity() {
            return record;
        }
        record
            .into_iter()
            .map(|(key, value)| (self.column(&key).to_string(), value))
            .collect()
    }

    /// Rename a record's keys from column names back to attribute names
    pub fn unserialize_record(&self, record: Map<String, Value>) -> Map<String, Value> {
        if self.is_identity() {
            return record;
        }
        record
            .into_iter()
            .map(|(key, value)| (self.attribute(&key).to_string(), value))
            .collect()
    }

    /// Rename the attribute keys of a `where` clause, descending into `and`/`or`
    ///
    /// Modifier objects (`{in: [...]}`, `{">": 3}`, ...) are left untouched.
    pub fn serialize_where(&self, clause: Map<String, Value>) -> Map<String, Value> {
        clause
            .into_iter()
            .map(|(key, value)| match (key.as_str(), value) {
                ("and" | "or", Value::Array(branches)) => {
                    let branches = branches
                        .into_iter()
                        .map(|branch| match branch {
                            Value::Object(inner) => Value::Object(self.serialize_where(inner)),
                            other => other,
                        })
                        .collect();
                    (key, Value::Array(branches))
                }
                (_, value) => (self.column(&key).to_string(), value),
            })
            .collect()
    }

    /// Rename a list of attribute names to column names
    pub fn serialize_names(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .map(|name| self.column(name).to_string())
            .collect()
    }
}
