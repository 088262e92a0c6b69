//! Index Descriptors - Validation of declared collection indexes

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{OrmError, OrmResult, UsageCode};

/// Validated index descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescriptor {
    /// Attribute paths covered by the index (dot notation allowed)
    pub fields: Vec<String>,
    pub geo_json: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse: Option<bool>,
    /// Adapter-specific options (`type`, `unique`, `name`, ...) passed through as-is
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl IndexDescriptor {
    /// Validate a raw index descriptor against the attributes known to `model`
    ///
    /// `known_attributes` must already include the implicit edge attributes
    /// when the model is an edge collection.
    pub fn parse(model: &str, raw: &Value, known_attributes: &[&str]) -> OrmResult<Self> {
        let descriptor = raw.as_object().ok_or_else(|| {
            invalid(
                model,
                "each index must be a dictionary with a `fields` array and optional `geoJson`/`sparse` flags",
            )
        })?;

        let mut fields = Vec::new();
        let mut geo_json = false;
        let mut sparse = None;
        let mut options = Map::new();

        for (key, value) in descriptor {
            match key.as_str() {
                "fields" => {
                    let entries = value.as_array().ok_or_else(|| {
                        invalid(model, "`fields` must be an array of attribute names")
                    })?;
                    for entry in entries {
                        let field = entry.as_str().ok_or_else(|| {
                            invalid(model, &format!("index field `{}` must be a string", entry))
                        })?;
                        fields.push(field.to_string());
                    }
                }
                "sparse" => {
                    let flag = value.as_bool().ok_or_else(|| {
                        invalid(model, "the `sparse` attribute of an index must be a boolean")
                    })?;
                    sparse = Some(flag);
                }
                "geoJson" => {
                    geo_json = value.as_bool().ok_or_else(|| {
                        invalid(model, "the `geoJson` attribute of an index must be a boolean")
                    })?;
                }
                _ => {
                    options.insert(key.clone(), value.clone());
                }
            }
        }

        for field in &fields {
            let leading = leading_segment(field);
            if !known_attributes.contains(&leading) {
                return Err(invalid(
                    model,
                    &format!("`{}` is not a recognized attribute", leading),
                ));
            }
        }

        Ok(Self {
            fields,
            geo_json,
            sparse,
            options,
        })
    }
}

/// First segment of a dot-notation attribute path
pub fn leading_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

fn invalid(model: &str, reason: &str) -> OrmError {
    OrmError::usage(
        UsageCode::InvalidIndex,
        format!("Incorrect index definition for model `{}`: {}", model, reason),
    )
}
