//! Attribute Definitions - Allow-list validation and typed attribute metadata

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{OrmError, OrmResult, UsageCode};

/// Every property an attribute definition may carry
pub const VALID_ATTRIBUTE_PROPERTIES: &[&str] = &[
    // Basic semantics
    "type",
    "defaultsTo",
    "required",
    "allowNull",
    "autoUpdatedAt",
    "autoCreatedAt",
    // Auto-migrations
    "autoMigrations",
    // High-level validation rules
    "validations",
    "rules",
    // Associations
    "through",
    "collection",
    "model",
    "via",
    "dominant",
    // Adapter
    "columnName",
    "meta",
    // At-rest encryption
    "encrypt",
    // Advisory
    "description",
    "extendedDescription",
    "moreInfoUrl",
    "example",
    "protect",
];

/// Returns true if `property` is a recognized attribute property
pub fn is_valid_attribute_property(property: &str) -> bool {
    VALID_ATTRIBUTE_PROPERTIES.contains(&property)
}

/// Check that an attribute definition only uses recognized properties
pub fn validate_attribute_properties(
    model: &str,
    attribute: &str,
    definition: &Map<String, Value>,
) -> OrmResult<()> {
    let unknown: Vec<&str> = definition
        .keys()
        .map(String::as_str)
        .filter(|key| !is_valid_attribute_property(key))
        .collect();

    if unknown.is_empty() {
        return Ok(());
    }

    Err(OrmError::usage_with_details(
        UsageCode::InvalidAttribute,
        format!(
            "Attribute `{}` of model `{}` uses unrecognized propert{}: {}",
            attribute,
            model,
            if unknown.len() == 1 { "y" } else { "ies" },
            unknown.join(", ")
        ),
        format!("Recognized properties: {}", VALID_ATTRIBUTE_PROPERTIES.join(", ")),
    ))
}

/// Declared value type of a plain attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Json,
    Ref,
}

impl AttributeType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "json" => Some(Self::Json),
            "ref" => Some(Self::Ref),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::Ref => "ref",
        }
    }

    /// Whether `value` (which is not null) conforms to this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Json => true,
            Self::Ref => true,
        }
    }

    /// Types that accept null regardless of `allowNull`
    pub fn accepts_null(&self) -> bool {
        matches!(self, Self::Json | Self::Ref)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Association declared by an attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Association {
    /// Singular association (`model: "person"`)
    Model { target: String },
    /// To-many association (`collection: "toy"`)
    Collection {
        target: String,
        via: Option<String>,
        through: Option<String>,
        dominant: bool,
    },
}

impl Association {
    pub fn target(&self) -> &str {
        match self {
            Self::Model { target } | Self::Collection { target, .. } => target,
        }
    }
}

/// Parsed, validated attribute definition
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDefinition {
    pub name: String,
    pub kind: Option<AttributeType>,
    pub default_value: Option<Value>,
    pub required: bool,
    pub allow_null: bool,
    pub auto_created_at: bool,
    pub auto_updated_at: bool,
    pub association: Option<Association>,
    pub column_name: Option<String>,
    /// The definition exactly as authored
    pub raw: Map<String, Value>,
}

impl AttributeDefinition {
    /// Validate and parse a raw attribute definition
    pub fn parse(model: &str, name: &str, raw: &Value) -> OrmResult<Self> {
        let definition = raw.as_object().ok_or_else(|| {
            invalid(model, name, "the definition must be a dictionary")
        })?;

        validate_attribute_properties(model, name, definition)?;

        let kind = match definition.get("type") {
            None => None,
            Some(Value::String(raw_type)) => Some(AttributeType::parse(raw_type).ok_or_else(|| {
                invalid(
                    model,
                    name,
                    &format!("unrecognized type `{}` (expected string, number, boolean, json or ref)", raw_type),
                )
            })?),
            Some(_) => return Err(invalid(model, name, "`type` must be a string")),
        };

        let model_target = string_property(model, name, definition, "model")?;
        let collection_target = string_property(model, name, definition, "collection")?;

        let association = match (model_target, collection_target) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    model,
                    name,
                    "an attribute cannot declare both `model` and `collection`",
                ))
            }
            (Some(target), None) => Some(Association::Model {
                target: target.to_lowercase(),
            }),
            (None, Some(target)) => Some(Association::Collection {
                target: target.to_lowercase(),
                via: string_property(model, name, definition, "via")?,
                through: string_property(model, name, definition, "through")?
                    .map(|through| through.to_lowercase()),
                dominant: flag(model, name, definition, "dominant")?,
            }),
            (None, None) => None,
        };

        if association.is_some() && kind.is_some() {
            return Err(invalid(
                model,
                name,
                "association attributes cannot declare a `type`",
            ));
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            default_value: definition.get("defaultsTo").cloned(),
            required: flag(model, name, definition, "required")?,
            allow_null: flag(model, name, definition, "allowNull")?,
            auto_created_at: flag(model, name, definition, "autoCreatedAt")?,
            auto_updated_at: flag(model, name, definition, "autoUpdatedAt")?,
            association,
            column_name: string_property(model, name, definition, "columnName")?,
            raw: definition.clone(),
        })
    }

    /// Column used by adapters for this attribute
    pub fn column(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.association, Some(Association::Collection { .. }))
    }

    pub fn is_singular_association(&self) -> bool {
        matches!(self.association, Some(Association::Model { .. }))
    }

    /// Whether an explicit null is acceptable for this attribute
    pub fn accepts_null(&self) -> bool {
        self.allow_null
            || self.is_singular_association()
            || self.kind.map(|kind| kind.accepts_null()).unwrap_or(false)
    }
}

fn invalid(model: &str, name: &str, reason: &str) -> OrmError {
    OrmError::usage(
        UsageCode::InvalidAttribute,
        format!("Invalid attribute `{}` in model `{}`: {}", name, model, reason),
    )
}

fn string_property(
    model: &str,
    name: &str,
    definition: &Map<String, Value>,
    key: &str,
) -> OrmResult<Option<String>> {
    match definition.get(key) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(invalid(model, name, &format!("`{}` must be a string", key))),
    }
}

fn flag(model: &str, name: &str, definition: &Map<String, Value>, key: &str) -> OrmResult<bool> {
    match definition.get(key) {
        None => Ok(false),
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(invalid(model, name, &format!("`{}` must be a boolean", key))),
    }
}
