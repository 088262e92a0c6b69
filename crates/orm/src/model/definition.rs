//! Model Definitions - Declarative model descriptions as authored by the application
//!
//! A `ModelDefinition` is the already-parsed form of a model declaration. Its
//! fields are intentionally loose (`Option`s and raw JSON values) so that the
//! builder can report precise errors for malformed definitions instead of
//! failing deserialization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the datastore models fall back to
pub const DEFAULT_DATASTORE: &str = "default";

/// Tenant tag applied when a model declares none
pub const DEFAULT_TENANT: &str = "default";

/// Attribute names every edge collection carries implicitly
pub const EDGE_ATTRIBUTES: [&str; 2] = ["_from", "_to"];

/// Raw model definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_type: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_definition: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Query-scoped variable bindings merged into every criteria
    #[serde(default, rename = "let", skip_serializing_if = "Option::is_none")]
    pub bindings: Option<Map<String, Value>>,
}

impl ModelDefinition {
    /// Start a definition with the given identity
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            ..Self::default()
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn with_datastore(mut self, datastore: impl Into<String>) -> Self {
        self.datastore = Some(datastore.into());
        self
    }

    pub fn with_class_type(mut self, class_type: impl Into<String>) -> Self {
        self.class_type = Some(class_type.into());
        self
    }

    pub fn with_tenant_type(mut self, tenant_type: Value) -> Self {
        self.tenant_type = Some(tenant_type);
        self
    }

    pub fn with_edge_definition(mut self, edge_definition: Value) -> Self {
        self.edge_definition = Some(edge_definition);
        self
    }

    pub fn with_indexes(mut self, indexes: Value) -> Self {
        self.indexes = Some(indexes);
        self
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, definition: Value) -> Self {
        self.attributes.insert(name.into(), definition);
        self
    }

    pub fn with_bindings(mut self, bindings: Map<String, Value>) -> Self {
        self.bindings = Some(bindings);
        self
    }
}

/// Graph role of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClassType {
    #[default]
    Vertex,
    Edge,
}

impl ClassType {
    pub fn is_edge(self) -> bool {
        matches!(self, Self::Edge)
    }
}

impl FromStr for ClassType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Vertex" => Ok(Self::Vertex),
            "Edge" => Ok(Self::Edge),
            other => Err(format!("Unrecognized classType `{}`", other)),
        }
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "Vertex"),
            Self::Edge => write!(f, "Edge"),
        }
    }
}

/// Collections an edge may connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: Vec<String>,
    pub to: Vec<String>,
}
