//! Model System - Definitions, validation and the live call surface
//!
//! - `definition`: raw, serde-deserializable model definitions
//! - `attribute`: attribute allow-list and typed attribute metadata
//! - `index`: index descriptor validation
//! - `transformer`: attribute ↔ column name mapping
//! - `builder`: validates definitions into resolved models
//! - `schema`: every resolved model, keyed by identity
//! - `live`: resolved models bound to their datastore, exposing queries

pub mod attribute;
pub mod builder;
pub mod definition;
pub mod index;
pub mod live;
pub mod schema;
pub mod transformer;

// Re-export main types for convenience
pub use attribute::{
    is_valid_attribute_property, validate_attribute_properties, Association,
    AttributeDefinition, AttributeType, VALID_ATTRIBUTE_PROPERTIES,
};
pub use builder::{ModelBuilder, ResolvedModel, DEFAULT_PRIMARY_KEY};
pub use definition::{
    ClassType, EdgeDefinition, ModelDefinition, DEFAULT_DATASTORE, DEFAULT_TENANT,
    EDGE_ATTRIBUTES,
};
pub use index::IndexDescriptor;
pub use live::LiveModel;
pub use schema::Schema;
pub use transformer::ColumnTransformer;
