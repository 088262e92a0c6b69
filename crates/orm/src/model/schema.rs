//! Schema - Every resolved model, keyed by identity

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::attribute::{Association, AttributeType};
use super::builder::ResolvedModel;
use crate::error::{OrmError, OrmResult, UsageCode};

/// Read-only registry of resolved models shared by every live model
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: BTreeMap<String, Arc<ResolvedModel>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolved model; identities must be unique
    pub fn insert(&mut self, model: ResolvedModel) -> OrmResult<Arc<ResolvedModel>> {
        if self.models.contains_key(model.identity()) {
            return Err(OrmError::usage(
                UsageCode::InvalidModelDefinition,
                format!("Duplicate model identity `{}`", model.identity()),
            ));
        }
        let model = Arc::new(model);
        self.models.insert(model.identity().to_string(), Arc::clone(&model));
        Ok(model)
    }

    pub fn get(&self, identity: &str) -> Option<&Arc<ResolvedModel>> {
        self.models.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.models.contains_key(identity)
    }

    pub fn models(&self) -> impl Iterator<Item = &ResolvedModel> {
        self.models.values().map(Arc::as_ref)
    }

    /// Shared handles to every model, ordered by identity
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResolvedModel>> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Check that every association target and junction (`through`) is a model in this schema
    pub fn check_associations(&self) -> OrmResult<()> {
        for model in self.models.values() {
            for attribute in model.attributes().values() {
                let Some(association) = &attribute.association else {
                    continue;
                };
                let through = match association {
                    Association::Collection { through, .. } => through.as_deref(),
                    Association::Model { .. } => None,
                };
                let referenced = std::iter::once(association.target()).chain(through);
                for target in referenced {
                    if !self.contains(target) {
                        return Err(OrmError::usage(
                            UsageCode::InvalidAttribute,
                            format!(
                                "Attribute `{}` of model `{}` references unknown model `{}`",
                                attribute.name,
                                model.identity(),
                                target
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether `value` is a well-formed primary key of the model `identity`
    ///
    /// Unknown models and untyped keys accept any string or number.
    pub fn is_primary_key_value(&self, identity: &str, value: &Value) -> bool {
        let kind = self
            .get(identity)
            .and_then(|model| model.attribute(model.primary_key()))
            .and_then(|attribute| attribute.kind);
        match kind {
            Some(AttributeType::Number) => value.is_number(),
            Some(AttributeType::String) => value.is_string(),
            _ => value.is_string() || value.is_number(),
        }
    }
}
