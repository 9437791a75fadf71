//! Field schema binding
//!
//! Attaches field definitions to profile types and hands out the validation
//! rules the profile store and the attach adapter enforce.

use std::sync::Arc;

use crate::domain::fields::validate_values;
use crate::domain::{FieldDefinition, FieldValues, FieldViolation};
use crate::error::{ProfileError, ProfileResult};
use crate::storage::Storage;

#[derive(Clone)]
pub struct FieldSchema {
    storage: Arc<dyn Storage>,
}

impl FieldSchema {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Binds a field to its type.
    ///
    /// `Reference` if the type does not exist, `Conflict` if the type already
    /// has a field with that name.
    pub async fn attach_field(&self, definition: FieldDefinition) -> ProfileResult<FieldDefinition> {
        let violations = definition.check();
        if !violations.is_empty() {
            return Err(ProfileError::Validation(violations));
        }

        self.storage.insert_definition(&definition).await?;

        tracing::info!(
            type_id = %definition.type_id,
            field = %definition.name,
            kind = %definition.kind,
            required = definition.required,
            "Field attached to profile type"
        );
        Ok(definition)
    }

    pub async fn definitions(&self, type_id: &str) -> ProfileResult<Vec<FieldDefinition>> {
        self.storage.field_definitions(type_id).await
    }

    /// Checks values against the fields bound to `type_id`.
    pub async fn validate(&self, type_id: &str, values: &FieldValues) -> ProfileResult<Vec<FieldViolation>> {
        let definitions = self.definitions(type_id).await?;
        Ok(validate_values(&definitions, values))
    }
}
