//! Profile type registry

use std::sync::Arc;

use crate::domain::profile_types::sort_types;
use crate::domain::ProfileType;
use crate::error::{ProfileError, ProfileResult};
use crate::storage::Storage;

/// Administrative access to profile types.
#[derive(Clone)]
pub struct ProfileTypeRegistry {
    storage: Arc<dyn Storage>,
}

impl ProfileTypeRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Registers a new type. `Conflict` if the id is taken.
    pub async fn create(&self, profile_type: ProfileType) -> ProfileResult<ProfileType> {
        check(&profile_type)?;
        self.storage.insert_type(&profile_type).await?;
        tracing::info!(type_id = %profile_type.id, label = %profile_type.label, "Profile type created");
        Ok(profile_type)
    }

    /// Inserts or updates a type.
    pub async fn save(&self, profile_type: &ProfileType) -> ProfileResult<()> {
        check(profile_type)?;
        if self.storage.update_type(profile_type).await? {
            tracing::info!(type_id = %profile_type.id, "Profile type updated");
            return Ok(());
        }
        self.storage.insert_type(profile_type).await?;
        tracing::info!(type_id = %profile_type.id, "Profile type created");
        Ok(())
    }

    pub async fn find(&self, id: &str) -> ProfileResult<Option<ProfileType>> {
        self.storage.get_type(id).await
    }

    pub async fn load(&self, id: &str) -> ProfileResult<ProfileType> {
        self.find(id)
            .await?
            .ok_or_else(|| ProfileError::not_found(format!("Profile type {} not found", id)))
    }

    /// All types by weight, then label.
    pub async fn list(&self) -> ProfileResult<Vec<ProfileType>> {
        let mut types = self.storage.list_types().await?;
        sort_types(&mut types);
        Ok(types)
    }

    /// Types offered during registration, in listing order.
    pub async fn registration_types(&self) -> ProfileResult<Vec<ProfileType>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|t| t.registration)
            .collect())
    }

    /// Deletes an unused type together with its field definitions.
    pub async fn delete(&self, id: &str) -> ProfileResult<()> {
        if !self.storage.delete_type(id).await? {
            return Err(ProfileError::not_found(format!("Profile type {} not found", id)));
        }
        tracing::info!(type_id = %id, "Profile type deleted");
        Ok(())
    }
}

fn check(profile_type: &ProfileType) -> ProfileResult<()> {
    let violations = profile_type.check();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ProfileError::Validation(violations))
    }
}
