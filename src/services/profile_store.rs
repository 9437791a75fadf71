//! Profile entity store
//!
//! Owns the profile lifecycle: construction, first save (id assignment),
//! updates, loading, listing by owner and deletion. It also reacts to account
//! deletion by removing every profile of the account before the account goes.

use async_trait::async_trait;
use std::sync::Arc;

use crate::clock::Clock;
use crate::domain::fields::normalize_values;
use crate::domain::profiles::NewProfileRecord;
use crate::domain::{
    AccountId, EntityState, FieldValue, FieldValues, Profile, ProfileId, ProfileRecord,
    SaveStatus,
};
use crate::error::{ProfileError, ProfileResult};
use crate::services::events::AccountDeletionHandler;
use crate::services::field_schema::FieldSchema;
use crate::storage::Storage;

pub struct ProfileStore {
    storage: Arc<dyn Storage>,
    schema: FieldSchema,
    clock: Arc<dyn Clock>,
}

impl ProfileStore {
    pub fn new(storage: Arc<dyn Storage>, schema: FieldSchema, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            schema,
            clock,
        }
    }

    /// Builds an unsaved profile. Nothing is checked until `save`.
    pub fn create(&self, profile_type: impl Into<String>, uid: AccountId, fields: FieldValues) -> Profile {
        Profile::new(profile_type, uid, fields)
    }

    /// Persists a profile.
    ///
    /// The first save assigns the id and stamps `created` and `changed`; later
    /// saves only move `changed` forward. On error neither storage nor the
    /// instance is modified.
    pub async fn save(&self, profile: &mut Profile) -> ProfileResult<SaveStatus> {
        if profile.state == EntityState::Deleted {
            return Err(ProfileError::reference(format!(
                "Profile {} has been deleted",
                describe(profile)
            )));
        }

        // Dangling references outrank field problems
        if self.storage.get_type(&profile.profile_type).await?.is_none() {
            return Err(ProfileError::reference(format!(
                "Profile type {} does not exist",
                profile.profile_type
            )));
        }
        if !self.storage.account_exists(profile.uid).await? {
            return Err(ProfileError::reference(format!(
                "Account {} does not exist",
                profile.uid
            )));
        }

        let violations = self.schema.validate(&profile.profile_type, &profile.fields).await?;
        if !violations.is_empty() {
            tracing::warn!(
                profile = %describe(profile),
                violations = violations.len(),
                "Profile rejected by field schema"
            );
            return Err(ProfileError::Validation(violations));
        }

        let fields = normalize_values(&profile.fields);
        let now = self.clock.now();

        match (profile.state, profile.id) {
            (EntityState::Persisted, Some(id)) => {
                // changed never moves backwards
                let changed = match profile.changed {
                    Some(previous) if previous > now => previous,
                    _ => now,
                };
                let created = profile.created.unwrap_or(now);
                let record = ProfileRecord {
                    id,
                    uuid: profile.uuid,
                    profile_type: profile.profile_type.clone(),
                    uid: profile.uid,
                    created,
                    changed,
                    fields: fields.clone(),
                };
                self.storage.update_profile(&record).await?;

                profile.changed = Some(changed);
                profile.fields = fields;
                tracing::info!(profile_id = id, uid = profile.uid, "Profile updated");
                Ok(SaveStatus::Updated)
            }
            _ => {
                let record = NewProfileRecord {
                    uuid: profile.uuid,
                    profile_type: profile.profile_type.clone(),
                    uid: profile.uid,
                    created: now,
                    changed: now,
                    fields: fields.clone(),
                };
                let id = self.storage.insert_profile(&record).await?;

                profile.id = Some(id);
                profile.fields = fields;
                profile.created = Some(now);
                profile.changed = Some(now);
                profile.state = EntityState::Persisted;
                tracing::info!(
                    profile_id = id,
                    uid = profile.uid,
                    profile_type = %profile.profile_type,
                    "Profile created"
                );
                Ok(SaveStatus::Created)
            }
        }
    }

    /// Absent profiles are `None`.
    pub async fn find(&self, id: ProfileId) -> ProfileResult<Option<Profile>> {
        Ok(self.storage.get_profile(id).await?.map(Profile::from_record))
    }

    pub async fn load(&self, id: ProfileId) -> ProfileResult<Profile> {
        self.find(id)
            .await?
            .ok_or_else(|| ProfileError::not_found(format!("Profile {} not found", id)))
    }

    /// Profiles of an owner in creation order.
    pub async fn load_by_owner(&self, uid: AccountId) -> ProfileResult<Vec<Profile>> {
        let records = self.storage.profiles_by_owner(uid, None).await?;
        Ok(records.into_iter().map(Profile::from_record).collect())
    }

    pub async fn load_by_owner_and_type(&self, uid: AccountId, profile_type: &str) -> ProfileResult<Vec<Profile>> {
        let records = self.storage.profiles_by_owner(uid, Some(profile_type)).await?;
        Ok(records.into_iter().map(Profile::from_record).collect())
    }

    /// Deletes a profile and its field values. Deleting twice is a no-op.
    pub async fn delete(&self, profile: &mut Profile) -> ProfileResult<()> {
        if let (EntityState::Persisted, Some(id)) = (profile.state, profile.id) {
            if self.storage.delete_profile(id).await? {
                tracing::info!(profile_id = id, uid = profile.uid, "Profile deleted");
            }
        }
        profile.state = EntityState::Deleted;
        Ok(())
    }

    /// Returns false if there was no such profile.
    pub async fn delete_by_id(&self, id: ProfileId) -> ProfileResult<bool> {
        let deleted = self.storage.delete_profile(id).await?;
        if deleted {
            tracing::info!(profile_id = id, "Profile deleted");
        }
        Ok(deleted)
    }

    /// `"<type label> profile of <owner name> (uid: <uid>)"`, looked up live.
    pub async fn label(&self, profile: &Profile) -> ProfileResult<String> {
        let profile_type = self
            .storage
            .get_type(&profile.profile_type)
            .await?
            .ok_or_else(|| {
                ProfileError::reference(format!(
                    "Profile type {} does not exist",
                    profile.profile_type
                ))
            })?;
        let owner = self
            .storage
            .account_display_name(profile.uid)
            .await?
            .ok_or_else(|| ProfileError::reference(format!("Account {} does not exist", profile.uid)))?;

        Ok(format!(
            "{} profile of {} (uid: {})",
            profile_type.label, owner, profile.uid
        ))
    }

    /// Stored values of one field.
    pub async fn field_value(&self, id: ProfileId, field_name: &str) -> ProfileResult<Vec<FieldValue>> {
        self.storage.get_value(id, field_name).await
    }

    /// Removes every profile of an account.
    pub async fn delete_by_owner(&self, uid: AccountId) -> ProfileResult<Vec<ProfileId>> {
        let deleted = self.storage.delete_profiles_by_owner(uid).await?;
        tracing::info!(uid = uid, deleted = deleted.len(), "Profiles of account deleted");
        Ok(deleted)
    }
}

#[async_trait]
impl AccountDeletionHandler for ProfileStore {
    fn name(&self) -> &'static str {
        "profile_cascade"
    }

    async fn on_account_deleting(&self, uid: AccountId) -> ProfileResult<()> {
        self.delete_by_owner(uid).await.map(|_| ())
    }
}

fn describe(profile: &Profile) -> String {
    match profile.id {
        Some(id) => id.to_string(),
        None => profile.uuid.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{FieldDefinition, FieldKind, NewAccount, ProfileType};
    use crate::storage::{AccountDirectory, FieldDefinitionStore, MemoryStorage, ProfileTypeStore};
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        store: ProfileStore,
        storage: Arc<MemoryStorage>,
        clock: Arc<ManualClock>,
        uid: AccountId,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .insert_type(&ProfileType::new("personal", "Personal"))
            .await
            .unwrap();
        storage
            .insert_definition(
                &FieldDefinition::new("personal", "nickname", "Nickname", FieldKind::String)
                    .required(true),
            )
            .await
            .unwrap();
        let uid = storage
            .create_account(&NewAccount::new("jane", "jane@example.com"))
            .await
            .unwrap()
            .id;
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let store = ProfileStore::new(storage.clone(), FieldSchema::new(storage.clone()), clock.clone());
        Fixture {
            store,
            storage,
            clock,
            uid,
        }
    }

    fn nickname(value: &str) -> FieldValues {
        FieldValues::from([("nickname".to_string(), vec![FieldValue::text(value)])])
    }

    #[tokio::test]
    async fn failed_first_save_leaves_instance_untouched() {
        let f = fixture().await;
        let mut profile = f.store.create("personal", f.uid, FieldValues::new());
        let before = profile.clone();

        let err = f.store.save(&mut profile).await.unwrap_err();
        assert!(matches!(err, ProfileError::Validation(_)));
        assert_eq!(profile, before);
        assert!(f.store.load_by_owner(f.uid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_type_is_a_reference_error() {
        let f = fixture().await;
        let mut profile = f.store.create("business", f.uid, FieldValues::new());
        let err = f.store.save(&mut profile).await.unwrap_err();
        assert!(matches!(err, ProfileError::Reference(_)));
        assert_eq!(profile.id(), None);
    }

    #[tokio::test]
    async fn unknown_type_wins_over_field_violations() {
        let f = fixture().await;
        let mut profile = f.store.create("business", f.uid, nickname("JD"));
        let err = f.store.save(&mut profile).await.unwrap_err();
        assert!(matches!(err, ProfileError::Reference(_)));
    }

    #[tokio::test]
    async fn unknown_owner_is_a_reference_error() {
        let f = fixture().await;
        let mut profile = f.store.create("personal", f.uid + 100, FieldValues::new());
        let err = f.store.save(&mut profile).await.unwrap_err();
        assert!(matches!(err, ProfileError::Reference(_)));
    }

    #[tokio::test]
    async fn blank_values_are_not_stored() {
        let f = fixture().await;
        let mut profile = f.store.create(
            "personal",
            f.uid,
            FieldValues::from([(
                "nickname".to_string(),
                vec![FieldValue::text(""), FieldValue::text("JD"), FieldValue::text("  ")],
            )]),
        );
        f.store.save(&mut profile).await.unwrap();
        let id = profile.id().unwrap();

        assert_eq!(
            f.store.field_value(id, "nickname").await.unwrap(),
            vec![FieldValue::text("JD")]
        );
        assert_eq!(profile.fields, nickname("JD"));
        assert_eq!(f.store.load(id).await.unwrap().fields, nickname("JD"));
    }

    #[tokio::test]
    async fn blank_text_in_integer_field_is_rejected() {
        let f = fixture().await;
        f.storage
            .insert_definition(&FieldDefinition::new("personal", "age", "Age", FieldKind::Integer))
            .await
            .unwrap();
        let mut fields = nickname("JD");
        fields.insert("age".to_string(), vec![FieldValue::text(" ")]);
        let mut profile = f.store.create("personal", f.uid, fields);

        let err = f.store.save(&mut profile).await.unwrap_err();
        let ProfileError::Validation(violations) = err else {
            panic!("expected a validation error");
        };
        assert_eq!(violations[0].message, "Age must be a number.");
        assert!(f.store.load_by_owner(f.uid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn changed_never_moves_backwards() {
        let f = fixture().await;
        let mut profile = f.store.create("personal", f.uid, nickname("JD"));
        f.store.save(&mut profile).await.unwrap();
        let first = profile.changed_time().unwrap();

        f.clock.advance(Duration::seconds(-30));
        assert_eq!(f.store.save(&mut profile).await.unwrap(), SaveStatus::Updated);
        assert_eq!(profile.changed_time(), Some(first));
    }

    #[tokio::test]
    async fn save_after_delete_is_rejected() {
        let f = fixture().await;
        let mut profile = f.store.create("personal", f.uid, nickname("JD"));
        f.store.save(&mut profile).await.unwrap();
        f.store.delete(&mut profile).await.unwrap();
        f.store.delete(&mut profile).await.unwrap();

        assert_eq!(profile.state(), EntityState::Deleted);
        assert!(matches!(
            f.store.save(&mut profile).await,
            Err(ProfileError::Reference(_))
        ));
    }

    #[tokio::test]
    async fn stale_copy_cannot_resurrect_deleted_row() {
        let f = fixture().await;
        let mut profile = f.store.create("personal", f.uid, nickname("JD"));
        f.store.save(&mut profile).await.unwrap();
        let mut stale = f.store.load(profile.id().unwrap()).await.unwrap();

        f.store.delete(&mut profile).await.unwrap();
        assert!(matches!(
            f.store.save(&mut stale).await,
            Err(ProfileError::Reference(_))
        ));
        assert!(f.store.find(profile.id().unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_unsaved_profile_only_marks_it() {
        let f = fixture().await;
        let mut profile = f.store.create("personal", f.uid, nickname("JD"));
        f.store.delete(&mut profile).await.unwrap();
        assert_eq!(profile.state(), EntityState::Deleted);
        assert!(f.store.save(&mut profile).await.is_err());
    }

    #[tokio::test]
    async fn label_fails_once_owner_is_gone() {
        let f = fixture().await;
        let mut profile = f.store.create("personal", f.uid, nickname("JD"));
        assert_eq!(
            f.store.label(&profile).await.unwrap(),
            format!("Personal profile of jane (uid: {})", f.uid)
        );
        f.store.save(&mut profile).await.unwrap();

        f.storage.begin_account_deletion(f.uid).await.unwrap();
        assert!(matches!(
            f.store.label(&profile).await,
            Err(ProfileError::Reference(_))
        ));
    }

    #[tokio::test]
    async fn field_value_reads_stored_values() {
        let f = fixture().await;
        let mut profile = f.store.create("personal", f.uid, nickname("JD"));
        f.store.save(&mut profile).await.unwrap();
        let id = profile.id().unwrap();
        assert_eq!(
            f.store.field_value(id, "nickname").await.unwrap(),
            vec![FieldValue::text("JD")]
        );
        assert!(f.store.field_value(id, "other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cascade_handler_removes_owner_profiles() {
        let f = fixture().await;
        for name in ["a", "b"] {
            let mut profile = f.store.create("personal", f.uid, nickname(name));
            f.store.save(&mut profile).await.unwrap();
        }
        f.store.on_account_deleting(f.uid).await.unwrap();
        assert!(f.store.load_by_owner(f.uid).await.unwrap().is_empty());
    }
}
