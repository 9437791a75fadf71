//! Profile domain types
//!
//! A profile is a typed record of supplementary data owned by one account.
//! `Profile` is the in-memory entity handed out by the profile store; it keeps
//! track of whether it has been persisted or deleted so the store can enforce
//! the `New -> Persisted -> Deleted` lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::accounts::AccountId;
use super::fields::{FieldValue, FieldValues};

pub type ProfileId = i64;

/// Where an in-memory profile stands in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    New,
    Persisted,
    Deleted,
}

/// Outcome of a successful save.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    Created,
    Updated,
}

/// Profile entity
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub(crate) id: Option<ProfileId>,
    pub(crate) uuid: Uuid,
    pub(crate) profile_type: String,
    pub(crate) uid: AccountId,
    pub(crate) created: Option<DateTime<Utc>>,
    pub(crate) changed: Option<DateTime<Utc>>,
    pub(crate) fields: FieldValues,
    pub(crate) state: EntityState,
}

impl Profile {
    /// Unsaved profile with a fresh uuid.
    pub fn new(profile_type: impl Into<String>, uid: AccountId, fields: FieldValues) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            profile_type: profile_type.into(),
            uid,
            created: None,
            changed: None,
            fields,
            state: EntityState::New,
        }
    }

    pub fn from_record(record: ProfileRecord) -> Self {
        Self {
            id: Some(record.id),
            uuid: record.uuid,
            profile_type: record.profile_type,
            uid: record.uid,
            created: Some(record.created),
            changed: Some(record.changed),
            fields: record.fields,
            state: EntityState::Persisted,
        }
    }

    pub fn id(&self) -> Option<ProfileId> {
        self.id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn profile_type(&self) -> &str {
        &self.profile_type
    }

    pub fn owner_id(&self) -> AccountId {
        self.uid
    }

    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn changed_time(&self) -> Option<DateTime<Utc>> {
        self.changed
    }

    /// Overrides the in-memory changed time; the next save replaces it.
    pub fn set_changed_time(&mut self, changed: DateTime<Utc>) {
        self.changed = Some(changed);
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn is_new(&self) -> bool {
        self.state == EntityState::New
    }

    pub fn fields(&self) -> &FieldValues {
        &self.fields
    }

    pub fn field(&self, name: &str) -> &[FieldValue] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value of a text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name).first().and_then(FieldValue::as_text)
    }

    pub fn set_field(&mut self, name: impl Into<String>, values: Vec<FieldValue>) {
        self.fields.insert(name.into(), values);
    }

    pub fn clear_field(&mut self, name: &str) {
        self.fields.remove(name);
    }
}

/// Stored form of a profile, as exchanged with storage backends.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    pub id: ProfileId,
    pub uuid: Uuid,
    pub profile_type: String,
    pub uid: AccountId,
    pub created: DateTime<Utc>,
    pub changed: DateTime<Utc>,
    pub fields: FieldValues,
}

/// A profile about to be inserted; storage assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProfileRecord {
    pub uuid: Uuid,
    pub profile_type: String,
    pub uid: AccountId,
    pub created: DateTime<Utc>,
    pub changed: DateTime<Utc>,
    pub fields: FieldValues,
}

impl NewProfileRecord {
    pub fn with_id(self, id: ProfileId) -> ProfileRecord {
        ProfileRecord {
            id,
            uuid: self.uuid,
            profile_type: self.profile_type,
            uid: self.uid,
            created: self.created,
            changed: self.changed,
            fields: self.fields,
        }
    }
}

/// Request DTO for creating a profile
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProfileRequest {
    #[serde(rename = "type")]
    pub profile_type: String,
    pub uid: AccountId,
    #[serde(default)]
    pub fields: FieldValues,
}

/// Request DTO for updating a profile's field values
///
/// Fields listed with an empty array are cleared; fields not listed keep
/// their current values.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub fields: FieldValues,
}

/// Response DTO for profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: ProfileId,
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub profile_type: String,
    pub uid: AccountId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub created: DateTime<Utc>,
    pub changed: DateTime<Utc>,
    pub fields: FieldValues,
}

impl ProfileResponse {
    /// Builds the response for a persisted profile; `None` for unsaved ones.
    pub fn from_profile(profile: Profile, label: Option<String>) -> Option<Self> {
        Some(Self {
            id: profile.id?,
            uuid: profile.uuid,
            profile_type: profile.profile_type,
            uid: profile.uid,
            label,
            created: profile.created?,
            changed: profile.changed?,
            fields: profile.fields,
        })
    }
}
