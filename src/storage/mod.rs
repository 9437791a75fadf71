//! Storage interfaces
//!
//! The profile engine talks to its collaborators (account directory, field
//! schema store, field value store, record storage) through these traits.
//! Every method is one atomic unit: backends must make the reference checks
//! and the write of a single call visible together or not at all.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::profiles::NewProfileRecord;
use crate::domain::{
    Account, AccountId, FieldDefinition, FieldValue, NewAccount, ProfileId, ProfileRecord,
    ProfileType,
};
use crate::error::ProfileResult;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// Account directory
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// `Conflict` if the name is taken.
    async fn create_account(&self, account: &NewAccount) -> ProfileResult<Account>;

    /// Active account by id.
    async fn account(&self, uid: AccountId) -> ProfileResult<Option<Account>>;

    /// Active account by name.
    async fn account_by_name(&self, name: &str) -> ProfileResult<Option<Account>>;

    async fn account_exists(&self, uid: AccountId) -> ProfileResult<bool>;

    async fn account_display_name(&self, uid: AccountId) -> ProfileResult<Option<String>>;

    /// Flags an active account as being deleted. Returns false if there was
    /// no active account. From here on the account no longer resolves.
    async fn begin_account_deletion(&self, uid: AccountId) -> ProfileResult<bool>;

    /// Removes a flagged account.
    async fn finish_account_deletion(&self, uid: AccountId) -> ProfileResult<()>;

    /// Restores a flagged account to active.
    async fn abort_account_deletion(&self, uid: AccountId) -> ProfileResult<()>;
}

/// Profile type storage
#[async_trait]
pub trait ProfileTypeStore: Send + Sync {
    /// `Conflict` if the id exists.
    async fn insert_type(&self, profile_type: &ProfileType) -> ProfileResult<()>;

    /// Returns false if no type has that id.
    async fn update_type(&self, profile_type: &ProfileType) -> ProfileResult<bool>;

    async fn get_type(&self, id: &str) -> ProfileResult<Option<ProfileType>>;

    async fn list_types(&self) -> ProfileResult<Vec<ProfileType>>;

    /// Deletes a type and its field definitions. `Conflict` while profiles of
    /// the type exist; returns false if no type has that id.
    async fn delete_type(&self, id: &str) -> ProfileResult<bool>;
}

/// Field definition storage
#[async_trait]
pub trait FieldDefinitionStore: Send + Sync {
    /// `Reference` if the type does not exist, `Conflict` if the type already
    /// has a field of that name.
    async fn insert_definition(&self, definition: &FieldDefinition) -> ProfileResult<()>;

    /// Definitions of a type in attachment order.
    async fn field_definitions(&self, type_id: &str) -> ProfileResult<Vec<FieldDefinition>>;
}

/// Per-profile field value storage
#[async_trait]
pub trait FieldValueStore: Send + Sync {
    /// Values of one field; empty if unset.
    async fn get_value(&self, profile_id: ProfileId, field_name: &str) -> ProfileResult<Vec<FieldValue>>;

    /// Replaces the values of one field. `Reference` if the profile does not exist.
    async fn set_value(
        &self,
        profile_id: ProfileId,
        field_name: &str,
        values: &[FieldValue],
    ) -> ProfileResult<()>;
}

/// Profile record storage
#[async_trait]
pub trait ProfileRecordStore: Send + Sync {
    /// Checks that the type exists and the owner is active, then inserts the
    /// record with its field values. Ids increase with insertion order.
    async fn insert_profile(&self, record: &NewProfileRecord) -> ProfileResult<ProfileId>;

    /// Checks that the row still exists and the owner and type still resolve,
    /// then rewrites `changed` and the field values. `created`, `type` and
    /// `uid` are never rewritten.
    async fn update_profile(&self, record: &ProfileRecord) -> ProfileResult<()>;

    async fn get_profile(&self, id: ProfileId) -> ProfileResult<Option<ProfileRecord>>;

    /// Profiles of an owner in creation order, optionally of one type only.
    async fn profiles_by_owner(
        &self,
        uid: AccountId,
        profile_type: Option<&str>,
    ) -> ProfileResult<Vec<ProfileRecord>>;

    /// Returns false if there was nothing to delete.
    async fn delete_profile(&self, id: ProfileId) -> ProfileResult<bool>;

    /// Deletes every profile of an owner, returning the deleted ids.
    async fn delete_profiles_by_owner(&self, uid: AccountId) -> ProfileResult<Vec<ProfileId>>;
}

/// Everything the profile engine needs from a backend.
#[async_trait]
pub trait Storage:
    AccountDirectory + ProfileTypeStore + FieldDefinitionStore + FieldValueStore + ProfileRecordStore
{
    fn backend_name(&self) -> &'static str;

    async fn health_check(&self) -> bool;
}
