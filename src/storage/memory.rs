//! In-process storage backend
//!
//! All state lives behind one mutex, so every trait call is atomic with
//! respect to every other. Nothing awaits while the lock is held.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::{
    AccountDirectory, FieldDefinitionStore, FieldValueStore, ProfileRecordStore, ProfileTypeStore,
    Storage,
};
use crate::domain::profiles::NewProfileRecord;
use crate::domain::{
    Account, AccountId, AccountStatus, FieldDefinition, FieldValue, NewAccount, ProfileId,
    ProfileRecord, ProfileType,
};
use crate::error::{ProfileError, ProfileResult};

#[derive(Debug)]
struct AccountRow {
    account: Account,
    status: AccountStatus,
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, AccountRow>,
    next_account_id: AccountId,
    types: BTreeMap<String, ProfileType>,
    fields: BTreeMap<String, Vec<FieldDefinition>>,
    // Keyed by id; ids are handed out in insertion order.
    profiles: BTreeMap<ProfileId, ProfileRecord>,
    next_profile_id: ProfileId,
}

impl MemoryState {
    fn active_account(&self, uid: AccountId) -> Option<&Account> {
        self.accounts
            .get(&uid)
            .filter(|row| row.status == AccountStatus::Active)
            .map(|row| &row.account)
    }

    fn check_references(&self, profile_type: &str, uid: AccountId) -> ProfileResult<()> {
        if !self.types.contains_key(profile_type) {
            return Err(ProfileError::reference(format!(
                "Profile type {} does not exist",
                profile_type
            )));
        }
        if self.active_account(uid).is_none() {
            return Err(ProfileError::reference(format!("Account {} does not exist", uid)));
        }
        Ok(())
    }
}

/// Storage backend keeping everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountDirectory for MemoryStorage {
    async fn create_account(&self, account: &NewAccount) -> ProfileResult<Account> {
        let mut state = self.state.lock();
        if state.accounts.values().any(|row| row.account.name == account.name) {
            return Err(ProfileError::conflict(format!(
                "The username {} is already taken.",
                account.name
            )));
        }
        state.next_account_id += 1;
        let created = Account {
            id: state.next_account_id,
            name: account.name.clone(),
            mail: account.mail.clone(),
            created_at: Utc::now(),
        };
        state.accounts.insert(
            created.id,
            AccountRow {
                account: created.clone(),
                status: AccountStatus::Active,
            },
        );
        Ok(created)
    }

    async fn account(&self, uid: AccountId) -> ProfileResult<Option<Account>> {
        Ok(self.state.lock().active_account(uid).cloned())
    }

    async fn account_by_name(&self, name: &str) -> ProfileResult<Option<Account>> {
        let state = self.state.lock();
        Ok(state
            .accounts
            .values()
            .find(|row| row.status == AccountStatus::Active && row.account.name == name)
            .map(|row| row.account.clone()))
    }

    async fn account_exists(&self, uid: AccountId) -> ProfileResult<bool> {
        Ok(self.state.lock().active_account(uid).is_some())
    }

    async fn account_display_name(&self, uid: AccountId) -> ProfileResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .active_account(uid)
            .map(|account| account.name.clone()))
    }

    async fn begin_account_deletion(&self, uid: AccountId) -> ProfileResult<bool> {
        let mut state = self.state.lock();
        match state.accounts.get_mut(&uid) {
            Some(row) if row.status == AccountStatus::Active => {
                row.status = AccountStatus::Deleting;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish_account_deletion(&self, uid: AccountId) -> ProfileResult<()> {
        let mut state = self.state.lock();
        if state.profiles.values().any(|p| p.uid == uid) {
            return Err(ProfileError::reference(format!(
                "Account {} still owns profiles",
                uid
            )));
        }
        state.accounts.remove(&uid);
        Ok(())
    }

    async fn abort_account_deletion(&self, uid: AccountId) -> ProfileResult<()> {
        if let Some(row) = self.state.lock().accounts.get_mut(&uid) {
            row.status = AccountStatus::Active;
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileTypeStore for MemoryStorage {
    async fn insert_type(&self, profile_type: &ProfileType) -> ProfileResult<()> {
        let mut state = self.state.lock();
        if state.types.contains_key(&profile_type.id) {
            return Err(ProfileError::conflict(format!(
                "Profile type {} already exists",
                profile_type.id
            )));
        }
        state
            .types
            .insert(profile_type.id.clone(), profile_type.clone());
        Ok(())
    }

    async fn update_type(&self, profile_type: &ProfileType) -> ProfileResult<bool> {
        let mut state = self.state.lock();
        match state.types.get_mut(&profile_type.id) {
            Some(existing) => {
                *existing = profile_type.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_type(&self, id: &str) -> ProfileResult<Option<ProfileType>> {
        Ok(self.state.lock().types.get(id).cloned())
    }

    async fn list_types(&self) -> ProfileResult<Vec<ProfileType>> {
        Ok(self.state.lock().types.values().cloned().collect())
    }

    async fn delete_type(&self, id: &str) -> ProfileResult<bool> {
        let mut state = self.state.lock();
        if !state.types.contains_key(id) {
            return Ok(false);
        }
        let in_use = state.profiles.values().filter(|p| p.profile_type == id).count();
        if in_use > 0 {
            return Err(ProfileError::conflict(format!(
                "Profile type {} is used by {} profiles",
                id, in_use
            )));
        }
        state.types.remove(id);
        state.fields.remove(id);
        Ok(true)
    }
}

#[async_trait]
impl FieldDefinitionStore for MemoryStorage {
    async fn insert_definition(&self, definition: &FieldDefinition) -> ProfileResult<()> {
        let mut state = self.state.lock();
        if !state.types.contains_key(&definition.type_id) {
            return Err(ProfileError::reference(format!(
                "Profile type {} does not exist",
                definition.type_id
            )));
        }
        let bound = state.fields.entry(definition.type_id.clone()).or_default();
        if bound.iter().any(|d| d.name == definition.name) {
            return Err(ProfileError::conflict(format!(
                "Field {} is already attached to {}",
                definition.name, definition.type_id
            )));
        }
        bound.push(definition.clone());
        Ok(())
    }

    async fn field_definitions(&self, type_id: &str) -> ProfileResult<Vec<FieldDefinition>> {
        Ok(self
            .state
            .lock()
            .fields
            .get(type_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl FieldValueStore for MemoryStorage {
    async fn get_value(&self, profile_id: ProfileId, field_name: &str) -> ProfileResult<Vec<FieldValue>> {
        Ok(self
            .state
            .lock()
            .profiles
            .get(&profile_id)
            .and_then(|p| p.fields.get(field_name).cloned())
            .unwrap_or_default())
    }

    async fn set_value(
        &self,
        profile_id: ProfileId,
        field_name: &str,
        values: &[FieldValue],
    ) -> ProfileResult<()> {
        let mut state = self.state.lock();
        let record = state
            .profiles
            .get_mut(&profile_id)
            .ok_or_else(|| ProfileError::reference(format!("Profile {} does not exist", profile_id)))?;
        if values.is_empty() {
            record.fields.remove(field_name);
        } else {
            record.fields.insert(field_name.to_string(), values.to_vec());
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileRecordStore for MemoryStorage {
    async fn insert_profile(&self, record: &NewProfileRecord) -> ProfileResult<ProfileId> {
        let mut state = self.state.lock();
        state.check_references(&record.profile_type, record.uid)?;
        state.next_profile_id += 1;
        let id = state.next_profile_id;
        state.profiles.insert(id, record.clone().with_id(id));
        Ok(id)
    }

    async fn update_profile(&self, record: &ProfileRecord) -> ProfileResult<()> {
        let mut state = self.state.lock();
        let (profile_type, uid) = match state.profiles.get(&record.id) {
            Some(existing) => (existing.profile_type.clone(), existing.uid),
            None => {
                return Err(ProfileError::reference(format!(
                    "Profile {} has been deleted",
                    record.id
                )))
            }
        };
        state.check_references(&profile_type, uid)?;
        if let Some(existing) = state.profiles.get_mut(&record.id) {
            existing.changed = record.changed;
            existing.fields = record.fields.clone();
        }
        Ok(())
    }

    async fn get_profile(&self, id: ProfileId) -> ProfileResult<Option<ProfileRecord>> {
        Ok(self.state.lock().profiles.get(&id).cloned())
    }

    async fn profiles_by_owner(
        &self,
        uid: AccountId,
        profile_type: Option<&str>,
    ) -> ProfileResult<Vec<ProfileRecord>> {
        let state = self.state.lock();
        Ok(state
            .profiles
            .values()
            .filter(|p| p.uid == uid)
            .filter(|p| profile_type.map_or(true, |t| p.profile_type == t))
            .cloned()
            .collect())
    }

    async fn delete_profile(&self, id: ProfileId) -> ProfileResult<bool> {
        Ok(self.state.lock().profiles.remove(&id).is_some())
    }

    async fn delete_profiles_by_owner(&self, uid: AccountId) -> ProfileResult<Vec<ProfileId>> {
        let mut state = self.state.lock();
        let ids: Vec<ProfileId> = state
            .profiles
            .values()
            .filter(|p| p.uid == uid)
            .map(|p| p.id)
            .collect();
        for id in &ids {
            state.profiles.remove(id);
        }
        Ok(ids)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> bool {
        true
    }
}
