//! Account service
//!
//! Account deletion runs in three steps: the account is flagged so it stops
//! resolving, subscribers of the event bus clean up what the account owns, and
//! only then the account row is removed. A failing subscriber restores the
//! account.

use std::sync::Arc;

use crate::domain::{Account, AccountId, NewAccount};
use crate::error::{ProfileError, ProfileResult};
use crate::services::events::AccountEventBus;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AccountService {
    storage: Arc<dyn Storage>,
    events: Arc<AccountEventBus>,
}

impl AccountService {
    pub fn new(storage: Arc<dyn Storage>, events: Arc<AccountEventBus>) -> Self {
        Self { storage, events }
    }

    pub async fn create(&self, account: NewAccount) -> ProfileResult<Account> {
        let violations = account.check();
        if !violations.is_empty() {
            return Err(ProfileError::Validation(violations));
        }

        let created = self.storage.create_account(&account).await?;
        tracing::info!(uid = created.id, name = %created.name, "Account created");
        Ok(created)
    }

    pub async fn find(&self, uid: AccountId) -> ProfileResult<Option<Account>> {
        self.storage.account(uid).await
    }

    pub async fn load(&self, uid: AccountId) -> ProfileResult<Account> {
        self.find(uid)
            .await?
            .ok_or_else(|| ProfileError::not_found(format!("Account {} not found", uid)))
    }

    pub async fn find_by_name(&self, name: &str) -> ProfileResult<Option<Account>> {
        self.storage.account_by_name(name).await
    }

    /// Deletes an account and, through the event bus, everything it owns.
    pub async fn delete(&self, uid: AccountId) -> ProfileResult<()> {
        if !self.storage.begin_account_deletion(uid).await? {
            return Err(ProfileError::not_found(format!("Account {} not found", uid)));
        }

        let cleanup = match self.events.publish_deleting(uid).await {
            Ok(()) => self.storage.finish_account_deletion(uid).await,
            Err(e) => Err(e),
        };

        if let Err(e) = cleanup {
            tracing::error!(uid = uid, error = %e, "Account deletion aborted");
            self.storage.abort_account_deletion(uid).await?;
            return Err(e);
        }

        tracing::info!(uid = uid, "Account deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::events::AccountDeletionHandler;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;

    struct Refuse;

    #[async_trait]
    impl AccountDeletionHandler for Refuse {
        fn name(&self) -> &'static str {
            "refuse"
        }

        async fn on_account_deleting(&self, _uid: AccountId) -> ProfileResult<()> {
            Err(ProfileError::reference("still referenced"))
        }
    }

    fn service() -> (AccountService, Arc<AccountEventBus>) {
        let events = Arc::new(AccountEventBus::new());
        (
            AccountService::new(Arc::new(MemoryStorage::new()), events.clone()),
            events,
        )
    }

    #[tokio::test]
    async fn create_validates_input() {
        let (accounts, _) = service();
        let err = accounts
            .create(NewAccount::new("", "jane@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_removes_the_account() {
        let (accounts, _) = service();
        let account = accounts
            .create(NewAccount::new("jane", "jane@example.com"))
            .await
            .unwrap();
        accounts.delete(account.id).await.unwrap();
        assert!(accounts.find(account.id).await.unwrap().is_none());
        assert!(accounts.delete(account.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn failing_handler_restores_the_account() {
        let (accounts, events) = service();
        events.subscribe(Arc::new(Refuse));
        let account = accounts
            .create(NewAccount::new("jane", "jane@example.com"))
            .await
            .unwrap();

        assert!(matches!(
            accounts.delete(account.id).await,
            Err(ProfileError::Reference(_))
        ));
        assert_eq!(accounts.load(account.id).await.unwrap(), account);
    }
}
