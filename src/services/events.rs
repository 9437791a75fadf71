//! Account lifecycle event bus
//!
//! Handlers register explicitly and get an id back to unsubscribe with.
//! Publishing runs in two passes over the handlers in subscription order:
//! first every `check_account_deletion`, then every `on_account_deleting`.
//! A handler that may refuse a deletion does so in the check pass, before any
//! handler has removed data. The first error aborts the publish so the
//! triggering operation can roll back.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::AccountId;
use crate::error::ProfileResult;

/// Reacts to an account that is about to be removed.
#[async_trait]
pub trait AccountDeletionHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Veto pass. Nothing has been removed yet when this runs.
    async fn check_account_deletion(&self, _uid: AccountId) -> ProfileResult<()> {
        Ok(())
    }

    /// Runs after the account stopped resolving and before it is removed.
    async fn on_account_deleting(&self, uid: AccountId) -> ProfileResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Event bus for account deletion
#[derive(Default)]
pub struct AccountEventBus {
    handlers: RwLock<Vec<(SubscriptionId, Arc<dyn AccountDeletionHandler>)>>,
    next_id: AtomicU64,
}

impl AccountEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: Arc<dyn AccountDeletionHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(handler = handler.name(), subscription = id.0, "Account handler subscribed");
        self.handlers.write().push((id, handler));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(sub, _)| *sub != id);
        before != handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    pub async fn publish_deleting(&self, uid: AccountId) -> ProfileResult<()> {
        // Snapshot so no lock is held across handler awaits
        let handlers: Vec<Arc<dyn AccountDeletionHandler>> =
            self.handlers.read().iter().map(|(_, h)| h.clone()).collect();

        for handler in &handlers {
            if let Err(e) = handler.check_account_deletion(uid).await {
                tracing::warn!(
                    handler = handler.name(),
                    uid = uid,
                    error = %e,
                    "Account deletion refused"
                );
                return Err(e);
            }
        }

        for handler in &handlers {
            if let Err(e) = handler.on_account_deleting(uid).await {
                tracing::error!(
                    handler = handler.name(),
                    uid = uid,
                    error = %e,
                    "Account deletion handler failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfileError;
    use parking_lot::Mutex;

    struct Recorder {
        seen: Mutex<Vec<AccountId>>,
        fail: bool,
        veto: bool,
    }

    impl Recorder {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail,
                veto: false,
            })
        }

        fn vetoing() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail: false,
                veto: true,
            })
        }
    }

    #[async_trait]
    impl AccountDeletionHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn check_account_deletion(&self, _uid: AccountId) -> ProfileResult<()> {
            if self.veto {
                return Err(ProfileError::conflict("account is still referenced"));
            }
            Ok(())
        }

        async fn on_account_deleting(&self, uid: AccountId) -> ProfileResult<()> {
            self.seen.lock().push(uid);
            if self.fail {
                return Err(ProfileError::reference("boom"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn publishes_to_subscribers_until_unsubscribed() {
        let bus = AccountEventBus::new();
        let recorder = Recorder::new(false);
        let id = bus.subscribe(recorder.clone());
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish_deleting(7).await.unwrap();
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish_deleting(8).await.unwrap();

        assert_eq!(*recorder.seen.lock(), vec![7]);
    }

    #[tokio::test]
    async fn first_failure_stops_the_publish() {
        let bus = AccountEventBus::new();
        let failing = Recorder::new(true);
        let after = Recorder::new(false);
        bus.subscribe(failing.clone());
        bus.subscribe(after.clone());

        assert!(bus.publish_deleting(1).await.is_err());
        assert_eq!(*failing.seen.lock(), vec![1]);
        assert!(after.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn late_veto_stops_earlier_handlers() {
        let bus = AccountEventBus::new();
        let destructive = Recorder::new(false);
        let veto = Recorder::vetoing();
        bus.subscribe(destructive.clone());
        bus.subscribe(veto.clone());

        let err = bus.publish_deleting(3).await.unwrap_err();
        assert!(matches!(err, ProfileError::Conflict(_)));
        assert!(destructive.seen.lock().is_empty());
        assert!(veto.seen.lock().is_empty());
    }
}
