//! Service layer
//!
//! Registry, field schema, profile store, attach adapter and the account
//! workflows that sit on top of a [`Storage`] backend.

pub mod accounts;
pub mod attach;
pub mod events;
pub mod field_schema;
pub mod profile_store;
pub mod registration;
pub mod registry;

use std::sync::Arc;

pub use accounts::AccountService;
pub use attach::AttachAdapter;
pub use events::{AccountDeletionHandler, AccountEventBus, SubscriptionId};
pub use field_schema::FieldSchema;
pub use profile_store::ProfileStore;
pub use registration::{RegistrationOutcome, RegistrationService, REGISTER_FORM_ID};
pub use registry::ProfileTypeRegistry;

use crate::clock::Clock;
use crate::storage::Storage;

/// All services wired against one storage backend.
///
/// Creating it subscribes the profile store to account deletion, so profiles
/// are removed together with their owner until [`ProfileServices::shutdown`].
pub struct ProfileServices {
    pub storage: Arc<dyn Storage>,
    pub events: Arc<AccountEventBus>,
    pub registry: ProfileTypeRegistry,
    pub schema: FieldSchema,
    pub profiles: Arc<ProfileStore>,
    pub accounts: AccountService,
    pub attach: AttachAdapter,
    pub registration: RegistrationService,
    cascade: SubscriptionId,
}

impl ProfileServices {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        let events = Arc::new(AccountEventBus::new());
        let registry = ProfileTypeRegistry::new(storage.clone());
        let schema = FieldSchema::new(storage.clone());
        let profiles = Arc::new(ProfileStore::new(storage.clone(), schema.clone(), clock));
        let accounts = AccountService::new(storage.clone(), events.clone());
        let attach = AttachAdapter::new(schema.clone(), profiles.clone());
        let registration = RegistrationService::new(accounts.clone(), registry.clone(), attach.clone());

        let cascade = events.subscribe(profiles.clone());
        tracing::debug!(backend = storage.backend_name(), "Profile services initialized");

        Self {
            storage,
            events,
            registry,
            schema,
            profiles,
            accounts,
            attach,
            registration,
            cascade,
        }
    }

    /// Stops cascading account deletions into profiles.
    pub fn shutdown(&self) {
        if self.events.unsubscribe(self.cascade) {
            tracing::debug!("Profile cascade unsubscribed");
        }
    }
}
