//! Domain types and DTOs
//!
//! These types define the data structures of the profile engine.

pub mod accounts;
pub mod fields;
pub mod forms;
pub mod profile_types;
pub mod profiles;

// Re-export commonly used types
pub use accounts::{Account, AccountId, AccountStatus, NewAccount};
pub use fields::{
    Cardinality, DisplayConfig, FieldDefinition, FieldKind, FieldValue, FieldValues,
    FieldViolation, WidgetConfig,
};
pub use forms::{AttachedGroup, FormElement, FormInput, FormStage, HostForm, ValidationResult};
pub use profile_types::ProfileType;
pub use profiles::{EntityState, Profile, ProfileId, ProfileRecord, SaveStatus};
