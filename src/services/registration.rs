//! Account registration workflow
//!
//! The host form that profile groups get attached to. Registration creates the
//! account first and only then commits the attached profiles, because they
//! reference the new account's id.

use serde::Serialize;

use crate::domain::forms::FormDescription;
use crate::domain::{Account, FieldViolation, FormElement, FormInput, HostForm, NewAccount, Profile};
use crate::error::{ProfileError, ProfileResult};
use crate::services::accounts::AccountService;
use crate::services::attach::AttachAdapter;
use crate::services::registry::ProfileTypeRegistry;

pub const REGISTER_FORM_ID: &str = "user_register_form";

pub const REGISTRATION_SUCCESSFUL: &str = "Registration successful.";

#[derive(Debug)]
pub enum RegistrationOutcome {
    Registered {
        account: Account,
        profiles: Vec<Profile>,
    },
    /// Nothing was created.
    Rejected { errors: Vec<FieldViolation> },
}

/// Registration form as shown to clients.
#[derive(Debug, Serialize)]
pub struct RegistrationForm {
    #[serde(flatten)]
    pub form: FormDescription,
}

#[derive(Clone)]
pub struct RegistrationService {
    accounts: AccountService,
    registry: ProfileTypeRegistry,
    attach: AttachAdapter,
}

impl RegistrationService {
    pub fn new(accounts: AccountService, registry: ProfileTypeRegistry, attach: AttachAdapter) -> Self {
        Self {
            accounts,
            registry,
            attach,
        }
    }

    /// Host elements plus one group per registration-eligible profile type.
    pub async fn build_form(&self) -> ProfileResult<HostForm> {
        let mut form = HostForm::new(REGISTER_FORM_ID);
        form.add_element(FormElement::new("name", "Username", "textfield").required(true));
        form.add_element(FormElement::new("mail", "Email address", "email").required(true));

        let types = self.registry.registration_types().await?;
        self.attach.attach(&mut form, &types).await?;
        Ok(form)
    }

    pub async fn describe_form(&self) -> ProfileResult<RegistrationForm> {
        let form = self.build_form().await?;
        Ok(RegistrationForm {
            form: FormDescription::from(&form),
        })
    }

    pub async fn submit(&self, input: FormInput) -> ProfileResult<RegistrationOutcome> {
        let mut form = self.build_form().await?;
        form.set_input(input);

        let new_account = NewAccount::new(
            form.value("name").unwrap_or_default(),
            form.value("mail").unwrap_or_default(),
        );
        for violation in new_account.check() {
            form.set_error(violation.field, violation.message);
        }
        if !new_account.name.is_empty()
            && self.accounts.find_by_name(&new_account.name).await?.is_some()
        {
            form.set_error(
                "name",
                format!("The username {} is already taken.", new_account.name),
            );
        }

        self.attach.validate(&mut form);

        if form.has_errors() {
            let errors = form.errors().to_vec();
            form.discard_input();
            tracing::warn!(
                form_id = REGISTER_FORM_ID,
                errors = errors.len(),
                "Registration rejected"
            );
            return Ok(RegistrationOutcome::Rejected { errors });
        }

        let account = match self.accounts.create(new_account).await {
            Ok(account) => account,
            // Lost a race for the name
            Err(ProfileError::Conflict(message)) => {
                return Ok(RegistrationOutcome::Rejected {
                    errors: vec![FieldViolation::new("name", message)],
                })
            }
            Err(e) => return Err(e),
        };

        match self.attach.commit(&mut form, account.id).await {
            Ok(profiles) => {
                tracing::info!(uid = account.id, profiles = profiles.len(), "Registration completed");
                Ok(RegistrationOutcome::Registered { account, profiles })
            }
            Err(e) => {
                tracing::error!(uid = account.id, error = %e, "Registration commit failed, removing account");
                if let Err(cleanup) = self.accounts.delete(account.id).await {
                    tracing::error!(uid = account.id, error = %cleanup, "Could not remove account");
                }
                Err(e)
            }
        }
    }
}
