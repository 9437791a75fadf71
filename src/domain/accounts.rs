//! Account domain types
//!
//! Accounts own profiles. Only what the profile engine needs is modelled here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fields::FieldViolation;

pub type AccountId = i64;

/// Account entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub mail: String,
    pub created_at: DateTime<Utc>,
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    /// Deletion in progress; the account no longer resolves.
    Deleting,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleting => "deleting",
        }
    }
}

/// Values for a new account
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub mail: String,
}

impl NewAccount {
    pub fn new(name: impl Into<String>, mail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mail: mail.into(),
        }
    }

    pub fn check(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        if self.name.trim().is_empty() {
            violations.push(FieldViolation::new("name", "Username field is required."));
        }
        if self.mail.trim().is_empty() {
            violations.push(FieldViolation::new("mail", "Email address field is required."));
        } else if !is_valid_mail(&self.mail) {
            violations.push(FieldViolation::new(
                "mail",
                format!("The email address {} is not valid.", self.mail),
            ));
        }
        violations
    }
}

fn is_valid_mail(mail: &str) -> bool {
    match mail.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !mail.contains(' ')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_checks() {
        assert!(NewAccount::new("jane", "jane@example.com").check().is_empty());

        let violations = NewAccount::new("", "not-a-mail").check();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].message, "Username field is required.");
        assert_eq!(violations[1].message, "The email address not-a-mail is not valid.");
    }

    #[test]
    fn mail_shape() {
        assert!(is_valid_mail("a@b"));
        assert!(!is_valid_mail("@b"));
        assert!(!is_valid_mail("a@"));
        assert!(!is_valid_mail("a@b@c"));
        assert!(!is_valid_mail("a b@c"));
    }
}
