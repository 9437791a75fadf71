//! Profile type domain types
//!
//! A profile type is a named category ("personal", "business", ...) that
//! decides which fields a profile carries and whether it is offered during
//! registration.

use serde::{Deserialize, Serialize};

use super::fields::{is_machine_name, FieldViolation};

/// Profile type entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileType {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub registration: bool,
}

impl ProfileType {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            weight: 0,
            registration: false,
        }
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_registration(mut self, registration: bool) -> Self {
        self.registration = registration;
        self
    }

    pub fn check(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        if !is_machine_name(&self.id) {
            violations.push(FieldViolation::new(
                "id",
                format!(
                    "The machine name {} must contain only lowercase letters, numbers and underscores.",
                    self.id
                ),
            ));
        }
        if self.label.trim().is_empty() {
            violations.push(FieldViolation::new("label", "Label field is required."));
        }
        violations
    }
}

/// Listing order: weight first, then label.
pub fn sort_types(types: &mut [ProfileType]) {
    types.sort_by(|a, b| a.weight.cmp(&b.weight).then_with(|| a.label.cmp(&b.label)));
}

/// Request DTO for updating a profile type; the id comes from the path
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileTypeRequest {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub weight: Option<i32>,
    #[serde(default)]
    pub registration: Option<bool>,
}

impl UpdateProfileTypeRequest {
    pub fn apply(self, profile_type: &mut ProfileType) {
        if let Some(label) = self.label {
            profile_type.label = label;
        }
        if let Some(weight) = self.weight {
            profile_type.weight = weight;
        }
        if let Some(registration) = self.registration {
            profile_type.registration = registration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_weight_then_label() {
        let mut types = vec![
            ProfileType::new("b", "Beta").with_weight(1),
            ProfileType::new("z", "Zulu"),
            ProfileType::new("a", "Alpha"),
        ];
        sort_types(&mut types);
        let ids: Vec<_> = types.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a", "z", "b"]);
    }

    #[test]
    fn check_rejects_bad_ids_and_labels() {
        assert!(ProfileType::new("personal", "Personal").check().is_empty());
        let violations = ProfileType::new("Personal Info", " ").check();
        let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, ["id", "label"]);
    }

    #[test]
    fn update_request_only_touches_given_values() {
        let mut t = ProfileType::new("test", "Test profile").with_registration(true);
        UpdateProfileTypeRequest {
            label: None,
            weight: Some(5),
            registration: None,
        }
        .apply(&mut t);
        assert_eq!(t.label, "Test profile");
        assert_eq!(t.weight, 5);
        assert!(t.registration);
    }
}
