//! Host form context
//!
//! A `HostForm` is the mutable form state a host workflow (e.g. registration)
//! builds, fills with submitted input and validates. The attach adapter adds
//! namespaced profile groups to it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::fields::{FieldDefinition, FieldValues, FieldViolation};
use super::profile_types::ProfileType;

/// Submitted input, keyed by element name (`entity_test[profile_fullname][0][value]`).
pub type FormInput = BTreeMap<String, String>;

/// Prefix of the namespace an attached profile group lives under.
pub const GROUP_NAMESPACE_PREFIX: &str = "entity_";

pub fn group_namespace(type_id: &str) -> String {
    format!("{}{}", GROUP_NAMESPACE_PREFIX, type_id)
}

/// One input element of a form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormElement {
    pub key: String,
    pub label: String,
    pub required: bool,
    pub widget_type: String,
    /// Namespace of the attached group this element belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl FormElement {
    pub fn new(key: impl Into<String>, label: impl Into<String>, widget_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            required: false,
            widget_type: widget_type.into(),
            group: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// A profile-edit group attached to a host form.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedGroup {
    pub namespace: String,
    pub profile_type: ProfileType,
    pub fields: Vec<FieldDefinition>,
    /// Parsed values, filled in by validation.
    pub values: FieldValues,
}

impl AttachedGroup {
    /// Element key of one of this group's fields.
    pub fn element_key(&self, field_name: &str) -> String {
        format!("{}[{}]", self.namespace, field_name)
    }
}

/// Lifecycle of a host form as seen by the attach adapter.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FormStage {
    Building,
    Validated,
    Committed,
}

/// Mutable form context shared between a host workflow and the attach adapter.
#[derive(Debug, Clone)]
pub struct HostForm {
    form_id: String,
    elements: Vec<FormElement>,
    groups: Vec<AttachedGroup>,
    input: FormInput,
    errors: Vec<FieldViolation>,
    stage: FormStage,
}

impl HostForm {
    pub fn new(form_id: impl Into<String>) -> Self {
        Self {
            form_id: form_id.into(),
            elements: Vec::new(),
            groups: Vec::new(),
            input: FormInput::new(),
            errors: Vec::new(),
            stage: FormStage::Building,
        }
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn add_element(&mut self, element: FormElement) {
        self.elements.push(element);
    }

    pub fn elements(&self) -> &[FormElement] {
        &self.elements
    }

    /// Whether a host element or attached group already uses this key.
    pub fn has_key(&self, key: &str) -> bool {
        self.elements.iter().any(|e| e.key == key) || self.groups.iter().any(|g| g.namespace == key)
    }

    pub fn groups(&self) -> &[AttachedGroup] {
        &self.groups
    }

    pub(crate) fn groups_mut(&mut self) -> &mut [AttachedGroup] {
        &mut self.groups
    }

    pub(crate) fn push_group(&mut self, group: AttachedGroup) {
        self.groups.push(group);
    }

    pub fn set_input(&mut self, input: FormInput) {
        self.input = input;
        self.errors.clear();
        self.stage = FormStage::Building;
    }

    pub fn input(&self) -> &FormInput {
        &self.input
    }

    /// Trimmed value of a host element.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.input.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn set_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldViolation::new(key, message));
    }

    /// Forgets errors recorded under attached groups; host errors stay.
    pub(crate) fn clear_group_errors(&mut self) {
        let prefixes: Vec<String> = self.groups.iter().map(|g| format!("{}[", g.namespace)).collect();
        self.errors
            .retain(|e| !prefixes.iter().any(|prefix| e.field.starts_with(prefix.as_str())));
    }

    pub fn errors(&self) -> &[FieldViolation] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn stage(&self) -> FormStage {
        self.stage
    }

    pub(crate) fn set_stage(&mut self, stage: FormStage) {
        self.stage = stage;
    }

    /// Drops everything that was submitted, e.g. after a failed host submission.
    pub fn discard_input(&mut self) {
        self.input.clear();
        for group in &mut self.groups {
            group.values.clear();
        }
        self.stage = FormStage::Building;
    }
}

/// Outcome of validating the attached groups of a form.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<FieldViolation>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Description of a form, as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct FormDescription {
    pub form_id: String,
    pub elements: Vec<FormElement>,
}

impl From<&HostForm> for FormDescription {
    fn from(form: &HostForm) -> Self {
        Self {
            form_id: form.form_id.clone(),
            elements: form.elements.clone(),
        }
    }
}
