//! Attach adapter
//!
//! Embeds profile-edit groups into a host form (e.g. registration), validates
//! them as part of the host submission and, once the host has created the
//! owning account, saves one profile per attached group.
//!
//! Submitted values of a group use the keys
//! `entity_<type>[<field>][<delta>][value]`.

use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::fields::validate_values;
use crate::domain::forms::group_namespace;
use crate::domain::{
    AccountId, AttachedGroup, FieldValues, FieldViolation, FormElement, FormInput, FormStage,
    HostForm, Profile, ProfileType, ValidationResult,
};
use crate::error::{ProfileError, ProfileResult};
use crate::services::field_schema::FieldSchema;
use crate::services::profile_store::ProfileStore;

#[derive(Clone)]
pub struct AttachAdapter {
    schema: FieldSchema,
    profiles: Arc<ProfileStore>,
}

impl AttachAdapter {
    pub fn new(schema: FieldSchema, profiles: Arc<ProfileStore>) -> Self {
        Self { schema, profiles }
    }

    /// Adds one namespaced group per type to the form.
    ///
    /// `Conflict` if a namespace collides with something already on the form;
    /// the form is left unchanged in that case.
    pub async fn attach(&self, form: &mut HostForm, eligible_types: &[ProfileType]) -> ProfileResult<()> {
        for profile_type in eligible_types {
            let namespace = group_namespace(&profile_type.id);
            if form.has_key(&namespace) {
                return Err(ProfileError::conflict(format!(
                    "Form {} already has an element named {}",
                    form.form_id(),
                    namespace
                )));
            }
        }

        let definitions = try_join_all(
            eligible_types
                .iter()
                .map(|profile_type| self.schema.definitions(&profile_type.id)),
        )
        .await?;

        for (profile_type, fields) in eligible_types.iter().zip(definitions) {
            let group = AttachedGroup {
                namespace: group_namespace(&profile_type.id),
                profile_type: profile_type.clone(),
                fields,
                values: FieldValues::new(),
            };

            for definition in &group.fields {
                let mut element = FormElement::new(
                    group.element_key(&definition.name),
                    definition.label.clone(),
                    definition.widget.widget_type.clone(),
                )
                .required(definition.required);
                element.group = Some(group.namespace.clone());
                form.add_element(element);
            }

            tracing::debug!(
                form_id = form.form_id(),
                namespace = %group.namespace,
                fields = group.fields.len(),
                "Profile group attached"
            );
            form.push_group(group);
        }
        Ok(())
    }

    /// Parses and checks every attached group against its field schema.
    ///
    /// Errors are recorded on the form under the element key of the offending
    /// field. The form counts as validated only if it has no errors at all,
    /// host errors included. Validating again replaces the group errors of
    /// the previous run.
    pub fn validate(&self, form: &mut HostForm) -> ValidationResult {
        form.clear_group_errors();
        form.set_stage(FormStage::Building);
        let input = form.input().clone();
        let mut errors = Vec::new();

        for group in form.groups_mut() {
            let (values, parse_errors) = parse_group(group, &input);

            errors.extend(parse_errors);
            errors.extend(
                validate_values(&group.fields, &values)
                    .into_iter()
                    .map(|v| FieldViolation::new(group.element_key(&v.field), v.message)),
            );
            group.values = values;
        }

        for error in &errors {
            form.set_error(error.field.clone(), error.message.clone());
        }
        if !form.has_errors() {
            form.set_stage(FormStage::Validated);
        }

        ValidationResult { errors }
    }

    /// Saves one profile per attached group for the new owner.
    ///
    /// Only valid on a validated form without errors. If one save fails, the
    /// profiles this call already created are deleted again.
    pub async fn commit(&self, form: &mut HostForm, new_owner_id: AccountId) -> ProfileResult<Vec<Profile>> {
        match form.stage() {
            FormStage::Validated => {}
            FormStage::Committed => {
                return Err(ProfileError::conflict(format!(
                    "Form {} has already been committed",
                    form.form_id()
                )))
            }
            FormStage::Building => {
                return Err(ProfileError::invalid(
                    form.form_id(),
                    "The form has not been validated.",
                ))
            }
        }
        if form.has_errors() {
            return Err(ProfileError::Validation(form.errors().to_vec()));
        }

        let mut created: Vec<Profile> = Vec::with_capacity(form.groups().len());
        for group in form.groups() {
            let mut profile =
                self.profiles
                    .create(group.profile_type.id.clone(), new_owner_id, group.values.clone());

            if let Err(e) = self.profiles.save(&mut profile).await {
                tracing::warn!(
                    form_id = form.form_id(),
                    namespace = %group.namespace,
                    uid = new_owner_id,
                    error = %e,
                    "Attached profile could not be saved, rolling back"
                );
                for saved in created.iter_mut() {
                    if let Err(rollback) = self.profiles.delete(saved).await {
                        tracing::error!(error = %rollback, "Rollback of attached profile failed");
                    }
                }
                return Err(e);
            }
            created.push(profile);
        }

        form.set_stage(FormStage::Committed);
        tracing::info!(
            form_id = form.form_id(),
            uid = new_owner_id,
            profiles = created.len(),
            "Attached profiles committed"
        );
        Ok(created)
    }
}

/// Collects a group's submitted values, ordered by delta, parsed by kind.
fn parse_group(group: &AttachedGroup, input: &FormInput) -> (FieldValues, Vec<FieldViolation>) {
    let prefix = format!("{}[", group.namespace);
    let mut raw: BTreeMap<&str, BTreeMap<usize, &str>> = BTreeMap::new();

    for (key, value) in input {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        let Some((field, delta)) = parse_value_key(rest) else {
            tracing::debug!(key = %key, "Ignoring malformed profile form key");
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }
        raw.entry(field).or_default().insert(delta, value.as_str());
    }

    let mut values = FieldValues::new();
    let mut errors = Vec::new();

    for definition in &group.fields {
        let Some(submitted) = raw.get(definition.name.as_str()) else {
            continue;
        };
        let mut parsed = Vec::with_capacity(submitted.len());
        for value in submitted.values() {
            match definition.kind.parse_input(value) {
                Some(v) => parsed.push(v),
                None => errors.push(FieldViolation::new(
                    group.element_key(&definition.name),
                    format!("{} must be {}.", definition.label, definition.kind.expectation()),
                )),
            }
        }
        if !parsed.is_empty() {
            values.insert(definition.name.clone(), parsed);
        }
    }

    (values, errors)
}

/// Splits `<field>][<delta>][value]` into field name and delta.
fn parse_value_key(rest: &str) -> Option<(&str, usize)> {
    let mut parts = rest.splitn(3, "][");
    let field = parts.next()?;
    let delta = parts.next()?.parse().ok()?;
    match parts.next()? {
        "value]" => Some((field, delta)),
        _ => None,
    }
}
