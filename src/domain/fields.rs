//! Field schema domain types
//!
//! Profile types carry a dynamic set of fields. Each field is described by a
//! `FieldDefinition` keyed by `(type_id, name)`; values are stored per profile
//! as an ordered list so multi-value fields keep their delta order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum length of machine names (type ids and field names).
pub const MACHINE_NAME_MAX_LENGTH: usize = 32;

/// Largest limited cardinality the storage column can hold.
pub const MAX_LIMITED_CARDINALITY: u32 = i32::MAX as u32;

/// Field values of one profile: field name -> values in delta order.
pub type FieldValues = BTreeMap<String, Vec<FieldValue>>;

/// Returns true for non-empty `[a-z0-9_]` identifiers within the length limit.
pub fn is_machine_name(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MACHINE_NAME_MAX_LENGTH
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Storage kind of a field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Single-line text
    String,
    /// Long text
    Text,
    Integer,
    Boolean,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "text" => Some(Self::Text),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    /// Whether a value is of this kind.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Self::String | Self::Text, FieldValue::Text(_))
                | (Self::Integer, FieldValue::Integer(_))
                | (Self::Boolean, FieldValue::Boolean(_))
        )
    }

    /// Phrase used in "<label> must be <expectation>." messages.
    pub fn expectation(&self) -> &'static str {
        match self {
            Self::String | Self::Text => "text",
            Self::Integer => "a number",
            Self::Boolean => "true or false",
        }
    }

    /// Parse raw form input into a value of this kind.
    pub fn parse_input(&self, raw: &str) -> Option<FieldValue> {
        match self {
            Self::String | Self::Text => Some(FieldValue::Text(raw.to_string())),
            Self::Integer => raw.trim().parse().ok().map(FieldValue::Integer),
            Self::Boolean => match raw.trim() {
                "1" | "true" | "on" => Some(FieldValue::Boolean(true)),
                "0" | "false" | "off" => Some(FieldValue::Boolean(false)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many values a single profile may hold for a field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Limited(u32),
    Unlimited,
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::Limited(1)
    }
}

impl Cardinality {
    pub fn allows(&self, count: usize) -> bool {
        match self {
            Self::Limited(max) => count <= *max as usize,
            Self::Unlimited => true,
        }
    }

    /// Column representation; 0 means unlimited.
    pub fn to_storage(self) -> i32 {
        match self {
            Self::Limited(max) => i32::try_from(max).unwrap_or(i32::MAX),
            Self::Unlimited => 0,
        }
    }

    pub fn from_storage(value: i32) -> Self {
        if value <= 0 {
            Self::Unlimited
        } else {
            Self::Limited(value as u32)
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Blank text counts as no value.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

/// Form widget used to edit a field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WidgetConfig {
    pub widget_type: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl WidgetConfig {
    pub fn new(widget_type: impl Into<String>) -> Self {
        Self {
            widget_type: widget_type.into(),
            settings: serde_json::Value::Object(Default::default()),
        }
    }

    /// Default widget for a field kind.
    pub fn for_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::String => Self::new("string_textfield"),
            FieldKind::Text => Self::new("text_textarea"),
            FieldKind::Integer => Self::new("number"),
            FieldKind::Boolean => Self::new("boolean_checkbox"),
        }
    }
}

/// How a field is shown on a rendered profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayConfig {
    pub formatter: String,
    #[serde(default)]
    pub weight: i32,
}

impl DisplayConfig {
    pub fn for_kind(kind: FieldKind) -> Self {
        let formatter = match kind {
            FieldKind::String | FieldKind::Text => "text_default",
            FieldKind::Integer => "number_integer",
            FieldKind::Boolean => "boolean",
        };
        Self {
            formatter: formatter.to_string(),
            weight: 0,
        }
    }
}

/// A field bound to one profile type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    pub type_id: String,
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub required: bool,
    pub widget: WidgetConfig,
    pub display: DisplayConfig,
}

impl FieldDefinition {
    pub fn new(
        type_id: impl Into<String>,
        name: impl Into<String>,
        label: impl Into<String>,
        kind: FieldKind,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            name: name.into(),
            label: label.into(),
            kind,
            cardinality: Cardinality::default(),
            required: false,
            widget: WidgetConfig::for_kind(kind),
            display: DisplayConfig::for_kind(kind),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn with_widget(mut self, widget: WidgetConfig) -> Self {
        self.widget = widget;
        self
    }

    pub fn with_display(mut self, display: DisplayConfig) -> Self {
        self.display = display;
        self
    }

    /// Checks the definition itself, not profile values.
    pub fn check(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        if !is_machine_name(&self.name) {
            violations.push(FieldViolation::new(
                "name",
                format!(
                    "The field name {} must contain only lowercase letters, numbers and underscores.",
                    self.name
                ),
            ));
        }
        if self.label.trim().is_empty() {
            violations.push(FieldViolation::new("label", "Label field is required."));
        }
        match self.cardinality {
            Cardinality::Limited(0) => violations.push(FieldViolation::new(
                "cardinality",
                "Cardinality must allow at least one value.",
            )),
            Cardinality::Limited(max) if max > MAX_LIMITED_CARDINALITY => {
                violations.push(FieldViolation::new(
                    "cardinality",
                    format!("Cardinality cannot exceed {}.", MAX_LIMITED_CARDINALITY),
                ))
            }
            _ => {}
        }
        violations
    }
}

/// Request DTO for attaching a field; the type comes from the path
#[derive(Debug, Clone, Deserialize)]
pub struct AttachFieldRequest {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub widget: Option<WidgetConfig>,
    #[serde(default)]
    pub display: Option<DisplayConfig>,
}

impl AttachFieldRequest {
    pub fn into_definition(self, type_id: impl Into<String>) -> FieldDefinition {
        let mut definition = FieldDefinition::new(type_id, self.name, self.label, self.kind)
            .with_cardinality(self.cardinality)
            .required(self.required);
        if let Some(widget) = self.widget {
            definition = definition.with_widget(widget);
        }
        if let Some(display) = self.display {
            definition = definition.with_display(display);
        }
        definition
    }
}

/// One rejected value, attributed to a field or form element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check profile values against the definitions bound to its type.
///
/// Violations are attributed to the field name; callers embedding fields in a
/// form re-key them to their element names.
pub fn validate_values(definitions: &[FieldDefinition], values: &FieldValues) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    for name in values.keys() {
        if !definitions.iter().any(|d| &d.name == name) {
            violations.push(FieldViolation::new(name, format!("Unknown field {}.", name)));
        }
    }

    for definition in definitions {
        let supplied = values.get(&definition.name).map(Vec::as_slice).unwrap_or_default();

        // Blank text of the wrong kind is still the wrong kind
        if supplied.iter().any(|value| !definition.kind.accepts(value)) {
            violations.push(FieldViolation::new(
                &definition.name,
                format!("{} must be {}.", definition.label, definition.kind.expectation()),
            ));
        }

        let present: Vec<&FieldValue> = supplied.iter().filter(|value| !value.is_empty()).collect();

        if present.is_empty() {
            if definition.required {
                violations.push(FieldViolation::new(
                    &definition.name,
                    format!("{} field is required.", definition.label),
                ));
            }
            continue;
        }

        if !definition.cardinality.allows(present.len()) {
            if let Cardinality::Limited(max) = definition.cardinality {
                violations.push(FieldViolation::new(
                    &definition.name,
                    format!(
                        "{}: this field cannot hold more than {} values.",
                        definition.label, max
                    ),
                ));
            }
        }
    }

    violations
}

/// Drops blank values, and fields left without any, so that what gets stored
/// is exactly what `validate_values` counted.
pub fn normalize_values(values: &FieldValues) -> FieldValues {
    values
        .iter()
        .filter_map(|(name, list)| {
            let kept: Vec<FieldValue> = list.iter().filter(|value| !value.is_empty()).cloned().collect();
            (!kept.is_empty()).then(|| (name.clone(), kept))
        })
        .collect()
}
