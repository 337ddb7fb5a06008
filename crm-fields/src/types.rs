//! Core types for the custom fields layer.
//!
//! Field definitions describe named, typed attributes attached at runtime to
//! contacts, companies and deals. Field values are the per-entity data stored
//! under a definition. All records serialize with camelCase keys.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::value::Value;

/// Prefix that addresses a custom field from a filter row.
pub const CUSTOM_FIELD_PREFIX: &str = "customField:";

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generate a fresh id
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            pub fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Ulid> for $name {
            fn from(id: Ulid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

define_id!(
    /// Identifier of a custom field definition
    DefinitionId
);
define_id!(
    /// Identifier of a stored custom field value
    ValueId
);

/// Key under which a custom field appears in a filterable record.
pub fn custom_field_key(id: &DefinitionId) -> String {
    format!("{CUSTOM_FIELD_PREFIX}{id}")
}

/// Parse a `customField:<id>` key back into its definition id.
pub fn parse_custom_field_key(key: &str) -> Option<DefinitionId> {
    key.strip_prefix(CUSTOM_FIELD_PREFIX)?.parse().ok()
}

/// The CRM record kinds that accept custom fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Contact,
    Company,
    Deal,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Contact, EntityType::Company, EntityType::Deal];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Contact => "contact",
            EntityType::Company => "company",
            EntityType::Deal => "deal",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contact" => Ok(EntityType::Contact),
            "company" => Ok(EntityType::Company),
            "deal" => Ok(EntityType::Deal),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

/// Identifier of a record owned by the external entity store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The type of a field. Determines accepted value shape and legal filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Select,
    Multiselect,
    Checkbox,
    Url,
    Email,
    Phone,
    Currency,
    Textarea,
}

impl FieldType {
    pub const ALL: [FieldType; 11] = [
        FieldType::Text,
        FieldType::Number,
        FieldType::Date,
        FieldType::Select,
        FieldType::Multiselect,
        FieldType::Checkbox,
        FieldType::Url,
        FieldType::Email,
        FieldType::Phone,
        FieldType::Currency,
        FieldType::Textarea,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Select => "select",
            FieldType::Multiselect => "multiselect",
            FieldType::Checkbox => "checkbox",
            FieldType::Url => "url",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Currency => "currency",
            FieldType::Textarea => "textarea",
        }
    }

    /// Only select and multiselect carry an option list.
    pub fn supports_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Multiselect)
    }

    /// Types whose value is free text subject to length and pattern checks.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldType::Text
                | FieldType::Textarea
                | FieldType::Url
                | FieldType::Email
                | FieldType::Phone
        )
    }

    /// The declared shape the filter engine evaluates this type as.
    pub fn shape(&self) -> FieldShape {
        match self {
            FieldType::Text
            | FieldType::Textarea
            | FieldType::Url
            | FieldType::Email
            | FieldType::Phone
            | FieldType::Select => FieldShape::String,
            FieldType::Number | FieldType::Currency => FieldShape::Number,
            FieldType::Date => FieldShape::Date,
            FieldType::Multiselect => FieldShape::Array,
            FieldType::Checkbox => FieldShape::Boolean,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown field type: {s}"))
    }
}

/// Declared shape of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldShape {
    String,
    Number,
    Date,
    Array,
    Boolean,
}

impl fmt::Display for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldShape::String => "string",
            FieldShape::Number => "number",
            FieldShape::Date => "date",
            FieldShape::Array => "array",
            FieldShape::Boolean => "boolean",
        };
        f.write_str(s)
    }
}

/// A single option in a select or multiselect field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl FieldOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Optional constraint bundle attached to a definition.
///
/// `min`/`max` are numeric bounds for number and currency fields and
/// character-count bounds for textual fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FieldValidation {
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A field definition: the complete schema for a single custom attribute.
///
/// `(entity_type, name)` is unique and, together with `field_type`, never
/// changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldDefinition {
    pub id: DefinitionId,
    pub entity_type: EntityType,
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FieldOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,
    pub order: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomFieldDefinition {
    /// Option list, empty for types without options.
    pub fn options(&self) -> &[FieldOption] {
        self.options.as_deref().unwrap_or_default()
    }

    /// Look up an option by its stored value.
    pub fn option(&self, value: &str) -> Option<&FieldOption> {
        self.options().iter().find(|o| o.value == value)
    }

    /// Display label for an option value, falling back to the raw value.
    pub fn option_label<'a>(&'a self, value: &'a str) -> &'a str {
        self.option(value)
            .map(|o| o.label.as_str())
            .unwrap_or(value)
    }

    /// Key under which this field appears in filterable records.
    pub fn filter_key(&self) -> String {
        custom_field_key(&self.id)
    }
}

/// The stored value of one definition for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldValue {
    pub id: ValueId,
    pub definition_id: DefinitionId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
