//! Error types for the custom fields layer

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EntityType, ValueId};

/// Result type for custom field operations
pub type Result<T> = std::result::Result<T, FieldsError>;

/// Result type for store port operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in registry and value store operations
#[derive(Debug, Error)]
pub enum FieldsError {
    /// A definition with the same name already exists for the entity type
    #[error("a {entity_type} field named '{name}' already exists")]
    DuplicateName {
        entity_type: EntityType,
        name: String,
    },

    /// Definition, value or other record id does not resolve
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// Value write against a deactivated definition
    #[error("field '{name}' is inactive and cannot accept values")]
    Inactive { name: String },

    /// Value write with an entity type that differs from the definition's
    #[error("field '{name}' belongs to {expected} records, not {actual}")]
    EntityTypeMismatch {
        name: String,
        expected: EntityType,
        actual: EntityType,
    },

    /// Options supplied for a type that has no option list
    #[error("field '{name}' of type {field_type} cannot declare options")]
    OptionsNotAllowed { name: String, field_type: String },

    /// Two options in one definition share a value
    #[error("field '{name}' declares option '{value}' more than once")]
    DuplicateOption { name: String, value: String },

    /// Definition attributes are malformed
    #[error("invalid field definition: {message}")]
    InvalidDefinition { message: String },

    /// Value failed validation against its definition
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Backing store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A batch write stopped on a store failure after persisting `written`
    #[error("value batch stopped after {} writes: {source}", .written.len())]
    BatchInterrupted {
        written: Vec<ValueId>,
        source: StoreError,
    },

    /// Defaults file could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl FieldsError {
    /// Create a not found error
    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create an invalid definition error
    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    /// True when the caller can recover by re-fetching definitions and retrying
    pub fn is_stale_definition(&self) -> bool {
        matches!(self, Self::Inactive { .. } | Self::EntityTypeMismatch { .. })
    }
}

/// Category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationErrorKind {
    Required,
    TypeMismatch,
    OutOfRange,
    InvalidPattern,
    InvalidOption,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Required => "required",
            Self::TypeMismatch => "type mismatch",
            Self::OutOfRange => "out of range",
            Self::InvalidPattern => "invalid pattern",
            Self::InvalidOption => "invalid option",
        };
        f.write_str(s)
    }
}

/// A single validation failure, keyed to the field it concerns.
///
/// `message` is user-facing text and is what `Display` renders.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    pub field: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Errors reported by a `FieldStore` implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert collided with an existing primary key
    #[error("{collection} record already exists: {id}")]
    Conflict {
        collection: &'static str,
        id: String,
    },

    /// Replace targeted a record that does not exist
    #[error("{collection} record missing: {id}")]
    Missing {
        collection: &'static str,
        id: String,
    },

    /// Failure inside an external backend
    #[error("store backend error: {0}")]
    Backend(String),
}
