//! Error types for smart list operations

use crm_fields::{FieldsError, StoreError};
use thiserror::Error;

/// Result type for smart list operations
pub type Result<T> = std::result::Result<T, SmartListError>;

#[derive(Debug, Error)]
pub enum SmartListError {
    /// Smart list id does not resolve
    #[error("smart list not found: {id}")]
    NotFound { id: String },

    /// Name is empty after trimming
    #[error("invalid smart list name: {message}")]
    InvalidName { message: String },

    /// Reading custom field values failed
    #[error(transparent)]
    Fields(#[from] FieldsError),

    /// Backing store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SmartListError {
    pub fn not_found(id: impl ToString) -> Self {
        Self::NotFound { id: id.to_string() }
    }
}
