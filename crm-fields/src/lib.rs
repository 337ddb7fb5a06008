//! Custom field definitions and values for CRM records
//!
//! `crm-fields` lets operators attach named, typed attributes to contacts,
//! companies and deals at runtime. It owns the definition registry, the
//! per-entity value store, the validation engine and display formatting.
//! Persistence is behind the [`FieldStore`] port; filtering and smart lists
//! live in `crm-filters` and `crm-smartlists`.
//!
//! # Architecture
//!
//! - **Registry**: definitions are unique per `(entity type, name)` and ordered per entity type
//! - **Values**: one value per `(definition, entity type, entity)`, upserted
//! - **Validation**: fail-fast checks with linear-time author patterns
//! - **Defaults**: `with_defaults()` seeds definitions that don't exist, preserves edits

pub mod activity;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod model;
pub mod registry;
pub mod store;
pub mod types;
pub mod validation;
pub mod value;
pub mod value_store;

pub use activity::{ActivityEvent, ActivitySink, RecordingActivitySink, TracingActivitySink};
pub use config::{ConfigError, DisplayConfig, FieldsConfig, ValidationConfig, ValuesConfig};
pub use context::{FieldsContext, FieldsContextBuilder};
pub use error::{FieldsError, Result, StoreError, StoreResult, ValidationError, ValidationErrorKind};
pub use format::{coerce_input, format_field_value, FieldFormatter};
pub use model::{default_value_for_type, is_value_shape_correct};
pub use registry::{
    DefinitionPatch, DefinitionRegistry, DeleteDefinitionOutcome, FieldDefaults, NewDefinition,
};
pub use store::{FieldStore, MemoryFieldStore};
pub use types::{
    custom_field_key, parse_custom_field_key, CustomFieldDefinition, CustomFieldValue,
    DefinitionId, EntityId, EntityType, FieldOption, FieldShape, FieldType, FieldValidation,
    ValueId, CUSTOM_FIELD_PREFIX,
};
pub use validation::ValidationEngine;
pub use value::{parse_date_millis, Value};
pub use value_store::{CustomFieldEntry, DeleteValueOutcome, FieldWithValue, ValueService};
