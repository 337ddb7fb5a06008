//! Field definition registry: CRUD over definitions per entity type.
//!
//! `(entity_type, name)` is unique. The duplicate check is a read followed by
//! a write, so uniqueness under concurrent creates relies on the backing
//! store's transaction isolation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::activity::{ActivityEvent, ActivitySink};
use crate::error::{FieldsError, Result};
use crate::store::FieldStore;
use crate::types::{
    CustomFieldDefinition, DefinitionId, EntityType, FieldOption, FieldType, FieldValidation,
};
use crate::validation::ValidationEngine;
use crate::value::Value;

/// Everything needed to create a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDefinition {
    pub entity_type: EntityType,
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub options: Option<Vec<FieldOption>>,
    #[serde(default)]
    pub validation: Option<FieldValidation>,
}

impl NewDefinition {
    pub fn new(
        entity_type: EntityType,
        name: impl Into<String>,
        label: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        Self {
            entity_type,
            name: name.into(),
            label: label.into(),
            field_type,
            description: None,
            placeholder: None,
            is_required: false,
            default_value: None,
            options: None,
            validation: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_options(mut self, options: Vec<FieldOption>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_validation(mut self, validation: FieldValidation) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// Partial update of a definition's mutable attributes.
///
/// `None` leaves an attribute unchanged; for optional attributes
/// `Some(None)` clears it. `name`, `entity_type` and `field_type` are not
/// part of the patch: changing them means deleting and recreating the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DefinitionPatch {
    pub label: Option<String>,
    pub description: Option<Option<String>>,
    pub placeholder: Option<Option<String>>,
    pub is_required: Option<bool>,
    pub options: Option<Option<Vec<FieldOption>>>,
    pub default_value: Option<Option<Value>>,
    pub validation: Option<Option<FieldValidation>>,
    pub is_active: Option<bool>,
}

impl DefinitionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_placeholder(mut self, placeholder: Option<String>) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.is_required = Some(required);
        self
    }

    pub fn with_options(mut self, options: Option<Vec<FieldOption>>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_default(mut self, value: Option<Value>) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_validation(mut self, validation: Option<FieldValidation>) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = Some(active);
        self
    }
}

/// Result of deleting a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDefinitionOutcome {
    pub deleted_values_count: usize,
}

/// A set of definitions to seed on startup.
///
/// A default is created only when no definition with the same
/// `(entity_type, name)` exists, so operator edits survive restarts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDefaults {
    fields: Vec<NewDefinition>,
}

impl FieldDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a default definition.
    pub fn field(mut self, def: NewDefinition) -> Self {
        self.fields.push(def);
        self
    }

    /// Parse a YAML list of definitions.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let fields: Vec<NewDefinition> = serde_yaml_ng::from_str(yaml)?;
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[NewDefinition] {
        &self.fields
    }
}

/// Create, update, reorder, delete and list field definitions.
#[derive(Clone)]
pub struct DefinitionRegistry {
    store: Arc<dyn FieldStore>,
    activity: Arc<dyn ActivitySink>,
    engine: Arc<ValidationEngine>,
}

impl DefinitionRegistry {
    pub fn new(
        store: Arc<dyn FieldStore>,
        activity: Arc<dyn ActivitySink>,
        engine: Arc<ValidationEngine>,
    ) -> Self {
        Self {
            store,
            activity,
            engine,
        }
    }

    /// Get a definition by id.
    pub async fn get(&self, id: &DefinitionId) -> Result<Option<CustomFieldDefinition>> {
        Ok(self.store.get_definition(id).await?)
    }

    /// Get a definition by id, failing with `NotFound` when it does not exist.
    pub async fn require(&self, id: &DefinitionId) -> Result<CustomFieldDefinition> {
        self.get(id)
            .await?
            .ok_or_else(|| FieldsError::not_found("field definition", id))
    }

    /// Get a definition by its unique name within an entity type.
    pub async fn get_by_name(
        &self,
        entity_type: EntityType,
        name: &str,
    ) -> Result<Option<CustomFieldDefinition>> {
        let defs = self.store.definitions_by_entity(entity_type).await?;
        Ok(defs.into_iter().find(|d| d.name == name))
    }

    /// All definitions (active and inactive) of an entity type, by ascending order.
    pub async fn list(&self, entity_type: EntityType) -> Result<Vec<CustomFieldDefinition>> {
        let mut defs = self.store.definitions_by_entity(entity_type).await?;
        defs.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(defs)
    }

    /// Active definitions only, by ascending order.
    pub async fn list_active(&self, entity_type: EntityType) -> Result<Vec<CustomFieldDefinition>> {
        let mut defs = self.list(entity_type).await?;
        defs.retain(|d| d.is_active);
        Ok(defs)
    }

    /// Create a definition, appending it after the highest existing order.
    ///
    /// Names are compared exactly; a name with leading or trailing whitespace
    /// is rejected rather than trimmed.
    pub async fn create(&self, new: NewDefinition) -> Result<DefinitionId> {
        let name = new.name;
        if name.trim().is_empty() {
            return Err(FieldsError::invalid_definition("field name cannot be empty"));
        }
        if name.trim() != name {
            return Err(FieldsError::invalid_definition(format!(
                "field name '{name}' has leading or trailing whitespace"
            )));
        }
        validate_options(&name, new.field_type, new.options.as_deref())?;

        let existing = self.store.definitions_by_entity(new.entity_type).await?;
        if existing.iter().any(|d| d.name == name) {
            return Err(FieldsError::DuplicateName {
                entity_type: new.entity_type,
                name,
            });
        }
        let order = existing
            .iter()
            .map(|d| d.order)
            .max()
            .map_or(0, |max| max + 1);

        let now = Utc::now();
        let label = if new.label.trim().is_empty() {
            name.clone()
        } else {
            new.label
        };
        let definition = CustomFieldDefinition {
            id: DefinitionId::new(),
            entity_type: new.entity_type,
            name,
            label,
            description: new.description,
            field_type: new.field_type,
            placeholder: new.placeholder,
            is_required: new.is_required,
            default_value: new.default_value,
            options: normalize_options(new.field_type, new.options),
            validation: new.validation,
            order,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.check_default(&definition)?;

        let id = definition.id;
        let event = ActivityEvent::DefinitionCreated {
            id,
            entity_type: definition.entity_type,
            name: definition.name.clone(),
            field_type: definition.field_type,
        };
        debug!(
            name = %definition.name,
            %id,
            order,
            "created custom field definition"
        );
        self.store.insert_definition(definition).await?;
        self.activity.record(event);
        Ok(id)
    }

    /// Apply a partial update to a definition's mutable attributes.
    pub async fn update(
        &self,
        id: &DefinitionId,
        patch: DefinitionPatch,
    ) -> Result<DefinitionId> {
        let mut def = self.require(id).await?;

        if let Some(label) = patch.label {
            def.label = label;
        }
        if let Some(description) = patch.description {
            def.description = description;
        }
        if let Some(placeholder) = patch.placeholder {
            def.placeholder = placeholder;
        }
        if let Some(required) = patch.is_required {
            def.is_required = required;
        }
        if let Some(options) = patch.options {
            validate_options(&def.name, def.field_type, options.as_deref())?;
            def.options = normalize_options(def.field_type, options);
        }
        if let Some(default_value) = patch.default_value {
            def.default_value = default_value;
        }
        if let Some(validation) = patch.validation {
            def.validation = validation;
        }
        if let Some(active) = patch.is_active {
            def.is_active = active;
        }
        self.check_default(&def)?;
        def.updated_at = Utc::now();

        let event = ActivityEvent::DefinitionUpdated {
            id: def.id,
            entity_type: def.entity_type,
            name: def.name.clone(),
        };
        debug!(
            name = %def.name,
            %id,
            active = def.is_active,
            "updated custom field definition"
        );
        self.store.replace_definition(def).await?;
        self.activity.record(event);
        Ok(*id)
    }

    /// Assign `order = index` to each listed definition.
    ///
    /// Definitions that are not listed keep their current order, which may
    /// now collide with a reassigned one. Unknown ids and ids of another
    /// entity type are skipped.
    pub async fn reorder(
        &self,
        entity_type: EntityType,
        ordered_ids: &[DefinitionId],
    ) -> Result<()> {
        let now = Utc::now();
        for (index, id) in ordered_ids.iter().enumerate() {
            let Some(mut def) = self.store.get_definition(id).await? else {
                warn!(%id, %entity_type, "skipping unknown definition in reorder");
                continue;
            };
            if def.entity_type != entity_type {
                warn!(
                    %id,
                    expected = %entity_type,
                    actual = %def.entity_type,
                    "skipping definition of another entity type in reorder"
                );
                continue;
            }
            let order = index as i64;
            if def.order != order {
                def.order = order;
                def.updated_at = now;
                self.store.replace_definition(def).await?;
            }
        }
        debug!(
            %entity_type,
            count = ordered_ids.len(),
            "reordered custom field definitions"
        );
        Ok(())
    }

    /// Delete a definition and every value stored under it.
    ///
    /// Values are removed first; an interrupted call leaves the definition in
    /// place with fewer values, and retrying finishes the job.
    pub async fn delete(&self, id: &DefinitionId) -> Result<DeleteDefinitionOutcome> {
        let def = self.require(id).await?;

        let mut deleted_values_count = 0;
        for value in self.store.values_by_definition(id).await? {
            if self.store.delete_value(&value.id).await? {
                deleted_values_count += 1;
            }
        }
        self.store.delete_definition(id).await?;

        self.activity.record(ActivityEvent::DefinitionDeleted {
            id: *id,
            entity_type: def.entity_type,
            name: def.name.clone(),
            deleted_values: deleted_values_count,
        });
        debug!(
            name = %def.name,
            %id,
            deleted_values_count,
            "deleted custom field definition"
        );
        Ok(DeleteDefinitionOutcome {
            deleted_values_count,
        })
    }

    /// Create every default whose `(entity_type, name)` does not exist yet.
    pub async fn seed(&self, defaults: &FieldDefaults) -> Result<Vec<DefinitionId>> {
        let mut created = Vec::new();
        for new in defaults.fields() {
            let existing = self.get_by_name(new.entity_type, &new.name).await?;
            if existing.is_some() {
                debug!(
                    name = %new.name,
                    entity_type = %new.entity_type,
                    "default field already present"
                );
                continue;
            }
            created.push(self.create(new.clone()).await?);
        }
        Ok(created)
    }

    fn check_default(&self, def: &CustomFieldDefinition) -> Result<()> {
        match &def.default_value {
            Some(value) if !value.is_empty() => {
                self.engine.validate(value, def)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn validate_options(
    name: &str,
    field_type: FieldType,
    options: Option<&[FieldOption]>,
) -> Result<()> {
    let Some(options) = options else {
        return Ok(());
    };
    if !field_type.supports_options() {
        if options.is_empty() {
            return Ok(());
        }
        return Err(FieldsError::OptionsNotAllowed {
            name: name.to_string(),
            field_type: field_type.to_string(),
        });
    }
    let mut seen = HashSet::new();
    for option in options {
        if !seen.insert(option.value.as_str()) {
            return Err(FieldsError::DuplicateOption {
                name: name.to_string(),
                value: option.value.clone(),
            });
        }
    }
    Ok(())
}

/// Options are stored only on select and multiselect definitions.
fn normalize_options(
    field_type: FieldType,
    options: Option<Vec<FieldOption>>,
) -> Option<Vec<FieldOption>> {
    if field_type.supports_options() {
        Some(options.unwrap_or_default())
    } else {
        None
    }
}
