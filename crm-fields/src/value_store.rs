//! Per-entity custom field values.
//!
//! At most one value exists per `(definition, entity type, entity)`. Writes
//! go through [`ValueService::set`], which upserts on that triple.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FieldsError, Result};
use crate::store::FieldStore;
use crate::types::{
    CustomFieldDefinition, CustomFieldValue, DefinitionId, EntityId, EntityType, FieldShape,
    ValueId,
};
use crate::validation::ValidationEngine;
use crate::value::Value;

/// One active definition paired with the entity's stored value, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldWithValue {
    pub definition: CustomFieldDefinition,
    pub value: Option<Value>,
}

/// Result of deleting a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteValueOutcome {
    pub found: bool,
}

/// A custom field as it appears in a filterable record.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFieldEntry {
    /// `customField:<definition id>`
    pub key: String,
    pub shape: FieldShape,
    pub value: Value,
}

/// Reads and writes values for entities.
#[derive(Clone)]
pub struct ValueService {
    store: Arc<dyn FieldStore>,
    engine: Arc<ValidationEngine>,
    enforce_validation: bool,
}

impl ValueService {
    pub fn new(store: Arc<dyn FieldStore>, engine: Arc<ValidationEngine>) -> Self {
        Self {
            store,
            engine,
            enforce_validation: false,
        }
    }

    /// Validate every write against its definition before storing it.
    pub fn with_enforced_validation(mut self, enforce: bool) -> Self {
        self.enforce_validation = enforce;
        self
    }

    /// The stored value for one definition and entity.
    pub async fn get(
        &self,
        definition_id: &DefinitionId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CustomFieldValue>> {
        Ok(self
            .store
            .value_by_definition_entity(definition_id, entity_type, entity_id)
            .await?)
    }

    /// Every active definition of the entity type, by ascending order, with
    /// the entity's value or `None` when unset.
    pub async fn get_all(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<Vec<FieldWithValue>> {
        let mut definitions = self.store.definitions_by_entity(entity_type).await?;
        definitions.retain(|d| d.is_active);
        definitions.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let values = self.store.values_by_entity(entity_type, entity_id).await?;
        Ok(attach_values(definitions, values))
    }

    /// Upsert the value for `(definition, entity type, entity)`.
    ///
    /// The definition must exist, be active and belong to `entity_type`.
    /// Replacing an existing value keeps its id and `created_at`.
    pub async fn set(
        &self,
        definition_id: &DefinitionId,
        entity_type: EntityType,
        entity_id: &EntityId,
        value: Value,
    ) -> Result<ValueId> {
        let definition = self
            .store
            .get_definition(definition_id)
            .await?
            .ok_or_else(|| FieldsError::not_found("field definition", definition_id))?;
        self.write(&definition, entity_type, entity_id, value).await
    }

    /// Set several values for one entity.
    ///
    /// Entries whose definition is unknown, inactive or belongs to another
    /// entity type are skipped, as are values rejected by enforced validation.
    /// Returns the ids that were written.
    ///
    /// The batch is not atomic. A store failure stops it with
    /// [`FieldsError::BatchInterrupted`], which carries the ids already
    /// persisted; re-running the batch is safe because writes upsert.
    pub async fn set_many(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
        values: impl IntoIterator<Item = (DefinitionId, Value)>,
    ) -> Result<Vec<ValueId>> {
        let mut written = Vec::new();
        for (definition_id, value) in values {
            let definition = match self.store.get_definition(&definition_id).await {
                Ok(Some(definition)) => definition,
                Ok(None) => {
                    debug!(%definition_id, %entity_id, "skipping value for unknown definition");
                    continue;
                }
                Err(source) => return Err(FieldsError::BatchInterrupted { written, source }),
            };
            if !definition.is_active || definition.entity_type != entity_type {
                debug!(
                    %definition_id,
                    %entity_id,
                    active = definition.is_active,
                    "skipping value for unusable definition"
                );
                continue;
            }
            match self.write(&definition, entity_type, entity_id, value).await {
                Ok(id) => written.push(id),
                Err(FieldsError::Validation(error)) => {
                    debug!(%definition_id, %entity_id, %error, "skipping invalid value");
                }
                Err(FieldsError::Store(source)) => {
                    warn!(
                        %definition_id,
                        %entity_id,
                        written = written.len(),
                        "value batch interrupted"
                    );
                    return Err(FieldsError::BatchInterrupted { written, source });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    /// Delete the value for one definition and entity. Absence is not an error.
    pub async fn delete(
        &self,
        definition_id: &DefinitionId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<DeleteValueOutcome> {
        let found = match self
            .store
            .value_by_definition_entity(definition_id, entity_type, entity_id)
            .await?
        {
            Some(existing) => self.store.delete_value(&existing.id).await?,
            None => false,
        };
        Ok(DeleteValueOutcome { found })
    }

    /// Delete every value attached to an entity, e.g. when the entity itself is deleted.
    pub async fn delete_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<usize> {
        let mut deleted = 0;
        for value in self.store.values_by_entity(entity_type, entity_id).await? {
            if self.store.delete_value(&value.id).await? {
                deleted += 1;
            }
        }
        debug!(%entity_type, %entity_id, deleted, "deleted custom field values for entity");
        Ok(deleted)
    }

    /// Every definition of the entity type with the entity's value, keyed
    /// for filter evaluation. Unset fields carry `Null`.
    ///
    /// Inactive definitions are included: deactivation hides a field from
    /// input but its stored values stay filterable.
    pub async fn record_for(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<Vec<CustomFieldEntry>> {
        let definitions = self.store.definitions_by_entity(entity_type).await?;
        let values = self.store.values_by_entity(entity_type, entity_id).await?;
        Ok(attach_values(definitions, values)
            .into_iter()
            .map(|f| CustomFieldEntry {
                key: f.definition.filter_key(),
                shape: f.definition.field_type.shape(),
                value: f.value.unwrap_or_default(),
            })
            .collect())
    }

    async fn write(
        &self,
        definition: &CustomFieldDefinition,
        entity_type: EntityType,
        entity_id: &EntityId,
        value: Value,
    ) -> Result<ValueId> {
        if !definition.is_active {
            return Err(FieldsError::Inactive {
                name: definition.name.clone(),
            });
        }
        if definition.entity_type != entity_type {
            return Err(FieldsError::EntityTypeMismatch {
                name: definition.name.clone(),
                expected: definition.entity_type,
                actual: entity_type,
            });
        }
        if self.enforce_validation {
            self.engine.validate(&value, definition)?;
        }

        let now = Utc::now();
        let existing = self
            .store
            .value_by_definition_entity(&definition.id, entity_type, entity_id)
            .await?;
        match existing {
            Some(mut stored) => {
                let id = stored.id;
                stored.value = value;
                stored.updated_at = now;
                self.store.replace_value(stored).await?;
                debug!(name = %definition.name, %entity_id, %id, "updated custom field value");
                Ok(id)
            }
            None => {
                let stored = CustomFieldValue {
                    id: ValueId::new(),
                    definition_id: definition.id,
                    entity_type,
                    entity_id: entity_id.clone(),
                    value,
                    created_at: now,
                    updated_at: now,
                };
                let id = stored.id;
                self.store.insert_value(stored).await?;
                debug!(name = %definition.name, %entity_id, %id, "created custom field value");
                Ok(id)
            }
        }
    }
}

/// Pair each definition with its value from `values`, keeping definition order.
fn attach_values(
    definitions: Vec<CustomFieldDefinition>,
    mut values: Vec<CustomFieldValue>,
) -> Vec<FieldWithValue> {
    definitions
        .into_iter()
        .map(|definition| {
            let value = values
                .iter()
                .position(|v| v.definition_id == definition.id)
                .map(|i| values.swap_remove(i).value);
            FieldWithValue { definition, value }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::activity::TracingActivitySink;
    use crate::error::{StoreError, StoreResult, ValidationErrorKind};
    use crate::registry::{DefinitionPatch, DefinitionRegistry, NewDefinition};
    use crate::store::MemoryFieldStore;
    use crate::types::{FieldType, FieldValidation};

    struct Fixture {
        registry: DefinitionRegistry,
        values: ValueService,
        store: Arc<MemoryFieldStore>,
    }

    impl Fixture {
        async fn put(&self, def: &DefinitionId, deal: &str, value: Value) -> ValueId {
            let deal = EntityId::new(deal);
            self.values
                .set(def, EntityType::Deal, &deal, value)
                .await
                .unwrap()
        }

        async fn read(&self, def: &DefinitionId, deal: &str) -> Option<CustomFieldValue> {
            let deal = EntityId::new(deal);
            self.values.get(def, EntityType::Deal, &deal).await.unwrap()
        }

        async fn deactivate(&self, def: &DefinitionId) {
            let patch = DefinitionPatch::new().with_active(false);
            self.registry.update(def, patch).await.unwrap();
        }
    }

    fn fixture(enforce: bool) -> Fixture {
        let store = Arc::new(MemoryFieldStore::new());
        let engine = Arc::new(ValidationEngine::default());
        let registry = DefinitionRegistry::new(
            store.clone(),
            Arc::new(TracingActivitySink),
            engine.clone(),
        );
        let values = ValueService::new(store.clone(), engine)
            .with_enforced_validation(enforce);
        Fixture {
            registry,
            values,
            store,
        }
    }

    async fn number_field(registry: &DefinitionRegistry, name: &str) -> DefinitionId {
        let new = NewDefinition::new(EntityType::Deal, name, name, FieldType::Number)
            .with_validation(FieldValidation::default().min(0.0));
        registry.create(new).await.unwrap()
    }

    /// Memory store whose value inserts start failing after a fixed number.
    struct FailingInserts {
        inner: MemoryFieldStore,
        inserts_left: AtomicUsize,
    }

    #[async_trait]
    impl FieldStore for FailingInserts {
        async fn get_definition(
            &self,
            id: &DefinitionId,
        ) -> StoreResult<Option<CustomFieldDefinition>> {
            self.inner.get_definition(id).await
        }

        async fn definitions_by_entity(
            &self,
            entity_type: EntityType,
        ) -> StoreResult<Vec<CustomFieldDefinition>> {
            self.inner.definitions_by_entity(entity_type).await
        }

        async fn insert_definition(&self, definition: CustomFieldDefinition) -> StoreResult<()> {
            self.inner.insert_definition(definition).await
        }

        async fn replace_definition(&self, definition: CustomFieldDefinition) -> StoreResult<()> {
            self.inner.replace_definition(definition).await
        }

        async fn delete_definition(&self, id: &DefinitionId) -> StoreResult<bool> {
            self.inner.delete_definition(id).await
        }

        async fn value_by_definition_entity(
            &self,
            definition_id: &DefinitionId,
            entity_type: EntityType,
            entity_id: &EntityId,
        ) -> StoreResult<Option<CustomFieldValue>> {
            self.inner
                .value_by_definition_entity(definition_id, entity_type, entity_id)
                .await
        }

        async fn values_by_entity(
            &self,
            entity_type: EntityType,
            entity_id: &EntityId,
        ) -> StoreResult<Vec<CustomFieldValue>> {
            self.inner.values_by_entity(entity_type, entity_id).await
        }

        async fn values_by_definition(
            &self,
            definition_id: &DefinitionId,
        ) -> StoreResult<Vec<CustomFieldValue>> {
            self.inner.values_by_definition(definition_id).await
        }

        async fn insert_value(&self, value: CustomFieldValue) -> StoreResult<()> {
            let left = self.inserts_left.load(Ordering::SeqCst);
            if left == 0 {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.inserts_left.store(left - 1, Ordering::SeqCst);
            self.inner.insert_value(value).await
        }

        async fn replace_value(&self, value: CustomFieldValue) -> StoreResult<()> {
            self.inner.replace_value(value).await
        }

        async fn delete_value(&self, id: &ValueId) -> StoreResult<bool> {
            self.inner.delete_value(id).await
        }
    }

    #[tokio::test]
    async fn set_upserts_on_the_triple() {
        let f = fixture(false);
        let def = number_field(&f.registry, "size").await;

        let first = f.put(&def, "deal_1", Value::from(1)).await;
        let created = f.read(&def, "deal_1").await.unwrap();
        let second = f.put(&def, "deal_1", Value::from(2)).await;

        assert_eq!(first, second);
        assert_eq!(f.store.value_count().await, 1);
        let stored = f.read(&def, "deal_1").await.unwrap();
        assert_eq!(stored.value, Value::from(2));
        assert_eq!(stored.created_at, created.created_at);
        assert!(stored.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn set_rejects_unusable_definitions() {
        let f = fixture(false);
        let def = number_field(&f.registry, "size").await;
        let deal: EntityId = "deal_1".into();

        let err = f
            .values
            .set(&DefinitionId::new(), EntityType::Deal, &deal, Value::from(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FieldsError::NotFound { .. }));

        let err = f
            .values
            .set(&def, EntityType::Contact, &deal, Value::from(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FieldsError::EntityTypeMismatch { .. }));
        assert!(err.is_stale_definition());

        f.deactivate(&def).await;
        let err = f
            .values
            .set(&def, EntityType::Deal, &deal, Value::from(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FieldsError::Inactive { .. }));
        assert_eq!(f.store.value_count().await, 0);
    }

    #[tokio::test]
    async fn unvalidated_by_default() {
        let f = fixture(false);
        let def = number_field(&f.registry, "size").await;
        f.put(&def, "deal_1", Value::from(-5)).await;
        assert_eq!(f.store.value_count().await, 1);
    }

    #[tokio::test]
    async fn enforced_validation_blocks_writes() {
        let f = fixture(true);
        let def = number_field(&f.registry, "size").await;
        let err = f
            .values
            .set(&def, EntityType::Deal, &"deal_1".into(), Value::from(-5))
            .await
            .unwrap_err();
        match err {
            FieldsError::Validation(e) => assert_eq!(e.kind, ValidationErrorKind::OutOfRange),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.store.value_count().await, 0);
    }

    #[tokio::test]
    async fn set_many_skips_silently() {
        let f = fixture(false);
        let size = number_field(&f.registry, "size").await;
        let retired = number_field(&f.registry, "retired").await;
        f.deactivate(&retired).await;
        let nick = NewDefinition::new(EntityType::Contact, "nick", "Nick", FieldType::Text);
        let contact_field = f.registry.create(nick).await.unwrap();

        let written = f
            .values
            .set_many(
                EntityType::Deal,
                &"deal_1".into(),
                [
                    (size, Value::from(10)),
                    (retired, Value::from(1)),
                    (contact_field, Value::from("x")),
                    (DefinitionId::new(), Value::from(2)),
                ],
            )
            .await
            .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(f.store.value_count().await, 1);
    }

    #[tokio::test]
    async fn set_many_reports_writes_made_before_a_store_failure() {
        let store = Arc::new(FailingInserts {
            inner: MemoryFieldStore::new(),
            inserts_left: AtomicUsize::new(1),
        });
        let engine = Arc::new(ValidationEngine::default());
        let registry = DefinitionRegistry::new(
            store.clone(),
            Arc::new(TracingActivitySink),
            engine.clone(),
        );
        let values = ValueService::new(store.clone(), engine);
        let size = number_field(&registry, "size").await;
        let tier = number_field(&registry, "tier").await;
        let score = number_field(&registry, "score").await;
        let deal: EntityId = "deal_1".into();

        let batch = [
            (size, Value::from(1)),
            (tier, Value::from(2)),
            (score, Value::from(3)),
        ];
        let err = values
            .set_many(EntityType::Deal, &deal, batch)
            .await
            .unwrap_err();

        let FieldsError::BatchInterrupted { written, source } = err else {
            panic!("expected an interrupted batch, got {err}");
        };
        assert!(matches!(source, StoreError::Backend(_)));
        let stored = values.get(&size, EntityType::Deal, &deal).await.unwrap();
        assert_eq!(written, vec![stored.unwrap().id]);
        let skipped = values.get(&tier, EntityType::Deal, &deal).await.unwrap();
        assert!(skipped.is_none());
    }

    #[tokio::test]
    async fn get_all_lists_active_definitions_in_order() {
        let f = fixture(false);
        let a = number_field(&f.registry, "a").await;
        let b = number_field(&f.registry, "b").await;
        let c = number_field(&f.registry, "c").await;
        f.deactivate(&b).await;
        f.registry.reorder(EntityType::Deal, &[c, a]).await.unwrap();

        let deal: EntityId = "deal_1".into();
        f.put(&a, "deal_1", Value::from(3)).await;

        let all = f.values.get_all(EntityType::Deal, &deal).await.unwrap();
        let ids: Vec<_> = all.iter().map(|fv| fv.definition.id).collect();
        assert_eq!(ids, vec![c, a]);
        assert_eq!(all[0].value, None);
        assert_eq!(all[1].value, Some(Value::from(3)));
    }

    #[tokio::test]
    async fn delete_reports_absence() {
        let f = fixture(false);
        let def = number_field(&f.registry, "size").await;
        let deal: EntityId = "deal_1".into();
        f.put(&def, "deal_1", Value::from(3)).await;

        for expected in [true, false] {
            let outcome = f
                .values
                .delete(&def, EntityType::Deal, &deal)
                .await
                .unwrap();
            assert_eq!(outcome.found, expected);
        }
    }

    #[tokio::test]
    async fn delete_for_entity_leaves_other_entities() {
        let f = fixture(false);
        let a = number_field(&f.registry, "a").await;
        let b = number_field(&f.registry, "b").await;
        for (def, deal) in [(a, "deal_1"), (b, "deal_1"), (a, "deal_2")] {
            f.put(&def, deal, Value::from(1)).await;
        }
        let deal: EntityId = "deal_1".into();
        let deleted = f
            .values
            .delete_for_entity(EntityType::Deal, &deal)
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(f.store.value_count().await, 1);
    }

    #[tokio::test]
    async fn record_entries_use_custom_field_keys() {
        let f = fixture(false);
        let def = number_field(&f.registry, "size").await;
        let unset = number_field(&f.registry, "unset").await;
        let deal: EntityId = "deal_1".into();
        f.put(&def, "deal_1", Value::from(7)).await;

        let entries = f.values.record_for(EntityType::Deal, &deal).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, format!("customField:{def}"));
        assert_eq!(entries[0].shape, FieldShape::Number);
        assert_eq!(entries[0].value, Value::from(7));
        assert_eq!(entries[1].key, format!("customField:{unset}"));
        assert_eq!(entries[1].value, Value::Null);
    }

    #[tokio::test]
    async fn record_keeps_values_of_deactivated_fields() {
        let f = fixture(false);
        let def = number_field(&f.registry, "size").await;
        let deal: EntityId = "deal_1".into();
        f.put(&def, "deal_1", Value::from(7)).await;
        f.deactivate(&def).await;

        let all = f.values.get_all(EntityType::Deal, &deal).await.unwrap();
        assert!(all.is_empty());
        let entries = f.values.record_for(EntityType::Deal, &deal).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, format!("customField:{def}"));
        assert_eq!(entries[0].value, Value::from(7));
    }
}
