//! Storage port for definitions and values.
//!
//! The document store is an external collaborator. `FieldStore` names exactly
//! what this layer needs from it: keyed get/insert/replace/delete and the
//! three index scans `by_entity`, `by_definition` and `by_definition_entity`.
//! `MemoryFieldStore` is a complete in-process implementation used by tests
//! and embedders that keep fields in memory.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::types::{
    CustomFieldDefinition, CustomFieldValue, DefinitionId, EntityId, EntityType, ValueId,
};

/// Persistence operations consumed by the registry and value store.
#[async_trait]
pub trait FieldStore: Send + Sync {
    async fn get_definition(
        &self,
        id: &DefinitionId,
    ) -> StoreResult<Option<CustomFieldDefinition>>;

    /// Index scan: every definition of an entity type, in insertion order.
    async fn definitions_by_entity(
        &self,
        entity_type: EntityType,
    ) -> StoreResult<Vec<CustomFieldDefinition>>;

    async fn insert_definition(&self, definition: CustomFieldDefinition) -> StoreResult<()>;

    async fn replace_definition(&self, definition: CustomFieldDefinition) -> StoreResult<()>;

    /// Returns whether a record was removed.
    async fn delete_definition(&self, id: &DefinitionId) -> StoreResult<bool>;

    /// Index lookup on the unique `(definition, entity type, entity)` triple.
    async fn value_by_definition_entity(
        &self,
        definition_id: &DefinitionId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> StoreResult<Option<CustomFieldValue>>;

    /// Index scan: every value attached to one entity.
    async fn values_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> StoreResult<Vec<CustomFieldValue>>;

    /// Index scan: every value stored under one definition.
    async fn values_by_definition(
        &self,
        definition_id: &DefinitionId,
    ) -> StoreResult<Vec<CustomFieldValue>>;

    async fn insert_value(&self, value: CustomFieldValue) -> StoreResult<()>;

    async fn replace_value(&self, value: CustomFieldValue) -> StoreResult<()>;

    /// Returns whether a record was removed.
    async fn delete_value(&self, id: &ValueId) -> StoreResult<bool>;
}

type TripleKey = (DefinitionId, EntityType, EntityId);

#[derive(Default)]
struct Tables {
    definitions: IndexMap<DefinitionId, CustomFieldDefinition>,
    values: IndexMap<ValueId, CustomFieldValue>,
    by_definition_entity: HashMap<TripleKey, ValueId>,
}

/// In-memory `FieldStore`. Writers are serialized by a single lock.
#[derive(Default)]
pub struct MemoryFieldStore {
    tables: RwLock<Tables>,
}

impl MemoryFieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values, across all definitions.
    pub async fn value_count(&self) -> usize {
        self.tables.read().await.values.len()
    }
}

fn triple(value: &CustomFieldValue) -> TripleKey {
    (value.definition_id, value.entity_type, value.entity_id.clone())
}

#[async_trait]
impl FieldStore for MemoryFieldStore {
    async fn get_definition(
        &self,
        id: &DefinitionId,
    ) -> StoreResult<Option<CustomFieldDefinition>> {
        Ok(self.tables.read().await.definitions.get(id).cloned())
    }

    async fn definitions_by_entity(
        &self,
        entity_type: EntityType,
    ) -> StoreResult<Vec<CustomFieldDefinition>> {
        let tables = self.tables.read().await;
        Ok(tables
            .definitions
            .values()
            .filter(|d| d.entity_type == entity_type)
            .cloned()
            .collect())
    }

    async fn insert_definition(&self, definition: CustomFieldDefinition) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.definitions.contains_key(&definition.id) {
            return Err(StoreError::Conflict {
                collection: "definitions",
                id: definition.id.to_string(),
            });
        }
        tables.definitions.insert(definition.id, definition);
        Ok(())
    }

    async fn replace_definition(&self, definition: CustomFieldDefinition) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.definitions.get_mut(&definition.id) {
            Some(slot) => {
                *slot = definition;
                Ok(())
            }
            None => Err(StoreError::Missing {
                collection: "definitions",
                id: definition.id.to_string(),
            }),
        }
    }

    async fn delete_definition(&self, id: &DefinitionId) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.definitions.shift_remove(id).is_some())
    }

    async fn value_by_definition_entity(
        &self,
        definition_id: &DefinitionId,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> StoreResult<Option<CustomFieldValue>> {
        let tables = self.tables.read().await;
        let key = (*definition_id, entity_type, entity_id.clone());
        Ok(tables
            .by_definition_entity
            .get(&key)
            .and_then(|id| tables.values.get(id))
            .cloned())
    }

    async fn values_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> StoreResult<Vec<CustomFieldValue>> {
        let tables = self.tables.read().await;
        Ok(tables
            .values
            .values()
            .filter(|v| v.entity_type == entity_type && &v.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn values_by_definition(
        &self,
        definition_id: &DefinitionId,
    ) -> StoreResult<Vec<CustomFieldValue>> {
        let tables = self.tables.read().await;
        Ok(tables
            .values
            .values()
            .filter(|v| &v.definition_id == definition_id)
            .cloned()
            .collect())
    }

    async fn insert_value(&self, value: CustomFieldValue) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let key = triple(&value);
        let taken = tables.values.contains_key(&value.id)
            || tables.by_definition_entity.contains_key(&key);
        if taken {
            return Err(StoreError::Conflict {
                collection: "values",
                id: value.id.to_string(),
            });
        }
        tables.by_definition_entity.insert(key, value.id);
        tables.values.insert(value.id, value);
        Ok(())
    }

    async fn replace_value(&self, value: CustomFieldValue) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.values.get(&value.id) else {
            return Err(StoreError::Missing {
                collection: "values",
                id: value.id.to_string(),
            });
        };
        let old_key = triple(existing);
        let new_key = triple(&value);
        if old_key != new_key {
            tables.by_definition_entity.remove(&old_key);
            tables.by_definition_entity.insert(new_key, value.id);
        }
        tables.values.insert(value.id, value);
        Ok(())
    }

    async fn delete_value(&self, id: &ValueId) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.values.shift_remove(id) {
            Some(removed) => {
                tables.by_definition_entity.remove(&triple(&removed));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;
    use crate::value::Value;
    use chrono::Utc;

    fn definition(entity_type: EntityType, name: &str) -> CustomFieldDefinition {
        let now = Utc::now();
        CustomFieldDefinition {
            id: DefinitionId::new(),
            entity_type,
            name: name.into(),
            label: name.into(),
            description: None,
            field_type: FieldType::Text,
            placeholder: None,
            is_required: false,
            default_value: None,
            options: None,
            validation: None,
            order: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn value(def: &CustomFieldDefinition, entity: &str, v: Value) -> CustomFieldValue {
        let now = Utc::now();
        CustomFieldValue {
            id: ValueId::new(),
            definition_id: def.id,
            entity_type: def.entity_type,
            entity_id: entity.into(),
            value: v,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn definitions_scan_by_entity() {
        let store = MemoryFieldStore::new();
        for (entity_type, name) in [
            (EntityType::Deal, "a"),
            (EntityType::Contact, "b"),
            (EntityType::Deal, "c"),
        ] {
            let def = definition(entity_type, name);
            store.insert_definition(def).await.unwrap();
        }

        let names: Vec<_> = store
            .definitions_by_entity(EntityType::Deal)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let store = MemoryFieldStore::new();
        let def = definition(EntityType::Deal, "a");
        store.insert_definition(def.clone()).await.unwrap();
        let err = store.insert_definition(def).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn replace_missing_definition_fails() {
        let store = MemoryFieldStore::new();
        let err = store
            .replace_definition(definition(EntityType::Deal, "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { .. }));
    }

    #[tokio::test]
    async fn triple_index_tracks_values() {
        let store = MemoryFieldStore::new();
        let def = definition(EntityType::Deal, "a");
        store.insert_definition(def.clone()).await.unwrap();

        let v = value(&def, "deal_1", Value::from("x"));
        store.insert_value(v.clone()).await.unwrap();

        let found = store
            .value_by_definition_entity(&def.id, EntityType::Deal, &"deal_1".into())
            .await
            .unwrap();
        assert_eq!(found.map(|f| f.id), Some(v.id));

        // A second value for the same triple is rejected.
        let dup = value(&def, "deal_1", Value::from("y"));
        assert!(store.insert_value(dup).await.is_err());

        assert!(store.delete_value(&v.id).await.unwrap());
        assert!(!store.delete_value(&v.id).await.unwrap());
        assert!(store
            .value_by_definition_entity(&def.id, EntityType::Deal, &"deal_1".into())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn value_scans() {
        let store = MemoryFieldStore::new();
        let a = definition(EntityType::Deal, "a");
        let b = definition(EntityType::Deal, "b");
        for (def, entity, n) in [(&a, "deal_1", 1), (&b, "deal_1", 2), (&a, "deal_2", 3)] {
            let v = value(def, entity, Value::from(n));
            store.insert_value(v).await.unwrap();
        }

        let entity = store
            .values_by_entity(EntityType::Deal, &"deal_1".into())
            .await
            .unwrap();
        assert_eq!(entity.len(), 2);
        assert_eq!(store.values_by_definition(&a.id).await.unwrap().len(), 2);
        assert_eq!(store.value_count().await, 3);
    }
}
