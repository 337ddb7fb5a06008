//! Ports for smart list persistence and entity scans.
//!
//! Smart lists live in the same external document store as field
//! definitions; `SmartListStore` is the slice of it this crate needs.
//! `EntitySource` is the external entity collection that refreshes scan.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_fields::{EntityId, EntityType, StoreError, StoreResult};
use crm_filters::Record;
use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::types::{SmartList, SmartListId};

/// Persistence operations for smart lists.
#[async_trait]
pub trait SmartListStore: Send + Sync {
    async fn get(&self, id: &SmartListId) -> StoreResult<Option<SmartList>>;

    /// Index scan: every smart list of an entity type.
    async fn list_by_entity(&self, entity_type: EntityType) -> StoreResult<Vec<SmartList>>;

    async fn insert(&self, list: SmartList) -> StoreResult<()>;

    async fn replace(&self, list: SmartList) -> StoreResult<()>;

    /// Write only `cached_count` and `last_refreshed_at`, leaving every other
    /// attribute as currently stored.
    async fn patch_count(
        &self,
        id: &SmartListId,
        cached_count: u64,
        last_refreshed_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &SmartListId) -> StoreResult<bool>;
}

/// One entity as the filter engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub id: EntityId,
    /// Built-in attributes; custom fields are merged in at evaluation time.
    pub record: Record,
}

/// Full scan over the external entity collection.
#[async_trait]
pub trait EntitySource: Send + Sync {
    async fn scan(&self, entity_type: EntityType) -> StoreResult<Vec<EntitySnapshot>>;
}

/// In-memory `SmartListStore`.
#[derive(Default)]
pub struct MemorySmartListStore {
    lists: RwLock<IndexMap<SmartListId, SmartList>>,
}

impl MemorySmartListStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SmartListStore for MemorySmartListStore {
    async fn get(&self, id: &SmartListId) -> StoreResult<Option<SmartList>> {
        Ok(self.lists.read().await.get(id).cloned())
    }

    async fn list_by_entity(&self, entity_type: EntityType) -> StoreResult<Vec<SmartList>> {
        Ok(self
            .lists
            .read()
            .await
            .values()
            .filter(|l| l.entity_type == entity_type)
            .cloned()
            .collect())
    }

    async fn insert(&self, list: SmartList) -> StoreResult<()> {
        let mut lists = self.lists.write().await;
        if lists.contains_key(&list.id) {
            return Err(StoreError::Conflict {
                collection: "smart_lists",
                id: list.id.to_string(),
            });
        }
        lists.insert(list.id, list);
        Ok(())
    }

    async fn replace(&self, list: SmartList) -> StoreResult<()> {
        let mut lists = self.lists.write().await;
        match lists.get_mut(&list.id) {
            Some(slot) => {
                *slot = list;
                Ok(())
            }
            None => Err(StoreError::Missing {
                collection: "smart_lists",
                id: list.id.to_string(),
            }),
        }
    }

    async fn patch_count(
        &self,
        id: &SmartListId,
        cached_count: u64,
        last_refreshed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut lists = self.lists.write().await;
        let Some(list) = lists.get_mut(id) else {
            return Err(StoreError::Missing {
                collection: "smart_lists",
                id: id.to_string(),
            });
        };
        list.cached_count = cached_count;
        list.last_refreshed_at = Some(last_refreshed_at);
        Ok(())
    }

    async fn delete(&self, id: &SmartListId) -> StoreResult<bool> {
        Ok(self.lists.write().await.shift_remove(id).is_some())
    }
}

/// In-memory `EntitySource`, keyed by entity type then id.
#[derive(Default)]
pub struct MemoryEntitySource {
    entities: RwLock<HashMap<EntityType, IndexMap<EntityId, Record>>>,
}

impl MemoryEntitySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity's built-in attributes.
    pub async fn upsert(&self, entity_type: EntityType, id: impl Into<EntityId>, record: Record) {
        self.entities
            .write()
            .await
            .entry(entity_type)
            .or_default()
            .insert(id.into(), record);
    }

    pub async fn remove(&self, entity_type: EntityType, id: &EntityId) -> bool {
        self.entities
            .write()
            .await
            .get_mut(&entity_type)
            .is_some_and(|m| m.shift_remove(id).is_some())
    }
}

#[async_trait]
impl EntitySource for MemoryEntitySource {
    async fn scan(&self, entity_type: EntityType) -> StoreResult<Vec<EntitySnapshot>> {
        let entities = self.entities.read().await;
        Ok(entities
            .get(&entity_type)
            .map(|m| {
                m.iter()
                    .map(|(id, record)| EntitySnapshot {
                        id: id.clone(),
                        record: record.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
