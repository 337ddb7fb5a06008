//! Smart list CRUD and count refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crm_fields::{EntityId, EntityType, StoreError, ValueService, CUSTOM_FIELD_PREFIX};
use crm_filters::{evaluate_at, Filter};
use tracing::{debug, info};

use crate::error::{Result, SmartListError};
use crate::store::{EntitySource, SmartListStore};
use crate::types::{NewSmartList, RefreshOutcome, SmartList, SmartListId, SmartListPatch};

/// Saves smart lists and evaluates them against the entity collection.
#[derive(Clone)]
pub struct SmartListService {
    lists: Arc<dyn SmartListStore>,
    entities: Arc<dyn EntitySource>,
    custom_fields: Option<Arc<ValueService>>,
}

impl SmartListService {
    pub fn new(lists: Arc<dyn SmartListStore>, entities: Arc<dyn EntitySource>) -> Self {
        Self {
            lists,
            entities,
            custom_fields: None,
        }
    }

    /// Resolve `customField:<id>` rows through `values`.
    ///
    /// Without it, rows on custom fields see an unknown field and never match.
    pub fn with_custom_fields(mut self, values: Arc<ValueService>) -> Self {
        self.custom_fields = Some(values);
        self
    }

    pub async fn get(&self, id: &SmartListId) -> Result<Option<SmartList>> {
        Ok(self.lists.get(id).await?)
    }

    pub async fn require(&self, id: &SmartListId) -> Result<SmartList> {
        self.get(id)
            .await?
            .ok_or_else(|| SmartListError::not_found(id))
    }

    /// Smart lists of an entity type, by name.
    pub async fn list(&self, entity_type: EntityType) -> Result<Vec<SmartList>> {
        let mut lists = self.lists.list_by_entity(entity_type).await?;
        lists.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(lists)
    }

    /// Save a new list. Its count starts at zero until the first refresh.
    pub async fn create(&self, new: NewSmartList) -> Result<SmartListId> {
        let name = valid_name(&new.name)?;
        let now = Utc::now();
        let list = SmartList {
            id: SmartListId::new(),
            entity_type: new.entity_type,
            name,
            description: new.description,
            filters: new.filters,
            cached_count: 0,
            last_refreshed_at: None,
            created_at: now,
            updated_at: now,
        };
        let id = list.id;
        debug!(
            %id,
            name = %list.name,
            entity_type = %list.entity_type,
            filters = list.filters.len(),
            "created smart list"
        );
        self.lists.insert(list).await?;
        Ok(id)
    }

    /// Apply a partial update. Changing filters leaves the cached count stale
    /// until the next refresh.
    pub async fn update(&self, id: &SmartListId, patch: SmartListPatch) -> Result<SmartListId> {
        let mut list = self.require(id).await?;
        if let Some(name) = patch.name {
            list.name = valid_name(&name)?;
        }
        if let Some(description) = patch.description {
            list.description = description;
        }
        if let Some(filters) = patch.filters {
            list.filters = filters;
        }
        list.updated_at = Utc::now();
        debug!(%id, name = %list.name, "updated smart list");
        self.lists.replace(list).await?;
        Ok(*id)
    }

    pub async fn delete(&self, id: &SmartListId) -> Result<()> {
        if !self.lists.delete(id).await? {
            return Err(SmartListError::not_found(id));
        }
        debug!(%id, "deleted smart list");
        Ok(())
    }

    /// Ids of every entity the list currently matches. Nothing is persisted.
    pub async fn matching_ids(&self, id: &SmartListId) -> Result<Vec<EntityId>> {
        let list = self.require(id).await?;
        self.scan(&list, Utc::now()).await
    }

    /// Re-run the list over the full collection and store the match count.
    ///
    /// Only `cached_count` and `last_refreshed_at` are written back, so edits
    /// saved while the scan runs are kept. A list deleted mid-scan is
    /// `NotFound`.
    pub async fn refresh_count(&self, id: &SmartListId) -> Result<RefreshOutcome> {
        let list = self.require(id).await?;
        let now = Utc::now();
        let cached_count = self.scan(&list, now).await?.len() as u64;

        match self.lists.patch_count(id, cached_count, now).await {
            Ok(()) => {}
            Err(StoreError::Missing { .. }) => return Err(SmartListError::not_found(id)),
            Err(e) => return Err(e.into()),
        }
        info!(%id, name = %list.name, cached_count, "refreshed smart list count");
        Ok(RefreshOutcome { cached_count })
    }

    async fn scan(&self, list: &SmartList, now: DateTime<Utc>) -> Result<Vec<EntityId>> {
        let snapshots = self.entities.scan(list.entity_type).await?;
        let custom_fields = self
            .custom_fields
            .as_ref()
            .filter(|_| references_custom_fields(&list.filters));

        let mut matched = Vec::new();
        for snapshot in snapshots {
            let mut record = snapshot.record;
            if let Some(values) = custom_fields {
                record.extend(values.record_for(list.entity_type, &snapshot.id).await?);
            }
            if evaluate_at(&list.filters, &record, now) {
                matched.push(snapshot.id);
            }
        }
        debug!(id = %list.id, matched = matched.len(), "scanned entities for smart list");
        Ok(matched)
    }
}

fn valid_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SmartListError::InvalidName {
            message: "name cannot be empty".into(),
        });
    }
    Ok(trimmed.to_string())
}

fn references_custom_fields(filters: &[Filter]) -> bool {
    filters
        .iter()
        .any(|f| f.field.starts_with(CUSTOM_FIELD_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntitySnapshot, MemoryEntitySource, MemorySmartListStore};
    use async_trait::async_trait;
    use crm_fields::{custom_field_key, DefinitionId, StoreResult, Value};
    use crm_filters::{FilterOperator, Record};
    use tokio::sync::OnceCell;
    use tracing_test::traced_test;

    fn deal(status: &str, amount: f64) -> Record {
        Record::new()
            .with_text("status", status)
            .with_number("amount", amount)
    }

    async fn seed_deals(entities: &MemoryEntitySource) {
        let deals = [
            ("d1", "open", 15000.0),
            ("d2", "open", 5000.0),
            ("d3", "won", 20000.0),
        ];
        for (id, status, amount) in deals {
            entities
                .upsert(EntityType::Deal, id, deal(status, amount))
                .await;
        }
    }

    async fn service() -> (SmartListService, Arc<MemoryEntitySource>) {
        let entities = Arc::new(MemoryEntitySource::new());
        seed_deals(&entities).await;
        let lists = Arc::new(MemorySmartListStore::new());
        let service = SmartListService::new(lists, entities.clone());
        (service, entities)
    }

    fn status_is(status: &str) -> Filter {
        Filter::new("status", FilterOperator::Equals, Value::from(status))
    }

    fn big_open() -> NewSmartList {
        NewSmartList::new(EntityType::Deal, "Big open deals")
            .with_filter(status_is("open"))
            .with_filter(Filter::new("amount", FilterOperator::GreaterThan, Value::from(10000)))
    }

    /// Entity source that saves an edit to a smart list while it is scanned.
    struct EditingSource {
        inner: MemoryEntitySource,
        service: OnceCell<SmartListService>,
        target: OnceCell<SmartListId>,
    }

    #[async_trait]
    impl EntitySource for EditingSource {
        async fn scan(&self, entity_type: EntityType) -> StoreResult<Vec<EntitySnapshot>> {
            if let (Some(service), Some(id)) = (self.service.get(), self.target.get()) {
                let patch = SmartListPatch::new()
                    .with_name("Won deals")
                    .with_filters(vec![status_is("won")]);
                service
                    .update(id, patch)
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
            self.inner.scan(entity_type).await
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn refresh_persists_count() {
        let (service, _) = service().await;
        let id = service.create(big_open()).await.unwrap();
        assert_eq!(service.require(&id).await.unwrap().cached_count, 0);

        let outcome = service.refresh_count(&id).await.unwrap();
        assert_eq!(outcome.cached_count, 1);

        let list = service.require(&id).await.unwrap();
        assert_eq!(list.cached_count, 1);
        assert!(list.last_refreshed_at.is_some());
        assert!(logs_contain("refreshed smart list count"));
    }

    #[tokio::test]
    async fn refresh_keeps_edits_saved_during_the_scan() {
        let source = Arc::new(EditingSource {
            inner: MemoryEntitySource::new(),
            service: OnceCell::new(),
            target: OnceCell::new(),
        });
        seed_deals(&source.inner).await;
        let lists = Arc::new(MemorySmartListStore::new());
        let service = SmartListService::new(lists, source.clone());
        let id = service.create(big_open()).await.unwrap();
        assert!(source.service.set(service.clone()).is_ok());
        assert!(source.target.set(id).is_ok());

        // Counted with the filters loaded before the edit landed.
        let outcome = service.refresh_count(&id).await.unwrap();
        assert_eq!(outcome.cached_count, 1);

        let list = service.require(&id).await.unwrap();
        assert_eq!(list.name, "Won deals");
        assert_eq!(list.filters, vec![status_is("won")]);
        assert_eq!(list.cached_count, 1);
        assert!(list.last_refreshed_at.is_some());
    }

    #[tokio::test]
    async fn count_is_stale_until_refreshed() {
        let (service, entities) = service().await;
        let id = service.create(big_open()).await.unwrap();
        service.refresh_count(&id).await.unwrap();

        entities
            .upsert(EntityType::Deal, "d4", deal("open", 99000.0))
            .await;
        assert_eq!(service.require(&id).await.unwrap().cached_count, 1);
        assert_eq!(service.refresh_count(&id).await.unwrap().cached_count, 2);
    }

    #[tokio::test]
    async fn empty_filters_count_everything() {
        let (service, _) = service().await;
        let all_deals = NewSmartList::new(EntityType::Deal, "All deals");
        let id = service.create(all_deals).await.unwrap();
        assert_eq!(service.refresh_count(&id).await.unwrap().cached_count, 3);

        let all_contacts = NewSmartList::new(EntityType::Contact, "All contacts");
        let contacts = service.create(all_contacts).await.unwrap();
        let outcome = service.refresh_count(&contacts).await.unwrap();
        assert_eq!(outcome.cached_count, 0);
    }

    #[tokio::test]
    async fn matching_ids_does_not_persist() {
        let (service, _) = service().await;
        let id = service.create(big_open()).await.unwrap();
        let ids = service.matching_ids(&id).await.unwrap();
        assert_eq!(ids, vec![EntityId::new("d1")]);
        let list = service.require(&id).await.unwrap();
        assert_eq!(list.cached_count, 0);
        assert!(list.last_refreshed_at.is_none());
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (service, _) = service().await;
        let missing = SmartListId::new();
        let refresh = service.refresh_count(&missing).await.unwrap_err();
        assert!(matches!(refresh, SmartListError::NotFound { .. }));
        let delete = service.delete(&missing).await.unwrap_err();
        assert!(matches!(delete, SmartListError::NotFound { .. }));
        let update = service
            .update(&missing, SmartListPatch::new())
            .await
            .unwrap_err();
        assert!(matches!(update, SmartListError::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_and_list() {
        let (service, _) = service().await;
        let first = service.create(big_open()).await.unwrap();
        let all_deals = NewSmartList::new(EntityType::Deal, "All deals");
        service.create(all_deals).await.unwrap();

        let patch = SmartListPatch::new()
            .with_name("  Won deals ")
            .with_filters(vec![status_is("won")]);
        service.update(&first, patch).await.unwrap();

        let names: Vec<_> = service
            .list(EntityType::Deal)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["All deals", "Won deals"]);
        let ids = service.matching_ids(&first).await.unwrap();
        assert_eq!(ids, vec![EntityId::new("d3")]);

        let err = service
            .update(&first, SmartListPatch::new().with_name("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, SmartListError::InvalidName { .. }));

        service.delete(&first).await.unwrap();
        assert!(service.get(&first).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn custom_field_rows_without_value_service_never_match() {
        let (service, _) = service().await;
        let unset = Filter::empty(custom_field_key(&DefinitionId::new()));
        let flagged = NewSmartList::new(EntityType::Deal, "Flagged").with_filter(unset);
        let id = service.create(flagged).await.unwrap();
        assert_eq!(service.refresh_count(&id).await.unwrap().cached_count, 0);
    }
}
