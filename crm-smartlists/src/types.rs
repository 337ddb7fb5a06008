//! Smart list records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use crm_fields::EntityType;
use crm_filters::Filter;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of a smart list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SmartListId(Ulid);

impl SmartListId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SmartListId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for SmartListId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

impl fmt::Display for SmartListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A named, saved filter over one entity type.
///
/// `cached_count` is only as fresh as `last_refreshed_at`; it is recomputed
/// when a caller asks for a refresh, never in the background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartList {
    pub id: SmartListId,
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub cached_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to save a new smart list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSmartList {
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl NewSmartList {
    pub fn new(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            name: name.into(),
            description: None,
            filters: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }
}

/// Partial update of a smart list. The entity type is fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmartListPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub filters: Option<Vec<Filter>>,
}

impl SmartListPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// Result of a count refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub cached_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_fields::Value;
    use crm_filters::FilterOperator;

    #[test]
    fn smart_list_serializes_camel_case() {
        let now = Utc::now();
        let big = Filter::new("amount", FilterOperator::GreaterThan, Value::from(10000));
        let list = SmartList {
            id: SmartListId::new(),
            entity_type: EntityType::Deal,
            name: "Big open deals".into(),
            description: None,
            filters: vec![big],
            cached_count: 3,
            last_refreshed_at: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["entityType"], "deal");
        assert_eq!(json["cachedCount"], 3);
        assert_eq!(json["filters"][0]["operator"], "greaterThan");
        assert!(json.get("lastRefreshedAt").is_none());

        let parsed: SmartList = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, list);
    }

    #[test]
    fn id_parses_from_display() {
        let id = SmartListId::new();
        assert_eq!(id.to_string().parse::<SmartListId>().unwrap(), id);
    }
}
