//! Activity events emitted when definitions change.
//!
//! The audit log is an external sink; this layer only fires events at it and
//! never waits on or inspects the outcome.

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::types::{DefinitionId, EntityType, FieldType};

/// A definition lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ActivityEvent {
    #[serde(rename = "definition.created")]
    DefinitionCreated {
        id: DefinitionId,
        entity_type: EntityType,
        name: String,
        field_type: FieldType,
    },
    #[serde(rename = "definition.updated")]
    DefinitionUpdated {
        id: DefinitionId,
        entity_type: EntityType,
        name: String,
    },
    #[serde(rename = "definition.deleted")]
    DefinitionDeleted {
        id: DefinitionId,
        entity_type: EntityType,
        name: String,
        deleted_values: usize,
    },
}

impl ActivityEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityEvent::DefinitionCreated { .. } => "definition.created",
            ActivityEvent::DefinitionUpdated { .. } => "definition.updated",
            ActivityEvent::DefinitionDeleted { .. } => "definition.deleted",
        }
    }
}

/// Fire-and-forget receiver of activity events.
pub trait ActivitySink: Send + Sync {
    fn record(&self, event: ActivityEvent);
}

/// Writes every event as a structured `info` log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, event: ActivityEvent) {
        match &event {
            ActivityEvent::DefinitionCreated {
                id,
                entity_type,
                name,
                field_type,
            } => info!(%id, %entity_type, %name, %field_type, "custom field created"),
            ActivityEvent::DefinitionUpdated {
                id,
                entity_type,
                name,
            } => info!(%id, %entity_type, %name, "custom field updated"),
            ActivityEvent::DefinitionDeleted {
                id,
                entity_type,
                name,
                deleted_values,
            } => info!(%id, %entity_type, %name, deleted_values, "custom field deleted"),
        }
    }
}

/// Keeps events in memory, for assertions and for forwarding in batches.
#[derive(Debug, Default)]
pub struct RecordingActivitySink {
    events: Mutex<Vec<ActivityEvent>>,
}

impl RecordingActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ActivitySink for RecordingActivitySink {
    fn record(&self, event: ActivityEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
