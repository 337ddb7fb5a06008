//! FieldsContext: main API surface for the custom fields layer.
//!
//! Wires the registry, value service, validation engine and formatter to a
//! single store and configuration.

use std::sync::Arc;

use tracing::debug;

use crate::activity::{ActivitySink, TracingActivitySink};
use crate::config::FieldsConfig;
use crate::error::Result;
use crate::format::FieldFormatter;
use crate::registry::{DefinitionRegistry, FieldDefaults};
use crate::store::FieldStore;
use crate::validation::ValidationEngine;
use crate::value_store::ValueService;

/// Builder for `FieldsContext`. Created by `FieldsContext::builder()`.
pub struct FieldsContextBuilder {
    store: Arc<dyn FieldStore>,
    config: FieldsConfig,
    activity: Arc<dyn ActivitySink>,
    defaults: Option<FieldDefaults>,
}

impl FieldsContextBuilder {
    pub fn with_config(mut self, config: FieldsConfig) -> Self {
        self.config = config;
        self
    }

    /// Send definition lifecycle events to `sink` instead of the log.
    pub fn with_activity(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.activity = sink;
        self
    }

    /// Provide default definitions.
    /// Defaults are seeded on build; existing definitions are preserved.
    pub fn with_defaults(mut self, defaults: FieldDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Build the context and seed defaults.
    pub async fn build(self) -> Result<FieldsContext> {
        let engine = Arc::new(ValidationEngine::new(self.config.validation.clone()));
        let registry = DefinitionRegistry::new(self.store.clone(), self.activity, engine.clone());
        let values = ValueService::new(self.store, engine.clone())
            .with_enforced_validation(self.config.values.enforce_validation);
        let formatter = FieldFormatter::new(self.config.display.clone());

        let seeded = match &self.defaults {
            Some(defaults) => registry.seed(defaults).await?.len(),
            None => 0,
        };
        debug!(
            seeded,
            enforce_validation = self.config.values.enforce_validation,
            "fields context opened"
        );

        Ok(FieldsContext {
            registry,
            values: Arc::new(values),
            engine,
            formatter,
            config: self.config,
        })
    }
}

/// Handle to the custom fields layer.
#[derive(Clone)]
pub struct FieldsContext {
    registry: DefinitionRegistry,
    values: Arc<ValueService>,
    engine: Arc<ValidationEngine>,
    formatter: FieldFormatter,
    config: FieldsConfig,
}

impl FieldsContext {
    pub fn builder(store: Arc<dyn FieldStore>) -> FieldsContextBuilder {
        FieldsContextBuilder {
            store,
            config: FieldsConfig::default(),
            activity: Arc::new(TracingActivitySink),
            defaults: None,
        }
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    /// Shared value service; smart lists hold a clone to read custom fields.
    pub fn values(&self) -> Arc<ValueService> {
        self.values.clone()
    }

    pub fn validation(&self) -> &ValidationEngine {
        &self.engine
    }

    pub fn formatter(&self) -> &FieldFormatter {
        &self.formatter
    }

    pub fn config(&self) -> &FieldsConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::RecordingActivitySink;
    use crate::config::ValuesConfig;
    use crate::registry::NewDefinition;
    use crate::store::MemoryFieldStore;
    use crate::types::{EntityType, FieldType};
    use crate::value::Value;

    #[tokio::test]
    async fn build_seeds_defaults_and_reports_activity() {
        let sink = Arc::new(RecordingActivitySink::new());
        let industry =
            NewDefinition::new(EntityType::Company, "industry", "Industry", FieldType::Text);
        let ctx = FieldsContext::builder(Arc::new(MemoryFieldStore::new()))
            .with_activity(sink.clone())
            .with_defaults(FieldDefaults::new().field(industry))
            .build()
            .await
            .unwrap();

        let defs = ctx.registry().list(EntityType::Company).await.unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn config_controls_value_validation() {
        let ctx = FieldsContext::builder(Arc::new(MemoryFieldStore::new()))
            .with_config(FieldsConfig {
                values: ValuesConfig {
                    enforce_validation: true,
                },
                ..FieldsConfig::default()
            })
            .build()
            .await
            .unwrap();
        let id = ctx
            .registry()
            .create(NewDefinition::new(EntityType::Deal, "score", "Score", FieldType::Number))
            .await
            .unwrap();

        let err = ctx
            .values()
            .set(&id, EntityType::Deal, &"deal_1".into(), Value::from("high"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::FieldsError::Validation(_)));
    }
}
