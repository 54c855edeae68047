//! Server host for transport-agnostic API exposure
//!
//! `ServerHost` holds everything needed to serve the blueprints: the model
//! registry, the effective configuration, the data service, the notifier and
//! the route table generated from them. Exposures (currently REST) consume it.

use super::route_table::{RouteTable, RouteTableGenerator};
use crate::blueprints::BlueprintState;
use crate::config::BlueprintsConfig;
use crate::core::events::{EventBus, Notifier};
use crate::core::model::ModelRegistry;
use crate::core::service::DataService;
use anyhow::Result;
use axum::routing::MethodRouter;
use indexmap::IndexMap;
use std::sync::Arc;

/// Host context containing all framework state
///
/// # Example
///
/// ```rust,ignore
/// let host = ServerHost::from_builder_components(
///     registry,
///     config,
///     data_service,
///     notifier,
///     actions,
/// )?;
///
/// let app = RestExposure::build_router(Arc::new(host), vec![])?;
/// ```
pub struct ServerHost {
    pub registry: Arc<ModelRegistry>,

    pub config: Arc<BlueprintsConfig>,

    pub data_service: Arc<dyn DataService>,

    /// Receives every mutation the blueprint actions perform
    pub notifier: Arc<dyn Notifier>,

    /// Present when the notifier is the bundled event bus
    pub event_bus: Option<EventBus>,

    /// Generated once, when the host is built
    pub route_table: RouteTable,

    /// Custom actions keyed by action name (`widget/hello`, `index`)
    pub actions: IndexMap<String, MethodRouter>,
}

impl ServerHost {
    /// Build the host and generate its route table
    pub fn from_builder_components(
        registry: Arc<ModelRegistry>,
        config: BlueprintsConfig,
        data_service: Arc<dyn DataService>,
        notifier: Arc<dyn Notifier>,
        actions: IndexMap<String, MethodRouter>,
    ) -> Result<Self> {
        registry.validate()?;
        for identity in config.models.keys() {
            if registry.get(identity).is_none() {
                tracing::warn!(model = %identity, "blueprint overrides for an unknown model are ignored");
            }
        }

        let route_table = RouteTableGenerator::new(&registry, &config)
            .with_actions(actions.keys().cloned())
            .generate();
        tracing::debug!(routes = route_table.len(), "route table generated");

        Ok(Self {
            registry,
            config: Arc::new(config),
            data_service,
            notifier,
            event_bus: None,
            route_table,
            actions,
        })
    }

    /// Attach the event bus that backs the notifier, for subscribers
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.event_bus.as_ref()
    }

    /// Identities of the registered models
    pub fn model_identities(&self) -> Vec<&str> {
        self.registry.models().map(|m| m.identity.as_str()).collect()
    }

    /// State handed to every blueprint action
    pub fn blueprint_state(&self) -> BlueprintState {
        BlueprintState::new(
            self.registry.clone(),
            self.data_service.clone(),
            self.notifier.clone(),
            self.config.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ModelDefinition;
    use crate::storage::InMemoryDataService;

    #[test]
    fn test_host_generates_route_table() {
        let registry = Arc::new(
            ModelRegistry::from_definitions([ModelDefinition::new("widget")]).unwrap(),
        );
        let host = ServerHost::from_builder_components(
            registry.clone(),
            BlueprintsConfig::default(),
            Arc::new(InMemoryDataService::new(registry)),
            Arc::new(EventBus::default()),
            IndexMap::new(),
        )
        .unwrap();

        assert_eq!(host.model_identities(), vec!["widget"]);
        // 5 shortcuts + 6 REST routes
        assert_eq!(host.route_table.len(), 11);
        assert!(host.event_bus().is_none());
    }
}
