//! ServerBuilder for fluent API to build HTTP servers

use super::exposure::RestExposure;
use super::host::ServerHost;
use crate::config::BlueprintsConfig;
use crate::core::events::{EventBus, Notifier};
use crate::core::model::ModelRegistry;
use crate::core::service::DataService;
use anyhow::Result;
use axum::Router;
use axum::routing::MethodRouter;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating HTTP servers with blueprint routes
///
/// # Example
///
/// ```ignore
/// let registry = Arc::new(ModelRegistry::from_yaml_file("models.yaml")?);
/// let app = ServerBuilder::new()
///     .with_registry(registry.clone())
///     .with_data_service(InMemoryDataService::new(registry))
///     .build()?;
/// ```
pub struct ServerBuilder {
    registry: Option<Arc<ModelRegistry>>,
    config: BlueprintsConfig,
    data_service: Option<Arc<dyn DataService>>,
    notifier: Option<Arc<dyn Notifier>>,
    event_bus: Option<EventBus>,
    actions: IndexMap<String, MethodRouter>,
    custom_routes: Vec<Router>,
    cors: bool,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            registry: None,
            config: BlueprintsConfig::default(),
            data_service: None,
            notifier: None,
            event_bus: None,
            actions: IndexMap::new(),
            custom_routes: Vec::new(),
            cors: false,
        }
    }

    /// Set the model registry (required)
    pub fn with_registry(mut self, registry: impl Into<Arc<ModelRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Set the blueprint configuration; defaults apply otherwise
    pub fn with_config(mut self, config: BlueprintsConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the data service (required)
    pub fn with_data_service(mut self, service: impl DataService + 'static) -> Self {
        self.data_service = Some(Arc::new(service));
        self
    }

    /// Report mutations to a custom notifier instead of the event bus
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Use an event bus with the given channel capacity as notifier
    ///
    /// Without this or [`with_notifier`](Self::with_notifier) a bus with the
    /// default capacity is used.
    pub fn with_event_bus(mut self, capacity: usize) -> Self {
        self.event_bus = Some(EventBus::new(capacity));
        self
    }

    /// Register a custom action under `key` (`widget/hello`, `index`, ...)
    ///
    /// Bound at `{prefix}/{key}` when action routes are on, and at the stripped
    /// path when index routes are on and the key ends in `index`.
    pub fn with_action(mut self, key: impl Into<String>, action: MethodRouter) -> Self {
        self.actions.insert(key.into(), action);
        self
    }

    /// Add custom routes to the server
    ///
    /// Use this for routes that are not actions, such as webhooks or auth.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Answer cross-origin requests from any origin
    pub fn with_cors(mut self) -> Self {
        self.cors = true;
        self
    }

    /// Build the transport-agnostic host
    pub fn build_host(&mut self) -> Result<ServerHost> {
        let registry = self
            .registry
            .take()
            .ok_or_else(|| anyhow::anyhow!("A model registry is required. Call .with_registry()"))?;
        let data_service = self.data_service.take().ok_or_else(|| {
            anyhow::anyhow!("A DataService is required. Call .with_data_service()")
        })?;

        let (notifier, event_bus): (Arc<dyn Notifier>, Option<EventBus>) = match self.notifier.take() {
            Some(notifier) => (notifier, None),
            None => {
                let bus = self
                    .event_bus
                    .take()
                    .unwrap_or_default()
                    .with_mirror(self.config.mirror);
                (Arc::new(bus.clone()), Some(bus))
            }
        };

        let host = ServerHost::from_builder_components(
            registry,
            std::mem::take(&mut self.config),
            data_service,
            notifier,
            std::mem::take(&mut self.actions),
        )?;

        Ok(match event_bus {
            Some(bus) => host.with_event_bus(bus),
            None => host,
        })
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router> {
        let host = Arc::new(self.build_host()?);
        self.router(host)
    }

    fn router(&mut self, host: Arc<ServerHost>) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let app = RestExposure::build_router(host, custom_routes)?;
        Ok(if self.cors {
            app.layer(RestExposure::cors_layer())
        } else {
            app
        })
    }

    /// Serve the application with graceful shutdown
    ///
    /// Configuration warnings collected while binding routes are logged once
    /// the listener is bound.
    ///
    /// # Example
    ///
    /// ```ignore
    /// ServerBuilder::new()
    ///     .with_registry(registry.clone())
    ///     .with_data_service(InMemoryDataService::new(registry))
    ///     .serve("127.0.0.1:3000").await?;
    /// ```
    pub async fn serve(mut self, addr: &str) -> Result<()> {
        let host = Arc::new(self.build_host()?);
        let app = self.router(host.clone())?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);
        host.route_table.emit_deferred_warnings();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ModelDefinition;
    use crate::storage::InMemoryDataService;
    use axum::routing::get;

    fn registry() -> Arc<ModelRegistry> {
        Arc::new(ModelRegistry::from_definitions([ModelDefinition::new("widget")]).unwrap())
    }

    #[test]
    fn test_build_without_registry_fails() {
        let result = ServerBuilder::new()
            .with_data_service(InMemoryDataService::new(registry()))
            .build();
        let err = result.err().unwrap();
        assert!(err.to_string().contains("with_registry"));
    }

    #[test]
    fn test_build_without_data_service_fails() {
        let result = ServerBuilder::new().with_registry(registry()).build();
        assert!(result.err().unwrap().to_string().contains("DataService"));
    }

    #[test]
    fn test_event_bus_mirrors_per_config() {
        let registry = registry();
        let host = ServerBuilder::new()
            .with_registry(registry.clone())
            .with_data_service(InMemoryDataService::new(registry))
            .with_config(BlueprintsConfig {
                mirror: true,
                ..Default::default()
            })
            .with_event_bus(8)
            .build_host()
            .unwrap();
        assert!(host.event_bus().is_some());
        assert!(host.config.mirror);
    }

    #[test]
    fn test_fluent_chaining_full_pipeline() {
        let registry = registry();
        let result = ServerBuilder::new()
            .with_registry(registry.clone())
            .with_data_service(InMemoryDataService::new(registry))
            .with_action("widget/hello", get(|| async { "hello" }))
            .with_custom_routes(Router::new())
            .with_cors()
            .build();
        assert!(result.is_ok());
    }
}
