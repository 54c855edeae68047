//! # blueprints-rs
//!
//! Schema-driven REST blueprints: declare models and their associations, get a
//! full CRUD and association API without writing controllers.
//!
//! ## Features
//!
//! - **Request-to-Query Compiler**: query strings, path params and JSON bodies
//!   (including legacy string-encoded filters) normalized into one ORM-agnostic
//!   [`QueryOptions`](core::query::QueryOptions)
//! - **Route Table Generator**: actions, shortcuts, REST and index routes, with
//!   prefixes, pluralization and per-model overrides
//! - **Associations**: to-one, to-many and many-to-many through a join model,
//!   linked and unlinked through explicit task graphs
//! - **Notifications**: every mutation reported to a [`Notifier`](core::events::Notifier),
//!   with a broadcast event bus bundled
//! - **Configuration-Based**: models and blueprint settings from YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blueprints::prelude::*;
//!
//! let registry = Arc::new(ModelRegistry::from_definitions([
//!     ModelDefinition::new("widget")
//!         .attribute("name", AttributeType::String)
//!         .association(AssociationDefinition::through(
//!             "parts", "part", "widgetpart", "widget", "part",
//!         )),
//!     ModelDefinition::new("part"),
//!     ModelDefinition::new("widgetpart"),
//! ])?);
//!
//! ServerBuilder::new()
//!     .with_registry(registry.clone())
//!     .with_data_service(InMemoryDataService::new(registry))
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod blueprints;
pub mod config;
pub mod core;
pub mod logging;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        compiler::QueryCompiler,
        error::{BlueprintError, ConfigError},
        events::{BlueprintEvent, EventBus, EventEnvelope, Notifier},
        model::{
            AssociationDefinition, AssociationDescriptor, AssociationKind, AttributeType,
            ModelDefinition, ModelDescriptor, ModelRegistry,
        },
        pluralize::Pluralizer,
        query::{Criteria, NewRecord, QueryOptions, SortClause},
        request::BlueprintRequest,
        route::{BlueprintAction, RouteMetadata},
        service::{DataService, Record, StoreError, StoreResult},
    };

    // === Blueprints ===
    pub use crate::blueprints::{BlueprintResponse, BlueprintState, dispatch};

    // === Storage ===
    pub use crate::storage::InMemoryDataService;

    // === Config ===
    pub use crate::config::{BlueprintsConfig, DirectUnlink, ModelOverrides, RouteOptions};

    // === Server ===
    pub use crate::server::{
        HttpVerb, RestExposure, RouteTable, RouteTableGenerator, RouteTarget, ServerBuilder,
        ServerHost,
    };

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;

    // === Axum ===
    pub use axum::{
        Router,
        routing::{any, delete, get, post, put},
    };
}
