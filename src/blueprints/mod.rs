//! Blueprint actions
//!
//! The eight pre-built actions every model gets. Each one compiles the request
//! with [`QueryCompiler`](crate::core::compiler::QueryCompiler), runs the
//! resulting [`QueryOptions`](crate::core::query::QueryOptions) against the
//! [`DataService`], and reports what changed to the [`Notifier`].
//!
//! Handlers are transport-agnostic: they take a [`BlueprintRequest`] and return
//! a [`BlueprintResponse`]. The axum binding lives in `server::router`.

pub mod association;
pub mod handlers;
pub mod tasks;

use crate::config::BlueprintsConfig;
use crate::core::error::BlueprintError;
use crate::core::events::Notifier;
use crate::core::model::ModelRegistry;
use crate::core::request::BlueprintRequest;
use crate::core::route::{BlueprintAction, RouteMetadata};
use crate::core::service::DataService;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::sync::Arc;

/// Everything an action needs besides the request
#[derive(Clone)]
pub struct BlueprintState {
    pub registry: Arc<ModelRegistry>,
    pub data: Arc<dyn DataService>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<BlueprintsConfig>,
}

impl BlueprintState {
    pub fn new(
        registry: Arc<ModelRegistry>,
        data: Arc<dyn DataService>,
        notifier: Arc<dyn Notifier>,
        config: Arc<BlueprintsConfig>,
    ) -> Self {
        Self {
            registry,
            data,
            notifier,
            config,
        }
    }
}

/// Status and JSON body produced by an action
#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl BlueprintResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn created(body: Value) -> Self {
        Self {
            status: StatusCode::CREATED,
            body,
        }
    }
}

impl IntoResponse for BlueprintResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Run `action` for a request on a bound route
pub async fn dispatch(
    state: &BlueprintState,
    action: BlueprintAction,
    route: &RouteMetadata,
    request: &BlueprintRequest,
) -> Result<BlueprintResponse, BlueprintError> {
    tracing::debug!(model = %route.model, %action, "blueprint action");

    match action {
        BlueprintAction::Find => handlers::find(state, route, request).await,
        BlueprintAction::FindOne => handlers::find_one(state, route, request).await,
        BlueprintAction::Create => handlers::create(state, route, request).await,
        BlueprintAction::Update => handlers::update(state, route, request).await,
        BlueprintAction::Destroy => handlers::destroy(state, route, request).await,
        BlueprintAction::Populate => handlers::populate(state, route, request).await,
        BlueprintAction::Add => association::add(state, route, request).await,
        BlueprintAction::Remove => association::remove(state, route, request).await,
    }
}
