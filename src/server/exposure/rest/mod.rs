//! REST API exposure for the blueprints
//!
//! Consumes a `ServerHost` and produces an axum `Router`: health checks, the
//! lowered route table and any custom routes, wrapped in an HTTP trace layer.

use super::super::host::ServerHost;
use crate::server::router::{REQUEST_ID_HEADER, build_blueprint_routes};
use anyhow::Result;
use axum::body::Body;
use axum::http::Request;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// Returns a router with:
    /// - Health check routes
    /// - Blueprint routes (shortcuts, REST, custom and index actions)
    /// - Custom routes
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
        let state = host.blueprint_state();
        let blueprint_routes = build_blueprint_routes(&host.route_table, &state, &host.actions);

        let mut app = Self::health_routes().merge(blueprint_routes);
        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        Ok(app.layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            let request_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("n/a");
            tracing::info_span!(
                "http_request",
                method = %req.method(),
                uri = %req.uri().path(),
                request_id = %request_id,
            )
        })))
    }

    /// Permissive CORS, for browser clients on another origin
    pub fn cors_layer() -> CorsLayer {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    }

    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": "blueprints-rs"
        }))
    }
}
