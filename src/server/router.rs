//! Lowering of the route table onto axum
//!
//! Route templates use `:name` parameters, with an optional trailing `:name?`.
//! axum has no optional segments and refuses two routes naming the same
//! position differently (`/widget/{id}` next to `/widget/{parentid}/items`), so
//! each template is lowered to one or two axum paths whose parameters are named
//! by position (`{p1}`, `{p2}`, ...) and mapped back to the template names when
//! a request comes in.

use super::route_table::{HttpVerb, RouteBinding, RouteTable, RouteTarget};
use crate::blueprints::{BlueprintState, dispatch};
use crate::core::error::BlueprintError;
use crate::core::request::BlueprintRequest;
use crate::core::route::{BlueprintAction, RouteMetadata};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Header carrying the id of the request, used as notification origin
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A template lowered to one concrete axum path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredPath {
    pub path: String,
    /// `(axum name, template name)` of every parameter
    pub params: Vec<(String, String)>,
}

/// Lower a `:name` / `:name?` template to axum paths
///
/// ```
/// use blueprints::server::router::lower_template;
///
/// let lowered = lower_template("/widget/:parentid/parts/:id?");
/// assert_eq!(lowered[0].path, "/widget/{p1}/parts");
/// assert_eq!(lowered[1].path, "/widget/{p1}/parts/{p3}");
/// ```
pub fn lower_template(template: &str) -> Vec<LoweredPath> {
    let segments: Vec<&str> = template.trim_start_matches('/').split('/').collect();
    let last = segments.len() - 1;

    let mut required = LoweredPath {
        path: String::new(),
        params: Vec::new(),
    };
    let mut optional = None;

    for (index, segment) in segments.iter().enumerate() {
        match segment.strip_prefix(':') {
            Some(name) => {
                let (name, is_optional) = match name.strip_suffix('?') {
                    Some(name) => (name, index == last),
                    None => (name, false),
                };
                if is_optional {
                    optional = Some(required.clone());
                }
                let positional = format!("p{index}");
                required.path.push_str(&format!("/{{{positional}}}"));
                required.params.push((positional, name.to_string()));
            }
            None => {
                required.path.push('/');
                required.path.push_str(segment);
            }
        }
    }

    match optional {
        Some(mut shorter) => {
            if shorter.path.is_empty() {
                shorter.path.push('/');
            }
            vec![shorter, required]
        }
        None => vec![required],
    }
}

fn method_filter(verb: HttpVerb) -> Option<MethodFilter> {
    match verb {
        HttpVerb::Get => Some(MethodFilter::GET),
        HttpVerb::Post => Some(MethodFilter::POST),
        HttpVerb::Patch => Some(MethodFilter::PATCH),
        HttpVerb::Put => Some(MethodFilter::PUT),
        HttpVerb::Delete => Some(MethodFilter::DELETE),
        HttpVerb::All => None,
    }
}

/// One blueprint route, ready to serve requests
struct BlueprintEndpoint {
    state: BlueprintState,
    action: BlueprintAction,
    metadata: Arc<RouteMetadata>,
    params: Vec<(String, String)>,
    deprecation: Option<String>,
}

impl BlueprintEndpoint {
    async fn handle(
        &self,
        path: HashMap<String, String>,
        query: HashMap<String, String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        if let Some(notice) = &self.deprecation {
            tracing::warn!("{}", notice);
        }

        let request = match self.request(path, query, &headers, &body) {
            Ok(request) => request,
            Err(e) => return e.into_response(),
        };
        match dispatch(&self.state, self.action, &self.metadata, &request).await {
            Ok(response) => response.into_response(),
            Err(e) => e.into_response(),
        }
    }

    fn request(
        &self,
        mut path: HashMap<String, String>,
        query: HashMap<String, String>,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<BlueprintRequest, BlueprintError> {
        let mut request = BlueprintRequest::new();
        for (positional, name) in &self.params {
            if let Some(value) = path.remove(positional) {
                request = request.with_path(name, value);
            }
        }
        for (name, value) in query {
            request = request.with_query(&name, value);
        }
        if !body.is_empty() {
            let body: Value = serde_json::from_slice(body).map_err(|e| {
                BlueprintError::usage(format!("Could not parse the request body as JSON: {e}"))
            })?;
            request = request.with_body(body);
        }
        if let Some(origin) = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            request = request.with_origin(origin);
        }
        Ok(request)
    }
}

fn blueprint_method(
    filter: MethodFilter,
    endpoint: BlueprintEndpoint,
    router: MethodRouter,
) -> MethodRouter {
    let endpoint = Arc::new(endpoint);
    if endpoint.params.is_empty() {
        router.on(
            filter,
            move |Query(query): Query<HashMap<String, String>>, headers: HeaderMap, body: Bytes| {
                let endpoint = endpoint.clone();
                async move { endpoint.handle(HashMap::new(), query, headers, body).await }
            },
        )
    } else {
        router.on(
            filter,
            move |Path(path): Path<HashMap<String, String>>,
                  Query(query): Query<HashMap<String, String>>,
                  headers: HeaderMap,
                  body: Bytes| {
                let endpoint = endpoint.clone();
                async move { endpoint.handle(path, query, headers, body).await }
            },
        )
    }
}

/// Build the axum routes of a route table
///
/// Custom action targets are looked up in `actions`; a key with no router is
/// logged and left unbound.
pub fn build_blueprint_routes(
    table: &RouteTable,
    state: &BlueprintState,
    actions: &IndexMap<String, MethodRouter>,
) -> Router {
    let mut groups: IndexMap<String, MethodRouter> = IndexMap::new();
    let mut bound: HashSet<(HttpVerb, String)> = HashSet::new();

    for binding in table.bindings() {
        for lowered in lower_template(&binding.path) {
            if !bound.insert((binding.verb, lowered.path.clone())) {
                tracing::warn!(verb = %binding.verb, path = %lowered.path, "route already bound, skipping");
                continue;
            }
            let group = groups.entry(lowered.path.clone()).or_default();
            let router = std::mem::take(group);
            *group = lower_binding(binding, lowered, state, actions, router);
        }
    }

    groups
        .into_iter()
        .fold(Router::new(), |app, (path, method_router)| app.route(&path, method_router))
}

fn lower_binding(
    binding: &RouteBinding,
    lowered: LoweredPath,
    state: &BlueprintState,
    actions: &IndexMap<String, MethodRouter>,
    router: MethodRouter,
) -> MethodRouter {
    match (&binding.target, &binding.metadata, method_filter(binding.verb)) {
        (RouteTarget::Blueprint { action, .. }, Some(metadata), Some(filter)) => {
            let endpoint = BlueprintEndpoint {
                state: state.clone(),
                action: *action,
                metadata: metadata.clone(),
                params: lowered.params,
                deprecation: binding.deprecation.clone(),
            };
            blueprint_method(filter, endpoint, router)
        }
        (RouteTarget::Action(key), _, _) => match actions.get(key) {
            Some(action) => router.fallback_service(action.clone()),
            None => {
                tracing::warn!(action = %key, "no handler registered for action, skipping");
                router
            }
        },
        (target, _, _) => {
            tracing::warn!(verb = %binding.verb, path = %binding.path, %target, "blueprint route cannot be lowered, skipping");
            router
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlueprintsConfig;
    use crate::core::events::EventBus;
    use crate::core::model::{AttributeType, ModelDefinition, ModelRegistry};
    use crate::server::route_table::RouteTableGenerator;
    use crate::storage::InMemoryDataService;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::any;
    use tower::util::ServiceExt;

    #[test]
    fn test_lower_plain_and_parameter_segments() {
        assert_eq!(
            lower_template("/widget/:id"),
            vec![LoweredPath {
                path: "/widget/{p1}".into(),
                params: vec![("p1".into(), "id".into())],
            }]
        );
        assert_eq!(lower_template("/widget/find")[0].path, "/widget/find");
    }

    #[test]
    fn test_optional_segment_yields_two_paths() {
        let lowered = lower_template("/api/widget/:id?");
        assert_eq!(lowered.len(), 2);
        assert_eq!(lowered[0].path, "/api/widget");
        assert!(lowered[0].params.is_empty());
        assert_eq!(lowered[1].path, "/api/widget/{p2}");
    }

    #[test]
    fn test_positional_names_line_up_across_templates() {
        let one = lower_template("/widget/:id");
        let many = lower_template("/widget/:parentid/items");
        assert_eq!(one[0].params[0].0, many[0].params[0].0);
    }

    #[test]
    fn test_root_template() {
        assert_eq!(lower_template("/")[0].path, "/");
    }

    fn app(actions: IndexMap<String, MethodRouter>) -> Router {
        let registry = Arc::new(
            ModelRegistry::from_definitions([
                ModelDefinition::new("widget")
                    .attribute("id", AttributeType::Integer)
                    .attribute("name", AttributeType::String),
            ])
            .unwrap(),
        );
        let config = BlueprintsConfig::default();
        let table = RouteTableGenerator::new(&registry, &config)
            .with_actions(actions.keys().cloned())
            .generate();
        let state = BlueprintState::new(
            registry.clone(),
            Arc::new(InMemoryDataService::new(registry)),
            Arc::new(EventBus::default()),
            Arc::new(config),
        );
        build_blueprint_routes(&table, &state, &actions)
    }

    #[tokio::test]
    async fn test_custom_action_answers_any_method() {
        let mut actions = IndexMap::new();
        actions.insert("widget/hello".to_string(), any(|| async { "hello" }));

        for method in ["GET", "POST", "DELETE"] {
            let response = app(actions.clone())
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri("/widget/hello")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{method}");
        }
    }

    #[tokio::test]
    async fn test_path_params_reach_the_action() {
        let app = app(IndexMap::new());
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/widget")
                    .body(Body::from(r#"{"name":"gear"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/widget/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_rejected() {
        let response = app(IndexMap::new())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/widget")
                    .body(Body::from("{"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
