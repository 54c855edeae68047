//! End-to-end tests simulating a client of the generated REST API
//!
//! These tests drive the complete flow from HTTP request to response: route
//! table, request compilation, blueprint actions and the in-memory store.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use blueprints::prelude::*;

// =============================================================================
// Fixtures
// =============================================================================

fn registry() -> Arc<ModelRegistry> {
    Arc::new(
        ModelRegistry::from_definitions([
            ModelDefinition::new("widget")
                .attribute("id", AttributeType::Integer)
                .attribute("name", AttributeType::String)
                .attribute("color", AttributeType::String)
                .association(AssociationDefinition::through(
                    "parts",
                    "part",
                    "widgetpart",
                    "widgetId",
                    "partId",
                ))
                .association(AssociationDefinition::to_many("notes", "note", "widget")),
            ModelDefinition::new("part")
                .attribute("id", AttributeType::Integer)
                .attribute("name", AttributeType::String),
            ModelDefinition::new("widgetpart").attribute("id", AttributeType::Integer),
            ModelDefinition::new("note")
                .attribute("id", AttributeType::Integer)
                .attribute("body", AttributeType::String),
        ])
        .expect("valid registry"),
    )
}

struct Harness {
    server: TestServer,
    store: InMemoryDataService,
    bus: EventBus,
}

fn harness_with(config: BlueprintsConfig) -> Harness {
    let registry = registry();
    let store = InMemoryDataService::new(registry.clone());
    let bus = EventBus::new(64).with_mirror(true);

    let app = ServerBuilder::new()
        .with_registry(registry)
        .with_config(config)
        .with_data_service(store.clone())
        .with_notifier(bus.clone())
        .build()
        .expect("Failed to build app");

    Harness {
        server: TestServer::try_new(app).expect("Failed to create test server"),
        store,
        bus,
    }
}

fn harness() -> Harness {
    harness_with(BlueprintsConfig::default())
}

async fn seed_widgets(server: &TestServer) {
    for widget in [
        json!({"id": 9, "name": "gear", "color": "red"}),
        json!({"id": 10, "name": "axle", "color": "red"}),
        json!({"id": 11, "name": "cog", "color": "blue"}),
    ] {
        server.post("/widget").json(&widget).await.assert_status(StatusCode::CREATED);
    }
}

fn names(body: &Value) -> Vec<&str> {
    body.as_array()
        .expect("array body")
        .iter()
        .filter_map(|w| w["name"].as_str())
        .collect()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let h = harness();
    let response = h.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "blueprints-rs");
}

// =============================================================================
// CRUD
// =============================================================================

#[tokio::test]
async fn test_create_answers_201_with_the_record() {
    let h = harness();
    let response = h
        .server
        .post("/widget")
        .json(&json!({"name": "gear", "color": "red"}))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["name"], "gear");
    assert_eq!(body["id"], 1);
}

#[tokio::test]
async fn test_batch_create_answers_an_array() {
    let h = harness();
    let response = h
        .server
        .post("/widget")
        .json(&json!([{"name": "gear"}, {"name": "cog"}]))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(names(&body), vec!["gear", "cog"]);
}

#[tokio::test]
async fn test_find_with_where_limit_and_sort() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h
        .server
        .get("/widget")
        .add_query_param("where", r#"{"color":"red"}"#)
        .add_query_param("limit", "5")
        .add_query_param("sort", "name ASC")
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(names(&body), vec!["axle", "gear"]);
}

#[tokio::test]
async fn test_find_with_implicit_where_and_skip() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h
        .server
        .get("/widget")
        .add_query_param("color", "red")
        .add_query_param("skip", "1")
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(names(&body), vec!["axle"]);
}

#[tokio::test]
async fn test_find_populates_associations_by_default() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h.server.get("/widget/9").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["parts"], json!([]));
    assert_eq!(body["notes"], json!([]));
}

#[tokio::test]
async fn test_populate_false_leaves_associations_out() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h
        .server
        .get("/widget/9")
        .add_query_param("populate", "false")
        .await;
    let body: Value = response.json();
    assert!(body.get("parts").is_none());
    assert!(body.get("notes").is_none());
}

#[tokio::test]
async fn test_find_one_missing_is_404() {
    let h = harness();
    let response = h.server.get("/widget/404").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_where_is_a_usage_error() {
    let h = harness();
    let response = h
        .server
        .get("/widget")
        .add_query_param("where", "{color: red")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "USAGE_ERROR");
}

#[tokio::test]
async fn test_malformed_body_is_a_usage_error() {
    let h = harness();
    let response = h
        .server
        .post("/widget")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_updates_and_returns_the_record() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h
        .server
        .patch("/widget/9")
        .json(&json!({"color": "green"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["id"], 9);
    assert_eq!(body["color"], "green");
    assert_eq!(body["name"], "gear");
}

#[tokio::test]
async fn test_put_still_updates() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h
        .server
        .put("/widget/11")
        .json(&json!({"name": "sprocket"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["name"], "sprocket");
}

#[tokio::test]
async fn test_update_ignores_a_primary_key_in_the_body() {
    let h = harness();
    seed_widgets(&h.server).await;

    h.server
        .patch("/widget/9")
        .json(&json!({"id": 99, "name": "big gear"}))
        .await
        .assert_status_ok();

    h.server.get("/widget/9").await.assert_status_ok();
    assert_eq!(
        h.server.get("/widget/99").await.status_code(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_update_missing_is_404() {
    let h = harness();
    let response = h.server.patch("/widget/1").json(&json!({"name": "x"})).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_query_modifiers_are_not_saved_as_attributes() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h
        .server
        .patch("/widget/9")
        .add_query_param("populate", "false")
        .json(&json!({"name": "b"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["name"], "b");
    assert!(body.get("populate").is_none());

    let response = h
        .server
        .post("/widget")
        .add_query_param("select", "name")
        .json(&json!({"id": 12, "name": "cam"}))
        .await;
    response.assert_status(StatusCode::CREATED);

    h.server
        .post("/widget/9/notes")
        .add_query_param("populate", "false")
        .json(&json!({"body": "hi"}))
        .await
        .assert_status_ok();
    let notes = h.store.rows("note").expect("rows");
    assert_eq!(notes.len(), 1);
    assert!(notes[0].get("populate").is_none());
    assert_eq!(notes[0]["body"], "hi");
}

#[tokio::test]
async fn test_destroy_returns_the_destroyed_record() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h.server.delete("/widget/10").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["name"], "axle");

    assert_eq!(
        h.server.get("/widget/10").await.status_code(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_destroy_without_id_is_a_usage_error() {
    let h = harness();
    let response = h.server.delete("/widget").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_shortcut_routes() {
    let h = harness();

    h.server
        .get("/widget/create")
        .add_query_param("name", "gear")
        .await
        .assert_status(StatusCode::CREATED);

    let response = h.server.get("/widget/find/1").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["name"], "gear");

    h.server.get("/widget/destroy/1").await.assert_status_ok();
    let response = h.server.get("/widget/find").await;
    let body: Value = response.json();
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_shortcuts_can_be_disabled() {
    let h = harness_with(BlueprintsConfig {
        shortcuts: false,
        ..Default::default()
    });
    let response = h.server.get("/widget/find").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Associations
// =============================================================================

#[tokio::test]
async fn test_add_new_child_through_join_model() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h
        .server
        .post("/widget/9/parts")
        .json(&json!({"name": "bolt"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["id"], 9);
    assert_eq!(body["name"], "gear");
    let parts = body["parts"].as_array().expect("parts populated");
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0]["name"], "bolt");

    let part_id = parts[0]["id"].clone();
    let joins = h.store.rows("widgetpart").expect("rows");
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0]["widgetId"], 9);
    assert_eq!(joins[0]["partId"], part_id);

    // the parent row itself is untouched
    let widgets = h.store.rows("widget").expect("rows");
    let gear = widgets.iter().find(|w| w["id"] == 9).expect("widget 9");
    assert!(gear.get("parts").is_none());
}

#[tokio::test]
async fn test_add_existing_child_then_populate() {
    let h = harness();
    seed_widgets(&h.server).await;
    h.server
        .post("/part")
        .json(&json!({"id": 3, "name": "nut"}))
        .await
        .assert_status(StatusCode::CREATED);

    h.server.post("/widget/9/parts/3").await.assert_status_ok();

    let response = h.server.get("/widget/9/parts").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!([{"id": 3, "name": "nut"}]));

    // other widgets do not see the link
    let response = h.server.get("/widget/10/parts").await;
    let body: Value = response.json();
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_add_unknown_child_is_404_and_links_nothing() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h.server.post("/widget/9/parts/77").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert!(h.store.rows("widgetpart").expect("rows").is_empty());
}

#[tokio::test]
async fn test_add_to_unknown_parent_creates_nothing() {
    let h = harness();

    let response = h
        .server
        .post("/widget/404/notes")
        .json(&json!({"body": "orphan"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert!(h.store.rows("note").expect("rows").is_empty());
}

#[tokio::test]
async fn test_direct_to_many_add_and_remove() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h
        .server
        .post("/widget/9/notes")
        .json(&json!({"body": "check torque"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let note_id = body["notes"][0]["id"].clone();
    assert_eq!(body["notes"][0]["body"], "check torque");

    let response = h.server.delete(&format!("/widget/9/notes/{note_id}")).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["notes"], json!([]));
}

#[tokio::test]
async fn test_remove_through_link_keeps_the_child() {
    let h = harness();
    seed_widgets(&h.server).await;
    h.server
        .post("/widget/9/parts")
        .json(&json!({"name": "bolt"}))
        .await
        .assert_status_ok();

    let response = h.server.delete("/widget/9/parts/1").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["parts"], json!([]));

    assert!(h.store.rows("widgetpart").expect("rows").is_empty());
    assert_eq!(h.store.rows("part").expect("rows").len(), 1);
}

#[tokio::test]
async fn test_remove_unlinked_child_is_404() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h.server.delete("/widget/9/parts/1").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_remove_without_child_id_is_a_usage_error() {
    let h = harness();
    seed_widgets(&h.server).await;

    let response = h.server.delete("/widget/9/parts").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn test_mutations_are_published_with_their_origin() {
    let h = harness();
    let mut events = h.bus.subscribe();

    h.server
        .post("/widget")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("client-1"),
        )
        .json(&json!({"id": 9, "name": "gear"}))
        .await
        .assert_status(StatusCode::CREATED);

    h.server
        .post("/widget/9/parts")
        .json(&json!({"name": "bolt"}))
        .await
        .assert_status_ok();

    let created = events.try_recv().expect("created event");
    assert_eq!(created.event.action(), "created");
    assert_eq!(created.event.model(), "widget");
    // mirror is on, so the origin is not excluded
    assert!(created.is_for("client-1"));

    let part = events.try_recv().expect("part created");
    assert_eq!(part.event.action(), "created");
    assert_eq!(part.event.model(), "part");

    let link = events.try_recv().expect("link added");
    assert_eq!(link.event.action(), "added");
    assert_eq!(link.event.model(), "widget");
}

#[tokio::test]
async fn test_created_records_name_the_watchers_of_their_model() {
    let h = harness();
    let mut events = h.bus.subscribe();

    h.server
        .get("/widget")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("watcher-1"),
        )
        .await
        .assert_status_ok();
    assert_eq!(h.bus.watchers("widget"), vec!["watcher-1"]);

    h.server
        .post("/widget")
        .json(&json!({"id": 9, "name": "gear"}))
        .await
        .assert_status(StatusCode::CREATED);

    let created = events.try_recv().expect("created event");
    assert!(created.is_watched_by("watcher-1"));
    assert!(!created.is_watched_by("client-2"));
}
