//! Widgets example: a small parts catalogue served by the blueprints
//!
//! ```text
//! cargo run --example widgets
//!
//! curl -X POST localhost:3000/api/widgets -d '{"name":"gear","color":"red"}'
//! curl -X POST localhost:3000/api/widgets/1/parts -d '{"name":"bolt"}'
//! curl 'localhost:3000/api/widgets?where={"color":"red"}&sort=name%20ASC'
//! curl -X DELETE localhost:3000/api/widgets/1/parts/1
//! curl localhost:3000/api/hello
//! ```

use axum::Json;
use blueprints::logging::init_tracing;
use blueprints::prelude::*;

const SETTINGS: &str = r#"
prefix: /api
pluralize: true
options:
  populate_limit: 10
models:
  note:
    shortcuts: false
"#;

fn registry() -> Result<ModelRegistry> {
    Ok(ModelRegistry::from_definitions([
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
        ModelDefinition::new("widgetpart"),
        ModelDefinition::new("note")
            .attribute("id", AttributeType::Integer)
            .attribute("body", AttributeType::String),
    ])?)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(None);

    let registry = Arc::new(registry()?);
    let config = BlueprintsConfig::from_yaml_str(SETTINGS)?;

    let bus = EventBus::new(256);
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(envelope) = events.recv().await {
            tracing::info!(
                model = envelope.event.model(),
                action = envelope.event.action(),
                "change published"
            );
        }
    });

    ServerBuilder::new()
        .with_registry(registry.clone())
        .with_config(config)
        .with_data_service(InMemoryDataService::new(registry))
        .with_notifier(bus)
        .with_action("hello", any(|| async { Json(json!({"hello": "world"})) }))
        .with_cors()
        .serve("127.0.0.1:3000")
        .await
}
