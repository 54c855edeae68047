//! Integration tests for route table generation

use blueprints::prelude::*;

fn registry() -> ModelRegistry {
    ModelRegistry::from_definitions([
        ModelDefinition::new("widget")
            .association(AssociationDefinition::to_many("items", "item", "widget")),
        ModelDefinition::new("item"),
    ])
    .expect("valid registry")
}

/// Configuration that only binds routes for `widget`
fn widget_only(yaml: &str) -> BlueprintsConfig {
    let mut config = BlueprintsConfig::from_yaml_str(yaml).expect("valid config");
    config.models.insert(
        "item".into(),
        ModelOverrides {
            shortcuts: Some(false),
            rest: Some(false),
            ..Default::default()
        },
    );
    config
}

fn routes(registry: &ModelRegistry, config: &BlueprintsConfig) -> Vec<String> {
    RouteTableGenerator::new(registry, config).generate().routes()
}

// =============================================================================
// Strategies
// =============================================================================

#[test]
fn test_rest_routes_for_a_to_many_alias() {
    let registry = registry();
    let config = widget_only("shortcuts: false");

    assert_eq!(
        routes(&registry, &config),
        vec![
            "GET /widget",
            "GET /widget/:id",
            "POST /widget",
            "PATCH /widget/:id",
            "DELETE /widget/:id?",
            "PUT /widget/:id",
            "POST /widget/:parentid/items/:id?",
            "DELETE /widget/:parentid/items/:id?",
            "GET /widget/:parentid/items",
        ]
    );
}

#[test]
fn test_shortcut_routes() {
    let registry = registry();
    let config = widget_only("rest: false");

    assert_eq!(
        routes(&registry, &config),
        vec![
            "GET /widget/find",
            "GET /widget/find/:id",
            "GET /widget/create",
            "GET /widget/update/:id",
            "GET /widget/destroy/:id",
            "GET /widget/:parentid/items/add/:id?",
            "GET /widget/:parentid/items/remove/:id?",
        ]
    );
}

#[test]
fn test_to_one_alias_only_gets_populate() {
    let registry = ModelRegistry::from_definitions([
        ModelDefinition::new("widget")
            .association(AssociationDefinition::to_one("owner", "user", "owner")),
        ModelDefinition::new("user"),
    ])
    .expect("valid registry");
    let config = BlueprintsConfig::default();
    let table = RouteTableGenerator::new(&registry, &config).generate();

    let owner_routes: Vec<_> = table
        .routes()
        .into_iter()
        .filter(|r| r.contains("owner"))
        .collect();
    assert_eq!(owner_routes, vec!["GET /widget/:parentid/owner"]);
}

#[test]
fn test_shortcuts_are_bound_before_rest() {
    let registry = registry();
    let config = BlueprintsConfig::default();
    let all = routes(&registry, &config);

    let last_shortcut = all
        .iter()
        .rposition(|r| r.contains("/find") || r.contains("/add") || r.contains("/remove"))
        .expect("shortcut routes");
    let first_rest = all.iter().position(|r| r == "POST /widget").expect("rest routes");
    assert!(last_shortcut < first_rest);
}

#[test]
fn test_actions_are_bound_under_the_prefix() {
    let registry = registry();
    let config = widget_only("prefix: /api\nshortcuts: false\nrest: false");
    let table = RouteTableGenerator::new(&registry, &config)
        .with_actions(["widget/hello", "stats"])
        .generate();

    assert_eq!(table.routes(), vec!["ALL /api/widget/hello", "ALL /api/stats"]);
    let hello = &table.bindings()[0];
    assert_eq!(hello.target, RouteTarget::Action("widget/hello".into()));
    assert!(hello.metadata.is_none());
}

#[test]
fn test_actions_switched_off_per_model() {
    let registry = registry();
    let mut config = widget_only("shortcuts: false\nrest: false");
    config.models.insert(
        "widget".into(),
        ModelOverrides {
            actions: Some(false),
            ..Default::default()
        },
    );
    let table = RouteTableGenerator::new(&registry, &config)
        .with_actions(["widget/hello", "stats"])
        .generate();
    assert_eq!(table.routes(), vec!["ALL /stats"]);
}

#[test]
fn test_actions_switched_off_globally() {
    let registry = registry();
    let config = widget_only("actions: false\nshortcuts: false\nrest: false");
    let table = RouteTableGenerator::new(&registry, &config)
        .with_actions(["stats"])
        .generate();
    assert!(table.is_empty());
}

#[test]
fn test_index_actions_bind_at_their_stripped_path() {
    let registry = registry();
    let config = widget_only("index: true\nshortcuts: false\nrest: false");
    let table = RouteTableGenerator::new(&registry, &config)
        .with_actions(["index", "widget/index", "widget/hello"])
        .generate();

    assert_eq!(
        table.routes(),
        vec![
            "ALL /index",
            "ALL /widget/index",
            "ALL /widget/hello",
            "ALL /",
            "ALL /widget",
        ]
    );
}

#[test]
fn test_repeated_action_key_is_bound_once() {
    let registry = registry();
    let config = widget_only("shortcuts: false\nrest: false");
    let table = RouteTableGenerator::new(&registry, &config)
        .with_actions(["stats", "stats"])
        .generate();
    assert_eq!(table.len(), 1);
}

// =============================================================================
// Naming
// =============================================================================

#[test]
fn test_pluralized_base_routes() {
    let registry = registry();
    let config = widget_only("pluralize: true\nshortcuts: false");
    let table = RouteTableGenerator::new(&registry, &config).generate();

    assert!(table.find(HttpVerb::Get, "/widgets").is_some());
    assert!(table.find(HttpVerb::Get, "/widgets/:parentid/items").is_some());
    assert!(table.find(HttpVerb::Get, "/widget").is_none());
}

#[test]
fn test_rest_prefix_applies_to_rest_only() {
    let registry = registry();
    let config = widget_only("prefix: /api\nrest_prefix: /v1");
    let table = RouteTableGenerator::new(&registry, &config).generate();

    assert!(table.find(HttpVerb::Get, "/api/widget/find").is_some());
    assert!(table.find(HttpVerb::Get, "/api/v1/widget").is_some());
    assert!(table.find(HttpVerb::Get, "/api/widget").is_none());
    assert!(table.deferred_warnings().is_empty());
}

#[test]
fn test_prefix_without_slash_is_fixed_with_one_warning() {
    let registry = registry();
    let config = BlueprintsConfig::from_yaml_str("prefix: api/").expect("valid config");
    let table = RouteTableGenerator::new(&registry, &config).generate();

    assert!(table.find(HttpVerb::Get, "/api/widget").is_some());
    assert!(table.find(HttpVerb::Get, "/api/item/:id").is_some());
    assert_eq!(table.deferred_warnings().len(), 1);
    assert!(table.deferred_warnings()[0].contains("assuming you meant \"/api\""));
}

#[test]
fn test_non_string_prefix_is_ignored_with_a_warning() {
    let registry = registry();
    let config = BlueprintsConfig::from_yaml_str("prefix: 5").expect("valid config");
    let table = RouteTableGenerator::new(&registry, &config).generate();

    assert!(table.find(HttpVerb::Get, "/widget").is_some());
    assert_eq!(table.deferred_warnings().len(), 1);
    assert!(table.deferred_warnings()[0].contains("should be a string"));
}

#[test]
fn test_legacy_settings_are_reported() {
    let registry = registry();
    let config =
        BlueprintsConfig::from_yaml_str("default_limit: 50\njsonp: true").expect("valid config");
    let table = RouteTableGenerator::new(&registry, &config).generate();

    let warnings = table.deferred_warnings();
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].contains("default_limit"));
    assert!(warnings[1].contains("jsonp"));
}

// =============================================================================
// Archive
// =============================================================================

#[test]
fn test_default_archive_model_gets_no_routes() {
    let mut widget = ModelDefinition::new("widget");
    widget.archive_model = Some("archive".into());
    let registry = ModelRegistry::from_definitions([widget, ModelDefinition::new("archive")])
        .expect("valid registry");
    let config = BlueprintsConfig::default();
    let all = routes(&registry, &config);

    assert!(all.iter().any(|r| r == "GET /widget"));
    assert!(!all.iter().any(|r| r.contains("/archive")));
}

#[test]
fn test_archive_model_not_in_use_is_routed() {
    let registry = ModelRegistry::from_definitions([
        ModelDefinition::new("widget"),
        ModelDefinition::new("archive"),
    ])
    .expect("valid registry");
    let config = BlueprintsConfig::default();
    assert!(routes(&registry, &config).iter().any(|r| r == "GET /archive"));
}
