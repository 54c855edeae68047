//! Route table generation
//!
//! Runs once at boot, after the model registry is final, and turns models,
//! associations and configuration into a flat list of [`RouteBinding`]s. The
//! table is plain data; `server::router` lowers it onto axum.
//!
//! Strategies are applied in this order, each one skipping models or actions it
//! is switched off for:
//!
//! 1. **actions**: `ALL {prefix}/{key}` for every custom action key
//! 2. **shortcuts**: GET-only CRUD (`/find`, `/create`, `/update/:id`, ...) and
//!    `.../add` / `.../remove` for to-many associations
//! 3. **rest**: `GET`/`POST`/`PATCH`/`PUT`/`DELETE` on `{base}` and
//!    `{base}/:id`, plus association sub-routes
//! 4. **index**: `ALL /{stripped}` for keys equal to or ending in `index`
//!
//! The first binding of a verb and path wins; later ones are logged and
//! dropped.

use crate::config::{BlueprintsConfig, ModelBlueprintConfig, normalize_prefix};
use crate::core::model::{ModelDescriptor, ModelRegistry};
use crate::core::pluralize::Pluralizer;
use crate::core::route::{BlueprintAction, RouteMetadata};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Identity skipped while a model uses it as its archive
const ARCHIVE: &str = "archive";

/// HTTP verb of a binding; `All` matches any method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Patch,
    Put,
    Delete,
    All,
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Put => "PUT",
            HttpVerb::Delete => "DELETE",
            HttpVerb::All => "ALL",
        };
        f.write_str(verb)
    }
}

/// What a binding runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// `<model>/<action>`
    Blueprint {
        model: String,
        action: BlueprintAction,
    },
    /// A custom action registered under this key
    Action(String),
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::Blueprint { model, action } => write!(f, "{model}/{action}"),
            RouteTarget::Action(key) => f.write_str(key),
        }
    }
}

/// One bound route
///
/// `path` is a template: `:name` is a parameter, `:name?` an optional trailing
/// parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteBinding {
    pub verb: HttpVerb,
    pub path: String,
    pub target: RouteTarget,
    /// Snapshot taken at bind time; blueprint routes only
    pub metadata: Option<Arc<RouteMetadata>>,
    /// Logged on every request to a deprecated route
    pub deprecation: Option<String>,
}

/// Every binding produced at boot, with warnings to emit once serving
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    bindings: Vec<RouteBinding>,
    deferred_warnings: Vec<String>,
}

impl RouteTable {
    pub fn bindings(&self) -> &[RouteBinding] {
        &self.bindings
    }

    /// Binding for an exact verb and template
    pub fn find(&self, verb: HttpVerb, path: &str) -> Option<&RouteBinding> {
        self.bindings
            .iter()
            .find(|b| b.verb == verb && b.path == path)
    }

    /// `VERB path` of every binding, in bind order
    pub fn routes(&self) -> Vec<String> {
        self.bindings
            .iter()
            .map(|b| format!("{} {}", b.verb, b.path))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Configuration problems found while binding
    pub fn deferred_warnings(&self) -> &[String] {
        &self.deferred_warnings
    }

    /// Log the deferred warnings; called once the server listens
    pub fn emit_deferred_warnings(&self) {
        for warning in &self.deferred_warnings {
            tracing::warn!("{}", warning);
        }
    }
}

/// Builds a [`RouteTable`] from a registry and a configuration
pub struct RouteTableGenerator<'a> {
    registry: &'a ModelRegistry,
    config: &'a BlueprintsConfig,
    actions: Vec<String>,
}

impl<'a> RouteTableGenerator<'a> {
    pub fn new(registry: &'a ModelRegistry, config: &'a BlueprintsConfig) -> Self {
        Self {
            registry,
            config,
            actions: Vec::new(),
        }
    }

    /// Custom action keys (`widget/hello`, `index`, ...) to bind
    pub fn with_actions<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn generate(&self) -> RouteTable {
        let mut binder = Binder::default();
        for notice in self.config.legacy_notices() {
            binder.defer(notice);
        }

        let (global_prefix, warning) = normalize_prefix(&self.config.prefix, "prefix");
        if let Some(warning) = warning {
            binder.defer(warning);
        }

        if self.config.actions {
            for key in self.actions.iter().filter(|key| !self.actions_disabled(key)) {
                binder.bind(
                    HttpVerb::All,
                    format!("{global_prefix}/{key}"),
                    RouteTarget::Action(key.clone()),
                    None,
                );
            }
        }

        let skip_archive = self.registry.default_archive_in_use();
        let models: Vec<&ModelDescriptor> = self
            .registry
            .models()
            .filter(|m| !(skip_archive && m.identity == ARCHIVE))
            .collect();

        for model in &models {
            let settings = self.config.for_model(&model.identity);
            if settings.shortcuts {
                self.bind_shortcuts(&mut binder, model, &settings);
            }
        }

        for model in &models {
            let settings = self.config.for_model(&model.identity);
            if settings.rest {
                self.bind_rest(&mut binder, model, &settings);
            }
        }

        if self.config.index {
            for key in self.actions.iter().filter(|key| !self.actions_disabled(key)) {
                if key == "index" || key.ends_with("/index") {
                    let stripped = key.strip_suffix("index").unwrap_or(key).trim_end_matches('/');
                    binder.bind(
                        HttpVerb::All,
                        format!("/{stripped}"),
                        RouteTarget::Action(key.clone()),
                        None,
                    );
                }
            }
        }

        binder.finish()
    }

    /// Custom actions living under a model whose `actions` override is off
    fn actions_disabled(&self, key: &str) -> bool {
        self.config
            .models
            .keys()
            .any(|identity| key.starts_with(identity.as_str()) && self.config.actions_disabled_for(identity))
    }

    fn base_name(&self, model: &ModelDescriptor, settings: &ModelBlueprintConfig) -> String {
        if settings.pluralize {
            Pluralizer::pluralize(&model.identity)
        } else {
            model.identity.clone()
        }
    }

    fn metadata(&self, model: &ModelDescriptor, settings: &ModelBlueprintConfig) -> RouteMetadata {
        RouteMetadata::new(&model.identity)
            .with_associations(model.associations.clone())
            .with_options(settings.options.clone())
            .with_populate(settings.populate)
            .with_auto_watch(settings.auto_watch)
    }

    fn bind_shortcuts(&self, binder: &mut Binder, model: &ModelDescriptor, settings: &ModelBlueprintConfig) {
        let (prefix, warning) = normalize_prefix(&settings.prefix, "prefix");
        if let Some(warning) = warning {
            binder.defer(warning);
        }
        let base = format!("{prefix}/{}", self.base_name(model, settings));
        let metadata = Arc::new(self.metadata(model, settings));

        for (suffix, action) in [
            ("/find", BlueprintAction::Find),
            ("/find/:id", BlueprintAction::FindOne),
            ("/create", BlueprintAction::Create),
            ("/update/:id", BlueprintAction::Update),
            ("/destroy/:id", BlueprintAction::Destroy),
        ] {
            binder.bind_blueprint(HttpVerb::Get, format!("{base}{suffix}"), model, action, &metadata);
        }

        for association in model.associations.iter().filter(|a| a.is_to_many()) {
            let metadata = Arc::new(self.metadata(model, settings).with_alias(&association.alias));
            let alias = &association.alias;
            binder.bind_blueprint(
                HttpVerb::Get,
                format!("{base}/:parentid/{alias}/add/:id?"),
                model,
                BlueprintAction::Add,
                &metadata,
            );
            binder.bind_blueprint(
                HttpVerb::Get,
                format!("{base}/:parentid/{alias}/remove/:id?"),
                model,
                BlueprintAction::Remove,
                &metadata,
            );
        }
    }

    fn bind_rest(&self, binder: &mut Binder, model: &ModelDescriptor, settings: &ModelBlueprintConfig) {
        let (prefix, warning) = normalize_prefix(&settings.prefix, "prefix");
        if let Some(warning) = warning {
            binder.defer(warning);
        }
        let (rest_prefix, warning) = normalize_prefix(&settings.rest_prefix, "rest_prefix");
        if let Some(warning) = warning {
            binder.defer(warning);
        }
        let base = format!("{prefix}{rest_prefix}/{}", self.base_name(model, settings));
        let metadata = Arc::new(self.metadata(model, settings));

        for (verb, suffix, action) in [
            (HttpVerb::Get, "", BlueprintAction::Find),
            (HttpVerb::Get, "/:id", BlueprintAction::FindOne),
            (HttpVerb::Post, "", BlueprintAction::Create),
            (HttpVerb::Patch, "/:id", BlueprintAction::Update),
            (HttpVerb::Delete, "/:id?", BlueprintAction::Destroy),
        ] {
            binder.bind_blueprint(verb, format!("{base}{suffix}"), model, action, &metadata);
        }

        binder.bind_with(
            HttpVerb::Put,
            format!("{base}/:id"),
            RouteTarget::Blueprint {
                model: model.identity.clone(),
                action: BlueprintAction::Update,
            },
            Some(metadata.clone()),
            Some(format!(
                "Using `PUT` to update a `{}` record is deprecated; use `PATCH` instead",
                model.identity
            )),
        );

        for association in &model.associations {
            let metadata = Arc::new(self.metadata(model, settings).with_alias(&association.alias));
            let alias = &association.alias;
            if association.is_to_many() {
                binder.bind_blueprint(
                    HttpVerb::Post,
                    format!("{base}/:parentid/{alias}/:id?"),
                    model,
                    BlueprintAction::Add,
                    &metadata,
                );
                binder.bind_blueprint(
                    HttpVerb::Delete,
                    format!("{base}/:parentid/{alias}/:id?"),
                    model,
                    BlueprintAction::Remove,
                    &metadata,
                );
            }
            binder.bind_blueprint(
                HttpVerb::Get,
                format!("{base}/:parentid/{alias}"),
                model,
                BlueprintAction::Populate,
                &metadata,
            );
        }
    }
}

#[derive(Default)]
struct Binder {
    bindings: Vec<RouteBinding>,
    seen: HashSet<(HttpVerb, String)>,
    warnings: Vec<String>,
}

impl Binder {
    fn defer(&mut self, warning: String) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    fn bind(
        &mut self,
        verb: HttpVerb,
        path: String,
        target: RouteTarget,
        metadata: Option<Arc<RouteMetadata>>,
    ) {
        self.bind_with(verb, path, target, metadata, None);
    }

    fn bind_blueprint(
        &mut self,
        verb: HttpVerb,
        path: String,
        model: &ModelDescriptor,
        action: BlueprintAction,
        metadata: &Arc<RouteMetadata>,
    ) {
        let target = RouteTarget::Blueprint {
            model: model.identity.clone(),
            action,
        };
        self.bind(verb, path, target, Some(metadata.clone()));
    }

    fn bind_with(
        &mut self,
        verb: HttpVerb,
        path: String,
        target: RouteTarget,
        metadata: Option<Arc<RouteMetadata>>,
        deprecation: Option<String>,
    ) {
        if !self.seen.insert((verb, path.clone())) {
            tracing::warn!(%verb, %path, %target, "route already bound, skipping");
            return;
        }
        tracing::debug!(%verb, %path, %target, "binding route");
        self.bindings.push(RouteBinding {
            verb,
            path,
            target,
            metadata,
            deprecation,
        });
    }

    fn finish(self) -> RouteTable {
        RouteTable {
            bindings: self.bindings,
            deferred_warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{AssociationDefinition, ModelDefinition};

    fn registry() -> ModelRegistry {
        ModelRegistry::from_definitions([
            ModelDefinition::new("widget")
                .association(AssociationDefinition::to_many("items", "item", "widget")),
            ModelDefinition::new("item"),
        ])
        .unwrap()
    }

    #[test]
    fn test_metadata_is_a_snapshot_per_alias() {
        let registry = registry();
        let config = BlueprintsConfig::default();
        let table = RouteTableGenerator::new(&registry, &config).generate();

        let populate = table
            .find(HttpVerb::Get, "/widget/:parentid/items")
            .and_then(|b| b.metadata.clone())
            .unwrap();
        assert_eq!(populate.alias.as_deref(), Some("items"));
        assert_eq!(populate.associations.len(), 1);

        let find = table.find(HttpVerb::Get, "/widget").unwrap();
        assert_eq!(find.metadata.as_ref().unwrap().alias, None);
    }

    #[test]
    fn test_registering_again_leaves_bound_metadata_alone() {
        let mut registry = registry();
        let config = BlueprintsConfig::default();
        let table = RouteTableGenerator::new(&registry, &config).generate();
        let bound = table
            .find(HttpVerb::Get, "/widget")
            .and_then(|b| b.metadata.clone())
            .unwrap();
        let before = bound.associations.clone();

        registry
            .register(
                ModelDefinition::new("widget")
                    .association(AssociationDefinition::to_many("items", "item", "widget"))
                    .association(AssociationDefinition::to_one("owner", "item", "owner")),
            )
            .unwrap();
        assert_eq!(registry.get("widget").unwrap().associations.len(), 2);

        assert_eq!(bound.associations, before);
        assert_eq!(bound.associations.len(), 1);
        let still_bound = table.find(HttpVerb::Get, "/widget/:parentid/items").unwrap();
        assert_eq!(
            still_bound.metadata.as_ref().unwrap().associations,
            before
        );
    }

    #[test]
    fn test_put_is_deprecated() {
        let registry = registry();
        let config = BlueprintsConfig::default();
        let table = RouteTableGenerator::new(&registry, &config).generate();
        let put = table.find(HttpVerb::Put, "/widget/:id").unwrap();
        assert!(put.deprecation.is_some());
        assert_eq!(put.target.to_string(), "widget/update");
    }

    #[test]
    fn test_repeated_action_key_is_bound_once() {
        let registry = registry();
        let config = BlueprintsConfig::default();
        let table = RouteTableGenerator::new(&registry, &config)
            .with_actions(["widget/find", "widget/find"])
            .generate();
        let bound: Vec<_> = table
            .bindings()
            .iter()
            .filter(|b| b.path == "/widget/find")
            .collect();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].verb, HttpVerb::All);
        assert_eq!(bound[1].verb, HttpVerb::Get);
    }
}
