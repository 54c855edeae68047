//! Blueprint configuration loading and per-model resolution

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn yes() -> bool {
    true
}

/// How a direct (foreign key) association is unlinked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DirectUnlink {
    /// Delete the child row
    #[default]
    Destroy,
    /// Keep the child row and null its foreign key
    ClearForeignKey,
}

/// A configured route prefix
///
/// Anything that is not a string is kept as `Invalid` so that boot can warn
/// about it and carry on without a prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefixSetting {
    Path(String),
    Invalid(serde_yaml::Value),
}

impl Default for PrefixSetting {
    fn default() -> Self {
        PrefixSetting::Path(String::new())
    }
}

impl From<&str> for PrefixSetting {
    fn from(value: &str) -> Self {
        PrefixSetting::Path(value.to_string())
    }
}

/// Normalize a prefix, returning the usable path and a warning to emit later
///
/// `what` names the setting in the warning (`prefix`, `rest_prefix`).
pub fn normalize_prefix(setting: &PrefixSetting, what: &str) -> (String, Option<String>) {
    match setting {
        PrefixSetting::Invalid(value) => (
            String::new(),
            Some(format!(
                "Ignoring invalid blueprint {what} {value:?}: `{what}` should be a string, e.g. \"/api/v1\""
            )),
        ),
        PrefixSetting::Path(path) => {
            let trimmed = path.trim().trim_end_matches('/');
            if trimmed.is_empty() {
                (String::new(), None)
            } else if trimmed.starts_with('/') {
                (trimmed.to_string(), None)
            } else {
                let fixed = format!("/{trimmed}");
                let warning = format!(
                    "Invalid blueprint {what} (\"{path}\"), should start with a `/`; assuming you meant \"{fixed}\""
                );
                (fixed, Some(warning))
            }
        }
    }
}

/// Filter-building options of a route
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteriaOptions {
    /// Params never turned into `where` terms; replaces the built-in list
    pub blacklist: Option<Vec<String>>,
}

/// Payload-building options of a route
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuesOptions {
    pub blacklist: Vec<String>,
    /// Merged underneath every submitted record
    pub defaults: Map<String, Value>,
}

/// Options carried by every route of a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    /// Forced primary key
    pub id: Option<Value>,

    /// Forced filter, merged over the client's with server keys winning
    #[serde(rename = "where")]
    pub where_clause: Option<Map<String, Value>>,

    pub criteria: CriteriaOptions,
    pub values: ValuesOptions,

    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub sort: Option<Value>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,

    /// Limit applied to every to-many populate
    pub populate_limit: Option<u64>,
    /// Per-alias populate limits, winning over `populate_limit`
    pub populate_limits: IndexMap<String, u64>,
}

impl RouteOptions {
    /// Layer `other` on top of `self`; set fields of `other` win
    pub fn overlay(&self, other: &RouteOptions) -> RouteOptions {
        let mut values = self.values.clone();
        if !other.values.blacklist.is_empty() {
            values.blacklist = other.values.blacklist.clone();
        }
        for (key, value) in &other.values.defaults {
            values.defaults.insert(key.clone(), value.clone());
        }

        let mut populate_limits = self.populate_limits.clone();
        populate_limits.extend(other.populate_limits.clone());

        RouteOptions {
            id: other.id.clone().or_else(|| self.id.clone()),
            where_clause: other
                .where_clause
                .clone()
                .or_else(|| self.where_clause.clone()),
            criteria: CriteriaOptions {
                blacklist: other
                    .criteria
                    .blacklist
                    .clone()
                    .or_else(|| self.criteria.blacklist.clone()),
            },
            values,
            limit: other.limit.or(self.limit),
            skip: other.skip.or(self.skip),
            sort: other.sort.clone().or_else(|| self.sort.clone()),
            page: other.page.or(self.page),
            per_page: other.per_page.or(self.per_page),
            populate_limit: other.populate_limit.or(self.populate_limit),
            populate_limits,
        }
    }
}

/// Per-model overrides of the global settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOverrides {
    pub actions: Option<bool>,
    pub shortcuts: Option<bool>,
    pub rest: Option<bool>,
    pub pluralize: Option<bool>,
    pub populate: Option<bool>,
    pub auto_watch: Option<bool>,
    pub prefix: Option<PrefixSetting>,
    pub rest_prefix: Option<PrefixSetting>,
    pub options: Option<RouteOptions>,
}

/// Blueprint settings after per-model overrides are applied
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBlueprintConfig {
    pub actions: bool,
    pub shortcuts: bool,
    pub rest: bool,
    pub pluralize: bool,
    pub populate: bool,
    pub auto_watch: bool,
    pub prefix: PrefixSetting,
    pub rest_prefix: PrefixSetting,
    pub options: RouteOptions,
}

/// Complete blueprint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintsConfig {
    /// Bind custom actions under `{prefix}/{key}`
    #[serde(default = "yes")]
    pub actions: bool,

    /// Bind GET-only shortcut routes
    #[serde(default = "yes")]
    pub shortcuts: bool,

    /// Bind REST routes
    #[serde(default = "yes")]
    pub rest: bool,

    /// Bind `index` actions at their stripped path
    #[serde(default)]
    pub index: bool,

    #[serde(default)]
    pub prefix: PrefixSetting,

    /// Extra prefix for REST routes only
    #[serde(default)]
    pub rest_prefix: PrefixSetting,

    #[serde(default)]
    pub pluralize: bool,

    /// Expand every association when the request names none
    #[serde(default = "yes")]
    pub populate: bool,

    /// Subscribe watchers to records created by `find`
    #[serde(default = "yes")]
    pub auto_watch: bool,

    /// Also notify the originating request
    #[serde(default)]
    pub mirror: bool,

    #[serde(default)]
    pub direct_unlink: DirectUnlink,

    #[serde(default)]
    pub options: RouteOptions,

    /// Overrides keyed by model identity
    #[serde(default)]
    pub models: IndexMap<String, ModelOverrides>,

    /// Removed setting, see [`BlueprintsConfig::legacy_notices`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<Value>,

    /// Removed setting, see [`BlueprintsConfig::legacy_notices`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonp: Option<Value>,
}

impl Default for BlueprintsConfig {
    fn default() -> Self {
        Self {
            actions: true,
            shortcuts: true,
            rest: true,
            index: false,
            prefix: PrefixSetting::default(),
            rest_prefix: PrefixSetting::default(),
            pluralize: false,
            populate: true,
            auto_watch: true,
            mirror: false,
            direct_unlink: DirectUnlink::default(),
            options: RouteOptions::default(),
            models: IndexMap::new(),
            default_limit: None,
            jsonp: None,
        }
    }
}

impl BlueprintsConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Settings for one model, overrides applied
    pub fn for_model(&self, identity: &str) -> ModelBlueprintConfig {
        let overrides = self.models.get(identity);
        let pick = |get: fn(&ModelOverrides) -> Option<bool>, global: bool| {
            overrides.and_then(get).unwrap_or(global)
        };

        ModelBlueprintConfig {
            actions: pick(|o| o.actions, self.actions),
            shortcuts: pick(|o| o.shortcuts, self.shortcuts),
            rest: pick(|o| o.rest, self.rest),
            pluralize: pick(|o| o.pluralize, self.pluralize),
            populate: pick(|o| o.populate, self.populate),
            auto_watch: pick(|o| o.auto_watch, self.auto_watch),
            prefix: overrides
                .and_then(|o| o.prefix.clone())
                .unwrap_or_else(|| self.prefix.clone()),
            rest_prefix: overrides
                .and_then(|o| o.rest_prefix.clone())
                .unwrap_or_else(|| self.rest_prefix.clone()),
            options: match overrides.and_then(|o| o.options.as_ref()) {
                Some(model_options) => self.options.overlay(model_options),
                None => self.options.clone(),
            },
        }
    }

    /// Whether custom actions under `identity` were switched off
    pub fn actions_disabled_for(&self, identity: &str) -> bool {
        self.models
            .get(identity)
            .and_then(|o| o.actions)
            .is_some_and(|enabled| !enabled)
    }

    /// Migration notices for settings that no longer have an effect
    pub fn legacy_notices(&self) -> Vec<String> {
        let mut notices = Vec::new();
        if self.default_limit.is_some() {
            notices.push(
                "The `default_limit` blueprint setting is no longer supported; set \
                 `options.limit` instead (using the default limit of 30)"
                    .to_string(),
            );
        }
        if self.jsonp.is_some() {
            notices.push(
                "The `jsonp` blueprint setting is no longer supported and is ignored".to_string(),
            );
        }
        notices
    }
}
