//! Blueprint actions and the metadata frozen into each bound route

use crate::config::RouteOptions;
use crate::core::model::AssociationDescriptor;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The eight pre-built blueprint actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BlueprintAction {
    Find,
    FindOne,
    Create,
    Update,
    Destroy,
    Add,
    Remove,
    Populate,
}

impl BlueprintAction {
    pub const ALL: [BlueprintAction; 8] = [
        BlueprintAction::Find,
        BlueprintAction::FindOne,
        BlueprintAction::Create,
        BlueprintAction::Update,
        BlueprintAction::Destroy,
        BlueprintAction::Add,
        BlueprintAction::Remove,
        BlueprintAction::Populate,
    ];

    /// Name used in route targets (`widget/findOne`)
    pub fn as_str(&self) -> &'static str {
        match self {
            BlueprintAction::Find => "find",
            BlueprintAction::FindOne => "findOne",
            BlueprintAction::Create => "create",
            BlueprintAction::Update => "update",
            BlueprintAction::Destroy => "destroy",
            BlueprintAction::Add => "add",
            BlueprintAction::Remove => "remove",
            BlueprintAction::Populate => "populate",
        }
    }

    /// Actions that need an association alias on the route
    pub fn requires_alias(&self) -> bool {
        matches!(
            self,
            BlueprintAction::Add | BlueprintAction::Remove | BlueprintAction::Populate
        )
    }
}

impl fmt::Display for BlueprintAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlueprintAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlueprintAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("Unknown blueprint action: {s}"))
    }
}

/// Snapshot bound into a route at boot
///
/// Owns a copy of the model's associations; registering a model again after
/// binding does not change what an existing route sees.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMetadata {
    pub model: String,
    pub alias: Option<String>,
    pub associations: Vec<AssociationDescriptor>,
    pub auto_watch: bool,
    /// Expand associations when the request names none
    pub populate: bool,
    pub options: RouteOptions,
}

impl RouteMetadata {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            alias: None,
            associations: Vec::new(),
            auto_watch: true,
            populate: true,
            options: RouteOptions::default(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_associations(mut self, associations: Vec<AssociationDescriptor>) -> Self {
        self.associations = associations;
        self
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    pub fn with_auto_watch(mut self, auto_watch: bool) -> Self {
        self.auto_watch = auto_watch;
        self
    }

    /// Association of the snapshot with the given alias
    pub fn association(&self, alias: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.alias == alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_round_trip() {
        for action in BlueprintAction::ALL {
            assert_eq!(action.as_str().parse::<BlueprintAction>(), Ok(action));
        }
        assert!("archive".parse::<BlueprintAction>().is_err());
    }

    #[test]
    fn test_alias_requirement() {
        assert!(BlueprintAction::Populate.requires_alias());
        assert!(!BlueprintAction::FindOne.requires_alias());
    }
}
