//! Association resolver
//!
//! Decides which associations a read expands, with which limit, and how a
//! relation routes its link/unlink writes.

use crate::core::error::ConfigError;
use crate::core::extractors;
use crate::core::model::{AssociationDescriptor, AssociationKind, ThroughDescriptor};
use crate::core::query::{Criteria, DEFAULT_LIMIT};
use crate::core::request::BlueprintRequest;
use crate::core::route::{BlueprintAction, RouteMetadata};
use crate::config::RouteOptions;
use indexmap::IndexMap;

/// How link/unlink writes reach an association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind<'a> {
    /// Foreign key on the parent
    DirectToOne,
    /// Foreign key on the child
    DirectToMany,
    /// Rows of a join model
    Through(&'a ThroughDescriptor),
}

/// Classify an association
pub fn classify(association: &AssociationDescriptor) -> RelationKind<'_> {
    match &association.kind {
        AssociationKind::ToOne => RelationKind::DirectToOne,
        AssociationKind::ToMany => RelationKind::DirectToMany,
        AssociationKind::ToManyThrough(through) => RelationKind::Through(through),
    }
}

/// Populate limit of a to-many association
///
/// Alias override, then `populate_limit`, then the request's limit, then the
/// default.
pub fn populate_limit(alias: &str, request: &BlueprintRequest, options: &RouteOptions) -> u64 {
    options
        .populate_limits
        .get(alias)
        .copied()
        .or(options.populate_limit)
        .or_else(|| extractors::limit(request, options))
        .unwrap_or(DEFAULT_LIMIT)
}

/// Sub-criteria for every association the request expands, in association order
pub fn resolve_populates(
    metadata: &RouteMetadata,
    request: &BlueprintRequest,
) -> IndexMap<String, Criteria> {
    let filter = extractors::populate_filter(request);

    metadata
        .associations
        .iter()
        .filter(|association| match &filter {
            Some(aliases) => aliases.iter().any(|a| a == &association.alias),
            None => metadata.populate,
        })
        .map(|association| {
            let criteria = if association.is_to_many() {
                Criteria {
                    limit: Some(populate_limit(&association.alias, request, &metadata.options)),
                    ..Default::default()
                }
            } else {
                Criteria::default()
            };
            (association.alias.clone(), criteria)
        })
        .collect()
}

/// Association named by the route's alias
///
/// Relation actions cannot run without one; the route was bound wrong.
pub fn require_alias(
    metadata: &RouteMetadata,
    action: BlueprintAction,
) -> Result<&AssociationDescriptor, ConfigError> {
    let alias = metadata
        .alias
        .as_deref()
        .ok_or_else(|| ConfigError::MissingAlias {
            model: metadata.model.clone(),
            action: action.as_str().to_string(),
        })?;

    metadata
        .association(alias)
        .ok_or_else(|| ConfigError::UnknownAssociation {
            model: metadata.model.clone(),
            alias: alias.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> RouteMetadata {
        RouteMetadata::new("widget").with_associations(vec![
            AssociationDescriptor {
                alias: "owner".into(),
                target: "user".into(),
                foreign_key: "ownerId".into(),
                kind: AssociationKind::ToOne,
            },
            AssociationDescriptor {
                alias: "parts".into(),
                target: "part".into(),
                foreign_key: "widgetId".into(),
                kind: AssociationKind::ToManyThrough(ThroughDescriptor {
                    model: "widgetpart".into(),
                    source_field: "widgetId".into(),
                    target_field: "partId".into(),
                }),
            },
            AssociationDescriptor {
                alias: "notes".into(),
                target: "note".into(),
                foreign_key: "widget".into(),
                kind: AssociationKind::ToMany,
            },
        ])
    }

    #[test]
    fn test_default_populate_expands_everything() {
        let populates = resolve_populates(&metadata(), &BlueprintRequest::new());
        let aliases: Vec<_> = populates.keys().cloned().collect();
        assert_eq!(aliases, vec!["owner", "parts", "notes"]);
        assert_eq!(populates["owner"].limit, None);
        assert_eq!(populates["parts"].limit, Some(30));
    }

    #[test]
    fn test_filter_wins_over_default() {
        let request = BlueprintRequest::new().with_query("populate", "notes,ghost,owner");
        let populates = resolve_populates(&metadata().with_populate(false), &request);
        let aliases: Vec<_> = populates.keys().cloned().collect();
        assert_eq!(aliases, vec!["owner", "notes"]);

        let none = BlueprintRequest::new().with_query("populate", "false");
        assert!(resolve_populates(&metadata(), &none).is_empty());
        assert!(resolve_populates(&metadata().with_populate(false), &BlueprintRequest::new()).is_empty());
    }

    #[test]
    fn test_limit_precedence() {
        let mut options = RouteOptions::default();
        let request = BlueprintRequest::new().with_query("limit", "12");
        assert_eq!(populate_limit("parts", &request, &options), 12);

        options.populate_limit = Some(8);
        assert_eq!(populate_limit("parts", &request, &options), 8);

        options.populate_limits.insert("parts".into(), 3);
        assert_eq!(populate_limit("parts", &request, &options), 3);
        assert_eq!(populate_limit("notes", &request, &options), 8);
    }

    #[test]
    fn test_classify_and_require_alias() {
        let metadata = metadata().with_alias("parts");
        let association = require_alias(&metadata, BlueprintAction::Add).unwrap();
        assert!(matches!(classify(association), RelationKind::Through(t) if t.target_field == "partId"));

        let missing = RouteMetadata::new("widget");
        assert_eq!(
            require_alias(&missing, BlueprintAction::Populate),
            Err(ConfigError::MissingAlias {
                model: "widget".into(),
                action: "populate".into()
            })
        );
    }
}
