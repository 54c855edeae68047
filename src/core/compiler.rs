//! Request-to-query compiler
//!
//! Turns one request, for one [`BlueprintAction`] on one bound route, into the
//! [`QueryOptions`] the data service executes. Compilation is pure: the same
//! request against the same registry always yields the same descriptor.
//!
//! | Action   | Criteria                          | Payload                     |
//! |----------|-----------------------------------|-----------------------------|
//! | find     | where, pagination, sort, select   | populates                   |
//! | findOne  | `{pk: id}`                        | populates                   |
//! | create   |                                   | `new_record`, fetch         |
//! | update   | `{pk: id}`                        | `values_to_set`, fetch      |
//! | destroy  | `{pk: id}`                        | fetch                       |
//! | add      |                                   | alias, parent, child ids    |
//! | remove   |                                   | alias, parent, child ids    |
//! | populate | `{pk: parentid}`                  | one alias with sub-criteria |

use crate::core::associations::{self, RelationKind};
use crate::core::criteria;
use crate::core::error::BlueprintError;
use crate::core::extractors;
use crate::core::model::{ModelDescriptor, ModelRegistry};
use crate::core::query::{Criteria, DEFAULT_LIMIT, NewRecord, QueryOptions};
use crate::core::request::BlueprintRequest;
use crate::core::route::{BlueprintAction, RouteMetadata};
use crate::core::values;
use indexmap::IndexMap;
use serde_json::Value;

/// Params the populate action never turns into `where` terms
const POPULATE_BLACKLIST: [&str; 3] = ["id", "parentid", "childid"];

/// Compiles requests against a model registry
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }

    /// Compile `request` for `action` on the route described by `route`
    pub fn compile(
        &self,
        action: BlueprintAction,
        route: &RouteMetadata,
        request: &BlueprintRequest,
    ) -> Result<QueryOptions, BlueprintError> {
        let model = self.registry.require(&route.model)?;

        match action {
            BlueprintAction::Find => self.find(model, route, request),
            BlueprintAction::FindOne => self.find_one(model, route, request),
            BlueprintAction::Create => Ok(QueryOptions::new(&model.identity)
                .with_new_record(values::build(request, &route.options, &[]))
                .fetch()),
            BlueprintAction::Update => {
                let id = self.require_pk(model, route, request)?;
                let values = values::build_update(request, &route.options, &model.primary_key, &id);
                Ok(QueryOptions::by_pk(&model.identity, &model.primary_key, id)
                    .with_values(values)
                    .fetch())
            }
            BlueprintAction::Destroy => {
                let id = self.require_pk(model, route, request)?;
                Ok(QueryOptions::by_pk(&model.identity, &model.primary_key, id).fetch())
            }
            BlueprintAction::Add | BlueprintAction::Remove => {
                self.relation_mutation(action, model, route, request)
            }
            BlueprintAction::Populate => self.populate(model, route, request),
        }
    }

    fn find(
        &self,
        model: &ModelDescriptor,
        route: &RouteMetadata,
        request: &BlueprintRequest,
    ) -> Result<QueryOptions, BlueprintError> {
        let criteria = criteria::build(request, &route.options, &[])?;
        Ok(QueryOptions::new(&model.identity)
            .with_criteria(criteria)
            .with_populates(associations::resolve_populates(route, request)))
    }

    fn find_one(
        &self,
        model: &ModelDescriptor,
        route: &RouteMetadata,
        request: &BlueprintRequest,
    ) -> Result<QueryOptions, BlueprintError> {
        let id = self.require_pk(model, route, request)?;
        Ok(QueryOptions::by_pk(&model.identity, &model.primary_key, id)
            .with_populates(associations::resolve_populates(route, request)))
    }

    fn require_pk(
        &self,
        model: &ModelDescriptor,
        route: &RouteMetadata,
        request: &BlueprintRequest,
    ) -> Result<Value, BlueprintError> {
        extractors::primary_key(request, &route.options)
            .map(|id| model.coerce_pk(id))
            .ok_or_else(|| {
                BlueprintError::usage(
                    "No `id` parameter provided. (Even when the primary key is not named `id`, \
                     `id` is the parameter name; it is mapped to the real key.)",
                )
            })
    }

    fn require_parent(
        &self,
        model: &ModelDescriptor,
        request: &BlueprintRequest,
    ) -> Result<Value, BlueprintError> {
        extractors::parent_key(request)
            .map(|id| model.coerce_pk(id))
            .ok_or_else(|| BlueprintError::usage("No `parentid` parameter provided"))
    }

    fn relation_mutation(
        &self,
        action: BlueprintAction,
        model: &ModelDescriptor,
        route: &RouteMetadata,
        request: &BlueprintRequest,
    ) -> Result<QueryOptions, BlueprintError> {
        let association = associations::require_alias(route, action)?;
        let target = self.registry.require(&association.target)?;
        let parent_id = self.require_parent(model, request)?;
        let child_id = extractors::primary_key(request, &route.options).map(|id| target.coerce_pk(id));

        let mut query = QueryOptions::new(&model.identity);
        query.alias = Some(association.alias.clone());
        query.target_record_id = Some(parent_id.clone());

        match (action, child_id) {
            (_, Some(child_id)) => query.associated_ids = Some(vec![child_id]),
            (BlueprintAction::Remove, None) => {
                return Err(BlueprintError::usage(format!(
                    "Missing required `id` of the `{}` record to remove",
                    association.alias
                )));
            }
            (_, None) => {
                let mut child = values::build(request, &route.options, &values::ASSOCIATION_BLACKLIST);
                if associations::classify(association) == RelationKind::DirectToMany {
                    let records: Vec<_> = match &mut child {
                        NewRecord::Single(record) => vec![record],
                        NewRecord::Batch(records) => records.iter_mut().collect(),
                    };
                    for record in records {
                        record.insert(association.foreign_key.clone(), parent_id.clone());
                    }
                }
                query.new_record = Some(child);
            }
        }

        Ok(query)
    }

    fn populate(
        &self,
        model: &ModelDescriptor,
        route: &RouteMetadata,
        request: &BlueprintRequest,
    ) -> Result<QueryOptions, BlueprintError> {
        let association = associations::require_alias(route, BlueprintAction::Populate)?;
        let target = self.registry.require(&association.target)?;
        let parent_id = self.require_parent(model, request)?;

        let sub_criteria = if association.is_to_many() {
            let where_clause = match extractors::primary_key(request, &route.options) {
                Some(child_id) => Criteria::by_field(
                    &target.primary_key,
                    Value::Array(vec![target.coerce_pk(child_id)]),
                )
                .where_clause,
                None => criteria::build_where(request, &route.options, &POPULATE_BLACKLIST)?,
            };
            let skip = extractors::skip(request, &route.options).unwrap_or(0);
            Criteria {
                where_clause,
                sort: extractors::sort(request, &route.options),
                limit: Some(extractors::limit(request, &route.options).unwrap_or(DEFAULT_LIMIT)),
                skip: (skip > 0).then_some(skip),
                select: extractors::select(request),
                omit: extractors::omit(request),
            }
        } else {
            Criteria::default()
        };

        let mut populates = IndexMap::new();
        populates.insert(association.alias.clone(), sub_criteria);

        let mut query = QueryOptions::by_pk(&model.identity, &model.primary_key, parent_id)
            .with_populates(populates);
        query.alias = Some(association.alias.clone());
        Ok(query)
    }
}
