//! Link and unlink actions: add, remove
//!
//! Both actions are planned as a [`TaskGraph`] first and then executed, so
//! every shape of mutation is visible as data:
//!
//! | Relation  | add with child id               | add with payload                   | remove                          |
//! |-----------|---------------------------------|------------------------------------|---------------------------------|
//! | to-many   | load child, set its foreign key | create child with foreign key set  | destroy child, or clear its key |
//! | through   | load child, create join row     | create child, then join row        | destroy matching join rows      |
//!
//! Every plan starts by loading the parent and ends by re-fetching it; the
//! re-fetched parent is the response.

use super::handlers::record_id;
use super::tasks::{ChildRef, Step, TaskGraph, TaskOutputs};
use super::{BlueprintResponse, BlueprintState};
use crate::config::DirectUnlink;
use crate::core::associations::{self, RelationKind};
use crate::core::compiler::QueryCompiler;
use crate::core::error::{BlueprintError, ConfigError};
use crate::core::model::{AssociationDescriptor, ModelDescriptor};
use crate::core::query::QueryOptions;
use crate::core::request::BlueprintRequest;
use crate::core::route::{BlueprintAction, RouteMetadata};
use crate::core::service::Record;
use serde_json::Value;

const PARENT: &str = "parent";
const CHILD: &str = "child";
const REFETCH: &str = "refetch";

/// Child side of a link request
#[derive(Debug, Clone, Copy)]
pub enum LinkTarget<'a> {
    Existing(&'a Value),
    New(&'a [Record]),
}

/// Everything a plan needs about the relation being changed
#[derive(Debug, Clone, Copy)]
pub struct Relation<'a> {
    pub parent: &'a ModelDescriptor,
    pub association: &'a AssociationDescriptor,
    pub target: &'a ModelDescriptor,
    pub parent_id: &'a Value,
}

impl Relation<'_> {
    fn load_parent(&self) -> Step {
        Step::LoadParent {
            model: self.parent.identity.clone(),
            primary_key: self.parent.primary_key.clone(),
            id: self.parent_id.clone(),
        }
    }

    fn load_child(&self, id: &Value) -> Step {
        Step::LoadChild {
            model: self.target.identity.clone(),
            primary_key: self.target.primary_key.clone(),
            id: id.clone(),
        }
    }

    fn not_linkable(&self) -> ConfigError {
        ConfigError::InvalidAssociation {
            model: self.parent.identity.clone(),
            alias: self.association.alias.clone(),
            message: "only to-many associations can be linked or unlinked".into(),
        }
    }
}

fn create_step(index: usize) -> String {
    format!("create-{CHILD}-{index}")
}

fn join_step(index: usize) -> String {
    format!("join-{index}")
}

/// Plan an add
pub fn plan_add(
    relation: &Relation<'_>,
    child: LinkTarget<'_>,
    refetch: QueryOptions,
) -> Result<TaskGraph, ConfigError> {
    let kind = associations::classify(relation.association);
    let mut graph = TaskGraph::new().then(PARENT, relation.load_parent(), &[]);
    let mut last: Vec<String> = Vec::new();

    match (kind, child) {
        (RelationKind::DirectToOne, _) => return Err(relation.not_linkable()),
        (RelationKind::DirectToMany, LinkTarget::Existing(id)) => {
            graph = graph
                .then(CHILD, relation.load_child(id), &[PARENT])
                .then(
                    "link",
                    Step::LinkChild {
                        model: relation.target.identity.clone(),
                        primary_key: relation.target.primary_key.clone(),
                        child: ChildRef::Given(id.clone()),
                        foreign_key: relation.association.foreign_key.clone(),
                        parent_id: relation.parent_id.clone(),
                    },
                    &[CHILD],
                );
            last.push("link".into());
        }
        (RelationKind::Through(through), LinkTarget::Existing(id)) => {
            graph = graph.then(CHILD, relation.load_child(id), &[PARENT]).then(
                "join",
                Step::CreateJoinRow {
                    model: through.model.clone(),
                    source_field: through.source_field.clone(),
                    target_field: through.target_field.clone(),
                    parent_id: relation.parent_id.clone(),
                    child: ChildRef::Given(id.clone()),
                },
                &[CHILD],
            );
            last.push("join".into());
        }
        (kind, LinkTarget::New(records)) => {
            for (index, record) in records.iter().enumerate() {
                let create = create_step(index);
                graph = graph.then(
                    &create,
                    Step::CreateChild {
                        model: relation.target.identity.clone(),
                        record: record.clone(),
                    },
                    &[PARENT],
                );

                if let RelationKind::Through(through) = kind {
                    let join = join_step(index);
                    graph = graph.then(
                        &join,
                        Step::CreateJoinRow {
                            model: through.model.clone(),
                            source_field: through.source_field.clone(),
                            target_field: through.target_field.clone(),
                            parent_id: relation.parent_id.clone(),
                            child: ChildRef::FromStep {
                                step: create.clone(),
                                field: relation.target.primary_key.clone(),
                            },
                        },
                        &[create.as_str()],
                    );
                    last.push(join);
                } else {
                    last.push(create);
                }
            }
        }
    }

    let deps: Vec<&str> = if last.is_empty() {
        vec![PARENT]
    } else {
        last.iter().map(String::as_str).collect()
    };
    Ok(graph.then(REFETCH, Step::RefetchParent { query: refetch }, &deps))
}

/// Plan a remove
pub fn plan_remove(
    relation: &Relation<'_>,
    child_id: &Value,
    policy: DirectUnlink,
    refetch: QueryOptions,
) -> Result<TaskGraph, ConfigError> {
    let unlink = match associations::classify(relation.association) {
        RelationKind::DirectToOne => return Err(relation.not_linkable()),
        RelationKind::Through(through) => Step::DestroyJoinRows {
            model: through.model.clone(),
            source_field: through.source_field.clone(),
            target_field: through.target_field.clone(),
            parent_id: relation.parent_id.clone(),
            child_id: child_id.clone(),
        },
        RelationKind::DirectToMany => match policy {
            DirectUnlink::Destroy => Step::DestroyChild {
                model: relation.target.identity.clone(),
                primary_key: relation.target.primary_key.clone(),
                child_id: child_id.clone(),
                foreign_key: relation.association.foreign_key.clone(),
                parent_id: relation.parent_id.clone(),
            },
            DirectUnlink::ClearForeignKey => Step::ClearForeignKey {
                model: relation.target.identity.clone(),
                primary_key: relation.target.primary_key.clone(),
                child_id: child_id.clone(),
                foreign_key: relation.association.foreign_key.clone(),
                parent_id: relation.parent_id.clone(),
            },
        },
    };

    Ok(TaskGraph::new()
        .then(PARENT, relation.load_parent(), &[])
        .then("unlink", unlink, &[PARENT])
        .then(REFETCH, Step::RefetchParent { query: refetch }, &["unlink"]))
}

fn refetch_query(
    parent: &ModelDescriptor,
    parent_id: &Value,
    route: &RouteMetadata,
    request: &BlueprintRequest,
) -> QueryOptions {
    QueryOptions::by_pk(&parent.identity, &parent.primary_key, parent_id.clone())
        .with_populates(associations::resolve_populates(route, request))
}

fn refetched(outputs: &TaskOutputs) -> Result<BlueprintResponse, BlueprintError> {
    outputs
        .first(REFETCH)
        .cloned()
        .map(|parent| BlueprintResponse::ok(Value::Object(parent)))
        .ok_or_else(|| BlueprintError::Store("association update did not re-fetch the parent".into()))
}

/// Link a child to a parent, creating the child first when no id is given
pub async fn add(
    state: &BlueprintState,
    route: &RouteMetadata,
    request: &BlueprintRequest,
) -> Result<BlueprintResponse, BlueprintError> {
    let parent = state.registry.require(&route.model)?;
    let association = associations::require_alias(route, BlueprintAction::Add)?;
    let target = state.registry.require(&association.target)?;
    let query = QueryCompiler::new(&state.registry).compile(BlueprintAction::Add, route, request)?;

    let parent_id = query.target_record_id.clone().unwrap_or(Value::Null);
    let child_id = query.associated_ids.as_ref().and_then(|ids| ids.first());
    let new_children: Vec<Record> = query
        .new_record
        .as_ref()
        .map(|r| r.records().into_iter().cloned().collect())
        .unwrap_or_default();

    let relation = Relation {
        parent,
        association,
        target,
        parent_id: &parent_id,
    };
    let child = match child_id {
        Some(id) => LinkTarget::Existing(id),
        None => LinkTarget::New(&new_children),
    };
    let graph = plan_add(&relation, child, refetch_query(parent, &parent_id, route, request))?;
    let outputs = graph.execute(state.data.as_ref()).await?;

    let origin = request.origin.as_deref();
    let linked: Vec<Value> = match child_id {
        Some(id) => vec![id.clone()],
        None => (0..new_children.len())
            .filter_map(|index| outputs.first(&create_step(index)))
            .map(|created| {
                let id = record_id(target, created);
                state.notifier.record_created(
                    &target.identity,
                    &id,
                    &Value::Object(created.clone()),
                    origin,
                );
                id
            })
            .collect(),
    };
    for id in &linked {
        state
            .notifier
            .link_added(&parent.identity, &association.alias, &parent_id, id, origin);
    }

    refetched(&outputs)
}

/// Unlink a child from a parent
pub async fn remove(
    state: &BlueprintState,
    route: &RouteMetadata,
    request: &BlueprintRequest,
) -> Result<BlueprintResponse, BlueprintError> {
    let parent = state.registry.require(&route.model)?;
    let association = associations::require_alias(route, BlueprintAction::Remove)?;
    let target = state.registry.require(&association.target)?;
    let query =
        QueryCompiler::new(&state.registry).compile(BlueprintAction::Remove, route, request)?;

    let parent_id = query.target_record_id.clone().unwrap_or(Value::Null);
    let child_id = query
        .associated_ids
        .as_ref()
        .and_then(|ids| ids.first())
        .cloned()
        .ok_or_else(|| BlueprintError::usage("Missing required `id` of the record to remove"))?;

    let relation = Relation {
        parent,
        association,
        target,
        parent_id: &parent_id,
    };
    let policy = state.config.direct_unlink;
    let graph = plan_remove(
        &relation,
        &child_id,
        policy,
        refetch_query(parent, &parent_id, route, request),
    )?;
    let outputs = graph.execute(state.data.as_ref()).await?;

    let origin = request.origin.as_deref();
    if association.through().is_none() && policy == DirectUnlink::Destroy {
        for child in outputs.get("unlink").unwrap_or_default() {
            state.notifier.record_destroyed(
                &target.identity,
                &child_id,
                &Value::Object(child.clone()),
                origin,
            );
        }
    }
    state
        .notifier
        .link_removed(&parent.identity, &association.alias, &parent_id, &child_id, origin);

    refetched(&outputs)
}
