//! Record actions: find, findOne, create, update, destroy, populate

use super::{BlueprintResponse, BlueprintState};
use crate::core::associations;
use crate::core::compiler::QueryCompiler;
use crate::core::error::BlueprintError;
use crate::core::extractors;
use crate::core::model::ModelDescriptor;
use crate::core::query::QueryOptions;
use crate::core::request::BlueprintRequest;
use crate::core::route::{BlueprintAction, RouteMetadata};
use crate::core::service::Record;
use serde_json::Value;

/// Primary key of a stored record
pub(crate) fn record_id(model: &ModelDescriptor, record: &Record) -> Value {
    record.get(&model.primary_key).cloned().unwrap_or(Value::Null)
}

fn missing_record(model: &ModelDescriptor, id: &Value) -> BlueprintError {
    BlueprintError::not_found(format!(
        "No `{}` record found with {} {}",
        model.identity, model.primary_key, id
    ))
}

/// Id the compiler put into `where` for a by-pk action
fn compiled_id(model: &ModelDescriptor, query: &QueryOptions) -> Value {
    query
        .where_clause()
        .and_then(|w| w.get(&model.primary_key))
        .cloned()
        .unwrap_or(Value::Null)
}

/// List records; a request carrying a primary key is answered like findOne
pub async fn find(
    state: &BlueprintState,
    route: &RouteMetadata,
    request: &BlueprintRequest,
) -> Result<BlueprintResponse, BlueprintError> {
    if extractors::primary_key(request, &route.options).is_some() {
        return find_one(state, route, request).await;
    }

    let query = QueryCompiler::new(&state.registry).compile(BlueprintAction::Find, route, request)?;
    let records = state.data.find(&query).await?;

    if route.auto_watch
        && let Some(origin) = request.origin.as_deref()
    {
        state.notifier.watch(&route.model, origin);
    }

    Ok(BlueprintResponse::ok(Value::Array(
        records.into_iter().map(Value::Object).collect(),
    )))
}

pub async fn find_one(
    state: &BlueprintState,
    route: &RouteMetadata,
    request: &BlueprintRequest,
) -> Result<BlueprintResponse, BlueprintError> {
    let model = state.registry.require(&route.model)?;
    let query =
        QueryCompiler::new(&state.registry).compile(BlueprintAction::FindOne, route, request)?;

    match state.data.find_one(&query).await? {
        Some(record) => Ok(BlueprintResponse::ok(Value::Object(record))),
        None => Err(missing_record(model, &compiled_id(model, &query))),
    }
}

/// Create one record, or one per element of an array body
pub async fn create(
    state: &BlueprintState,
    route: &RouteMetadata,
    request: &BlueprintRequest,
) -> Result<BlueprintResponse, BlueprintError> {
    let model = state.registry.require(&route.model)?;
    let query =
        QueryCompiler::new(&state.registry).compile(BlueprintAction::Create, route, request)?;
    let batch = query.new_record.as_ref().is_some_and(|r| r.is_batch());

    let created = state.data.create(&query).await?;
    for record in &created {
        state.notifier.record_created(
            &model.identity,
            &record_id(model, record),
            &Value::Object(record.clone()),
            request.origin.as_deref(),
        );
    }

    if batch {
        return Ok(BlueprintResponse::created(Value::Array(
            created.into_iter().map(Value::Object).collect(),
        )));
    }
    let record = created.into_iter().next().ok_or_else(|| {
        BlueprintError::Store(format!("Creating a `{}` record returned nothing", model.identity))
    })?;
    Ok(BlueprintResponse::created(Value::Object(record)))
}

/// Update one record, then answer with it re-fetched
pub async fn update(
    state: &BlueprintState,
    route: &RouteMetadata,
    request: &BlueprintRequest,
) -> Result<BlueprintResponse, BlueprintError> {
    let model = state.registry.require(&route.model)?;
    let query =
        QueryCompiler::new(&state.registry).compile(BlueprintAction::Update, route, request)?;
    let id = compiled_id(model, &query);

    let previous = state
        .data
        .find_one(&QueryOptions::by_pk(&model.identity, &model.primary_key, id.clone()))
        .await?
        .ok_or_else(|| missing_record(model, &id))?;

    let updated = state.data.update(&query).await?;
    let record = updated
        .into_iter()
        .next()
        .ok_or_else(|| missing_record(model, &id))?;

    state.notifier.record_updated(
        &model.identity,
        &id,
        &Value::Object(record),
        Some(&Value::Object(previous)),
        request.origin.as_deref(),
    );

    let refetch = QueryOptions::by_pk(&model.identity, &model.primary_key, id.clone())
        .with_populates(associations::resolve_populates(route, request));
    let refreshed = state.data.find_one(&refetch).await?.ok_or_else(|| {
        BlueprintError::Store(format!(
            "Could not find `{}` record {} after updating it",
            model.identity, id
        ))
    })?;

    Ok(BlueprintResponse::ok(Value::Object(refreshed)))
}

/// Destroy one record and answer with it as it was
pub async fn destroy(
    state: &BlueprintState,
    route: &RouteMetadata,
    request: &BlueprintRequest,
) -> Result<BlueprintResponse, BlueprintError> {
    let model = state.registry.require(&route.model)?;
    let query =
        QueryCompiler::new(&state.registry).compile(BlueprintAction::Destroy, route, request)?;
    let id = compiled_id(model, &query);

    let lookup = QueryOptions::by_pk(&model.identity, &model.primary_key, id.clone())
        .with_populates(associations::resolve_populates(route, request));
    let record = state
        .data
        .find_one(&lookup)
        .await?
        .ok_or_else(|| missing_record(model, &id))?;

    state.data.destroy(&query).await?;

    let record = Value::Object(record);
    state
        .notifier
        .record_destroyed(&model.identity, &id, &record, request.origin.as_deref());

    Ok(BlueprintResponse::ok(record))
}

/// Expand one association of a parent and answer with the associated value
pub async fn populate(
    state: &BlueprintState,
    route: &RouteMetadata,
    request: &BlueprintRequest,
) -> Result<BlueprintResponse, BlueprintError> {
    let model = state.registry.require(&route.model)?;
    let association = associations::require_alias(route, BlueprintAction::Populate)?;
    let query =
        QueryCompiler::new(&state.registry).compile(BlueprintAction::Populate, route, request)?;
    let parent_id = compiled_id(model, &query);

    let mut parent = state
        .data
        .find_one(&query)
        .await?
        .ok_or_else(|| missing_record(model, &parent_id))?;

    match parent.remove(&association.alias) {
        Some(Value::Null) | None if !association.is_to_many() => {
            Err(BlueprintError::not_found(format!(
                "`{}` record {} has no `{}`",
                model.identity, parent_id, association.alias
            )))
        }
        Some(value) => Ok(BlueprintResponse::ok(value)),
        None => Ok(BlueprintResponse::ok(Value::Array(Vec::new()))),
    }
}
