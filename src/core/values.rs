//! Values builder: create and update payloads

use crate::config::RouteOptions;
use crate::core::criteria::DEFAULT_BLACKLIST;
use crate::core::query::NewRecord;
use crate::core::request::BlueprintRequest;
use serde_json::{Map, Value};

/// Params dropped from a child record created through an association route
pub const ASSOCIATION_BLACKLIST: [&str; 3] = ["id", "parentid", "childid"];

/// Query modifiers; never record values
fn is_query_modifier(key: &str) -> bool {
    key == "where" || DEFAULT_BLACKLIST.contains(&key)
}

fn normalize(
    element: &Map<String, Value>,
    options: &RouteOptions,
    extra_blacklist: &[&str],
) -> Map<String, Value> {
    let mut values = options.values.defaults.clone();
    for (key, value) in element {
        values.insert(key.clone(), value.clone());
    }
    values.retain(|key, value| {
        !value.is_null()
            && !is_query_modifier(key)
            && !options.values.blacklist.iter().any(|b| b == key)
            && !extra_blacklist.contains(&key.as_str())
    });
    values
}

/// Build the record(s) a request submits
///
/// An array body yields a batch in body order (non-object elements are
/// skipped); anything else yields one record from all request params.
pub fn build(
    request: &BlueprintRequest,
    options: &RouteOptions,
    extra_blacklist: &[&str],
) -> NewRecord {
    match &request.body {
        Some(Value::Array(elements)) => NewRecord::Batch(
            elements
                .iter()
                .filter_map(Value::as_object)
                .map(|element| normalize(element, options, extra_blacklist))
                .collect(),
        ),
        _ => NewRecord::Single(normalize(&request.all_params(), options, extra_blacklist)),
    }
}

/// Build an update payload pinned to the record being updated
///
/// The `id` param is dropped and the primary key is forced to `id`; a client
/// value that disagrees is discarded with a warning.
pub fn build_update(
    request: &BlueprintRequest,
    options: &RouteOptions,
    primary_key: &str,
    id: &Value,
) -> Map<String, Value> {
    // the path `id` shadows a body primary key named `id`, so look at the body
    let submitted = request
        .body
        .as_ref()
        .and_then(|body| body.get(primary_key))
        .or_else(|| request.query.get(primary_key))
        .filter(|value| !value.is_null());
    if let Some(submitted) = submitted
        && !same_key(submitted, id)
    {
        tracing::warn!(
            primary_key,
            submitted = %submitted,
            "ignoring attempt to change the primary key of {id} through update"
        );
    }

    let mut values = normalize(&request.all_params(), options, &["id"]);
    values.insert(primary_key.to_string(), id.clone());
    values
}

/// Compare keys that may arrive as a number or its string form
fn same_key(a: &Value, b: &Value) -> bool {
    let text = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    a == b || text(a) == text(b)
}
