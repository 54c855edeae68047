//! Parameter extractors
//!
//! Each function pulls one logical value out of a [`BlueprintRequest`]. They
//! never fail: malformed input reads as absent so the caller falls back to the
//! route option or the default.

use crate::config::RouteOptions;
use crate::core::query::SortClause;
use crate::core::request::BlueprintRequest;
use serde_json::Value;

/// A scalar usable as a primary key (objects and null are filters, not keys)
fn scalar(value: Option<&Value>) -> Option<Value> {
    match value {
        Some(Value::Object(_)) | Some(Value::Array(_)) | Some(Value::Null) | None => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(other) => Some(other.clone()),
    }
}

/// Primary key of the targeted record
///
/// Order: route option `id`, route option `where.id`, the `id` param, then
/// the `childid` param.
pub fn primary_key(request: &BlueprintRequest, options: &RouteOptions) -> Option<Value> {
    scalar(options.id.as_ref())
        .or_else(|| scalar(options.where_clause.as_ref().and_then(|w| w.get("id"))))
        .or_else(|| scalar(request.param("id")))
        .or_else(|| scalar(request.param("childid")))
}

/// Primary key of the parent record on association routes
pub fn parent_key(request: &BlueprintRequest) -> Option<Value> {
    scalar(request.param("parentid"))
}

/// Sort from the `sort` param, else the route option
pub fn sort(request: &BlueprintRequest, options: &RouteOptions) -> Option<SortClause> {
    request
        .param("sort")
        .and_then(SortClause::from_param)
        .or_else(|| options.sort.as_ref().and_then(SortClause::from_param))
}

/// Read a non-negative integer from a number or a numeric string
pub fn non_negative(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
        }
        _ => None,
    }
}

fn numeric_param(request: &BlueprintRequest, name: &str, fallback: Option<u64>) -> Option<u64> {
    request.param(name).and_then(non_negative).or(fallback)
}

/// `limit` param, else route option
pub fn limit(request: &BlueprintRequest, options: &RouteOptions) -> Option<u64> {
    numeric_param(request, "limit", options.limit)
}

/// `skip` param, else route option
pub fn skip(request: &BlueprintRequest, options: &RouteOptions) -> Option<u64> {
    numeric_param(request, "skip", options.skip)
}

/// `page` param, else route option
pub fn page(request: &BlueprintRequest, options: &RouteOptions) -> Option<u64> {
    numeric_param(request, "page", options.page)
}

/// `perPage` param, else route option
pub fn per_page(request: &BlueprintRequest, options: &RouteOptions) -> Option<u64> {
    numeric_param(request, "perPage", options.per_page)
}

/// Split a name list given as a JSON array, a JSON string array, or a
/// comma-joined string optionally wrapped in brackets
fn name_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(s) {
                return name_list(&parsed);
            }
            let inner = s
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .unwrap_or(s);
            Some(
                inner
                    .split(',')
                    .map(|part| part.trim().trim_matches('"').trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            )
        }
        _ => None,
    }
}

/// Aliases named by the `populate` param
///
/// `None` means the request named nothing and the route default applies;
/// `Some(vec![])` means expand nothing (`populate=false` or an empty list).
pub fn populate_filter(request: &BlueprintRequest) -> Option<Vec<String>> {
    match request.param("populate")? {
        Value::Bool(false) => Some(Vec::new()),
        Value::Bool(true) | Value::Null => None,
        Value::String(s) if s.trim() == "false" => Some(Vec::new()),
        other => name_list(other),
    }
}

/// Attribute names of the `select` param
pub fn select(request: &BlueprintRequest) -> Option<Vec<String>> {
    request
        .param("select")
        .and_then(name_list)
        .filter(|names| !names.is_empty())
}

/// Attribute names of the `omit` param
pub fn omit(request: &BlueprintRequest) -> Option<Vec<String>> {
    request
        .param("omit")
        .and_then(name_list)
        .filter(|names| !names.is_empty())
}
