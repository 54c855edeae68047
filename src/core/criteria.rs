//! Criteria builder: `where`, pagination, sort and projection for `find`

use crate::config::RouteOptions;
use crate::core::error::BlueprintError;
use crate::core::extractors;
use crate::core::query::{Criteria, DEFAULT_LIMIT};
use crate::core::request::BlueprintRequest;
use serde_json::{Map, Value};

/// Params that never become implicit `where` terms
pub const DEFAULT_BLACKLIST: [&str; 8] = [
    "limit", "skip", "page", "perPage", "sort", "populate", "select", "omit",
];

/// Effective page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u64,
    pub skip: u64,
}

/// Resolve `limit`/`skip`
///
/// `page` + `perPage` win outright when both are known; otherwise `limit` and
/// `skip` each fall back independently to the route option, then to the
/// default.
pub fn pagination(request: &BlueprintRequest, options: &RouteOptions) -> Pagination {
    let page = extractors::page(request, options);
    let per_page = extractors::per_page(request, options);

    match (page, per_page) {
        (Some(page), Some(per_page)) => Pagination {
            limit: per_page,
            skip: (page.max(1) - 1).saturating_mul(per_page),
        },
        _ => Pagination {
            limit: extractors::limit(request, options).unwrap_or(DEFAULT_LIMIT),
            skip: extractors::skip(request, options).unwrap_or(0),
        },
    }
}

/// Merge `overlay` into `base`, recursing into nested objects; `overlay` wins
pub fn deep_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming)
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Parse an explicit `where` parameter; `None` when it parses to `null`
fn explicit_where(value: &Value) -> Result<Option<Map<String, Value>>, BlueprintError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map.clone())),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(Value::Null) => Ok(None),
            Ok(_) => Err(BlueprintError::usage(
                "Could not parse the provided `where` criteria: expected a JSON object",
            )),
            Err(e) => Err(BlueprintError::usage(format!(
                "Could not parse the provided `where` criteria: {e}"
            ))),
        },
        _ => Err(BlueprintError::usage(
            "Could not parse the provided `where` criteria: expected a JSON object",
        )),
    }
}

/// Build the `where` clause of a request
///
/// An explicit `where` param is used as given; otherwise (or when it is
/// `null`) every param not on the blacklist (the route's, or
/// [`DEFAULT_BLACKLIST`], plus `extra_blacklist`) and not `null` becomes an
/// equality term. The route's forced `where` is merged on top. Returns `None`
/// when nothing is left to filter on.
pub fn build_where(
    request: &BlueprintRequest,
    options: &RouteOptions,
    extra_blacklist: &[&str],
) -> Result<Option<Map<String, Value>>, BlueprintError> {
    let explicit = match request.param("where") {
        Some(value) => explicit_where(value)?,
        None => None,
    };
    let mut where_clause = match explicit {
        Some(map) => map,
        None => {
            let blacklist: Vec<&str> = match &options.criteria.blacklist {
                Some(list) => list.iter().map(String::as_str).collect(),
                None => DEFAULT_BLACKLIST.to_vec(),
            };
            request
                .all_params()
                .into_iter()
                .filter(|(key, value)| {
                    !value.is_null()
                        && key != "where"
                        && !blacklist.contains(&key.as_str())
                        && !extra_blacklist.contains(&key.as_str())
                })
                .collect()
        }
    };

    if let Some(forced) = &options.where_clause {
        deep_merge(&mut where_clause, forced);
    }

    Ok((!where_clause.is_empty()).then_some(where_clause))
}

/// Full criteria of a `find`
pub fn build(
    request: &BlueprintRequest,
    options: &RouteOptions,
    extra_blacklist: &[&str],
) -> Result<Criteria, BlueprintError> {
    let Pagination { limit, skip } = pagination(request, options);

    Ok(Criteria {
        where_clause: build_where(request, options, extra_blacklist)?,
        sort: extractors::sort(request, options),
        limit: Some(limit),
        skip: (skip > 0).then_some(skip),
        select: extractors::select(request),
        omit: extractors::omit(request),
    })
}
