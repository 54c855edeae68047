//! In-memory implementation of DataService for testing and development

use crate::core::model::{
    AssociationDescriptor, AssociationKind, AttributeType, ModelDescriptor, ModelRegistry,
};
use crate::core::query::{Criteria, QueryOptions, SortClause};
use crate::core::service::{DataService, Record, StoreError, StoreResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct Table {
    rows: IndexMap<String, Record>,
    next_id: i64,
}

type Tables = HashMap<String, Table>;

/// In-memory data service
///
/// Rows are kept per model in insertion order. Uses RwLock for thread-safe
/// access; locks are never held across an await.
#[derive(Clone)]
pub struct InMemoryDataService {
    registry: Arc<ModelRegistry>,
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryDataService {
    /// Create an empty store for the models of `registry`
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| StoreError::Internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| StoreError::Internal(format!("Failed to acquire write lock: {}", e)))
    }

    fn model(&self, identity: &str) -> StoreResult<&ModelDescriptor> {
        self.registry
            .get(identity)
            .ok_or_else(|| StoreError::Internal(format!("Unknown model `{}`", identity)))
    }

    /// Snapshot of every row of `model`, in insertion order
    pub fn rows(&self, model: &str) -> StoreResult<Vec<Record>> {
        let tables = self.read()?;
        Ok(tables
            .get(model)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DataService for InMemoryDataService {
    async fn find(&self, query: &QueryOptions) -> StoreResult<Vec<Record>> {
        let model = self.model(&query.using)?;
        let tables = self.read()?;
        let rows = select_rows(&tables, model, query.criteria.as_ref());
        rows.into_iter()
            .map(|row| shape(&tables, &self.registry, model, row, query))
            .collect()
    }

    async fn find_one(&self, query: &QueryOptions) -> StoreResult<Option<Record>> {
        let model = self.model(&query.using)?;
        let tables = self.read()?;
        let where_clause = query.criteria.as_ref().and_then(|c| c.where_clause.as_ref());
        let row = table_rows(&tables, &model.identity)
            .find(|row| where_clause.is_none_or(|w| matches(row, w)))
            .cloned();
        row.map(|row| shape(&tables, &self.registry, model, row, query))
            .transpose()
    }

    async fn create(&self, query: &QueryOptions) -> StoreResult<Vec<Record>> {
        let model = self.model(&query.using)?;
        let new_record = query
            .new_record
            .as_ref()
            .ok_or_else(|| StoreError::Internal("create called without a new record".into()))?;

        let prepared = new_record
            .records()
            .into_iter()
            .map(|values| prepare_values(&self.registry, model, values))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut tables = self.write()?;
        let table = tables.entry(model.identity.clone()).or_default();
        let mut created = Vec::with_capacity(prepared.len());

        for mut record in prepared {
            let id = match record.get(&model.primary_key) {
                Some(id) if !id.is_null() => model.coerce_pk(id.clone()),
                _ => match model.attribute_type(&model.primary_key) {
                    Some(AttributeType::Integer) | None => {
                        table.next_id += 1;
                        json!(table.next_id)
                    }
                    Some(_) => json!(Uuid::new_v4().to_string()),
                },
            };
            if let Some(n) = id.as_i64() {
                table.next_id = table.next_id.max(n);
            }

            let key = row_key(&id);
            if table.rows.contains_key(&key) {
                return Err(StoreError::Validation {
                    message: format!("A `{}` record with id {} already exists", model.identity, id),
                    details: Some(json!({"field": model.primary_key})),
                });
            }
            record.insert(model.primary_key.clone(), id);
            table.rows.insert(key, record.clone());
            created.push(record);
        }

        Ok(created)
    }

    async fn update(&self, query: &QueryOptions) -> StoreResult<Vec<Record>> {
        let model = self.model(&query.using)?;
        let values = query
            .values_to_set
            .as_ref()
            .map(|values| prepare_values(&self.registry, model, values))
            .transpose()?
            .unwrap_or_default();
        let where_clause = query.criteria.as_ref().and_then(|c| c.where_clause.clone());

        let mut tables = self.write()?;
        let Some(table) = tables.get_mut(&model.identity) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in table.rows.values_mut() {
            if where_clause.as_ref().is_none_or(|w| matches(&*row, w)) {
                for (key, value) in &values {
                    if key != &model.primary_key {
                        row.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn destroy(&self, query: &QueryOptions) -> StoreResult<Vec<Record>> {
        let model = self.model(&query.using)?;
        let where_clause = query.criteria.as_ref().and_then(|c| c.where_clause.clone());

        let mut tables = self.write()?;
        let Some(table) = tables.get_mut(&model.identity) else {
            return Ok(Vec::new());
        };

        let mut destroyed = Vec::new();
        table.rows.retain(|_, row| {
            let hit = where_clause.as_ref().is_none_or(|w| matches(&*row, w));
            if hit {
                destroyed.push(row.clone());
            }
            !hit
        });
        Ok(destroyed)
    }

    async fn count(&self, query: &QueryOptions) -> StoreResult<u64> {
        let model = self.model(&query.using)?;
        let tables = self.read()?;
        let where_clause = query.criteria.as_ref().and_then(|c| c.where_clause.as_ref());
        Ok(table_rows(&tables, &model.identity)
            .filter(|row| where_clause.is_none_or(|w| matches(row, w)))
            .count() as u64)
    }
}

// =============================================================================
// Reading
// =============================================================================

fn table_rows<'a>(tables: &'a Tables, model: &str) -> impl Iterator<Item = &'a Record> {
    tables.get(model).into_iter().flat_map(|t| t.rows.values())
}

fn row_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rows of `model` matching `criteria`, sorted and windowed
fn select_rows(tables: &Tables, model: &ModelDescriptor, criteria: Option<&Criteria>) -> Vec<Record> {
    let where_clause = criteria.and_then(|c| c.where_clause.as_ref());
    let mut rows: Vec<Record> = table_rows(tables, &model.identity)
        .filter(|row| where_clause.is_none_or(|w| matches(row, w)))
        .cloned()
        .collect();

    if let Some(sort) = criteria.and_then(|c| c.sort.as_ref()) {
        sort_rows(&mut rows, sort);
    }

    let skip = criteria.and_then(|c| c.skip).unwrap_or(0) as usize;
    let limit = criteria.and_then(|c| c.limit).map(|l| l as usize);
    rows.into_iter()
        .skip(skip)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Expand populates of one row, then apply its projection
fn shape(
    tables: &Tables,
    registry: &ModelRegistry,
    model: &ModelDescriptor,
    row: Record,
    query: &QueryOptions,
) -> StoreResult<Record> {
    let mut expanded = Vec::with_capacity(query.populates.len());
    for (alias, criteria) in &query.populates {
        let association = model.association(alias).ok_or_else(|| {
            StoreError::Internal(format!("Model `{}` has no association `{}`", model.identity, alias))
        })?;
        expanded.push((alias.clone(), populate(tables, registry, model, &row, association, criteria)?));
    }

    let mut shaped = match &query.criteria {
        Some(criteria) => project(row, criteria, &model.primary_key),
        None => row,
    };
    for (alias, value) in expanded {
        shaped.insert(alias, value);
    }
    Ok(shaped)
}

fn populate(
    tables: &Tables,
    registry: &ModelRegistry,
    model: &ModelDescriptor,
    row: &Record,
    association: &AssociationDescriptor,
    criteria: &Criteria,
) -> StoreResult<Value> {
    let target = registry.get(&association.target).ok_or_else(|| {
        StoreError::Internal(format!("Unknown model `{}`", association.target))
    })?;
    let pk = row.get(&model.primary_key).cloned().unwrap_or(Value::Null);

    let mut scoped = criteria.clone();
    match &association.kind {
        AssociationKind::ToOne => {
            let Some(fk) = row.get(&association.foreign_key).filter(|v| !v.is_null()) else {
                return Ok(Value::Null);
            };
            let found = table_rows(tables, &target.identity)
                .find(|r| r.get(&target.primary_key).is_some_and(|id| loose_eq(id, fk)))
                .cloned();
            return Ok(found
                .map(|r| Value::Object(project(r, criteria, &target.primary_key)))
                .unwrap_or(Value::Null));
        }
        AssociationKind::ToMany => {
            scoped = scoped.and(&association.foreign_key, pk);
        }
        AssociationKind::ToManyThrough(through) => {
            let ids: Vec<Value> = table_rows(tables, &through.model)
                .filter(|j| j.get(&through.source_field).is_some_and(|v| loose_eq(v, &pk)))
                .filter_map(|j| j.get(&through.target_field).cloned())
                .collect();
            let ids = match scoped
                .where_clause
                .as_mut()
                .and_then(|w| w.remove(&target.primary_key))
            {
                // Intersect an explicit child filter with the linked ids
                Some(requested) => ids
                    .into_iter()
                    .filter(|id| condition_holds(Some(id), &requested))
                    .collect(),
                None => ids,
            };
            scoped = scoped.and(&target.primary_key, Value::Array(ids));
        }
    }

    let rows = select_rows(tables, target, Some(&scoped));
    Ok(Value::Array(
        rows.into_iter()
            .map(|r| Value::Object(project(r, criteria, &target.primary_key)))
            .collect(),
    ))
}

/// Apply `select`/`omit`; the primary key always survives `select`
fn project(mut row: Record, criteria: &Criteria, primary_key: &str) -> Record {
    if let Some(select) = &criteria.select {
        row.retain(|key, _| key == primary_key || select.iter().any(|s| s == key));
    }
    if let Some(omit) = &criteria.omit {
        row.retain(|key, _| !omit.iter().any(|o| o == key));
    }
    row
}

// =============================================================================
// Filtering
// =============================================================================

const OPERATORS: [&str; 11] = [
    "in", "nin", "!=", "<", "<=", ">", ">=", "contains", "startsWith", "endsWith", "like",
];

fn matches(row: &Record, where_clause: &Map<String, Value>) -> bool {
    where_clause.iter().all(|(key, condition)| match key.as_str() {
        "or" => condition
            .as_array()
            .is_some_and(|alternatives| {
                alternatives
                    .iter()
                    .filter_map(Value::as_object)
                    .any(|w| matches(row, w))
            }),
        "and" => condition
            .as_array()
            .is_some_and(|all| all.iter().filter_map(Value::as_object).all(|w| matches(row, w))),
        _ => condition_holds(row.get(key), condition),
    })
}

fn condition_holds(value: Option<&Value>, condition: &Value) -> bool {
    match condition {
        Value::Array(options) => value.is_some_and(|v| options.iter().any(|o| loose_eq(v, o))),
        Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| OPERATORS.contains(&k.as_str())) => {
            ops.iter().all(|(op, operand)| operator_holds(value, op, operand))
        }
        Value::Null => value.is_none_or(Value::is_null),
        expected => value.is_some_and(|v| loose_eq(v, expected)),
    }
}

fn operator_holds(value: Option<&Value>, op: &str, operand: &Value) -> bool {
    let as_text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_lowercase);
    let needle = operand.as_str().map(str::to_lowercase).unwrap_or_default();
    match op {
        "in" => condition_holds(value, operand),
        "nin" => !condition_holds(value, operand),
        "!=" => !condition_holds(value, operand),
        "<" => value.is_some_and(|v| compare(v, operand) == Some(Ordering::Less)),
        "<=" => value.is_some_and(|v| matches!(compare(v, operand), Some(Ordering::Less | Ordering::Equal))),
        ">" => value.is_some_and(|v| compare(v, operand) == Some(Ordering::Greater)),
        ">=" => value.is_some_and(|v| {
            matches!(compare(v, operand), Some(Ordering::Greater | Ordering::Equal))
        }),
        "contains" => as_text(value).is_some_and(|t| t.contains(&needle)),
        "startsWith" => as_text(value).is_some_and(|t| t.starts_with(&needle)),
        "endsWith" => as_text(value).is_some_and(|t| t.ends_with(&needle)),
        "like" => as_text(value).is_some_and(|t| {
            let parts: Vec<&str> = needle.split('%').collect();
            like_matches(&t, &parts)
        }),
        _ => false,
    }
}

/// `%` wildcard match
fn like_matches(text: &str, parts: &[&str]) -> bool {
    match parts {
        [] => text.is_empty(),
        [only] => text == *only,
        [first, rest @ ..] => {
            let Some(mut remaining) = text.strip_prefix(first) else {
                return false;
            };
            let Some((last, middle)) = rest.split_last() else {
                return false;
            };
            for part in middle {
                match remaining.find(part) {
                    Some(at) => remaining = &remaining[at + part.len()..],
                    None => return false,
                }
            }
            remaining.ends_with(last)
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Equality tolerant of query strings (`"3"` equals `3`, `"true"` equals `true`)
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::Bool(flag), Value::String(s)) | (Value::String(s), Value::Bool(flag)) => {
            s == if *flag { "true" } else { "false" }
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

// =============================================================================
// Sorting
// =============================================================================

fn direction(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64().is_none_or(|f| f >= 0.0),
        Value::String(s) => !s.eq_ignore_ascii_case("desc"),
        _ => true,
    }
}

fn raw_sort_keys(raw: &str) -> Vec<(String, bool)> {
    raw.split(',')
        .filter_map(|term| {
            let mut words = term.split_whitespace();
            let field = words.next()?;
            let ascending = words.next().is_none_or(|d| !d.eq_ignore_ascii_case("desc"));
            Some((field.to_string(), ascending))
        })
        .collect()
}

fn sort_keys(sort: &SortClause) -> Vec<(String, bool)> {
    match sort {
        SortClause::Raw(raw) => raw_sort_keys(raw),
        SortClause::Json(Value::String(raw)) => raw_sort_keys(raw),
        SortClause::Json(Value::Object(fields)) => fields
            .iter()
            .map(|(field, dir)| (field.clone(), direction(dir)))
            .collect(),
        SortClause::Json(Value::Array(terms)) => terms
            .iter()
            .flat_map(|term| match term {
                Value::Object(_) | Value::String(_) => sort_keys(&SortClause::Json(term.clone())),
                _ => Vec::new(),
            })
            .collect(),
        SortClause::Json(_) => Vec::new(),
    }
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(_) => 4,
    }
}

fn sort_rows(rows: &mut [Record], sort: &SortClause) {
    let keys = sort_keys(sort);
    rows.sort_by(|a, b| {
        for (field, ascending) in &keys {
            let (x, y) = (a.get(field), b.get(field));
            let ordering = rank(x).cmp(&rank(y)).then_with(|| match (x, y) {
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            });
            let ordering = if *ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

// =============================================================================
// Validation
// =============================================================================

fn coerce(ty: AttributeType, value: &Value) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match ty {
        AttributeType::Json => Some(value.clone()),
        AttributeType::String => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(_) | Value::Bool(_) => Some(Value::String(value.to_string())),
            _ => None,
        },
        AttributeType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        AttributeType::Number => as_number(value)
            .and_then(serde_json::Number::from_f64)
            .map(|n| match value {
                Value::Number(_) => value.clone(),
                _ => Value::Number(n),
            }),
        AttributeType::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) if s == "true" => Some(Value::Bool(true)),
            Value::String(s) if s == "false" => Some(Value::Bool(false)),
            _ => None,
        },
        AttributeType::Uuid => value
            .as_str()
            .filter(|s| Uuid::parse_str(s).is_ok())
            .map(|_| value.clone()),
        AttributeType::Datetime => value
            .as_str()
            .filter(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
            .map(|_| value.clone()),
    }
}

/// Whether `key` is a relation column stored on `model` without being declared
/// as an attribute: a to-one foreign key of its own, the foreign key of another
/// model's to-many, or a field of a join model
fn is_relation_key(registry: &ModelRegistry, model: &ModelDescriptor, key: &str) -> bool {
    let own = model
        .associations
        .iter()
        .any(|a| matches!(a.kind, AssociationKind::ToOne) && a.foreign_key == key);
    own || registry.models().flat_map(|m| &m.associations).any(|a| match &a.kind {
        AssociationKind::ToMany => a.target == model.identity && a.foreign_key == key,
        AssociationKind::ToManyThrough(through) => {
            through.model == model.identity
                && (through.source_field == key || through.target_field == key)
        }
        AssociationKind::ToOne => false,
    })
}

/// Check submitted values against the model's declared attributes
///
/// Models without declared attributes accept anything.
fn prepare_values(
    registry: &ModelRegistry,
    model: &ModelDescriptor,
    values: &Map<String, Value>,
) -> StoreResult<Record> {
    if model.attributes.is_empty() {
        return Ok(values.clone());
    }

    let mut prepared = Record::new();
    let mut unknown = Vec::new();
    let mut invalid = Map::new();

    for (key, value) in values {
        let foreign_key = is_relation_key(registry, model, key);

        match model.attribute_type(key) {
            Some(ty) => match coerce(ty, value) {
                Some(coerced) => {
                    prepared.insert(key.clone(), coerced);
                }
                None => {
                    invalid.insert(key.clone(), json!(format!("expected {:?}", ty).to_lowercase()));
                }
            },
            None if foreign_key || *key == model.primary_key => {
                prepared.insert(key.clone(), value.clone());
            }
            None => unknown.push(key.clone()),
        }
    }

    if !unknown.is_empty() || !invalid.is_empty() {
        let mut details = Map::new();
        if !unknown.is_empty() {
            details.insert("unknown".into(), json!(unknown));
        }
        if !invalid.is_empty() {
            details.insert("invalid".into(), Value::Object(invalid));
        }
        return Err(StoreError::Validation {
            message: format!("Invalid values for model `{}`", model.identity),
            details: Some(Value::Object(details)),
        });
    }
    Ok(prepared)
}
