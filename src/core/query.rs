//! Query descriptors handed to the data service
//!
//! [`QueryOptions`] is the only thing the compiler produces. Fields that do not
//! apply to an action stay `None` (or empty) and are skipped when serialized,
//! so a downstream adapter never mistakes an absent filter for an empty one.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default page size for `find` and for to-many populates
pub const DEFAULT_LIMIT: u64 = 30;

/// Sort order, either parsed JSON (`{"name": 1}`) or a raw string (`"name ASC"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortClause {
    Json(Value),
    Raw(String),
}

impl SortClause {
    /// Interpret a sort parameter
    ///
    /// Strings are JSON-parsed first and kept raw when that fails; any other
    /// JSON value is taken as already structured.
    pub fn from_param(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(match serde_json::from_str::<Value>(s) {
                Ok(parsed @ (Value::Object(_) | Value::Array(_))) => SortClause::Json(parsed),
                _ => SortClause::Raw(s.clone()),
            }),
            other => Some(SortClause::Json(other.clone())),
        }
    }
}

/// Filter, sort, pagination and projection for one model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortClause>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omit: Option<Vec<String>>,
}

impl Criteria {
    /// `where = {field: value}` and nothing else
    pub fn by_field(field: &str, value: Value) -> Self {
        let mut where_clause = Map::new();
        where_clause.insert(field.to_string(), value);
        Self {
            where_clause: Some(where_clause),
            ..Default::default()
        }
    }

    /// Add one more equality term to `where`
    pub fn and(mut self, field: &str, value: Value) -> Self {
        self.where_clause
            .get_or_insert_with(Map::new)
            .insert(field.to_string(), value);
        self
    }
}

/// Payload of a create call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NewRecord {
    Single(Map<String, Value>),
    Batch(Vec<Map<String, Value>>),
}

impl NewRecord {
    /// Every record to create, in submission order
    pub fn records(&self) -> Vec<&Map<String, Value>> {
        match self {
            NewRecord::Single(record) => vec![record],
            NewRecord::Batch(records) => records.iter().collect(),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, NewRecord::Batch(_))
    }
}

/// Execution hints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMeta {
    /// Return the affected records
    pub fetch: bool,
}

/// Compiled, ORM-agnostic description of one data access
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Model identity the query runs against
    pub using: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Criteria>,

    /// Associations to expand, keyed by alias
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub populates: IndexMap<String, Criteria>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_record: Option<NewRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_to_set: Option<Map<String, Value>>,

    /// Association being linked or unlinked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Parent primary key of a link/unlink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_record_id: Option<Value>,

    /// Child primary keys of a link/unlink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_ids: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<QueryMeta>,
}

impl QueryOptions {
    /// An empty query against `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            using: model.into(),
            ..Default::default()
        }
    }

    /// Lookup of one record by primary key
    pub fn by_pk(model: impl Into<String>, pk_field: &str, id: Value) -> Self {
        Self::new(model).with_criteria(Criteria::by_field(pk_field, id))
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn with_populates(mut self, populates: IndexMap<String, Criteria>) -> Self {
        self.populates = populates;
        self
    }

    pub fn with_new_record(mut self, record: NewRecord) -> Self {
        self.new_record = Some(record);
        self
    }

    pub fn with_values(mut self, values: Map<String, Value>) -> Self {
        self.values_to_set = Some(values);
        self
    }

    /// Ask the data service to return the affected records
    pub fn fetch(mut self) -> Self {
        self.meta = Some(QueryMeta { fetch: true });
        self
    }

    /// The `where` clause, if any
    pub fn where_clause(&self) -> Option<&Map<String, Value>> {
        self.criteria.as_ref().and_then(|c| c.where_clause.as_ref())
    }
}
