//! Data-access contract consumed by the blueprint actions

use crate::core::query::QueryOptions;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// A stored record, as the data service hands it back
pub type Record = Map<String, Value>;

/// Result alias for data service calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure reported by a data service
///
/// Validation failures are kept apart from internal failures so the HTTP
/// boundary can answer 400 for the former and 500 for the latter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The submitted values were rejected
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    /// Anything else (connection, lock, corrupted state, ...)
    #[error("{0}")]
    Internal(String),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation {
            message: message.into(),
            details: None,
        }
    }
}

/// Service trait executing compiled [`QueryOptions`]
///
/// Implementations own persistence; the blueprint layer only builds the
/// descriptors. Every method reads the model identity from `query.using`.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Records matching `criteria`, with `populates` expanded
    async fn find(&self, query: &QueryOptions) -> StoreResult<Vec<Record>>;

    /// First record matching `criteria`, with `populates` expanded
    async fn find_one(&self, query: &QueryOptions) -> StoreResult<Option<Record>>;

    /// Create every record of `new_record`, returned in submission order
    async fn create(&self, query: &QueryOptions) -> StoreResult<Vec<Record>>;

    /// Apply `values_to_set` to records matching `criteria`
    async fn update(&self, query: &QueryOptions) -> StoreResult<Vec<Record>>;

    /// Destroy records matching `criteria`, returning what was removed
    async fn destroy(&self, query: &QueryOptions) -> StoreResult<Vec<Record>>;

    /// Number of records matching `criteria` (pagination ignored)
    async fn count(&self, query: &QueryOptions) -> StoreResult<u64>;
}
