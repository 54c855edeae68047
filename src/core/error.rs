//! Typed error handling for blueprint routes
//!
//! Every failure a blueprint can produce is classified so that the HTTP
//! boundary can pick a response code without inspecting messages:
//!
//! - [`BlueprintError::Usage`]: the client sent something unusable (malformed
//!   `where` JSON, missing `id`) → 400
//! - [`BlueprintError::NotFound`]: the parent, child or record is absent → 404
//! - [`BlueprintError::Config`]: the route or registry is inconsistent → 500
//! - [`BlueprintError::Validation`]: the data service rejected the values → 400
//! - [`BlueprintError::Store`]: any other data service failure → 500
//!
//! # Example
//!
//! ```rust,ignore
//! match compiler.compile(BlueprintAction::Find, &route, &request) {
//!     Ok(query) => run(query).await,
//!     Err(BlueprintError::Usage { message }) => bad_request(message),
//!     Err(e) => return Err(e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::core::service::StoreError;

/// The main error type for blueprint actions
#[derive(Debug, Error)]
pub enum BlueprintError {
    /// The request cannot be interpreted (client error)
    #[error("{message}")]
    Usage { message: String },

    /// A record the action depends on does not exist
    #[error("{message}")]
    NotFound { message: String },

    /// The route, model registry or blueprint configuration is inconsistent
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The data service rejected the submitted values
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The data service failed for a reason other than validation
    #[error("Store error: {0}")]
    Store(String),
}

impl BlueprintError {
    /// Build a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Build a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            BlueprintError::Usage { .. } => StatusCode::BAD_REQUEST,
            BlueprintError::NotFound { .. } => StatusCode::NOT_FOUND,
            BlueprintError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BlueprintError::Validation { .. } => StatusCode::BAD_REQUEST,
            BlueprintError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            BlueprintError::Usage { .. } => "USAGE_ERROR",
            BlueprintError::NotFound { .. } => "NOT_FOUND",
            BlueprintError::Config(e) => e.error_code(),
            BlueprintError::Validation { .. } => "VALIDATION_ERROR",
            BlueprintError::Store(_) => "STORE_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        let details = match self {
            BlueprintError::Validation { details, .. } => details.clone(),
            _ => None,
        };

        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for BlueprintError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "{}", self);
        }
        (status, Json(self.to_response())).into_response()
    }
}

impl From<StoreError> for BlueprintError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation { message, details } => {
                BlueprintError::Validation { message, details }
            }
            StoreError::Internal(message) => BlueprintError::Store(message),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while reading the model registry, the blueprint
/// configuration, or the metadata bound to a route
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Failed to parse a configuration document
    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// A route or association references a model that is not registered
    #[error("Unknown model: `{model}`")]
    UnknownModel { model: String },

    /// A route references an association the model does not declare
    #[error("Model `{model}` has no association `{alias}`")]
    UnknownAssociation { model: String, alias: String },

    /// A relation blueprint was bound without an alias
    #[error("Missing required route option `alias` for `{model}/{action}`")]
    MissingAlias { model: String, action: String },

    /// Two associations of one model share an alias
    #[error("Duplicate association alias `{alias}` on model `{model}`")]
    DuplicateAlias { model: String, alias: String },

    /// An association definition is incomplete or contradictory
    #[error("Invalid association `{alias}` on model `{model}`: {message}")]
    InvalidAssociation {
        model: String,
        alias: String,
        message: String,
    },

    /// A multi-step mutation plan is malformed
    #[error("Invalid task graph: {message}")]
    InvalidPlan { message: String },
}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::Parse { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::UnknownModel { .. } => "UNKNOWN_MODEL",
            ConfigError::UnknownAssociation { .. } => "UNKNOWN_ASSOCIATION",
            ConfigError::MissingAlias { .. } => "MISSING_ALIAS",
            ConfigError::DuplicateAlias { .. } => "DUPLICATE_ALIAS",
            ConfigError::InvalidAssociation { .. } => "INVALID_ASSOCIATION",
            ConfigError::InvalidPlan { .. } => "INVALID_TASK_GRAPH",
        }
    }
}
