//! Core module containing the request compiler and the types it works on

pub mod associations;
pub mod compiler;
pub mod criteria;
pub mod error;
pub mod events;
pub mod extractors;
pub mod model;
pub mod pluralize;
pub mod query;
pub mod request;
pub mod route;
pub mod service;
pub mod values;

pub use compiler::QueryCompiler;
pub use error::{BlueprintError, ConfigError};
pub use events::{EventBus, Notifier};
pub use model::{ModelDescriptor, ModelRegistry};
pub use pluralize::Pluralizer;
pub use query::QueryOptions;
pub use request::BlueprintRequest;
pub use route::{BlueprintAction, RouteMetadata};
pub use service::DataService;
