//! Server module for building HTTP servers with blueprint routes
//!
//! - [`route_table`]: models and configuration → route bindings, once at boot
//! - [`router`]: route bindings → axum routes
//! - [`ServerBuilder`]: wiring, serving and graceful shutdown

pub mod builder;
pub mod exposure;
pub mod host;
pub mod route_table;
pub mod router;

pub use builder::ServerBuilder;
pub use exposure::RestExposure;
pub use host::ServerHost;
pub use route_table::{HttpVerb, RouteBinding, RouteTable, RouteTableGenerator, RouteTarget};
