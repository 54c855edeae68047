//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,blueprints=debug,tower_http=info";

/// Install a formatting subscriber
///
/// `RUST_LOG` wins over `filter`, which wins over [`DEFAULT_FILTER`]. Calling
/// this twice, or after another subscriber was installed, is a no-op.
pub fn init_tracing(filter: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}
