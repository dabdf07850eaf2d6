//! Logging initialization.
//!
//! Installs a tracing-subscriber fmt layer for hosts that have no subscriber
//! of their own.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when the host does not pass one.
pub const DEFAULT_FILTER: &str = "netmsg_client=info,netmsg_bridge=info";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `filter` when set. Returns false if a
/// global subscriber was already installed; calling this twice is harmless.
pub fn init_logging(filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(target: "netmsg_bridge::init", "Logging initialized");
    }
    installed
}
