//! Logging setup for Hiroba binaries.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose spans and events are enabled at the default level.
const LOGGED_CRATES: &[&str] = &["hiroba_server", "hiroba_shared", "tower_http"];

/// Initialize the tracing subscriber with the specified default log level.
///
/// Events from the Hiroba crates, from `tower_http` and from the binary
/// itself are enabled at `default_log_level`. The filter can be overridden
/// with the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "hiroba-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use hiroba_shared::logger::setup_logger;
///
/// setup_logger("hiroba-server", "debug");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the `EnvFilter` directive string used when `RUST_LOG` is unset.
fn default_filter(binary_name: &str, default_log_level: &str) -> String {
    let binary_target = binary_name.replace('-', "_");
    let mut targets: Vec<&str> = LOGGED_CRATES.to_vec();
    if !targets.contains(&binary_target.as_str()) {
        targets.push(&binary_target);
    }

    targets
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}
