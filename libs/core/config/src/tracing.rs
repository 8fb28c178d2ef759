//! Process-wide error reporting and log output for the worker binaries.

use crate::Environment;
use tracing::debug;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

const PRODUCTION_FILTER: &str = "info,sea_orm=warn,sqlx=warn,lettre=warn";
const DEVELOPMENT_FILTER: &str = "debug,sea_orm=info,sqlx=warn,lettre=info,redis=info";

/// Install color-eyre with file:line locations and without the env section.
///
/// Safe to call more than once.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Filter directives used when `RUST_LOG` is unset
pub fn default_filter(environment: &Environment) -> &'static str {
    if environment.is_production() {
        PRODUCTION_FILTER
    } else {
        DEVELOPMENT_FILTER
    }
}

/// Install the global subscriber.
///
/// Production (`APP_ENV=production`) writes flattened JSON lines; anything
/// else gets pretty output. Both carry an `ErrorLayer` so eyre reports include
/// span traces. `RUST_LOG` overrides [`default_filter`]. Later calls are no-ops.
pub fn init_tracing(environment: &Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(environment)));

    let output = if environment.is_production() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .flatten_event(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .pretty()
            .boxed()
    };

    let installed = tracing_subscriber::registry()
        .with(output)
        .with(tracing_error::ErrorLayer::default())
        .with(filter)
        .try_init();

    match installed {
        Ok(()) => debug!(?environment, "Tracing initialized"),
        Err(_) => debug!("Tracing already initialized, skipping"),
    }
}
