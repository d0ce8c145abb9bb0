//! Tracing initialization (fmt subscriber with an env filter).
//!
//! `RUST_LOG` takes precedence; otherwise the filter comes from the `log_filter` config
//! field. Repository methods emit spans through `#[instrument]`, and SQL statements are
//! logged by sqlx at debug level (slow ones at warn, see [`crate::db::connect`]).
//!
//! ```bash
//! RUST_LOG="rolemap=debug,sqlx=warn" rolemap -f rolemap.yaml
//! ```

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing with a console fmt layer.
///
/// Parameters:
/// - `default_filter`: directives used when `RUST_LOG` is unset or invalid
pub fn init_telemetry(default_filter: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");

    Ok(())
}
