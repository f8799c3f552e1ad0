//! Observability infrastructure: tracing and metrics.
//!
//! Log output goes to stderr so stdout stays free for the definition side
//! channel.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Initialize global tracing and describe the client metrics.
///
/// `RUST_LOG` takes precedence over `default_level`. Calling this twice
/// returns an error instead of panicking.
pub fn init(default_level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .try_init()?;

    metrics::register_core_metrics();
    tracing::debug!("observability initialized");
    Ok(())
}
