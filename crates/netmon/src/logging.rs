//! Logging setup for binaries embedding the engine.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for console logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_directives(level: &str) -> String {
    format!("netmon={},netmon_probe={}", level, level)
}

/// Initialize logging to stderr. `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str, format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))?;

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false);

    match format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(layer.compact().with_filter(env_filter))
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_filter(env_filter))
            .try_init()?,
    }

    info!("Logging initialized - Level: {}, Format: {:?}", level, format);
    Ok(())
}
