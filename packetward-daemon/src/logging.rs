//! Logging initialization for the packetward daemon.
//!
//! Configures `tracing-subscriber` based on the `[general]` section
//! of `PacketwardConfig`. Supports JSON structured logging plus the
//! human-readable pretty and compact formats.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use packetward_core::config::GeneralConfig;

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
/// `RUST_LOG` takes precedence over `config.log_level`.
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines (default for production)
/// * `"pretty"` - Multi-line colored output (for development)
/// * `"compact"` - Single-line human-readable output
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e))?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e))?,
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
            .map_err(|e| {
                anyhow::anyhow!("failed to initialize compact tracing subscriber: {}", e)
            })?,
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json', 'pretty' or 'compact'",
                other
            ));
        }
    }

    Ok(())
}
