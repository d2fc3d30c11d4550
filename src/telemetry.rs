use crate::error::{ErrorKind, Result};
use pdf_renderer_config::{LogConfig, LogFormat};
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber. `RUST_LOG`, when set, beats `log.level`.
pub fn init(log: &LogConfig) -> Result<()> {
    let default: Directive = log.level.parse().unwrap_or_else(|_| {
        // No subscriber yet to report this through.
        eprintln!("ignoring unparseable log level {:?}", log.level);
        LevelFilter::INFO.into()
    });
    let env_filter = EnvFilter::builder().with_default_directive(default).from_env_lossy();

    let fmt_layer = match log.format {
        LogFormat::Json => fmt::layer().json().with_current_span(true).with_span_list(true).with_target(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ErrorKind::Telemetry(e.to_string()))?;
    Ok(())
}
