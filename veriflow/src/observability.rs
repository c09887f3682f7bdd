//! Structured logging setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Output format for pipeline logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable line format.
    #[default]
    Text,
    /// Newline-delimited JSON, for log shipping.
    Json,
}

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info` for this crate.
/// Safe to call once per process; embedders that install their own
/// subscriber should skip this.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,veriflow=info"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
