//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr so stdout stays free for a JSON-lines sink.
//! `RUST_LOG` overrides the configured level.

use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Result, SnifferError};

/// Output format for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Structured JSON lines.
    Json,
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns `Config` error if a global subscriber is already installed.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| SnifferError::Config(format!("failed to install tracing subscriber: {}", e)))
}
