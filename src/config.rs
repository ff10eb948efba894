//! Sniffer configuration.
//!
//! Configuration is usually built with [`SnifferBuilder`](crate::SnifferBuilder)
//! or loaded from TOML:
//!
//! ```toml
//! service = "10.0.0.1:6379"
//! buffer_capacity = 65536
//!
//! [analyze]
//! recorded = ["read", "write"]
//! detail = "with_reply"
//! read_hit_analysis = true
//!
//! [sink]
//! format = "json_lines"
//! channel_capacity = 1024
//! overflow = "drop_newest"
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::Deserialize;

use crate::analyzer::{CommandKind, RecordDetail};
use crate::error::{Result, SnifferError};
use crate::protocol::DEFAULT_BUFFER_CAPACITY;
use crate::sink::SinkConfig;

/// Default observed service port.
pub const DEFAULT_SERVICE_PORT: u16 = 6379;

/// Default capacity of the capture event channel.
pub const DEFAULT_CAPTURE_CHANNEL_CAPACITY: usize = 1024;

/// What to record for each analyzed exchange.
///
/// Shared read-only by every session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzeConfig {
    /// Command categories to record.
    pub recorded: Vec<CommandKind>,
    /// How much of each exchange to keep.
    pub detail: RecordDetail,
    /// Compute hit/miss status for read commands.
    pub read_hit_analysis: bool,
}

impl AnalyzeConfig {
    /// Check if commands of `kind` are recorded.
    #[inline]
    pub fn records(&self, kind: CommandKind) -> bool {
        self.recorded.contains(&kind)
    }
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            recorded: vec![CommandKind::Read],
            detail: RecordDetail::WithParams,
            read_hit_analysis: true,
        }
    }
}

/// Full sniffer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnifferConfig {
    /// Address of the observed key-value server.
    pub service: SocketAddr,
    /// Per-flow, per-direction buffer capacity in bytes.
    pub buffer_capacity: usize,
    /// Capacity of the channel between capture and the engine.
    pub capture_channel_capacity: usize,
    /// Analysis settings.
    pub analyze: AnalyzeConfig,
    /// Output settings.
    pub sink: SinkConfig,
}

impl SnifferConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SnifferConfig =
            toml::from_str(content).map_err(|e| SnifferError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SnifferError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(SnifferError::Config(
                "buffer_capacity must be greater than 0".to_string(),
            ));
        }
        if self.capture_channel_capacity == 0 {
            return Err(SnifferError::Config(
                "capture_channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.sink.channel_capacity == 0 {
            return Err(SnifferError::Config(
                "sink.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.analyze.recorded.is_empty() {
            return Err(SnifferError::Config(
                "analyze.recorded must name at least one command category".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            service: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_SERVICE_PORT)),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            capture_channel_capacity: DEFAULT_CAPTURE_CHANNEL_CAPACITY,
            analyze: AnalyzeConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}
