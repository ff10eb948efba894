//! Error types for resp-sniffer.

use serde::Serialize;
use thiserror::Error;

/// Main error type for all sniffer operations.
///
/// Nothing here is fatal to the process: the worst case is that a single
/// session's analysis becomes unreliable until it is torn down.
#[derive(Debug, Error)]
pub enum SnifferError {
    /// A flow buffer would exceed its configured capacity.
    #[error("buffer overflow: {needed} bytes needed, capacity is {capacity}")]
    BufferOverflow { needed: usize, capacity: usize },

    /// Captured bytes violate the RESP grammar.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A reply arrived with no pending request to pair it with.
    #[error("reply observed with no pending request")]
    Desync,

    /// EXEC reply does not line up with the queued transaction commands.
    #[error("transaction mismatch: {queued} commands queued, {replied} results replied")]
    TransactionMismatch { queued: usize, replied: usize },

    /// The session stopped being analyzed after an overflow or malformed
    /// frame. Holds the original cause.
    #[error("session unanalyzable until teardown: {0}")]
    Unanalyzable(String),

    /// A request/reply pair could not be analyzed.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// I/O error while writing to a sink or reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The sink task has stopped accepting events.
    #[error("sink closed")]
    SinkClosed,
}

/// Stable tag for an error, used when errors are published to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BufferOverflow,
    MalformedFrame,
    Desync,
    TransactionMismatch,
    Unanalyzable,
    Analysis,
    Io,
    Serialization,
    Config,
    SinkClosed,
}

impl SnifferError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SnifferError::BufferOverflow { .. } => ErrorKind::BufferOverflow,
            SnifferError::MalformedFrame(_) => ErrorKind::MalformedFrame,
            SnifferError::Desync => ErrorKind::Desync,
            SnifferError::TransactionMismatch { .. } => ErrorKind::TransactionMismatch,
            SnifferError::Unanalyzable(_) => ErrorKind::Unanalyzable,
            SnifferError::Analysis(_) => ErrorKind::Analysis,
            SnifferError::Io(_) => ErrorKind::Io,
            SnifferError::Json(_)
            | SnifferError::MsgPackEncode(_)
            | SnifferError::MsgPackDecode(_) => ErrorKind::Serialization,
            SnifferError::Config(_) => ErrorKind::Config,
            SnifferError::SinkClosed => ErrorKind::SinkClosed,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        SnifferError::MalformedFrame(msg.into())
    }
}

/// Result type alias using SnifferError.
pub type Result<T> = std::result::Result<T, SnifferError>;
