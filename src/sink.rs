//! Sink adapter: the only place analysis output is written.
//!
//! The engine hands finished [`SinkEvent`]s to a [`SinkHandle`]; a dedicated
//! writer task drains the channel, batches whatever is ready, encodes it in
//! the configured [`SinkFormat`] and writes it to any `AsyncWrite`.
//!
//! ```text
//! Sniffer ─► SinkHandle ─► mpsc::Sender<SinkEvent> ─► sink task ─► writer
//!                │
//!                └─ OverflowPolicy: Block (await) | DropNewest (count)
//! ```
//!
//! The JSON-lines format suits log files and stdout; the MsgPack format
//! emits length-prefixed frames for an external publisher to forward.

use std::fmt::Display;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::analyzer::{AnalysisRecord, CommandKind};
use crate::backpressure::{OverflowPolicy, SinkStats};
use crate::capture::FlowKey;
use crate::codec::{JsonCodec, MsgPackCodec};
use crate::error::{ErrorKind, Result, SnifferError};
use crate::session::SessionId;

/// Default sink channel capacity.
pub const DEFAULT_SINK_CHANNEL_CAPACITY: usize = 1024;

/// Maximum events to encode into a single write.
const MAX_BATCH_SIZE: usize = 64;

/// Output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SinkFormat {
    /// One JSON object per line.
    #[default]
    #[serde(rename = "json_lines")]
    JsonLines,
    /// u32 big-endian length prefix followed by a MessagePack map.
    #[serde(rename = "msgpack")]
    MsgPack,
}

/// Configuration for the sink task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinkConfig {
    /// Output encoding.
    pub format: SinkFormat,
    /// Channel capacity for the event queue.
    pub channel_capacity: usize,
    /// What to do when the queue is full.
    pub overflow: OverflowPolicy,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            format: SinkFormat::default(),
            channel_capacity: DEFAULT_SINK_CHANNEL_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// What happened in one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventBody {
    /// A successfully analyzed request/reply pair.
    Record(AnalysisRecord),
    /// The server answered a request with an error reply.
    RequestError {
        cmd: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cmd_type: Option<CommandKind>,
        message: String,
    },
    /// A transaction was discarded.
    TransactionDiscarded { queued: usize },
    /// Buffering, decoding, pairing or analysis failed.
    Error { kind: ErrorKind, cause: String },
}

impl EventBody {
    /// Build an error body from a sniffer error.
    pub fn from_error(err: &SnifferError) -> Self {
        EventBody::Error {
            kind: err.kind(),
            cause: err.to_string(),
        }
    }

    /// Check if this body reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, EventBody::Error { .. })
    }
}

/// One unit of sink output, tagged with session metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkEvent {
    /// Session the event belongs to.
    pub session: SessionId,
    /// Session packet counter when the event was produced.
    pub counter: u64,
    #[serde(serialize_with = "as_display")]
    pub client: SocketAddr,
    #[serde(serialize_with = "as_display")]
    pub server: SocketAddr,
    /// Emission time.
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub body: EventBody,
}

impl SinkEvent {
    /// Create an event stamped with the current time.
    pub fn new(session: SessionId, counter: u64, flow: FlowKey, body: EventBody) -> Self {
        Self {
            session,
            counter,
            client: flow.client,
            server: flow.server,
            ts: Utc::now(),
            body,
        }
    }
}

fn as_display<T: Display, S: Serializer>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Outcome of handing an event to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The event is queued for the writer.
    Queued,
    /// The queue was full and the event was dropped.
    Dropped,
}

/// Handle for sending events to the sink task.
///
/// Cheaply cloneable; clones share the channel and the statistics.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<SinkEvent>,
    policy: OverflowPolicy,
    stats: SinkStats,
}

impl SinkHandle {
    fn new(tx: mpsc::Sender<SinkEvent>, policy: OverflowPolicy, stats: SinkStats) -> Self {
        Self { tx, policy, stats }
    }

    /// Hand an event to the sink task.
    ///
    /// With [`OverflowPolicy::Block`] this waits for queue space. With
    /// [`OverflowPolicy::DropNewest`] a full queue drops the event, counts
    /// it and returns [`Delivery::Dropped`].
    ///
    /// # Errors
    ///
    /// Returns `SinkClosed` if the sink task has exited.
    pub async fn send(&self, event: SinkEvent) -> Result<Delivery> {
        match self.policy {
            OverflowPolicy::Block => {
                self.tx
                    .send(event)
                    .await
                    .map_err(|_| SnifferError::SinkClosed)?;
            }
            OverflowPolicy::DropNewest => match self.tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = self.stats.record_dropped();
                    tracing::warn!(dropped, "sink queue full, event dropped");
                    return Ok(Delivery::Dropped);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(SnifferError::SinkClosed),
            },
        }

        self.stats.record_accepted();
        Ok(Delivery::Queued)
    }

    /// Overflow policy in effect.
    #[inline]
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Shared delivery counters.
    #[inline]
    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }
}

/// Spawn the sink task and return a handle for sending events.
///
/// The task ends with `Ok(())` once every handle is dropped and the queue
/// is drained, or with the first write error.
pub fn spawn_sink_task<W>(writer: W, config: &SinkConfig) -> (SinkHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let stats = SinkStats::new();
    let handle = SinkHandle::new(tx, config.overflow, stats.clone());

    let task = tokio::spawn(sink_loop(rx, writer, config.format, stats));

    (handle, task)
}

async fn sink_loop<W>(
    mut rx: mpsc::Receiver<SinkEvent>,
    mut writer: W,
    format: SinkFormat,
    stats: SinkStats,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
    let mut buf = Vec::new();

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }

        buf.clear();
        let result = write_batch(&mut writer, format, &batch, &mut buf).await;
        if let Err(e) = result {
            tracing::error!(error = %e, pending = batch.len(), "sink write failed");
            return Err(e);
        }

        stats.record_written(batch.len() as u64);
        batch.clear();
    }

    writer.flush().await?;
    Ok(())
}

async fn write_batch<W>(
    writer: &mut W,
    format: SinkFormat,
    batch: &[SinkEvent],
    buf: &mut Vec<u8>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for event in batch {
        encode_event(format, event, buf)?;
    }
    writer.write_all(buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Append `event` to `out` in the given format.
pub fn encode_event(format: SinkFormat, event: &SinkEvent, out: &mut Vec<u8>) -> Result<()> {
    match format {
        SinkFormat::JsonLines => JsonCodec::write_line(event, out),
        SinkFormat::MsgPack => MsgPackCodec::write_frame(event, out),
    }
}
