//! Sniffer builder and runtime loop.
//!
//! The [`SnifferBuilder`] provides a fluent API for configuring the sniffer.
//! The [`Sniffer`] owns every session and drives each capture event through
//! the pipeline:
//! 1. Resolve the flow key and direction
//! 2. Append, decode and pair in the session ([`Correlator`])
//! 3. Analyze matched pairs ([`analyze`])
//! 4. Hand the results to the sink
//!
//! Payload and teardown events arrive on one channel and are handled by one
//! task, so a teardown can never interleave with an ingest for the same flow.
//!
//! # Example
//!
//! ```no_run
//! use resp_sniffer::{spawn_sink_task, CaptureEvent, Sniffer};
//!
//! # async fn demo() -> resp_sniffer::Result<()> {
//! let sniffer = Sniffer::builder()
//!     .service("127.0.0.1:6379".parse().unwrap())
//!     .buffer_capacity(16 * 1024)
//!     .build()?;
//!
//! let (sink, sink_task) = spawn_sink_task(tokio::io::stdout(), &sniffer.config().sink);
//! let (capture_tx, capture_rx) = sniffer.capture_channel();
//! let engine = tokio::spawn(sniffer.run(capture_rx, sink));
//!
//! // The capture facility feeds events here.
//! # let (client, server) = ("127.0.0.1:50000".parse().unwrap(), "127.0.0.1:6379".parse().unwrap());
//! capture_tx.send(CaptureEvent::teardown(client, server)).await.ok();
//! drop(capture_tx);
//!
//! let stats = engine.await.expect("engine task panicked")?;
//! sink_task.await.expect("sink task panicked")?;
//! println!("{} events", stats.events);
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::analyzer::{analyze, CommandKind, KeyStat, KeyStatus, RecordDetail};
use crate::backpressure::OverflowPolicy;
use crate::capture::{CaptureEvent, FlowKey};
use crate::config::{AnalyzeConfig, SnifferConfig};
use crate::correlator::{Correlator, Pairing};
use crate::error::Result;
use crate::sink::{EventBody, SinkConfig, SinkEvent, SinkFormat, SinkHandle};

/// Builder for configuring and creating a [`Sniffer`].
#[derive(Debug, Clone, Default)]
pub struct SnifferBuilder {
    config: SnifferConfig,
}

impl SnifferBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. loaded from TOML).
    pub fn from_config(config: SnifferConfig) -> Self {
        Self { config }
    }

    /// Set the observed server address.
    ///
    /// Default: 127.0.0.1:6379
    pub fn service(mut self, addr: SocketAddr) -> Self {
        self.config.service = addr;
        self
    }

    /// Set the per-flow, per-direction buffer capacity in bytes.
    ///
    /// Default: 64 KiB
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    /// Set the capture channel capacity.
    ///
    /// Default: 1024
    pub fn capture_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.capture_channel_capacity = capacity;
        self
    }

    /// Replace the whole analysis configuration.
    pub fn analyze(mut self, analyze: AnalyzeConfig) -> Self {
        self.config.analyze = analyze;
        self
    }

    /// Set the recorded command categories.
    pub fn recorded(mut self, kinds: impl IntoIterator<Item = CommandKind>) -> Self {
        self.config.analyze.recorded = kinds.into_iter().collect();
        self
    }

    /// Set the record detail level.
    pub fn detail(mut self, detail: RecordDetail) -> Self {
        self.config.analyze.detail = detail;
        self
    }

    /// Enable or disable hit/miss analysis for reads.
    pub fn read_hit_analysis(mut self, enabled: bool) -> Self {
        self.config.analyze.read_hit_analysis = enabled;
        self
    }

    /// Replace the sink configuration.
    pub fn sink(mut self, sink: SinkConfig) -> Self {
        self.config.sink = sink;
        self
    }

    /// Set the sink output format.
    pub fn sink_format(mut self, format: SinkFormat) -> Self {
        self.config.sink.format = format;
        self
    }

    /// Set the sink overflow policy.
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.sink.overflow = policy;
        self
    }

    /// Validate the configuration and build the sniffer.
    pub fn build(self) -> Result<Sniffer> {
        self.config.validate()?;
        Ok(Sniffer::new(self.config))
    }
}

/// Global key hit/miss/error totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HitRate {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl HitRate {
    /// Count a record's key statistics.
    pub fn record(&mut self, stats: &[KeyStat]) {
        for stat in stats {
            match stat.status {
                KeyStatus::Hit => self.hits += 1,
                KeyStatus::Miss => self.misses += 1,
                KeyStatus::Error => self.errors += 1,
            }
        }
    }

    /// Keys counted so far.
    pub fn total(&self) -> u64 {
        self.hits + self.misses + self.errors
    }

    /// Fraction of keys that hit, 0.0 before any key is seen.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.total())
    }

    /// Fraction of keys that missed, 0.0 before any key is seen.
    pub fn miss_rate(&self) -> f64 {
        ratio(self.misses, self.total())
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Counters reported when the sniffer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Capture events handled.
    pub events: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    /// Analysis records emitted.
    pub records: u64,
    /// Request errors and transaction discards emitted.
    pub notices: u64,
    /// Error events emitted.
    pub errors: u64,
    pub hit_rate: HitRate,
}

/// The analysis engine.
///
/// Owns the session registry exclusively; use [`Sniffer::handle`] for
/// synchronous driving or [`Sniffer::run`] inside a task.
#[derive(Debug)]
pub struct Sniffer {
    config: SnifferConfig,
    correlator: Correlator,
    stats: RunStats,
}

impl Sniffer {
    /// Create a new sniffer builder.
    pub fn builder() -> SnifferBuilder {
        SnifferBuilder::new()
    }

    fn new(config: SnifferConfig) -> Self {
        Self {
            correlator: Correlator::new(config.buffer_capacity),
            config,
            stats: RunStats::default(),
        }
    }

    /// Effective configuration.
    pub fn config(&self) -> &SnifferConfig {
        &self.config
    }

    /// Session state.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Counters so far.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Global hit/miss totals so far.
    pub fn hit_rate(&self) -> &HitRate {
        &self.stats.hit_rate
    }

    /// Create a capture channel sized from the configuration.
    pub fn capture_channel(&self) -> (mpsc::Sender<CaptureEvent>, mpsc::Receiver<CaptureEvent>) {
        mpsc::channel(self.config.capture_channel_capacity.max(1))
    }

    /// Process one capture event and return what should be emitted.
    ///
    /// Events come out in pairing order for the session.
    pub fn handle(&mut self, event: CaptureEvent) -> Vec<SinkEvent> {
        self.stats.events += 1;
        let (key, direction) = event.flow(self.config.service);

        match event {
            CaptureEvent::Payload { payload, .. } => {
                if self.correlator.registry().get(&key).is_none() {
                    self.stats.sessions_opened += 1;
                }

                let ingested = self.correlator.observe(key, direction, &payload);
                let (session, counter) = (ingested.session, ingested.counter);

                ingested
                    .pairings
                    .into_iter()
                    .filter_map(|pairing| self.emit_body(key, pairing))
                    .map(|body| SinkEvent::new(session, counter, key, body))
                    .collect()
            }
            CaptureEvent::Teardown { .. } => {
                if self.correlator.teardown(&key) {
                    self.stats.sessions_closed += 1;
                }
                Vec::new()
            }
        }
    }

    fn emit_body(&mut self, key: FlowKey, pairing: Pairing) -> Option<EventBody> {
        let body = match pairing {
            Pairing::Matched(pair) => match analyze(&pair, &self.config.analyze) {
                Ok(Some(record)) => {
                    if let Some(stat) = &record.stat {
                        self.stats.hit_rate.record(stat);
                    }
                    EventBody::Record(record)
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(flow = %key, cmd = pair.command.name(), "{}", e);
                    EventBody::from_error(&e)
                }
            },
            Pairing::RequestError { command, message } => {
                let cmd = command.upper_name();
                EventBody::RequestError {
                    cmd_type: CommandKind::classify(&cmd),
                    cmd,
                    message,
                }
            }
            Pairing::TransactionDiscarded { queued } => EventBody::TransactionDiscarded { queued },
            Pairing::Failed(e) => EventBody::from_error(&e),
        };

        match &body {
            EventBody::Record(_) => self.stats.records += 1,
            EventBody::Error { .. } => self.stats.errors += 1,
            _ => self.stats.notices += 1,
        }
        Some(body)
    }

    /// Consume capture events until the channel closes.
    ///
    /// # Errors
    ///
    /// Returns `SinkClosed` if the sink task stops accepting events.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<CaptureEvent>,
        sink: SinkHandle,
    ) -> Result<RunStats> {
        while let Some(event) = events.recv().await {
            for out in self.handle(event) {
                sink.send(out).await?;
            }
        }

        tracing::debug!(
            events = self.stats.events,
            records = self.stats.records,
            errors = self.stats.errors,
            live_sessions = self.correlator.registry().len(),
            "capture channel closed"
        );
        Ok(self.stats)
    }
}
