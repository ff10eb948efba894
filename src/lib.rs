//! # resp-sniffer
//!
//! Passive analyzer for RESP (Redis serialization protocol) traffic.
//!
//! The crate consumes TCP payloads that a capture facility has already
//! demultiplexed per connection, reassembles RESP messages in each
//! direction, pairs every request with its reply (pipelining and
//! MULTI/EXEC/DISCARD transactions included) and turns the pairs into
//! structured records with per-key cache hit/miss status.
//!
//! ## Architecture
//!
//! ```text
//! capture ─► CaptureEvent ─► Sniffer ─► SessionRegistry ─► FlowBuffer ─► FrameDecoder
//!                               │                                            │
//!                               │             Correlator (FIFO + MULTI) ◄────┘
//!                               │                    │
//!                               └──► analyze ◄───────┘
//!                                       │
//!                                       ▼
//!                            SinkHandle ─► sink task ─► JSON lines / MsgPack frames
//! ```
//!
//! Packet capture and TCP reassembly are out of scope: anything that can
//! produce [`CaptureEvent`]s can drive the sniffer.
//!
//! ## Example
//!
//! ```
//! use resp_sniffer::{CaptureEvent, EventBody, Sniffer};
//!
//! let mut sniffer = Sniffer::builder().build().unwrap();
//! let client = "10.0.0.2:50000".parse().unwrap();
//! let server = "127.0.0.1:6379".parse().unwrap();
//!
//! sniffer.handle(CaptureEvent::payload(client, server, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n"));
//! let out = sniffer.handle(CaptureEvent::payload(server, client, b"$-1\r\n"));
//!
//! assert!(matches!(&out[0].body, EventBody::Record(r) if r.cmd == "GET"));
//! assert_eq!(sniffer.hit_rate().misses, 1);
//! ```

pub mod analyzer;
pub mod backpressure;
pub mod capture;
pub mod codec;
pub mod config;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod sink;

pub use analyzer::{analyze, AnalysisRecord, CommandKind, KeyStat, KeyStatus, RecordDetail};
pub use backpressure::{OverflowPolicy, SinkStats};
pub use capture::{CaptureEvent, Direction, FlowKey};
pub use config::{AnalyzeConfig, SnifferConfig};
pub use correlator::{Correlator, MatchedPair, Pairing, TransactionState};
pub use engine::{HitRate, RunStats, Sniffer, SnifferBuilder};
pub use error::{ErrorKind, Result, SnifferError};
pub use logging::{init_tracing, LogFormat};
pub use protocol::{Command, FlowBuffer, FrameDecoder, Value};
pub use session::{Session, SessionId, SessionRegistry};
pub use sink::{spawn_sink_task, Delivery, EventBody, SinkConfig, SinkEvent, SinkFormat, SinkHandle};
