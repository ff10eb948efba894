//! Codec module - serialization of sink events.
//!
//! - [`JsonCodec`] - newline-delimited JSON for log sinks
//! - [`MsgPackCodec`] - length-prefixed MessagePack frames for publishers
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects.
//! The sink picks one per configured [`SinkFormat`](crate::sink::SinkFormat).
//!
//! # Example
//!
//! ```
//! use resp_sniffer::codec::{JsonCodec, MsgPackCodec};
//!
//! let line = JsonCodec::encode_line(&vec!["GET", "k"]).unwrap();
//! assert_eq!(line, b"[\"GET\",\"k\"]\n");
//!
//! let mut out = Vec::new();
//! MsgPackCodec::write_frame(&"hello", &mut out).unwrap();
//! let (body, consumed) = MsgPackCodec::read_frame(&out).unwrap();
//! assert_eq!(consumed, out.len());
//! assert_eq!(MsgPackCodec::decode::<String>(body).unwrap(), "hello");
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::{MsgPackCodec, FRAME_LENGTH_SIZE};
