//! Protocol module - RESP values, frame decoding, and flow buffering.
//!
//! This module implements the wire-level half of the sniffer:
//! - `Value`/`Command`: decoded RESP values and client commands
//! - `FrameDecoder`: stateless decoding of complete frames from a byte slice
//! - `FlowBuffer`: bounded per-direction accumulator with compaction

mod decoder;
mod flow_buffer;
mod value;

pub use decoder::{Decoded, FrameDecoder, MAX_BULK_LEN, MAX_NESTING_DEPTH};
pub use flow_buffer::{FlowBuffer, DEFAULT_BUFFER_CAPACITY};
pub use value::{Command, Value, ARRAY_TAG, BULK_TAG, CRLF, ERROR_TAG, INTEGER_TAG, STATUS_TAG};
