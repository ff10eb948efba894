//! Per-direction byte accumulator for one flow.
//!
//! Captured TCP payloads rarely line up with RESP frame boundaries: one
//! packet may carry several pipelined commands, or a large bulk reply may
//! span many packets. [`FlowBuffer`] appends payloads into an owned region,
//! hands the unconsumed bytes to [`FrameDecoder`], and compacts after every
//! decode pass so the undecoded remainder always starts at offset 0.
//!
//! The region is bounded. An append that would exceed the configured
//! capacity is refused without touching the buffered data.
//!
//! # Example
//!
//! ```
//! use resp_sniffer::protocol::{FlowBuffer, Value};
//!
//! let mut buffer = FlowBuffer::new(1024);
//! buffer.append(b"*1\r\n$4\r\nPI").unwrap();
//! assert!(buffer.decode_all().unwrap().is_empty());
//!
//! buffer.append(b"NG\r\n").unwrap();
//! assert_eq!(buffer.decode_all().unwrap(), vec![Value::command(&["PING"])]);
//! assert!(buffer.is_empty());
//! ```

use bytes::{Buf, BytesMut};

use super::decoder::FrameDecoder;
use super::value::Value;
use crate::error::{Result, SnifferError};

/// Default per-direction capacity (64 KiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Initial allocation; the region grows on demand up to its capacity.
const INITIAL_ALLOCATION: usize = 4 * 1024;

/// Bounded byte region with append/decode/compact semantics.
///
/// Write offset is `region.len()`. The consumed offset only exists during a
/// decode pass: compaction rebases it to zero before `decode_all` returns.
#[derive(Debug)]
pub struct FlowBuffer {
    /// Appended, not yet decoded bytes.
    region: BytesMut,
    /// Maximum number of bytes the region may hold.
    capacity: usize,
}

impl FlowBuffer {
    /// Create an empty buffer bounded to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            region: BytesMut::with_capacity(capacity.min(INITIAL_ALLOCATION)),
            capacity,
        }
    }

    /// Append newly captured payload bytes.
    ///
    /// # Errors
    ///
    /// Returns `BufferOverflow` if the result would exceed the capacity.
    /// Buffered data is left unchanged in that case.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let needed = self.region.len() + data.len();
        if needed > self.capacity {
            return Err(SnifferError::BufferOverflow {
                needed,
                capacity: self.capacity,
            });
        }

        self.region.extend_from_slice(data);
        Ok(())
    }

    /// Decode every complete value in the buffer, then compact.
    ///
    /// A trailing partial frame stays buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` if the buffered bytes violate the grammar.
    /// Nothing is consumed, so the error repeats until the buffer is cleared.
    pub fn decode_all(&mut self) -> Result<Vec<Value>> {
        let decoded = FrameDecoder::decode(&self.region)?;
        self.compact(decoded.consumed);
        Ok(decoded.values)
    }

    /// Drop the consumed prefix so the remainder starts at offset 0.
    fn compact(&mut self, consumed: usize) {
        debug_assert!(consumed <= self.region.len());
        self.region.advance(consumed);
    }

    /// Get the number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Check if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Maximum number of bytes this buffer may hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that can still be appended.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.region.len()
    }

    /// Buffered, undecoded bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.region
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.region.clear();
    }
}

impl Default for FlowBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
