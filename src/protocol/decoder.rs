//! RESP frame decoding.
//!
//! [`FrameDecoder::decode`] parses as many complete values as it can find at
//! the front of a byte slice and reports how many bytes they occupied. A
//! trailing partial frame is left undecoded and not counted, so the caller
//! can append more bytes and decode again from the same position. The
//! decoder itself holds no state between calls.
//!
//! # Example
//!
//! ```
//! use resp_sniffer::protocol::{FrameDecoder, Value};
//!
//! let decoded = FrameDecoder::decode(b"+OK\r\n:42\r\n$5\r\nhel").unwrap();
//! assert_eq!(decoded.values, vec![Value::status("OK"), Value::Integer(42)]);
//! assert_eq!(decoded.consumed, 10);
//! ```

use bytes::Bytes;

use super::value::{Value, ARRAY_TAG, BULK_TAG, CRLF, ERROR_TAG, INTEGER_TAG, STATUS_TAG};
use crate::error::{Result, SnifferError};

/// Largest bulk string the server accepts (512 MB).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Maximum array nesting depth before input is rejected.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Upper bound on up-front allocation for an array header's element count.
const MAX_PREALLOC_ITEMS: usize = 1024;

/// Sentinel length for null bulk strings and null arrays.
const NULL_LEN: i64 = -1;

/// Values decoded from the front of a buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Complete values, in wire order.
    pub values: Vec<Value>,
    /// Bytes occupied by `values`.
    pub consumed: usize,
}

/// Stateless RESP decoder.
pub struct FrameDecoder;

impl FrameDecoder {
    /// Decode every complete value at the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` if any frame violates the grammar. In that
    /// case nothing is reported as consumed.
    pub fn decode(buf: &[u8]) -> Result<Decoded> {
        let mut decoded = Decoded::default();

        while let Some((value, next)) = parse(buf, decoded.consumed, 0)? {
            decoded.values.push(value);
            decoded.consumed = next;
        }

        Ok(decoded)
    }

    /// Decode a single value from the front of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` holds only part of a frame.
    pub fn decode_one(buf: &[u8]) -> Result<Option<(Value, usize)>> {
        parse(buf, 0, 0)
    }
}

/// Parse one value starting at `pos`, returning it and the position after it.
fn parse(buf: &[u8], pos: usize, depth: usize) -> Result<Option<(Value, usize)>> {
    let Some(&tag) = buf.get(pos) else {
        return Ok(None);
    };

    // Reject bad tags before waiting for a line terminator.
    if !matches!(
        tag,
        STATUS_TAG | ERROR_TAG | INTEGER_TAG | BULK_TAG | ARRAY_TAG
    ) {
        return Err(SnifferError::malformed(format!(
            "unexpected type tag 0x{:02x} at offset {}",
            tag, pos
        )));
    }

    let Some((line, next)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    match tag {
        STATUS_TAG => Ok(Some((
            Value::Status(String::from_utf8_lossy(line).into_owned()),
            next,
        ))),
        ERROR_TAG => Ok(Some((
            Value::Error(String::from_utf8_lossy(line).into_owned()),
            next,
        ))),
        INTEGER_TAG => Ok(Some((Value::Integer(parse_int(line, "integer")?), next))),
        BULK_TAG => parse_bulk(buf, line, next),
        _ => parse_array(buf, line, next, depth),
    }
}

fn parse_bulk(buf: &[u8], line: &[u8], next: usize) -> Result<Option<(Value, usize)>> {
    let len = parse_int(line, "bulk length")?;
    if len == NULL_LEN {
        return Ok(Some((Value::Bulk(None), next)));
    }
    if len < NULL_LEN || len > MAX_BULK_LEN {
        return Err(SnifferError::malformed(format!("invalid bulk length {}", len)));
    }

    let len = len as usize;
    let end = next + len;
    if buf.len() < end + CRLF.len() {
        return Ok(None);
    }
    if &buf[end..end + CRLF.len()] != CRLF {
        return Err(SnifferError::malformed(format!(
            "bulk string of length {} not terminated by CRLF",
            len
        )));
    }

    let data = Bytes::copy_from_slice(&buf[next..end]);
    Ok(Some((Value::Bulk(Some(data)), end + CRLF.len())))
}

fn parse_array(
    buf: &[u8],
    line: &[u8],
    next: usize,
    depth: usize,
) -> Result<Option<(Value, usize)>> {
    let count = parse_int(line, "array length")?;
    if count == NULL_LEN {
        return Ok(Some((Value::Array(None), next)));
    }
    if count < NULL_LEN {
        return Err(SnifferError::malformed(format!("invalid array length {}", count)));
    }
    if depth >= MAX_NESTING_DEPTH {
        return Err(SnifferError::malformed(format!(
            "array nesting deeper than {}",
            MAX_NESTING_DEPTH
        )));
    }

    let count = count as usize;
    let mut items = Vec::with_capacity(count.min(MAX_PREALLOC_ITEMS));
    let mut cursor = next;

    for _ in 0..count {
        match parse(buf, cursor, depth + 1)? {
            Some((item, after)) => {
                items.push(item);
                cursor = after;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((Value::Array(Some(items)), cursor)))
}

/// Find the CRLF-terminated line starting at `start`.
///
/// Returns the line body and the position just past the terminator.
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let idx = rest.windows(CRLF.len()).position(|w| w == CRLF)?;
    Some((&rest[..idx], start + idx + CRLF.len()))
}

fn parse_int(line: &[u8], what: &str) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            SnifferError::malformed(format!(
                "non-numeric {}: {:?}",
                what,
                String::from_utf8_lossy(line)
            ))
        })
}
