//! Decoded RESP values and the commands derived from them.
//!
//! RESP (version 2) has five value types, each introduced by a one-byte tag
//! and terminated by CRLF:
//!
//! ```text
//! +OK\r\n                      status
//! -ERR unknown command\r\n     error
//! :42\r\n                      integer
//! $5\r\nhello\r\n              bulk string ($-1\r\n = null)
//! *2\r\n$3\r\nGET\r\n$1\r\nk\r\n  array (*-1\r\n = null)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, SnifferError};

/// Status tag byte.
pub const STATUS_TAG: u8 = b'+';
/// Error tag byte.
pub const ERROR_TAG: u8 = b'-';
/// Integer tag byte.
pub const INTEGER_TAG: u8 = b':';
/// Bulk string tag byte.
pub const BULK_TAG: u8 = b'$';
/// Array tag byte.
pub const ARRAY_TAG: u8 = b'*';

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// One fully decoded RESP value. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Simple status string, e.g. `OK` or `QUEUED`.
    Status(String),
    /// Error string sent by the server.
    Error(String),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Bulk string; `None` is the null bulk.
    Bulk(Option<Bytes>),
    /// Array of values; `None` is the null array.
    Array(Option<Vec<Value>>),
}

impl Value {
    /// Build a bulk value from anything byte-like.
    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        Value::Bulk(Some(Bytes::copy_from_slice(data.as_ref())))
    }

    /// Build a status value.
    pub fn status(s: &str) -> Self {
        Value::Status(s.to_string())
    }

    /// Build a command array from string arguments.
    pub fn command(args: &[&str]) -> Self {
        Value::Array(Some(args.iter().map(Value::bulk).collect()))
    }

    /// Check if this is an error reply.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Check if this is the `+OK` status.
    #[inline]
    pub fn is_ok_status(&self) -> bool {
        matches!(self, Value::Status(s) if s == "OK")
    }

    /// Null or zero-length bulk/array, the shape of a cache miss.
    pub fn is_nil_or_empty(&self) -> bool {
        match self {
            Value::Bulk(None) | Value::Array(None) => true,
            Value::Bulk(Some(b)) => b.is_empty(),
            Value::Array(Some(items)) => items.is_empty(),
            Value::Status(s) => s.is_empty(),
            Value::Error(_) | Value::Integer(_) => false,
        }
    }

    /// Array elements, if this is a non-null array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    /// Short type name for log messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Status(_) => "status",
            Value::Error(_) => "error",
            Value::Integer(_) => "integer",
            Value::Bulk(_) => "bulk",
            Value::Array(_) => "array",
        }
    }

    /// Re-encode this value in its exact RESP wire form.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Value::Status(s) => put_line(buf, STATUS_TAG, s.as_bytes()),
            Value::Error(s) => put_line(buf, ERROR_TAG, s.as_bytes()),
            Value::Integer(n) => put_line(buf, INTEGER_TAG, n.to_string().as_bytes()),
            Value::Bulk(None) => put_line(buf, BULK_TAG, b"-1"),
            Value::Bulk(Some(data)) => {
                put_line(buf, BULK_TAG, data.len().to_string().as_bytes());
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Value::Array(None) => put_line(buf, ARRAY_TAG, b"-1"),
            Value::Array(Some(items)) => {
                put_line(buf, ARRAY_TAG, items.len().to_string().as_bytes());
                for item in items {
                    item.encode_into(buf);
                }
            }
        }
    }

    /// Re-encode this value into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

fn put_line(buf: &mut BytesMut, tag: u8, body: &[u8]) {
    buf.reserve(body.len() + 3);
    buf.put_u8(tag);
    buf.put_slice(body);
    buf.put_slice(CRLF);
}

/// A client request: an array of bulk strings re-materialized as text.
///
/// `args[0]` is the command name (case-insensitive), the rest are arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<String>,
}

impl Command {
    /// Create a command from its arguments.
    ///
    /// # Errors
    ///
    /// Returns `Analysis` error if `args` is empty.
    pub fn new(args: Vec<String>) -> Result<Self> {
        if args.is_empty() {
            return Err(SnifferError::Analysis("empty args for command".to_string()));
        }
        Ok(Self { args })
    }

    /// Interpret a decoded request value as a command.
    ///
    /// # Errors
    ///
    /// Returns `Analysis` error unless the value is a non-empty array whose
    /// elements are all non-null bulk strings.
    pub fn from_value(value: &Value) -> Result<Self> {
        let items = match value {
            Value::Array(Some(items)) => items,
            other => {
                return Err(SnifferError::Analysis(format!(
                    "request is not a command array (got {})",
                    other.type_name()
                )))
            }
        };

        let mut args = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Bulk(Some(data)) => args.push(String::from_utf8_lossy(data).into_owned()),
                other => {
                    return Err(SnifferError::Analysis(format!(
                        "command argument is {}, expected bulk string",
                        other.type_name()
                    )))
                }
            }
        }
        Self::new(args)
    }

    /// Command name as sent by the client.
    pub fn name(&self) -> &str {
        &self.args[0]
    }

    /// Upper-cased command name for table lookups.
    pub fn upper_name(&self) -> String {
        self.args[0].to_ascii_uppercase()
    }

    /// Arguments after the command name.
    pub fn params(&self) -> &[String] {
        &self.args[1..]
    }

    /// All arguments including the command name.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Check the command name case-insensitively.
    #[inline]
    pub fn is(&self, name: &str) -> bool {
        self.args[0].eq_ignore_ascii_case(name)
    }
}
