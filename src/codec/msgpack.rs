//! MsgPack codec using `rmp-serde`.
//!
//! Always uses `to_vec_named`: structs are written as maps with field
//! names, so consumers in other languages can read events without knowing
//! the field order.
//!
//! Frames for the publish sink are a u32 big-endian body length followed by
//! the MessagePack body:
//!
//! ```text
//! +----------------+---------------------+
//! | len (u32 BE)   | msgpack body        |
//! +----------------+---------------------+
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SnifferError};

/// Size of the frame length prefix.
pub const FRAME_LENGTH_SIZE: usize = 4;

/// MessagePack codec for sink events.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Append a length-prefixed frame for `value` to `out`.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails or the body exceeds `u32::MAX`.
    pub fn write_frame<T: Serialize>(value: &T, out: &mut Vec<u8>) -> Result<()> {
        let body = Self::encode(value)?;
        let len = u32::try_from(body.len()).map_err(|_| {
            SnifferError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame body of {} bytes exceeds u32 length prefix", body.len()),
            ))
        })?;

        out.reserve(FRAME_LENGTH_SIZE + body.len());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(())
    }

    /// Split the first complete frame off `buf`.
    ///
    /// Returns the frame body and the total bytes consumed, or `None` if
    /// `buf` does not yet hold a whole frame.
    pub fn read_frame(buf: &[u8]) -> Option<(&[u8], usize)> {
        let prefix: [u8; FRAME_LENGTH_SIZE] = buf.get(..FRAME_LENGTH_SIZE)?.try_into().ok()?;
        let len = u32::from_be_bytes(prefix) as usize;
        let end = FRAME_LENGTH_SIZE.checked_add(len)?;
        let body = buf.get(FRAME_LENGTH_SIZE..end)?;
        Some((body, end))
    }
}
