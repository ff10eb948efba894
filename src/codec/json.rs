//! JSON-lines codec.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Newline-delimited JSON: one compact object per line.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value as a single JSON line, trailing `\n` included.
    #[inline]
    pub fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        Self::write_line(value, &mut out)?;
        Ok(out)
    }

    /// Append a value as a JSON line to `out`.
    pub fn write_line<T: Serialize>(value: &T, out: &mut Vec<u8>) -> Result<()> {
        serde_json::to_writer(&mut *out, value)?;
        out.push(b'\n');
        Ok(())
    }

    /// Decode one line. A trailing newline is ignored.
    pub fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Result<T> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        Ok(serde_json::from_slice(line)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Line {
        cmd: String,
        hits: u32,
    }

    #[test]
    fn test_encode_line() {
        let line = Line {
            cmd: "GET".to_string(),
            hits: 3,
        };

        let encoded = JsonCodec::encode_line(&line).unwrap();

        assert_eq!(encoded, b"{\"cmd\":\"GET\",\"hits\":3}\n");
        assert_eq!(JsonCodec::decode_line::<Line>(&encoded).unwrap(), line);
    }

    #[test]
    fn test_write_appends() {
        let mut out = b"{}\n".to_vec();
        JsonCodec::write_line(&1u8, &mut out).unwrap();
        assert_eq!(out, b"{}\n1\n");
    }

    #[test]
    fn test_decode_error() {
        let err = JsonCodec::decode_line::<Line>(b"{not json}\n").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Serialization);
    }
}
