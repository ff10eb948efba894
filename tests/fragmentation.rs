//! Property-based decoding tests (proptest).
//!
//! However a byte stream is split across packets, the flow buffer must
//! yield exactly the values a single decode of the whole stream yields.

use bytes::{Bytes, BytesMut};
use proptest::collection::vec;
use proptest::prelude::*;

use resp_sniffer::protocol::{FlowBuffer, FrameDecoder, Value};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Status),
        "[A-Z]{1,8}( [a-z ]{0,12})?".prop_map(Value::Error),
        any::<i64>().prop_map(Value::Integer),
        vec(any::<u8>(), 0..48).prop_map(|b| Value::Bulk(Some(Bytes::from(b)))),
        Just(Value::Bulk(None)),
        Just(Value::Array(None)),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        vec(inner, 0..6).prop_map(|items| Value::Array(Some(items)))
    })
}

fn encode_all(values: &[Value]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for value in values {
        value.encode_into(&mut buf);
    }
    buf.to_vec()
}

/// Turn arbitrary cut points into sorted, in-range split offsets.
fn split_offsets(len: usize, cuts: &[usize]) -> Vec<usize> {
    let mut offsets: Vec<usize> = cuts.iter().map(|c| c % (len + 1)).collect();
    offsets.push(0);
    offsets.push(len);
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

proptest! {
    #[test]
    fn fragmented_decode_matches_whole_decode(
        values in vec(value(), 1..12),
        cuts in vec(any::<usize>(), 0..16),
    ) {
        let wire = encode_all(&values);

        let whole = FrameDecoder::decode(&wire).unwrap();
        prop_assert_eq!(&whole.values, &values);
        prop_assert_eq!(whole.consumed, wire.len());

        let mut buffer = FlowBuffer::new(wire.len().max(1));
        let mut fragmented = Vec::new();
        let offsets = split_offsets(wire.len(), &cuts);
        for window in offsets.windows(2) {
            buffer.append(&wire[window[0]..window[1]]).unwrap();
            fragmented.extend(buffer.decode_all().unwrap());
        }

        prop_assert_eq!(fragmented, values);
        prop_assert!(buffer.is_empty());
    }

    #[test]
    fn byte_at_a_time_decode(values in vec(value(), 1..4)) {
        let wire = encode_all(&values);
        let mut buffer = FlowBuffer::new(wire.len().max(1));
        let mut decoded = Vec::new();

        for byte in &wire {
            buffer.append(std::slice::from_ref(byte)).unwrap();
            decoded.extend(buffer.decode_all().unwrap());
        }

        prop_assert_eq!(decoded, values);
    }

    #[test]
    fn re_encoding_is_exact(v in value()) {
        let wire = v.to_bytes();
        let (decoded, used) = FrameDecoder::decode_one(&wire).unwrap().unwrap();

        prop_assert_eq!(used, wire.len());
        prop_assert_eq!(decoded.to_bytes(), wire);
    }
}
