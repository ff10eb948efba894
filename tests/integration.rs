//! Integration tests for resp-sniffer.
//!
//! These drive whole client/server conversations through the sniffer and
//! check what reaches the sink.

use std::net::SocketAddr;

use tokio::io::{duplex, AsyncReadExt};

use resp_sniffer::codec::MsgPackCodec;
use resp_sniffer::{
    spawn_sink_task, AnalyzeConfig, CaptureEvent, CommandKind, ErrorKind, EventBody, KeyStat,
    KeyStatus, OverflowPolicy, RecordDetail, SinkEvent, SinkFormat, Sniffer, SnifferConfig,
    TransactionState, Value,
};

fn client() -> SocketAddr {
    "192.168.1.20:41000".parse().unwrap()
}

fn server() -> SocketAddr {
    "192.168.1.10:6379".parse().unwrap()
}

fn sniffer() -> Sniffer {
    Sniffer::builder()
        .service(server())
        .recorded([CommandKind::Read, CommandKind::Write])
        .build()
        .unwrap()
}

fn requests(cmds: &[&[&str]]) -> CaptureEvent {
    let mut wire = Vec::new();
    for args in cmds {
        wire.extend_from_slice(&Value::command(args).to_bytes());
    }
    CaptureEvent::payload(client(), server(), &wire)
}

fn replies(values: Vec<Value>) -> CaptureEvent {
    let mut wire = Vec::new();
    for value in values {
        wire.extend_from_slice(&value.to_bytes());
    }
    CaptureEvent::payload(server(), client(), &wire)
}

fn records(events: &[SinkEvent]) -> Vec<&resp_sniffer::AnalysisRecord> {
    events
        .iter()
        .filter_map(|e| match &e.body {
            EventBody::Record(r) => Some(r),
            _ => None,
        })
        .collect()
}

fn stat(key: &str, status: KeyStatus) -> KeyStat {
    KeyStat {
        key: key.to_string(),
        status,
    }
}

#[test]
fn test_pipelined_pairs_keep_order() {
    let mut sniffer = sniffer();
    let n = 50;

    let keys: Vec<String> = (0..n).map(|i| format!("key:{}", i)).collect();
    let cmds: Vec<Vec<&str>> = keys.iter().map(|k| vec!["GET", k.as_str()]).collect();
    let cmd_refs: Vec<&[&str]> = cmds.iter().map(Vec::as_slice).collect();

    assert!(sniffer.handle(requests(&cmd_refs)).is_empty());

    let vals = (0..n)
        .map(|i| if i % 2 == 0 { Value::bulk(format!("v{}", i)) } else { Value::Bulk(None) })
        .collect();
    let out = sniffer.handle(replies(vals));

    let recs = records(&out);
    assert_eq!(recs.len(), n);
    for (i, rec) in recs.iter().enumerate() {
        assert_eq!(rec.params.as_deref(), Some(&[keys[i].clone()][..]));
        let expected = if i % 2 == 0 { KeyStatus::Hit } else { KeyStatus::Miss };
        assert_eq!(rec.stat.as_deref(), Some(&[stat(&keys[i], expected)][..]));
    }
    assert_eq!(sniffer.hit_rate().hit_rate(), 0.5);
}

#[test]
fn test_transaction_round_trip() {
    let mut sniffer = sniffer();

    sniffer.handle(requests(&[&["MULTI"]]));
    assert!(sniffer.handle(replies(vec![Value::status("OK")])).is_empty());
    sniffer.handle(requests(&[&["SET", "a", "1"]]));
    assert!(sniffer.handle(replies(vec![Value::status("QUEUED")])).is_empty());
    sniffer.handle(requests(&[&["GET", "a"]]));
    assert!(sniffer.handle(replies(vec![Value::status("QUEUED")])).is_empty());
    sniffer.handle(requests(&[&["EXEC"]]));
    let out = sniffer.handle(replies(vec![Value::Array(Some(vec![
        Value::status("OK"),
        Value::bulk("1"),
    ]))]));

    let recs = records(&out);
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].cmd, "SET");
    assert_eq!(recs[0].params, Some(vec!["a".to_string(), "1".to_string()]));
    assert_eq!(recs[1].cmd, "GET");
    assert_eq!(recs[1].stat.as_deref(), Some(&[stat("a", KeyStatus::Hit)][..]));

    let key = resp_sniffer::FlowKey::new(client(), server());
    let session = sniffer.correlator().registry().get(&key).unwrap();
    assert_eq!(session.transaction(), &TransactionState::Normal);
}

#[test]
fn test_discard_emits_notice_only() {
    let mut sniffer = sniffer();

    sniffer.handle(requests(&[&["MULTI"], &["SET", "a", "1"], &["DISCARD"]]));
    let out = sniffer.handle(replies(vec![
        Value::status("OK"),
        Value::status("QUEUED"),
        Value::status("OK"),
    ]));

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].body, EventBody::TransactionDiscarded { queued: 1 });
    assert!(records(&out).is_empty());
}

#[test]
fn test_get_hit_miss_error() {
    let mut sniffer = sniffer();
    let cases = [
        (Value::bulk(""), KeyStatus::Miss),
        (Value::bulk("v"), KeyStatus::Hit),
        (Value::Error("WRONGTYPE Operation against a key".into()), KeyStatus::Error),
    ];

    for (reply, expected) in cases {
        sniffer.handle(requests(&[&["GET", "k"]]));
        let out = sniffer.handle(replies(vec![reply]));
        match &out[0].body {
            EventBody::Record(rec) => {
                assert_eq!(rec.stat.as_deref(), Some(&[stat("k", expected)][..]))
            }
            // Error replies are reported as request errors before analysis.
            EventBody::RequestError { cmd, message, .. } => {
                assert_eq!(expected, KeyStatus::Error);
                assert_eq!(cmd, "GET");
                assert!(message.starts_with("WRONGTYPE"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn test_mget_mixed() {
    let mut sniffer = sniffer();

    sniffer.handle(requests(&[&["MGET", "a", "b"]]));
    let out = sniffer.handle(replies(vec![Value::Array(Some(vec![
        Value::bulk("1"),
        Value::Bulk(None),
    ]))]));

    let recs = records(&out);
    assert_eq!(
        recs[0].stat.as_deref(),
        Some(&[stat("a", KeyStatus::Hit), stat("b", KeyStatus::Miss)][..])
    );
}

#[test]
fn test_overflow_makes_session_unanalyzable() {
    let mut sniffer = Sniffer::builder().service(server()).buffer_capacity(64).build().unwrap();

    sniffer.handle(requests(&[&["GET", "big"], &["GET", "small"]]));

    // The reply for "big" does not fit and is lost.
    let out = sniffer.handle(replies(vec![Value::bulk(vec![b'x'; 100])]));
    match &out[..] {
        [SinkEvent {
            body: EventBody::Error { kind, .. },
            ..
        }] => assert_eq!(*kind, ErrorKind::BufferOverflow),
        other => panic!("unexpected {:?}", other),
    }

    // The miss for "small" must not be attributed to "big".
    let out = sniffer.handle(replies(vec![Value::Bulk(None)]));
    assert!(records(&out).is_empty());
    match &out[..] {
        [SinkEvent {
            body: EventBody::Error { kind, cause },
            ..
        }] => {
            assert_eq!(*kind, ErrorKind::Unanalyzable);
            assert!(cause.contains("buffer overflow"));
        }
        other => panic!("unexpected {:?}", other),
    }

    let out = sniffer.handle(requests(&[&["GET", "c"]]));
    assert!(out.iter().all(|e| e.body.is_error()));
    assert_eq!(sniffer.hit_rate().total(), 0);

    // A fresh session after teardown analyzes normally again.
    sniffer.handle(CaptureEvent::teardown(client(), server()));
    sniffer.handle(requests(&[&["GET", "d"]]));
    let out = sniffer.handle(replies(vec![Value::bulk("1")]));
    assert_eq!(records(&out)[0].params, Some(vec!["d".to_string()]));
    assert_eq!(sniffer.hit_rate().hits, 1);
}

#[test]
fn test_teardown_discards_state() {
    let mut sniffer = sniffer();

    sniffer.handle(requests(&[&["MULTI"], &["GET", "a"]]));
    sniffer.handle(replies(vec![Value::status("OK")]));
    let key = resp_sniffer::FlowKey::new(client(), server());
    let old = sniffer.correlator().registry().get(&key).unwrap().id();

    sniffer.handle(CaptureEvent::teardown(client(), server()));

    sniffer.handle(requests(&[&["GET", "b"]]));
    let session = sniffer.correlator().registry().get(&key).unwrap();
    assert_ne!(session.id(), old);
    assert_eq!(session.counter(), 0);
    assert_eq!(session.pending_requests(), 1);
    assert_eq!(session.transaction(), &TransactionState::Normal);

    let out = sniffer.handle(replies(vec![Value::bulk("x")]));
    let recs = records(&out);
    assert_eq!(recs[0].params, Some(vec!["b".to_string()]));
    assert_eq!(out[0].counter, 1);
}

#[test]
fn test_sessions_are_independent() {
    let mut sniffer = sniffer();
    let other: SocketAddr = "192.168.1.21:41001".parse().unwrap();

    sniffer.handle(requests(&[&["GET", "a"]]));
    sniffer.handle(CaptureEvent::payload(other, server(), &Value::command(&["GET", "b"]).to_bytes()));

    let out = sniffer.handle(CaptureEvent::payload(server(), other, &Value::bulk("2").to_bytes()));
    assert_eq!(records(&out)[0].params, Some(vec!["b".to_string()]));
    assert_eq!(out[0].client, other);

    let out = sniffer.handle(replies(vec![Value::bulk("1")]));
    assert_eq!(records(&out)[0].params, Some(vec!["a".to_string()]));
    assert_ne!(out[0].session, sniffer.correlator().registry().get(&resp_sniffer::FlowKey::new(other, server())).unwrap().id());
}

#[test]
fn test_config_from_toml_drives_detail() {
    let config = SnifferConfig::from_toml_str(&format!(
        r#"
        service = "{}"

        [analyze]
        recorded = ["write"]
        detail = "with_request"
        "#,
        server()
    ))
    .unwrap();
    let mut sniffer = resp_sniffer::SnifferBuilder::from_config(config).build().unwrap();

    sniffer.handle(requests(&[&["SET", "a", "1"], &["GET", "a"]]));
    let out = sniffer.handle(replies(vec![Value::status("OK"), Value::bulk("1")]));

    let recs = records(&out);
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].cmd_type, CommandKind::Write);
    assert_eq!(recs[0].reply.as_deref(), Some("+OK\r\n"));
    assert_eq!(
        recs[0].request.as_deref(),
        Some("*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n")
    );
}

#[tokio::test]
async fn test_end_to_end_json_lines() {
    let sniffer = sniffer();
    let (out_w, mut out_r) = duplex(64 * 1024);
    let (sink, sink_task) = spawn_sink_task(out_w, &sniffer.config().sink);
    let (tx, rx) = sniffer.capture_channel();
    let engine = tokio::spawn(sniffer.run(rx, sink));

    tx.send(requests(&[&["GET", "a"], &["SET", "b", "2"]])).await.unwrap();
    tx.send(replies(vec![Value::Bulk(None), Value::status("OK")])).await.unwrap();
    tx.send(replies(vec![Value::status("OK")])).await.unwrap();
    tx.send(CaptureEvent::teardown(server(), client())).await.unwrap();
    drop(tx);

    let stats = engine.await.unwrap().unwrap();
    sink_task.await.unwrap().unwrap();

    let mut written = String::new();
    out_r.read_to_string(&mut written).await.unwrap();
    let lines: Vec<serde_json::Value> = written
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["cmd"], "GET");
    assert_eq!(lines[0]["stat"][0]["status"], "miss");
    assert_eq!(lines[1]["cmd"], "SET");
    assert_eq!(lines[2]["event"], "error");
    assert_eq!(lines[2]["kind"], "desync");
    assert_eq!(lines[0]["session"], lines[2]["session"]);

    assert_eq!(stats.records, 2);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.sessions_opened, 1);
    assert_eq!(stats.sessions_closed, 1);
}

#[tokio::test]
async fn test_end_to_end_msgpack_frames() {
    let sniffer = Sniffer::builder()
        .service(server())
        .analyze(AnalyzeConfig {
            recorded: vec![CommandKind::Read],
            detail: RecordDetail::CommandOnly,
            read_hit_analysis: true,
        })
        .sink_format(SinkFormat::MsgPack)
        .overflow(OverflowPolicy::Block)
        .build()
        .unwrap();
    let (out_w, mut out_r) = duplex(64 * 1024);
    let (sink, sink_task) = spawn_sink_task(out_w, &sniffer.config().sink);
    let (tx, rx) = sniffer.capture_channel();
    let engine = tokio::spawn(sniffer.run(rx, sink));

    tx.send(requests(&[&["GET", "a"], &["GET", "b"]])).await.unwrap();
    tx.send(replies(vec![Value::bulk("1"), Value::bulk("2")])).await.unwrap();
    drop(tx);

    engine.await.unwrap().unwrap();
    sink_task.await.unwrap().unwrap();

    let mut written = Vec::new();
    out_r.read_to_end(&mut written).await.unwrap();

    let mut offset = 0;
    let mut cmds = Vec::new();
    while let Some((body, used)) = MsgPackCodec::read_frame(&written[offset..]) {
        let event: serde_json::Value = MsgPackCodec::decode(body).unwrap();
        assert!(event.get("params").is_none());
        cmds.push(event["stat"][0]["key"].as_str().unwrap().to_string());
        offset += used;
    }

    assert_eq!(offset, written.len());
    assert_eq!(cmds, vec!["a", "b"]);
}
