//! Replay a scripted client/server conversation through the sniffer.
//!
//! Run with `cargo run --example replay`. Records are written to stdout as
//! JSON lines; diagnostics go to stderr (`RUST_LOG=debug` for more).

use std::net::SocketAddr;

use resp_sniffer::{
    init_tracing, spawn_sink_task, CaptureEvent, CommandKind, LogFormat, RecordDetail, Sniffer,
    Value,
};

fn wire(values: &[Value]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_bytes().to_vec()).collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info", LogFormat::Text)?;

    let client: SocketAddr = "10.0.0.2:52100".parse()?;
    let server: SocketAddr = "10.0.0.1:6379".parse()?;

    let sniffer = Sniffer::builder()
        .service(server)
        .recorded([CommandKind::Read, CommandKind::Write])
        .detail(RecordDetail::WithReply)
        .build()?;

    let (sink, sink_task) = spawn_sink_task(tokio::io::stdout(), &sniffer.config().sink);
    let (tx, rx) = sniffer.capture_channel();
    let engine = tokio::spawn(sniffer.run(rx, sink));

    // Pipelined reads, the reply split across two packets.
    let reqs = wire(&[
        Value::command(&["GET", "user:1"]),
        Value::command(&["MGET", "user:2", "user:3"]),
    ]);
    let reps = wire(&[
        Value::bulk("alice"),
        Value::Array(Some(vec![Value::Bulk(None), Value::bulk("carol")])),
    ]);
    let (head, tail) = reps.split_at(9);
    tx.send(CaptureEvent::payload(client, server, &reqs)).await?;
    tx.send(CaptureEvent::payload(server, client, head)).await?;
    tx.send(CaptureEvent::payload(server, client, tail)).await?;

    // A transaction.
    let reqs = wire(&[
        Value::command(&["MULTI"]),
        Value::command(&["SET", "counter", "1"]),
        Value::command(&["GET", "counter"]),
        Value::command(&["EXEC"]),
    ]);
    let reps = wire(&[
        Value::status("OK"),
        Value::status("QUEUED"),
        Value::status("QUEUED"),
        Value::Array(Some(vec![Value::status("OK"), Value::bulk("1")])),
    ]);
    tx.send(CaptureEvent::payload(client, server, &reqs)).await?;
    tx.send(CaptureEvent::payload(server, client, &reps)).await?;

    // A rejected command, then a discarded transaction.
    let reqs = wire(&[
        Value::command(&["GET"]),
        Value::command(&["MULTI"]),
        Value::command(&["DEL", "user:1"]),
        Value::command(&["DISCARD"]),
    ]);
    let reps = wire(&[
        Value::Error("ERR wrong number of arguments for 'get' command".into()),
        Value::status("OK"),
        Value::status("QUEUED"),
        Value::status("OK"),
    ]);
    tx.send(CaptureEvent::payload(client, server, &reqs)).await?;
    tx.send(CaptureEvent::payload(server, client, &reps)).await?;

    tx.send(CaptureEvent::teardown(client, server)).await?;
    drop(tx);

    let stats = engine.await??;
    sink_task.await??;

    eprintln!(
        "events={} records={} notices={} errors={} hit_rate={:.3} miss_rate={:.3}",
        stats.events,
        stats.records,
        stats.notices,
        stats.errors,
        stats.hit_rate.hit_rate(),
        stats.hit_rate.miss_rate(),
    );
    Ok(())
}
