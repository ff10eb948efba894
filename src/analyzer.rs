//! Command classification and cache hit/miss analysis.
//!
//! [`analyze`] turns a matched request/reply pair into an
//! [`AnalysisRecord`]. It is a pure function of the pair and the
//! [`AnalyzeConfig`]; nothing here performs I/O.

use serde::{Deserialize, Serialize};

use crate::config::AnalyzeConfig;
use crate::correlator::MatchedPair;
use crate::error::{Result, SnifferError};
use crate::protocol::{Command, Value};

/// Category a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Reads data without modifying it.
    Read,
    /// Modifies data.
    Write,
    /// Server, connection and transaction management.
    Admin,
}

impl CommandKind {
    /// Look up the category of an upper-cased command name.
    ///
    /// Commands missing from the table are not recorded.
    pub fn classify(upper_name: &str) -> Option<Self> {
        let kind = match upper_name {
            "GET" | "MGET" | "GETRANGE" | "STRLEN" | "EXISTS" | "TTL" | "PTTL" | "TYPE"
            | "HGET" | "HMGET" | "HGETALL" | "HKEYS" | "HVALS" | "HLEN" | "HEXISTS"
            | "HSTRLEN" | "LLEN" | "LRANGE" | "LINDEX" | "SMEMBERS" | "SISMEMBER" | "SCARD"
            | "ZRANGE" | "ZRANGEBYSCORE" | "ZSCORE" | "ZCARD" | "ZRANK" => CommandKind::Read,

            "SET" | "SETEX" | "PSETEX" | "SETNX" | "MSET" | "MSETNX" | "GETSET" | "APPEND"
            | "INCR" | "INCRBY" | "DECR" | "DECRBY" | "DEL" | "UNLINK" | "EXPIRE"
            | "PEXPIRE" | "PERSIST" | "HSET" | "HMSET" | "HDEL" | "HINCRBY" | "LPUSH"
            | "RPUSH" | "LPOP" | "RPOP" | "LSET" | "LREM" | "SADD" | "SREM" | "ZADD"
            | "ZREM" | "ZINCRBY" => CommandKind::Write,

            "INFO" | "MULTI" | "PING" | "SELECT" | "AUTH" | "CONFIG" | "CLIENT" | "DBSIZE"
            | "FLUSHDB" | "FLUSHALL" | "WATCH" | "UNWATCH" => CommandKind::Admin,

            _ => return None,
        };
        Some(kind)
    }
}

/// How much of each exchange to keep. Each level includes the ones below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordDetail {
    /// Command name and category.
    CommandOnly,
    /// Plus the argument list.
    WithParams,
    /// Plus the raw reply.
    WithReply,
    /// Plus the raw request.
    WithRequest,
}

/// Outcome of a read for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Hit,
    Miss,
    Error,
}

/// Hit/miss status of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStat {
    pub key: String,
    pub status: KeyStatus,
}

impl KeyStat {
    fn new(key: impl Into<String>, status: KeyStatus) -> Self {
        Self {
            key: key.into(),
            status,
        }
    }
}

/// Structured result of analyzing one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRecord {
    /// Upper-cased command name.
    pub cmd: String,
    /// Command category.
    pub cmd_type: CommandKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    /// Raw RESP reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    /// Raw RESP request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<Vec<KeyStat>>,
}

impl AnalysisRecord {
    fn new(cmd: String, cmd_type: CommandKind) -> Self {
        Self {
            cmd,
            cmd_type,
            params: None,
            reply: None,
            request: None,
            stat: None,
        }
    }
}

/// Analyze a matched pair.
///
/// Returns `Ok(None)` for commands outside the lookup table or outside the
/// configured categories.
///
/// # Errors
///
/// Returns `Analysis` error when hit analysis cannot line up keys with the
/// reply (e.g. an MGET reply whose length differs from the key count).
pub fn analyze(pair: &MatchedPair, config: &AnalyzeConfig) -> Result<Option<AnalysisRecord>> {
    let name = pair.command.upper_name();
    let Some(kind) = CommandKind::classify(&name) else {
        return Ok(None);
    };
    if !config.records(kind) {
        return Ok(None);
    }

    let mut record = AnalysisRecord::new(name, kind);

    if config.detail >= RecordDetail::WithParams {
        record.params = Some(pair.command.params().to_vec());
    }
    if config.detail >= RecordDetail::WithReply {
        record.reply = Some(raw_string(&pair.reply));
    }
    if config.detail >= RecordDetail::WithRequest {
        record.request = Some(raw_string(&pair.request));
    }

    if config.read_hit_analysis && kind == CommandKind::Read {
        record.stat = key_hit_analyze(&pair.command, &pair.reply)?;
    }

    Ok(Some(record))
}

/// Compute per-key hit/miss status for read commands that support it.
///
/// Only GET and MGET are analyzed; other reads return `Ok(None)`.
pub fn key_hit_analyze(command: &Command, reply: &Value) -> Result<Option<Vec<KeyStat>>> {
    if command.is("GET") {
        let key = command.params().first().cloned().unwrap_or_default();
        return Ok(Some(vec![KeyStat::new(key, single_status(reply))]));
    }

    if command.is("MGET") {
        if reply.is_error() {
            return Ok(Some(vec![KeyStat::new("", KeyStatus::Error)]));
        }

        let Some(items) = reply.as_array() else {
            return Err(SnifferError::Analysis(format!(
                "MGET reply is {}, expected array",
                reply.type_name()
            )));
        };
        let keys = command.params();
        if items.len() != keys.len() {
            return Err(SnifferError::Analysis(format!(
                "MGET asked for {} keys but reply has {} entries",
                keys.len(),
                items.len()
            )));
        }

        let stats = keys
            .iter()
            .zip(items)
            .map(|(key, item)| KeyStat::new(key.clone(), single_status(item)))
            .collect();
        return Ok(Some(stats));
    }

    Ok(None)
}

fn single_status(reply: &Value) -> KeyStatus {
    if reply.is_error() {
        KeyStatus::Error
    } else if reply.is_nil_or_empty() {
        KeyStatus::Miss
    } else {
        KeyStatus::Hit
    }
}

fn raw_string(value: &Value) -> String {
    String::from_utf8_lossy(&value.to_bytes()).into_owned()
}
