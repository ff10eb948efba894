//! Request/reply correlation.
//!
//! Every payload is appended to its session's flow buffer, both buffers are
//! decoded, and the decoded values are queued per direction. Pairs are then
//! popped strictly FIFO: the server answers pipelined requests in arrival
//! order, so request `i` always belongs to reply `i`.
//!
//! Transactions change the pairing rules:
//!
//! ```text
//! MULTI  -> +OK        enter InTransaction([])
//! SET..  -> +QUEUED    queue the command, swallow the acknowledgement
//! GET..  -> +QUEUED    queue the command, swallow the acknowledgement
//! EXEC   -> *N results pair queued[i] with result[i], back to Normal
//! DISCARD-> +OK        discard notice, back to Normal
//! ```

use std::collections::VecDeque;

use crate::capture::{Direction, FlowKey};
use crate::error::SnifferError;
use crate::protocol::{Command, Value};
use crate::session::{Session, SessionId, SessionRegistry};

/// A command accepted into an open transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    /// Interpreted command.
    pub command: Command,
    /// Request as decoded from the wire.
    pub request: Value,
}

/// Per-session transaction sub-state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransactionState {
    /// Requests pair with the next reply.
    #[default]
    Normal,
    /// Inside MULTI; real replies arrive batched at EXEC.
    InTransaction(Vec<QueuedCommand>),
}

/// Decoded values waiting to be paired, plus transaction state.
#[derive(Debug, Default)]
pub struct PairingState {
    pub(crate) requests: VecDeque<Value>,
    pub(crate) replies: VecDeque<Value>,
    pub(crate) transaction: TransactionState,
}

/// A request matched with its reply, ready for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    /// Interpreted request.
    pub command: Command,
    /// Request as decoded from the wire.
    pub request: Value,
    /// The server's reply (an EXEC result element for transactions).
    pub reply: Value,
    /// Whether this pair was unpacked from an EXEC reply.
    pub transactional: bool,
}

/// Outcome of one pairing step.
#[derive(Debug)]
pub enum Pairing {
    /// A normal pair for the analyzer.
    Matched(MatchedPair),
    /// The server rejected the request with an error reply.
    RequestError { command: Command, message: String },
    /// A transaction was discarded along with its queued commands.
    TransactionDiscarded { queued: usize },
    /// Buffering, decoding or pairing failed.
    Failed(SnifferError),
}

impl PairingState {
    /// Pop request/reply pairs until one queue runs dry.
    fn drain(&mut self, out: &mut Vec<Pairing>) {
        while !self.requests.is_empty() && !self.replies.is_empty() {
            let (Some(request), Some(reply)) = (self.requests.pop_front(), self.replies.pop_front())
            else {
                break;
            };
            self.step(request, reply, out);
        }

        // Replies left over with nothing to pair against.
        while let Some(reply) = self.replies.pop_front() {
            tracing::warn!(reply = reply.type_name(), "reply without pending request");
            out.push(Pairing::Failed(SnifferError::Desync));
        }
    }

    fn step(&mut self, request: Value, reply: Value, out: &mut Vec<Pairing>) {
        let command = match Command::from_value(&request) {
            Ok(command) => command,
            Err(e) => {
                out.push(Pairing::Failed(e));
                return;
            }
        };

        if let Value::Error(message) = reply {
            // A failed EXEC or DISCARD still closes the transaction.
            if (command.is("EXEC") || command.is("DISCARD"))
                && matches!(self.transaction, TransactionState::InTransaction(_))
            {
                self.transaction = TransactionState::Normal;
            }
            out.push(Pairing::RequestError { command, message });
            return;
        }

        if command.is("MULTI") && reply.is_ok_status() {
            self.transaction = TransactionState::InTransaction(Vec::new());
            return;
        }

        let TransactionState::InTransaction(queued) = &mut self.transaction else {
            out.push(Pairing::Matched(MatchedPair {
                command,
                request,
                reply,
                transactional: false,
            }));
            return;
        };

        if command.is("DISCARD") {
            out.push(Pairing::TransactionDiscarded {
                queued: queued.len(),
            });
            self.transaction = TransactionState::Normal;
        } else if command.is("EXEC") {
            let queued = std::mem::take(queued);
            self.transaction = TransactionState::Normal;
            Self::unpack_exec(queued, reply, out);
        } else {
            // The +QUEUED acknowledgement is consumed here and not emitted.
            queued.push(QueuedCommand { command, request });
        }
    }

    fn unpack_exec(queued: Vec<QueuedCommand>, reply: Value, out: &mut Vec<Pairing>) {
        let results = match reply {
            Value::Array(Some(results)) if results.len() == queued.len() => results,
            Value::Array(None) if queued.is_empty() => Vec::new(),
            other => {
                let replied = other.as_array().map_or(0, <[Value]>::len);
                out.push(Pairing::Failed(SnifferError::TransactionMismatch {
                    queued: queued.len(),
                    replied,
                }));
                return;
            }
        };

        for (entry, result) in queued.into_iter().zip(results) {
            out.push(Pairing::Matched(MatchedPair {
                command: entry.command,
                request: entry.request,
                reply: result,
                transactional: true,
            }));
        }
    }
}

impl Session {
    /// Feed one payload through buffering, decoding and pairing.
    ///
    /// Errors are returned in-band as [`Pairing::Failed`] so that one bad
    /// exchange never stops the rest of the session from being analyzed.
    /// Overflow and malformed frames are the exception: bytes on the flow
    /// are lost or unparseable, so the session is marked unanalyzable and
    /// every later payload reports `Unanalyzable` until teardown.
    pub fn ingest(&mut self, direction: Direction, payload: &[u8]) -> Vec<Pairing> {
        if let Some(cause) = self.fault() {
            return vec![Pairing::Failed(SnifferError::Unanalyzable(cause.to_string()))];
        }

        if let Err(e) = self.buffer_mut(direction).append(payload) {
            self.mark_unanalyzable(&e);
            return vec![Pairing::Failed(e)];
        }

        for dir in [Direction::ClientToServer, Direction::ServerToClient] {
            match self.buffer_mut(dir).decode_all() {
                Ok(values) => {
                    let queue = match dir {
                        Direction::ClientToServer => &mut self.pairing.requests,
                        Direction::ServerToClient => &mut self.pairing.replies,
                    };
                    queue.extend(values);
                }
                Err(e) => {
                    self.mark_unanalyzable(&e);
                    return vec![Pairing::Failed(e)];
                }
            }
        }

        let mut out = Vec::new();
        self.pairing.drain(&mut out);
        out
    }
}

/// Result of observing one payload.
#[derive(Debug)]
pub struct Ingested {
    /// Session the payload belonged to.
    pub session: SessionId,
    /// Session packet counter after this payload.
    pub counter: u64,
    /// Pairing outcomes, in order.
    pub pairings: Vec<Pairing>,
}

/// Session registry plus the pairing state machine.
#[derive(Debug, Default)]
pub struct Correlator {
    registry: SessionRegistry,
}

impl Correlator {
    /// Create a correlator whose sessions buffer at most `buffer_capacity`
    /// bytes per direction.
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            registry: SessionRegistry::new(buffer_capacity),
        }
    }

    /// Route a payload to its session, creating the session if needed.
    pub fn observe(&mut self, key: FlowKey, direction: Direction, payload: &[u8]) -> Ingested {
        let session = self.registry.resolve_or_create(key);
        let pairings = session.ingest(direction, payload);
        Ingested {
            session: session.id(),
            counter: session.counter(),
            pairings,
        }
    }

    /// Drop the session for `key`. Returns whether one existed.
    pub fn teardown(&mut self, key: &FlowKey) -> bool {
        self.registry.on_teardown(key).is_some()
    }

    /// Live sessions.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}
