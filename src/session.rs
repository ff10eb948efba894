//! Sessions and the flow-keyed session registry.
//!
//! A [`Session`] is the analysis unit for one TCP connection: the request
//! and reply [`FlowBuffer`]s, the pending pairing queues, and metadata. The
//! [`SessionRegistry`] creates sessions lazily on the first payload for an
//! unseen flow and drops them when the connection is torn down. Anything
//! still pending at teardown is discarded, not flushed.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::capture::{Direction, FlowKey};
use crate::correlator::{PairingState, TransactionState};
use crate::error::SnifferError;
use crate::protocol::{FlowBuffer, DEFAULT_BUFFER_CAPACITY};

/// Length of a session identifier in bytes.
pub const SESSION_ID_LEN: usize = 16;

/// Opaque session identifier.
///
/// Derived from the flow endpoints, the creation time and a registry-local
/// nonce, so a flow that is torn down and reopened within the same clock
/// tick still gets a fresh id. Not intended to be cryptographically secure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    /// Derive an id for `key` created at `created`.
    pub fn derive(key: &FlowKey, created: DateTime<Utc>, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}-{}-{}",
            key,
            created.timestamp_nanos_opt().unwrap_or_default(),
            nonce
        ));
        let digest = hasher.finalize();

        let mut id = [0u8; SESSION_ID_LEN];
        id.copy_from_slice(&digest[..SESSION_ID_LEN]);
        Self(id)
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }

    /// Lower-case hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// State tracked for one observed connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    key: FlowKey,
    created: DateTime<Utc>,
    /// Payloads observed after the first one.
    counter: u64,
    /// Client to server bytes.
    requests: FlowBuffer,
    /// Server to client bytes.
    replies: FlowBuffer,
    pub(crate) pairing: PairingState,
    /// Cause of the failure that made this session unanalyzable.
    fault: Option<String>,
}

impl Session {
    /// Create a session with empty buffers bounded to `buffer_capacity`.
    pub fn new(key: FlowKey, buffer_capacity: usize, nonce: u64) -> Self {
        let created = Utc::now();
        Self {
            id: SessionId::derive(&key, created, nonce),
            key,
            created,
            counter: 0,
            requests: FlowBuffer::new(buffer_capacity),
            replies: FlowBuffer::new(buffer_capacity),
            pairing: PairingState::default(),
            fault: None,
        }
    }

    /// Session identifier.
    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Flow this session tracks.
    #[inline]
    pub fn key(&self) -> FlowKey {
        self.key
    }

    /// Creation time.
    #[inline]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Packet sequence counter, 0 for the payload that created the session.
    #[inline]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Buffer for the given direction.
    pub fn buffer(&self, direction: Direction) -> &FlowBuffer {
        match direction {
            Direction::ClientToServer => &self.requests,
            Direction::ServerToClient => &self.replies,
        }
    }

    pub(crate) fn buffer_mut(&mut self, direction: Direction) -> &mut FlowBuffer {
        match direction {
            Direction::ClientToServer => &mut self.requests,
            Direction::ServerToClient => &mut self.replies,
        }
    }

    /// Decoded requests waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.pairing.requests.len()
    }

    /// Decoded replies waiting for a request.
    pub fn pending_replies(&self) -> usize {
        self.pairing.replies.len()
    }

    /// Current transaction state.
    pub fn transaction(&self) -> &TransactionState {
        &self.pairing.transaction
    }

    /// Why this session stopped being analyzed, if it did.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Stop analyzing this session until it is torn down.
    ///
    /// Buffered bytes and pending values are released: once bytes are lost
    /// or unparseable, nothing later on the flow can be paired reliably.
    pub(crate) fn mark_unanalyzable(&mut self, cause: &SnifferError) {
        tracing::warn!(
            session = %self.id,
            flow = %self.key,
            pending_requests = self.pending_requests(),
            pending_replies = self.pending_replies(),
            "session unanalyzable until teardown: {}",
            cause
        );
        self.requests.clear();
        self.replies.clear();
        self.pairing = PairingState::default();
        self.fault = Some(cause.to_string());
    }
}

/// Owns every live session, keyed by flow.
///
/// Sessions are never evicted on their own: a flow whose teardown is never
/// captured stays registered until [`SessionRegistry::on_teardown`] is called
/// for its key.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<FlowKey, Session>,
    buffer_capacity: usize,
    next_nonce: u64,
}

impl SessionRegistry {
    /// Create a registry whose sessions buffer at most `buffer_capacity`
    /// bytes per direction.
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            buffer_capacity,
            next_nonce: 0,
        }
    }

    /// Look up the session for `key`, creating it on first sight.
    ///
    /// A new session starts with counter 0; every later lookup increments
    /// the counter.
    pub fn resolve_or_create(&mut self, key: FlowKey) -> &mut Session {
        match self.sessions.entry(key) {
            Entry::Occupied(entry) => {
                let session = entry.into_mut();
                session.counter += 1;
                session
            }
            Entry::Vacant(entry) => {
                self.next_nonce += 1;
                let session = Session::new(key, self.buffer_capacity, self.next_nonce);
                tracing::debug!(session = %session.id(), flow = %key, "session created");
                entry.insert(session)
            }
        }
    }

    /// Remove the session for `key`, discarding its pending state.
    ///
    /// Unknown keys are a silent no-op.
    pub fn on_teardown(&mut self, key: &FlowKey) -> Option<Session> {
        let removed = self.sessions.remove(key);
        if let Some(session) = &removed {
            tracing::debug!(
                session = %session.id(),
                flow = %key,
                pending_requests = session.pending_requests(),
                pending_replies = session.pending_replies(),
                "session closed"
            );
        }
        removed
    }

    /// Get the session for `key`, if live.
    pub fn get(&self, key: &FlowKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Per-direction buffer capacity for new sessions.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
