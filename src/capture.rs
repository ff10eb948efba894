//! Interface to the packet capture facility.
//!
//! Capture, link-layer and TCP header parsing happen outside this crate. The
//! capture side delivers [`CaptureEvent`]s: already-demultiplexed TCP payload
//! bytes tagged with their endpoints, and a teardown signal when a connection
//! closes. Direction is derived by comparing the source endpoint with the
//! observed service address.

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;

/// Which way a payload travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Request bytes, client to server.
    ClientToServer,
    /// Reply bytes, server to client.
    ServerToClient,
}

/// Direction-independent identity of one TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    /// Client endpoint.
    pub client: SocketAddr,
    /// Observed server endpoint.
    pub server: SocketAddr,
}

impl FlowKey {
    /// Create a flow key from its two endpoints.
    pub fn new(client: SocketAddr, server: SocketAddr) -> Self {
        Self { client, server }
    }

    /// Resolve the flow key and direction of a packet from `src` to `dst`.
    ///
    /// Packets whose source is the observed `service` flow server to client;
    /// everything else is a request.
    pub fn classify(src: SocketAddr, dst: SocketAddr, service: SocketAddr) -> (Self, Direction) {
        if src == service {
            (Self::new(dst, src), Direction::ServerToClient)
        } else {
            (Self::new(src, dst), Direction::ClientToServer)
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.client, self.server)
    }
}

/// One event delivered by the capture facility.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// TCP payload bytes observed from `src` to `dst`.
    Payload {
        src: SocketAddr,
        dst: SocketAddr,
        payload: Bytes,
    },
    /// The connection between `src` and `dst` closed (FIN observed).
    Teardown { src: SocketAddr, dst: SocketAddr },
}

impl CaptureEvent {
    /// Create a payload event (copies data).
    pub fn payload(src: SocketAddr, dst: SocketAddr, data: &[u8]) -> Self {
        CaptureEvent::Payload {
            src,
            dst,
            payload: Bytes::copy_from_slice(data),
        }
    }

    /// Create a teardown event.
    pub fn teardown(src: SocketAddr, dst: SocketAddr) -> Self {
        CaptureEvent::Teardown { src, dst }
    }

    /// Source and destination endpoints.
    pub fn endpoints(&self) -> (SocketAddr, SocketAddr) {
        match self {
            CaptureEvent::Payload { src, dst, .. } | CaptureEvent::Teardown { src, dst } => {
                (*src, *dst)
            }
        }
    }

    /// Flow key and direction relative to the observed `service`.
    pub fn flow(&self, service: SocketAddr) -> (FlowKey, Direction) {
        let (src, dst) = self.endpoints();
        FlowKey::classify(src, dst, service)
    }
}
