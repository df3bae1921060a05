//! Transport abstraction layer for Crosstalk.
//!
//! Provides the [`Transport`] and [`Connection`] traits that the relay core
//! is written against, plus the WebSocket implementation used in
//! production. Room and liveness code never name a concrete socket type;
//! tests substitute an in-process mock connection.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Opaque identifier for a connection, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The upgrade request a connection arrived with.
///
/// Signaling connections carry their join parameters (room identifier,
/// display name, device tag) in the upgrade URL's query string. The
/// transport captures path and query verbatim during the handshake;
/// interpreting them is the admission layer's job.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// The request path (e.g. `/ws/voicechat`).
    pub path: String,
    /// The raw, still-encoded query string, if any.
    pub query: Option<String>,
}

/// One unit of inbound traffic from a peer.
///
/// Liveness tracking needs to see *all* traffic, not just data frames: a
/// pong answering a probe proves the peer is alive even when it has
/// nothing to say. Control traffic therefore surfaces as [`Inbound::Ack`]
/// instead of being swallowed inside the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A data frame (one serialized message).
    Data(Vec<u8>),
    /// Control traffic (ping/pong) that carries no payload but proves the
    /// peer's transport is alive.
    Ack,
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection, returning it
    /// together with the upgrade request it arrived with.
    async fn accept(
        &mut self,
    ) -> Result<(Self::Connection, ConnectRequest), Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that can send and receive frames.
///
/// Writes are serialized internally: concurrent callers of [`send`] and
/// [`ping`] (the router relaying messages, a room broadcasting, the
/// liveness supervisor probing) never interleave frames. Reads carry no
/// such guard; exactly one task (the connection's receive loop) may call
/// [`recv`].
///
/// [`send`]: Connection::send
/// [`ping`]: Connection::ping
/// [`recv`]: Connection::recv
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one data frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Sends a liveness probe (ping control frame) to the remote peer.
    async fn ping(&self) -> Result<(), Self::Error>;

    /// Receives the next unit of inbound traffic from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Inbound>, Self::Error>;

    /// Closes the connection. Idempotent and safe from any task.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
