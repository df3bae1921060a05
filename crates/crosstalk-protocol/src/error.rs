//! Error types for the protocol layer.
//!
//! Each crate in Crosstalk defines its own error enum. A `ProtocolError`
//! always means a serialization/deserialization problem, never a networking
//! or room-state one.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, wrong data
    /// types, truncated frames. A decode failure on a live connection is
    /// treated as a broken peer and tears that connection down.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message is invalid at the protocol level: it parsed fine but
    /// violates a protocol rule (e.g., a targeted message with no
    /// recipient where one is mandatory).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
