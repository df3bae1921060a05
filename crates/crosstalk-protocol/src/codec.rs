//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Callers don't care HOW messages are serialized; they just need something
//! that implements the [`Codec`] trait, which keeps the wire encoding
//! swappable in one place.
//!
//! [`JsonCodec`] is the production encoding. The signaling wire is JSON
//! because the peers on the other end are browsers: DevTools can inspect
//! every frame, and the payloads being relayed (SDP, ICE) are already JSON
//! in the client APIs that produce them.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds
///
/// - `Send + Sync` so the codec can be shared between connection tasks
///   (Tokio may run them on any thread in its pool).
/// - `'static` so the codec can live inside long-lived async tasks without
///   borrowing temporary data.
///
/// The methods are generic: `encode` works for any `T: Serialize`, `decode`
/// for any `T: DeserializeOwned`. `DeserializeOwned` (rather than plain
/// `Deserialize`) means the result owns all its data, so the input buffer
/// can be dropped right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use crosstalk_protocol::{Codec, JsonCodec, ParticipantId, RoomId, SignalMessage};
///
/// let codec = JsonCodec;
/// let msg = SignalMessage::welcome(ParticipantId::generate(), RoomId::new("lobby"));
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: SignalMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
