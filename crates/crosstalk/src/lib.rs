//! # Crosstalk
//!
//! A real-time signaling relay: peers sharing a room identifier exchange
//! WebRTC negotiation messages (offers, answers, ICE candidates) and
//! presence notifications over persistent WebSocket connections. The
//! relay carries no media; it brokers the control-plane handshake peers
//! need to establish their own direct media path.
//!
//! This crate ties the layers together: transport (WebSocket frames) →
//! protocol (signaling messages) → room/presence (membership) → router
//! (dispatch), plus the `crosstalkd` binary.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use crosstalk::{CrosstalkServer, MemoryPresence};
//!
//! # async fn run() -> Result<(), crosstalk::CrosstalkError> {
//! let server = CrosstalkServer::<MemoryPresence>::builder()
//!     .bind("0.0.0.0:8080")
//!     .control_bind("0.0.0.0:8081")
//!     .build(MemoryPresence::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod control;
mod error;
mod handler;
mod router;
mod server;
mod teardown;

pub use error::CrosstalkError;
pub use server::{CrosstalkServer, ServerBuilder};

// Re-exported so embedders configuring a server don't need to name the
// sub-crates for the common cases.
pub use crosstalk_liveness::LivenessConfig;
pub use crosstalk_presence::{HttpPresence, MemoryPresence, PresenceConfig, PresenceStore};
pub use crosstalk_protocol::{ParticipantId, RoomId, SignalMessage};
