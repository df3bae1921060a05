//! Durable presence for Crosstalk.
//!
//! The relay's in-memory rooms are authoritative for who is *connected*;
//! the presence store is the durable record of who *joined*, kept in an
//! external service so rosters survive relay restarts. This crate holds
//! the client side of that collaboration:
//!
//! 1. **Contract** — the [`PresenceStore`] trait
//!    (add-or-reactivate / list / touch / remove, keyed by room+user)
//! 2. **Production client** — [`HttpPresence`], speaking the store's
//!    PostgREST-style REST dialect
//! 3. **Test double** — [`MemoryPresence`], same semantics, no network
//!
//! # How it fits in the stack
//!
//! ```text
//! Router (above)    ← consults the store for roster queries
//!     ↕
//! Presence (this crate)  ← client for the external store
//!     ↕
//! External service (below)  ← owns the durable room_users table
//! ```

mod error;
mod http;
mod memory;
mod store;

pub use error::PresenceError;
pub use http::{ENV_PRESENCE_KEY, ENV_PRESENCE_URL, HttpPresence, PresenceConfig};
pub use memory::MemoryPresence;
pub use store::{PresenceRecord, PresenceStore};
