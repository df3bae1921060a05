//! `crosstalkd`: the relay binary.
//!
//! Configuration comes from the environment (a `.env` file is honored):
//!
//! - `PRESENCE_URL` / `PRESENCE_KEY` — required; the process refuses to
//!   start without a configured presence store
//! - `SIGNAL_ADDR` — signaling WebSocket listener (default `0.0.0.0:8080`)
//! - `CONTROL_ADDR` — HTTP control API listener (default `0.0.0.0:8081`)
//! - `RUST_LOG` — tracing filter (default `info`)

use crosstalk::{CrosstalkError, CrosstalkServer};
use crosstalk_presence::{HttpPresence, PresenceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), CrosstalkError> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let presence = HttpPresence::new(PresenceConfig::from_env()?)?;

    let signal_addr =
        std::env::var("SIGNAL_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let control_addr =
        std::env::var("CONTROL_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_string());

    let server = CrosstalkServer::<HttpPresence>::builder()
        .bind(&signal_addr)
        .control_bind(&control_addr)
        .build(presence)
        .await?;

    tracing::info!(%signal_addr, %control_addr, "crosstalk relay starting");
    server.run().await
}
