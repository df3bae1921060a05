//! `CrosstalkServer` builder and accept loop.
//!
//! This is the entry point for running the relay. It ties the layers
//! together: transport → protocol → room/presence → router.

use std::sync::Arc;

use crosstalk_liveness::LivenessConfig;
use crosstalk_presence::PresenceStore;
use crosstalk_room::RoomRegistry;
use crosstalk_transport::{Transport, WebSocketConnection, WebSocketTransport};

use crate::CrosstalkError;
use crate::control;
use crate::handler::handle_connection;

/// The concrete connection type signaling peers arrive over.
pub(crate) type SignalConnection = WebSocketConnection;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// registry is the single room authority; nothing else in the process
/// holds room state.
pub(crate) struct ServerState<P: PresenceStore> {
    pub(crate) registry: RoomRegistry<SignalConnection>,
    pub(crate) presence: P,
    pub(crate) liveness: LivenessConfig,
}

/// Builder for configuring and starting a relay.
///
/// # Example
///
/// ```rust,ignore
/// use crosstalk::CrosstalkServer;
/// use crosstalk_presence::{HttpPresence, PresenceConfig};
///
/// let presence = HttpPresence::new(PresenceConfig::from_env()?)?;
/// let server = CrosstalkServer::builder()
///     .bind("0.0.0.0:8080")
///     .control_bind("0.0.0.0:8081")
///     .build(presence)
///     .await?;
/// server.run().await
/// ```
pub struct ServerBuilder {
    signal_addr: String,
    control_addr: Option<String>,
    liveness: LivenessConfig,
}

impl ServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            signal_addr: "127.0.0.1:8080".to_string(),
            control_addr: None,
            liveness: LivenessConfig::default(),
        }
    }

    /// Sets the address the signaling WebSocket listener binds to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.signal_addr = addr.to_string();
        self
    }

    /// Enables the HTTP control API (room creation) on this address.
    pub fn control_bind(mut self, addr: &str) -> Self {
        self.control_addr = Some(addr.to_string());
        self
    }

    /// Overrides the liveness timing configuration.
    pub fn liveness(mut self, config: LivenessConfig) -> Self {
        self.liveness = config;
        self
    }

    /// Binds the listeners and assembles the server.
    pub async fn build<P: PresenceStore>(
        self,
        presence: P,
    ) -> Result<CrosstalkServer<P>, CrosstalkError> {
        let transport = WebSocketTransport::bind(&self.signal_addr).await?;

        let control = match &self.control_addr {
            Some(addr) => Some(tokio::net::TcpListener::bind(addr).await?),
            None => None,
        };

        let state = Arc::new(ServerState {
            registry: RoomRegistry::new(),
            presence,
            liveness: self.liveness.validated(),
        });

        Ok(CrosstalkServer {
            transport,
            control,
            state,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running signaling relay.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CrosstalkServer<P: PresenceStore> {
    transport: WebSocketTransport,
    control: Option<tokio::net::TcpListener>,
    state: Arc<ServerState<P>>,
}

impl<P: PresenceStore> CrosstalkServer<P> {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the local address of the signaling listener.
    pub fn signal_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the local address of the control listener, if enabled.
    pub fn control_addr(&self) -> Option<std::net::SocketAddr> {
        self.control
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Runs the relay: serves the control API (if configured) and
    /// accepts signaling connections until the process is terminated.
    pub async fn run(mut self) -> Result<(), CrosstalkError> {
        if let Some(listener) = self.control.take() {
            let app = control::router(Arc::clone(&self.state));
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "control API server failed");
                }
            });
        }

        tracing::info!("crosstalk relay running");

        loop {
            match self.transport.accept().await {
                Ok((conn, request)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, request, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
