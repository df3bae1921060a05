//! WebSocket transport implementation using `tokio-tungstenite`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

use crate::{ConnectRequest, Connection, ConnectionId, Inbound, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    ///
    /// Needed by callers that bind to port 0 and let the OS pick.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(
        &mut self,
    ) -> Result<(Self::Connection, ConnectRequest), Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        // `accept_hdr_async` runs the upgrade handshake and hands us the
        // HTTP request on the way through; the query string on it is the
        // only place a signaling client can state which room it wants.
        let mut request: Option<ConnectRequest> = None;
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, resp: Response| {
                request = Some(ConnectRequest {
                    path: req.uri().path().to_string(),
                    query: req.uri().query().map(str::to_string),
                });
                Ok(resp)
            },
        )
        .await
        .map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        // The callback always ran if the handshake succeeded.
        let request = request.unwrap_or(ConnectRequest {
            path: "/".to_string(),
            query: None,
        });

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, path = %request.path, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok((
            WebSocketConnection {
                id,
                sink: Arc::new(Mutex::new(sink)),
                stream: Mutex::new(stream),
            },
            request,
        ))
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A single WebSocket connection.
///
/// The socket is split into its sink and stream halves. The sink sits
/// behind a mutex that acts as the write-exclusivity guard: relay frames
/// and liveness pings from different tasks queue on it instead of
/// interleaving. The stream half is owned by the receive loop; keeping it
/// out of the sink's guard means a connection that is quietly waiting for
/// inbound traffic never blocks writers.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    fn send_error(e: tokio_tungstenite::tungstenite::Error) -> TransportError {
        TransportError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // Signaling frames are JSON; send them as text so browser clients
        // receive strings rather than blobs.
        let text = String::from_utf8(data.to_vec()).map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            ))
        })?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(Self::send_error)
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(Self::send_error)
    }

    async fn recv(&self) -> Result<Option<Inbound>, Self::Error> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Inbound::Data(data.into())));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Inbound::Data(text.as_bytes().to_vec())));
                }
                // Pings are answered by tungstenite itself; both directions
                // of control traffic count as proof of life.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    return Ok(Some(Inbound::Ack));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip raw frames
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match self.sink.lock().await.close().await {
            Ok(()) => Ok(()),
            // Closing an already-closed socket is a no-op, not a failure:
            // teardown runs from multiple exit paths.
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(Self::send_error(e)),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
