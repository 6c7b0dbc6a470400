use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, ToSocketAddrs},
};
use tracing::Instrument;

use crate::{
    config::Config,
    error::{Error, UpgradeError},
    frames::CloseFrame,
    handshake::{HandshakeResult, UpgradeRequest, negotiate},
    hijack::{Hijack, Refused},
    http::HttpExchange,
    protocol::Message,
    ws::{Event, WebSocket},
};

/// Application callbacks for one server, shared by all its connections.
///
/// Returning a message from [`on_text`](MessageHandler::on_text) or
/// [`on_binary`](MessageHandler::on_binary) sends it back to the peer.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn on_open(&self, _request: &UpgradeRequest) {}

    async fn on_text(&self, s: String) -> Option<Message>;

    async fn on_binary(&self, b: Vec<u8>) -> Option<Message>;

    /// `latency` is set when the Pong answers the last keepalive ping.
    async fn on_pong(&self, _latency: Option<u16>) {}

    async fn on_close(&self, _close: Option<CloseFrame>) {}

    async fn on_error(&self, _error: Error) {}
}

pub struct WebSocketServer {
    listener: TcpListener,
    config: Arc<Config>,
}

impl WebSocketServer {
    pub async fn bind(addr: impl ToSocketAddrs, config: Config) -> Result<Self, UpgradeError> {
        let listener = TcpListener::bind(addr).await.map_err(UpgradeError::Bind)?;
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "Listening on");
        }
        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> { self.listener.local_addr() }

    /// Accepts connections until the listener fails, one task per connection.
    pub async fn run<H: MessageHandler>(self, handler: H) {
        let handler = Arc::new(handler);
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "set_nodelay failed");
            }

            let config = Arc::clone(&self.config);
            let handler = Arc::clone(&handler);
            let span = tracing::info_span!("conn", %peer);
            tokio::spawn(
                async move {
                    match accept(stream, config, Some(peer)).await {
                        Ok((ws, request)) => {
                            tracing::info!("client connected");
                            serve(ws, &request, handler.as_ref()).await;
                        }
                        Err(e) => tracing::info!(error = %e, "upgrade failed"),
                    }
                }
                .instrument(span),
            );
        }
    }
}

/// Runs the upgrade on a freshly accepted stream.
///
/// Reads the request head, negotiates, takes the stream over and answers
/// `101`. Rejected and refused requests are answered with their HTTP status
/// before the error is returned.
pub async fn accept<S>(
    stream: S,
    config: Arc<Config>,
    peer: Option<SocketAddr>,
) -> Result<(WebSocket<S>, UpgradeRequest), UpgradeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let read = HttpExchange::read(stream, config.max_header_bytes);
    let exchange = match config.handshake_timeout {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| UpgradeError::Timeout)??,
        None => read.await?,
    };

    let result = negotiate(exchange.request());
    if let HandshakeResult::Rejected { status, reason } = result {
        tracing::debug!(status, reason, "handshake rejected");
        exchange.respond(status).await?;
        return Err(UpgradeError::BadRequest(reason));
    }

    let mut conn = match exchange.hijack() {
        Ok(conn) => conn,
        Err(Refused { exchange, error }) => {
            tracing::warn!(error = %error, "cannot take over connection");
            if let Some(status) = error.status() {
                exchange.respond(status).await?;
            }
            return Err(error);
        }
    };

    conn.switch_protocols(&result).await?;
    let request = conn.request().clone();
    tracing::debug!(path = %request.target, "switched protocols");
    Ok((WebSocket::start(conn, config, peer), request))
}

async fn serve<S, H>(mut ws: WebSocket<S>, request: &UpgradeRequest, handler: &H)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: MessageHandler,
{
    handler.on_open(request).await;

    while let Some(event) = ws.recv().await {
        let reply = match event {
            Event::Message(Message::Text(s)) => handler.on_text(s).await,
            Event::Message(Message::Binary(b)) => handler.on_binary(b).await,
            Event::Pong { latency, .. } => {
                handler.on_pong(latency).await;
                None
            }
            Event::Error(e) => {
                handler.on_error(e).await;
                None
            }
            Event::Closed(close) => {
                tracing::info!(close = ?close, "client closed");
                handler.on_close(close).await;
                break;
            }
        };

        if let Some(msg) = reply {
            if let Err(e) = ws.send(msg).await {
                tracing::debug!(error = %e, "failed to send reply");
            }
        }
    }
}
