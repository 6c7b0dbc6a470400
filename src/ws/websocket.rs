use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::mpsc::{self, Receiver, Sender},
    time::interval,
};

use super::{ConnInner, Event, recv_loop::recv_loop};
use crate::{
    config::Config,
    error::{CloseReason, Error, Result},
    frames::{CloseFrame, FrameReader},
    hijack::Connection,
    protocol::Message,
};

const EVENT_CAPACITY: usize = 64;

/// An upgraded connection.
///
/// Incoming frames are read by a background task and surface as [`Event`]s
/// through [`WebSocket::recv`]. Sending methods take `&self` and may be
/// called while a receive is pending.
pub struct WebSocket<S = TcpStream> {
    inner: Arc<ConnInner<S>>,
    event_rx: Receiver<Event>,
}

/// Stops the receive task if the user forgets to call [`WebSocket::close`].
/// The task then sends a best-effort Close before shutting down.
impl<S> Drop for WebSocket<S> {
    fn drop(&mut self) { self.inner.cancel(); }
}

impl<S> WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Starts a session on a hijacked connection.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn from_connection(conn: Connection<S>, config: Arc<Config>) -> Self {
        Self::start(conn, config, None)
    }

    pub(crate) fn start(conn: Connection<S>, config: Arc<Config>, peer: Option<SocketAddr>) -> Self {
        let (_, io, read_buf) = conn.into_parts();
        let (reader, writer) = tokio::io::split(io);
        let reader = FrameReader::new(reader, &read_buf, config.max_frame_payload);

        let ping_interval = config.ping_interval.filter(|p| !p.is_zero());
        let inner = Arc::new(ConnInner::new(writer, config, peer));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);

        recv_loop(Arc::clone(&inner), reader, event_tx.clone());
        if let Some(period) = ping_interval {
            ping_loop(Arc::clone(&inner), period, event_tx);
        }
        tracing::debug!(peer = ?inner.peer, "session started");

        Self { inner, event_rx }
    }

    pub async fn send_text(&self, text: &str) -> Result<()> { self.send(Message::from(text)).await }

    pub async fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.send(Message::Binary(bytes.to_vec())).await
    }

    pub async fn send(&self, msg: Message) -> Result<()> { self.inner.send(msg).await }

    /// Sends a Ping whose Pong is timed; see [`WebSocket::latency`].
    pub async fn ping(&self) -> Result<()> { self.inner.ping().await }

    pub async fn close(&self) -> Result<()> { self.close_reason(CloseReason::Normal, "").await }

    /// Starts the closing handshake.
    ///
    /// The receive task keeps running until the peer answers with its own
    /// Close or `close_timeout` runs out.
    pub async fn close_reason(&self, reason: CloseReason, text: &str) -> Result<()> {
        let close = CloseFrame::new(reason, text);
        if self.inner.close(Some(&close)).await? {
            let inner = Arc::clone(&self.inner);
            let timeout = inner.config.close_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if !inner.is_closed() {
                    tracing::debug!("close timeout elapsed");
                    inner.cancel();
                }
            });
        }
        Ok(())
    }

    /// Stops the session without waiting for the closing handshake.
    pub fn abort(&self) { self.inner.cancel(); }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.inner.peer }

    /// True once the stream has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.inner.is_closed() }

    /// Average latency in ms form last 5 pings
    pub async fn latency(&self) -> Option<u16> { self.inner.ping_stats.lock().await.average() }

    /// Next event, or `None` once the receive task has finished and every
    /// event has been taken.
    pub async fn recv(&mut self) -> Option<Event> { self.event_rx.recv().await }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Event> {
        tokio::time::timeout(timeout, self.event_rx.recv())
            .await
            .unwrap_or_default()
    }
}

fn ping_loop<S>(inner: Arc<ConnInner<S>>, period: Duration, event_tx: Sender<Event>)
where
    S: AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = interval(period);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if inner.is_closing() {
                tracing::info!("socket closing, stopping ping loop");
                break;
            }

            if inner.ping_stats.lock().await.awaiting_pong() {
                tracing::warn!("no PONG within ping interval, closing");
                let close = CloseFrame::new(CloseReason::Policy, "ping timeout");
                let _ = inner.close(Some(&close)).await;
                inner.cancel();
                break;
            }

            if let Err(e) = inner.ping().await {
                tracing::warn!("Ping failed, stopping ping loop.");
                if !matches!(e, Error::Closed) {
                    let _ = event_tx.send(Event::Error(e)).await;
                }
                break;
            }
        }
    });
}
