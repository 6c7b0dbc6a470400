use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::{
    error::UpgradeError,
    handshake::{HandshakeResult, UpgradeRequest},
    http::HttpExchange,
};

/// Raw byte stream taken over from the HTTP layer.
///
/// `read_buf` holds bytes the HTTP reader had already pulled off the socket
/// past the request head; they are the first bytes of the frame stream.
#[derive(Debug)]
pub struct Connection<S> {
    request: UpgradeRequest,
    io: S,
    read_buf: BytesMut,
}

impl<S> Connection<S> {
    #[must_use]
    pub fn new(request: UpgradeRequest, io: S, read_buf: BytesMut) -> Self {
        Self {
            request,
            io,
            read_buf,
        }
    }

    /// The request this connection was upgraded from.
    #[must_use]
    pub fn request(&self) -> &UpgradeRequest { &self.request }

    #[must_use]
    pub fn read_buf(&self) -> &[u8] { &self.read_buf }

    pub fn get_mut(&mut self) -> &mut S { &mut self.io }

    #[must_use]
    pub fn into_parts(self) -> (UpgradeRequest, S, BytesMut) { (self.request, self.io, self.read_buf) }
}

impl<S: AsyncWrite + Unpin> Connection<S> {
    /// Writes the `101 Switching Protocols` response for an accepted handshake.
    pub async fn switch_protocols(&mut self, result: &HandshakeResult) -> Result<(), UpgradeError> {
        let Some(response) = result.response() else {
            return Err(UpgradeError::BadRequest("handshake was rejected"));
        };
        self.io
            .write_all(response.as_bytes())
            .await
            .map_err(UpgradeError::Write)?;
        self.io.flush().await.map_err(UpgradeError::Write)
    }
}

/// A refused takeover. The exchange comes back untouched so the caller can
/// still answer it.
pub struct Refused<T> {
    pub exchange: T,
    pub error: UpgradeError,
}

/// Transfers the raw stream out of an HTTP exchange.
///
/// Taking the stream consumes the exchange, so nothing else can write a
/// response onto it afterwards.
pub trait Hijack: Sized {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn hijack(self) -> Result<Connection<Self::Io>, Refused<Self>>;
}

impl<S> Hijack for HttpExchange<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Io = S;

    fn hijack(self) -> Result<Connection<S>, Refused<Self>> {
        let request = self.request();
        if request.version != "HTTP/1.1" {
            tracing::debug!(version = %request.version, "cannot take over stream");
            return Err(Refused {
                exchange: self,
                error: UpgradeError::HijackUnsupported,
            });
        }
        if request.has_body() {
            tracing::debug!("request body pending, refusing takeover");
            return Err(Refused {
                exchange: self,
                error: UpgradeError::HijackFailed("request carries a body"),
            });
        }

        let (request, io, read_buf) = self.into_parts();
        tracing::debug!(buffered = read_buf.len(), "stream taken over");
        Ok(Connection::new(request, io, read_buf))
    }
}
