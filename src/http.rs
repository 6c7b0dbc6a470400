use std::io::{self, ErrorKind};

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{error::UpgradeError, handshake::UpgradeRequest};

type Result<T> = std::result::Result<T, UpgradeError>;

/// One HTTP/1.x request read off a stream, not yet answered.
///
/// The stream stays inside the exchange until it is either answered with
/// [`HttpExchange::respond`] or handed over through
/// [`Hijack::hijack`](crate::Hijack::hijack).
pub struct HttpExchange<S> {
    request: UpgradeRequest,
    reader: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> HttpExchange<S> {
    /// Reads the request line and headers, up to `max_header_bytes`.
    ///
    /// A malformed head is answered with 400 before the error is returned.
    pub async fn read(stream: S, max_header_bytes: usize) -> Result<Self> {
        let mut reader = BufReader::new(stream);
        match read_head(&mut reader, max_header_bytes).await {
            Ok(request) => {
                tracing::debug!(
                    method = %request.method,
                    path = %request.target,
                    version = %request.version,
                    "request"
                );
                Ok(Self { request, reader })
            }
            Err(UpgradeError::BadRequest(reason)) => {
                tracing::debug!(reason, "malformed request head");
                let _ = write_status(reader.get_mut(), 400).await;
                Err(UpgradeError::BadRequest(reason))
            }
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn request(&self) -> &UpgradeRequest { &self.request }

    /// Answers with a plain status response and closes the stream.
    pub async fn respond(mut self, status: u16) -> Result<()> {
        tracing::debug!(status, "responding");
        write_status(self.reader.get_mut(), status).await
    }

    /// The raw stream plus whatever the reader buffered past the head.
    pub(crate) fn into_parts(self) -> (UpgradeRequest, S, BytesMut) {
        let read_buf = BytesMut::from(self.reader.buffer());
        (self.request, self.reader.into_inner(), read_buf)
    }
}

async fn read_head<S: AsyncRead + Unpin>(
    reader: &mut BufReader<S>,
    max_header_bytes: usize,
) -> Result<UpgradeRequest> {
    let mut remaining = max_header_bytes;

    let line = read_line(reader, &mut remaining).await?;
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(UpgradeError::BadRequest("malformed request line"));
    };
    if !version.starts_with("HTTP/") {
        return Err(UpgradeError::BadRequest("malformed request line"));
    }
    let mut request = UpgradeRequest::new(method, target, version);

    loop {
        let line = read_line(reader, &mut remaining).await?;
        if line.is_empty() {
            // end of headers
            return Ok(request);
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(UpgradeError::BadRequest("malformed header line"));
        };
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(UpgradeError::BadRequest("malformed header name"));
        }
        request.push_header(name, value.trim());
    }
}

// Reads one CRLF or LF terminated line, counting it against the head budget.
async fn read_line<S: AsyncRead + Unpin>(
    reader: &mut BufReader<S>,
    remaining: &mut usize,
) -> Result<String> {
    if *remaining == 0 {
        return Err(UpgradeError::BadRequest("request head too large"));
    }
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(*remaining as u64)
        .read_until(b'\n', &mut line)
        .await
        .map_err(UpgradeError::Read)?;

    if n == 0 {
        return Err(UpgradeError::Read(io::Error::from(ErrorKind::UnexpectedEof)));
    }
    if line.last() != Some(&b'\n') {
        return Err(if n == *remaining {
            UpgradeError::BadRequest("request head too large")
        } else {
            UpgradeError::Read(io::Error::from(ErrorKind::UnexpectedEof))
        });
    }
    *remaining -= n;

    let mut line = String::from_utf8(line).map_err(|_| UpgradeError::BadRequest("request head is not UTF-8"))?;
    line.truncate(line.trim_end_matches(['\r', '\n']).len());
    Ok(line)
}

#[must_use]
pub(crate) fn status_text(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Error",
    }
}

async fn write_status<W: AsyncWrite + Unpin>(writer: &mut W, status: u16) -> Result<()> {
    let text = status_text(status);
    let response = format!(
        "HTTP/1.1 {status} {text}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n\
         {text}",
        text.len(),
    );
    writer
        .write_all(response.as_bytes())
        .await
        .map_err(UpgradeError::Write)?;
    writer.shutdown().await.map_err(UpgradeError::Write)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, duplex};

    use super::*;

    async fn exchange(raw: &[u8]) -> (Result<HttpExchange<tokio::io::DuplexStream>>, Vec<u8>) {
        let (mut client, server) = duplex(4096);
        client.write_all(raw).await.unwrap();
        let result = HttpExchange::read(server, 1024).await;
        let mut written = Vec::new();
        if result.is_err() {
            client.read_to_end(&mut written).await.unwrap();
        }
        (result, written)
    }

    #[tokio::test]
    async fn parses_request_head() {
        let (ex, _) = exchange(
            b"GET /chat HTTP/1.1\r\n\
              Host: example.com\r\n\
              Upgrade: websocket\r\n\
              Sec-WebSocket-Protocol: a\r\n\
              Sec-WebSocket-Protocol: b\r\n\r\n",
        )
        .await;
        let ex = ex.unwrap();
        let req = ex.request();
        assert_eq!(req.method, "GET");
        assert_eq!(req.target, "/chat");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.upgrade(), Some("websocket"));
        assert_eq!(req.protocols().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[tokio::test]
    async fn accepts_bare_lf_lines() {
        let (ex, _) = exchange(b"GET / HTTP/1.1\nUpgrade: websocket\n\n").await;
        assert_eq!(ex.unwrap().request().upgrade(), Some("websocket"));
    }

    #[tokio::test]
    async fn keeps_bytes_after_the_head() {
        let (ex, _) = exchange(b"GET / HTTP/1.1\r\n\r\n\x81\x80abcd").await;
        let (_, _, read_buf) = ex.unwrap().into_parts();
        assert_eq!(&read_buf[..], b"\x81\x80abcd");
    }

    #[tokio::test]
    async fn malformed_request_line_is_answered_with_400() {
        let (ex, written) = exchange(b"NONSENSE\r\n\r\n").await;
        assert!(matches!(ex, Err(UpgradeError::BadRequest(_))));
        assert!(written.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
        assert!(written.ends_with(b"Bad Request"));
    }

    #[tokio::test]
    async fn malformed_header_is_rejected() {
        let (ex, _) = exchange(b"GET / HTTP/1.1\r\nno colon here\r\n\r\n").await;
        assert!(matches!(ex, Err(UpgradeError::BadRequest("malformed header line"))));
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', 2000));
        raw.extend_from_slice(b"\r\n\r\n");
        let (ex, _) = exchange(&raw).await;
        assert!(matches!(ex, Err(UpgradeError::BadRequest("request head too large"))));
    }

    #[tokio::test]
    async fn eof_before_head_ends_is_a_read_error() {
        let (mut client, server) = duplex(1024);
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").await.unwrap();
        drop(client);
        let ex = HttpExchange::read(server, 1024).await;
        assert!(matches!(ex, Err(UpgradeError::Read(_))));
    }
}
