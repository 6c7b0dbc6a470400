use base64::engine::{Engine, general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Header names the negotiator reads. Lookup is case-insensitive.
pub mod header {
    pub const UPGRADE: &str = "Upgrade";
    pub const CONNECTION: &str = "Connection";
    pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
    pub const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";
    pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
}

/// An inbound HTTP request head, as parsed by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct UpgradeRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, target: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            version: version.into(),
            headers: Vec::new(),
        }
    }

    /// Appends a header line; repeated names keep every value in order.
    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_header(name, value);
        self
    }

    /// Every value of `name`, in arrival order.
    pub fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> { self.values(name).next() }

    #[must_use]
    pub fn upgrade(&self) -> Option<&str> { self.get(header::UPGRADE) }

    #[must_use]
    pub fn connection(&self) -> Option<&str> { self.get(header::CONNECTION) }

    #[must_use]
    pub fn key(&self) -> Option<&str> { self.get(header::SEC_WEBSOCKET_KEY) }

    /// Requested subprotocols, one entry per comma-separated name.
    pub fn protocols(&self) -> impl Iterator<Item = &str> {
        self.values(header::SEC_WEBSOCKET_PROTOCOL)
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Whether the request carries a body that would follow the head.
    #[must_use]
    pub fn has_body(&self) -> bool {
        let content_length = self
            .get(header::CONTENT_LENGTH)
            .is_some_and(|v| v.trim() != "0");
        content_length || self.get(header::TRANSFER_ENCODING).is_some()
    }
}

/// Outcome of negotiating one upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeResult {
    Accepted {
        /// `Sec-WebSocket-Accept` value.
        accept: String,
        /// Echoed `Sec-WebSocket-Protocol`, if the client asked for one.
        protocol: Option<String>,
    },
    Rejected {
        status: u16,
        reason: &'static str,
    },
}

impl HandshakeResult {
    /// The `101 Switching Protocols` response for an accepted handshake.
    #[must_use]
    pub fn response(&self) -> Option<String> {
        let Self::Accepted { accept, protocol } = self else {
            return None;
        };

        let mut response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             {}: websocket\r\n\
             {}: Upgrade\r\n\
             {}: {accept}\r\n",
            header::UPGRADE,
            header::CONNECTION,
            header::SEC_WEBSOCKET_ACCEPT,
        );
        if let Some(protocol) = protocol {
            response.push_str(&format!("{}: {protocol}\r\n", header::SEC_WEBSOCKET_PROTOCOL));
        }
        response.push_str("\r\n");
        Some(response)
    }
}

/// Derives `Sec-WebSocket-Accept` from the raw `Sec-WebSocket-Key` value.
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(key.as_bytes());
    sha.update(ACCEPT_GUID.as_bytes());
    BASE64.encode(sha.finalize())
}

/// Decides whether `request` may be upgraded.
///
/// Either `Upgrade: websocket` or `Connection: Upgrade` is enough; clients
/// in the wild are not consistent about sending both.
#[must_use]
pub fn negotiate(request: &UpgradeRequest) -> HandshakeResult {
    let upgrade = request.upgrade().is_some_and(|v| has_token(v, "websocket"));
    let connection = request.connection().is_some_and(|v| has_token(v, "upgrade"));
    if !upgrade && !connection {
        tracing::debug!(
            upgrade = ?request.upgrade(),
            connection = ?request.connection(),
            "no upgrade signal"
        );
        return HandshakeResult::Rejected {
            status: 400,
            reason: "missing upgrade headers",
        };
    }

    let Some(key) = request.key().filter(|k| !k.is_empty()) else {
        return HandshakeResult::Rejected {
            status: 400,
            reason: "missing Sec-WebSocket-Key",
        };
    };

    let protocol = request.protocols().next().map(str::to_owned);
    tracing::debug!(protocol = ?protocol, "handshake accepted");

    HandshakeResult::Accepted {
        accept: accept_key(key),
        protocol,
    }
}

fn has_token(value: &str, token: &str) -> bool {
    value.split(',').any(|v| v.trim().eq_ignore_ascii_case(token))
}
