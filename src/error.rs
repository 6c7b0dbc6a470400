use std::io;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Close status codes as specified in
/// [RFC 6455](https://www.rfc-editor.org/rfc/rfc6455.html#section-7.4)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Normal close
    Normal,
    /// Going away
    GoingAway,
    /// Websocket protocol violation
    ProtoError,
    /// Unsupported data type
    DataType,
    /// Invalid UTF-8 in Text message
    DataError,
    /// Generic policy violation
    Policy,
    /// Messages are too big
    TooBig,
    /// Unsupported extensions
    Extension,
    /// An unexpected condition that prevented the request from being fulfilled
    Unexpected,
    /// Registered (3000-3999) or private use (4000-4999) code.
    Other(u16),
}

impl CloseReason {
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::ProtoError => 1002,
            Self::DataType => 1003,
            Self::DataError => 1007,
            Self::Policy => 1008,
            Self::TooBig => 1009,
            Self::Extension => 1010,
            Self::Unexpected => 1011,
            Self::Other(code) => code,
        }
    }

    /// Whether `code` may appear on the wire in a Close frame.
    ///
    /// 1004, 1005, 1006 and 1015 are reserved for local use and never sent.
    #[must_use]
    pub fn is_sendable(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

impl From<u16> for CloseReason {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::ProtoError,
            1003 => Self::DataType,
            1007 => Self::DataError,
            1008 => Self::Policy,
            1009 => Self::TooBig,
            1010 => Self::Extension,
            1011 => Self::Unexpected,
            other => Self::Other(other),
        }
    }
}

/// Converts a reason code to bytes of the appropriate endianness.
impl From<CloseReason> for [u8; 2] {
    fn from(value: CloseReason) -> Self { value.code().to_be_bytes() }
}

impl From<[u8; 2]> for CloseReason {
    fn from(bytes: [u8; 2]) -> Self { u16::from_be_bytes(bytes).into() }
}

/// Errors raised before the stream is handed over to the WebSocket session.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The request is not a usable upgrade request.
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    /// The HTTP exchange cannot give up its raw stream.
    #[error("connection hijacking is not supported for this exchange")]
    HijackUnsupported,
    /// The raw stream could not be detached cleanly.
    #[error("hijack failed: {0}")]
    HijackFailed(&'static str),
    /// Failed to read the request from the TCP stream.
    #[error("failed to read request: {0}")]
    Read(#[source] io::Error),
    /// Failed to write the response to the TCP stream.
    #[error("failed to write response: {0}")]
    Write(#[source] io::Error),
    /// The request head did not arrive in time.
    #[error("timed out waiting for request")]
    Timeout,
    /// Failed to bind the TCP listener.
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),
}

impl UpgradeError {
    /// HTTP status used to answer the client, if it can still be answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(400),
            Self::HijackUnsupported => Some(501),
            Self::HijackFailed(_) => Some(500),
            Self::Read(_) | Self::Write(_) | Self::Timeout | Self::Bind(_) => None,
        }
    }
}

/// A rule of the framing protocol that the peer broke.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("reserved bits set without a negotiated extension")]
    ReservedBits,
    #[error("unknown opcode {0:#x}")]
    Opcode(u8),
    #[error("client frame is not masked")]
    Unmasked,
    #[error("server frame is masked")]
    UnexpectedMask,
    #[error("control frame is fragmented")]
    FragmentedControl,
    #[error("control frame payload exceeds 125 bytes")]
    ControlTooLong,
    #[error("64-bit payload length has its high bit set")]
    LengthHighBit,
    #[error("frame payload of {0} bytes exceeds the limit")]
    FrameTooLarge(u64),
    #[error("invalid close frame payload")]
    ClosePayload,
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,
    #[error("new data frame before the previous message finished")]
    UnfinishedMessage,
    #[error("message exceeds the size limit")]
    MessageTooLarge,
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
    #[error("frame received after close")]
    AfterClose,
}

impl Violation {
    /// Status code sent in the Close frame that answers this violation.
    #[must_use]
    pub fn close_reason(self) -> CloseReason {
        match self {
            Self::FrameTooLarge(_) | Self::MessageTooLarge => CloseReason::TooBig,
            Self::InvalidUtf8 => CloseReason::DataError,
            _ => CloseReason::ProtoError,
        }
    }
}

/// Errors produced while decoding frames from the stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended in the middle of a frame.
    #[error("stream ended mid-frame")]
    Truncated,
    /// The frame broke a protocol rule.
    #[error("malformed frame: {0}")]
    Malformed(#[from] Violation),
    /// Reading from the stream failed.
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
}

/// Top level error for WebSocket operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Sending a frame failed; the connection is unusable.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),
    /// The connection is closing or closed.
    #[error("connection closed")]
    Closed,
}
