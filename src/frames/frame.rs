use bytes::Bytes;

use super::Opcode;

/// One unit of the RFC 6455 wire format.
///
/// Frames handed out by the decoder are already unmasked; `mask` only
/// records the key that was on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload_len: u64,
    pub mask: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    /// Unmasked frame, as a server sends it.
    pub fn new(fin: bool, opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            fin,
            opcode,
            payload_len: payload.len() as u64,
            mask: None,
            payload,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(true, Opcode::Text, Bytes::from(text.into()))
    }

    pub fn binary(bytes: impl Into<Bytes>) -> Self { Self::new(true, Opcode::Bin, bytes) }

    pub fn ping(payload: impl Into<Bytes>) -> Self { Self::new(true, Opcode::Ping, payload) }

    pub fn pong(payload: impl Into<Bytes>) -> Self { Self::new(true, Opcode::Pong, payload) }
}
