use bytes::{BufMut, Bytes, BytesMut};

use super::{Frame, Opcode};
use crate::error::{CloseReason, Violation};

/// Control frame payloads are capped at 125 bytes, two of which hold the code.
const MAX_REASON_LEN: usize = 123;

/// Status code and reason carried by a Close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub reason: CloseReason,
    pub text: String,
}

impl CloseFrame {
    pub fn new(reason: CloseReason, text: impl Into<String>) -> Self {
        Self {
            reason,
            text: text.into(),
        }
    }

    /// Parses a Close payload. An empty payload carries no status.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, Violation> {
        match payload {
            [] => Ok(None),
            [_] => Err(Violation::ClosePayload),
            [hi, lo, text @ ..] => {
                let code = u16::from_be_bytes([*hi, *lo]);
                if !CloseReason::is_sendable(code) {
                    return Err(Violation::ClosePayload);
                }
                let text = std::str::from_utf8(text).map_err(|_| Violation::ClosePayload)?;
                Ok(Some(Self::new(code.into(), text)))
            }
        }
    }

    /// Encodes code and reason, cutting the reason at a char boundary to fit.
    #[must_use]
    pub fn to_payload(&self) -> Bytes {
        let mut len = self.text.len().min(MAX_REASON_LEN);
        while !self.text.is_char_boundary(len) {
            len -= 1;
        }

        let mut buf = BytesMut::with_capacity(2 + len);
        buf.put_u16(self.reason.code());
        buf.extend_from_slice(&self.text.as_bytes()[..len]);
        buf.freeze()
    }
}

impl Frame {
    /// Close frame, with an empty payload when `close` is `None`.
    #[must_use]
    pub fn close(close: Option<&CloseFrame>) -> Self {
        let payload = close.map(CloseFrame::to_payload).unwrap_or_default();
        Self::new(true, Opcode::Close, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_has_no_status() {
        assert_eq!(CloseFrame::parse(&[]), Ok(None));
    }

    #[test]
    fn single_byte_payload_is_invalid() {
        assert_eq!(CloseFrame::parse(&[0x03]), Err(Violation::ClosePayload));
    }

    #[test]
    fn parses_code_and_reason() {
        let close = CloseFrame::parse(b"\x03\xe8bye").unwrap().unwrap();
        assert_eq!(close.reason, CloseReason::Normal);
        assert_eq!(close.text, "bye");
    }

    #[test]
    fn rejects_reserved_code_and_bad_utf8() {
        assert_eq!(CloseFrame::parse(&[0x03, 0xED]), Err(Violation::ClosePayload)); // 1005
        assert_eq!(
            CloseFrame::parse(&[0x03, 0xE8, 0xFF, 0xFE]),
            Err(Violation::ClosePayload)
        );
    }

    #[test]
    fn long_reason_is_cut_on_char_boundary() {
        let text = "é".repeat(100); // 200 bytes
        let payload = CloseFrame::new(CloseReason::GoingAway, text).to_payload();
        assert!(payload.len() <= 125);
        assert_eq!(&payload[..2], &[0x03, 0xE9]);
        assert!(std::str::from_utf8(&payload[2..]).is_ok());
    }

    #[test]
    fn close_frame_is_final_and_unmasked() {
        let frame = Frame::close(Some(&CloseFrame::new(CloseReason::Normal, "")));
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Close);
        assert_eq!(frame.mask, None);
        assert_eq!(&frame.payload[..], &[0x03, 0xE8]);
        assert!(Frame::close(None).payload.is_empty());
    }
}
