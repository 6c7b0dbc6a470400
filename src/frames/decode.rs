use std::{io::ErrorKind, marker::PhantomData, ops::Deref};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{CloseFrame, Frame, Opcode};
use crate::{
    error::{FrameError, Violation},
    role::{RolePolicy, Server},
};

// helper type since decoder errors are protocol violations
type Result<T> = std::result::Result<T, Violation>;

/// Spare capacity requested before each socket read.
const READ_CHUNK: usize = 8 * 1024;

/// Incremental frame parser over pushed bytes.
///
/// Returns `Ok(None)` until a whole frame is buffered. After an error the
/// decoder state is unspecified and the connection must be dropped.
pub struct FrameDecoder<R: RolePolicy = Server> {
    buf: BytesMut,
    state: DecodeState,
    ctx: DecodeContext,
    max_payload: u64,
    _p: PhantomData<R>,
}

#[derive(Debug)]
enum DecodeState {
    Header1,
    Header2,
    ExtendedLen,
    Mask,
    Payload,
}

#[derive(Debug)]
struct DecodeContext {
    is_fin: bool,
    opcode: Opcode,
    payload_len: u64,
    mask_key: Option<[u8; 4]>,
}

impl<R: RolePolicy> FrameDecoder<R> {
    #[must_use]
    pub fn new(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            state: DecodeState::Header1,
            ctx: DecodeContext {
                is_fin: false,
                opcode: Opcode::Cont,
                payload_len: 0,
                mask_key: None,
            },
            max_payload: max_payload as u64,
            _p: PhantomData,
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }

    /// True when some bytes of a frame have been consumed or buffered.
    #[must_use]
    pub fn is_mid_frame(&self) -> bool {
        !matches!(self.state, DecodeState::Header1) || !self.buf.is_empty()
    }

    pub(crate) fn buf_mut(&mut self) -> &mut BytesMut { &mut self.buf }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let next_state = match self.state {
                DecodeState::Header1 => {
                    let Some([b]) = self.pop_n::<1>() else {
                        return Ok(None);
                    };
                    self.parse_header1(b)?
                }
                DecodeState::Header2 => {
                    let Some([b]) = self.pop_n::<1>() else {
                        return Ok(None);
                    };
                    self.parse_header2(b)?
                }
                DecodeState::ExtendedLen => match self.parse_extended_len()? {
                    Some(state) => state,
                    None => return Ok(None),
                },
                DecodeState::Mask => {
                    let Some(key) = self.pop_n() else {
                        return Ok(None);
                    };
                    self.ctx.mask_key = Some(key);
                    DecodeState::Payload
                }
                DecodeState::Payload => {
                    let Some(frame) = self.parse_payload()? else {
                        return Ok(None);
                    };
                    self.state = DecodeState::Header1;

                    tracing::trace!(
                        opcode = ?frame.opcode,
                        fin = frame.fin,
                        payload_len = frame.payload_len,
                        masked = frame.mask.is_some(),
                        "frame decoded"
                    );
                    return Ok(Some(frame));
                }
            };
            tracing::trace!(
                from = ?self.state,
                to = ?next_state,
                "state transition"
            );
            self.state = next_state;
        }
    }

    fn parse_header1(&mut self, b: u8) -> Result<DecodeState> {
        // 0   | 1 2 3 | 4 5 6 7
        // Fin | Rsv   | Opcode
        if b & 0b0111_0000 != 0 {
            tracing::debug!("reserved bits set");
            return Err(Violation::ReservedBits);
        }

        self.ctx = DecodeContext {
            is_fin: b & 0b1000_0000 != 0,
            opcode: Opcode::try_from(b & 0b1111)?,
            payload_len: 0,
            mask_key: None,
        };

        Ok(DecodeState::Header2)
    }

    fn parse_header2(&mut self, b: u8) -> Result<DecodeState> {
        // 0    | 1 2 3 4 5 6 7
        // Mask | Payload len
        let masked = b & 0b1000_0000 != 0;
        match (R::SERVER, masked) {
            (true, false) => return Err(Violation::Unmasked),
            (false, true) => return Err(Violation::UnexpectedMask),
            _ => {}
        }

        self.ctx.payload_len = u64::from(b & 0b0111_1111);

        if self.ctx.opcode.is_control() {
            if !self.ctx.is_fin {
                return Err(Violation::FragmentedControl);
            }
            if self.ctx.payload_len > 125 {
                return Err(Violation::ControlTooLong);
            }
        }

        Ok(if self.ctx.payload_len > 125 {
            DecodeState::ExtendedLen
        } else {
            self.check_len()?;
            self.after_len()
        })
    }

    fn parse_extended_len(&mut self) -> Result<Option<DecodeState>> {
        self.ctx.payload_len = if self.ctx.payload_len == 126 {
            // 126 => 2 bytes extended (u16)
            let Some(len_bytes) = self.pop_n() else {
                return Ok(None);
            };
            u64::from(u16::from_be_bytes(len_bytes))
        } else {
            // 127 => 8 bytes extended (u64), most significant bit must be 0
            let Some(len_bytes) = self.pop_n() else {
                return Ok(None);
            };
            let len = u64::from_be_bytes(len_bytes);
            if len >> 63 != 0 {
                return Err(Violation::LengthHighBit);
            }
            len
        };

        self.check_len()?;
        Ok(Some(self.after_len()))
    }

    fn check_len(&self) -> Result<()> {
        if self.ctx.payload_len > self.max_payload {
            tracing::debug!(len = self.ctx.payload_len, "payload larger than maximum size");
            return Err(Violation::FrameTooLarge(self.ctx.payload_len));
        }
        Ok(())
    }

    fn after_len(&self) -> DecodeState {
        if R::SERVER {
            DecodeState::Mask
        } else {
            DecodeState::Payload
        }
    }

    fn parse_payload(&mut self) -> Result<Option<Frame>> {
        // bounded by max_payload, which came from a usize
        let len = usize::try_from(self.ctx.payload_len)
            .map_err(|_| Violation::FrameTooLarge(self.ctx.payload_len))?;
        if self.buf.len() < len {
            return Ok(None);
        }

        let mut payload = self.buf.split_to(len);
        if let Some(key) = self.ctx.mask_key {
            crate::protocol::mask(&mut payload, key);
        }

        if self.ctx.opcode == Opcode::Close {
            CloseFrame::parse(&payload)?;
        }

        Ok(Some(Frame {
            fin: self.ctx.is_fin,
            opcode: self.ctx.opcode,
            payload_len: self.ctx.payload_len,
            mask: self.ctx.mask_key,
            payload: payload.freeze(),
        }))
    }

    fn pop_n<const N: usize>(&mut self) -> Option<[u8; N]> {
        if N > self.buf.len() {
            return None;
        }
        self.buf.split_to(N).deref().try_into().ok()
    }
}

/// Reads whole frames from an async byte stream.
///
/// Bytes the HTTP layer buffered past the request head are handed in at
/// construction and decoded before the stream is touched.
pub struct FrameReader<S, R: RolePolicy = Server> {
    io: S,
    decoder: FrameDecoder<R>,
}

impl<S: AsyncRead + Unpin, R: RolePolicy> FrameReader<S, R> {
    pub fn new(io: S, read_buf: &[u8], max_payload: usize) -> Self {
        let mut decoder = FrameDecoder::new(max_payload);
        decoder.push_bytes(read_buf);
        Self { io, decoder }
    }

    /// Next frame from the stream.
    ///
    /// `Ok(None)` means the peer closed the stream between frames; EOF
    /// inside a frame is [`FrameError::Truncated`].
    pub async fn read_frame(&mut self) -> std::result::Result<Option<Frame>, FrameError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }

            let buf = self.decoder.buf_mut();
            buf.reserve(READ_CHUNK);
            let read = self.io.read_buf(buf).await;
            match read {
                Ok(0) if self.decoder.is_mid_frame() => {
                    tracing::debug!("stream ended mid-frame");
                    return Err(FrameError::Truncated);
                }
                Ok(0) => {
                    tracing::debug!("TCP FIN");
                    return Ok(None);
                }
                Ok(n) => tracing::trace!(bytes = n, "read socket"),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(FrameError::Truncated);
                }
                Err(e) => return Err(FrameError::Read(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec, prelude::*};

    use super::*;
    use crate::role::Client;

    const MAX: usize = 1 << 20;

    fn opcode_strategy() -> BoxedStrategy<Opcode> {
        prop_oneof![
            Just(Opcode::Text),
            Just(Opcode::Bin),
            Just(Opcode::Cont),
            Just(Opcode::Ping),
            Just(Opcode::Pong),
        ]
        .boxed()
    }

    // Build a raw WebSocket frame from opcode and payload
    fn build_frame_bytes(
        opcode: Opcode,
        payload: &[u8],
        fin: bool,
        mask: Option<[u8; 4]>,
    ) -> Vec<u8> {
        #![allow(clippy::cast_possible_truncation)]

        let mut bytes = vec![opcode as u8 | if fin { 0x80 } else { 0 }];
        let mask_bit = if mask.is_some() { 0x80 } else { 0 };

        if payload.len() <= 125 {
            bytes.push(payload.len() as u8 | mask_bit);
        } else if let Ok(len) = u16::try_from(payload.len()) {
            bytes.push(126 | mask_bit);
            bytes.extend_from_slice(&len.to_be_bytes());
        } else {
            bytes.push(127 | mask_bit);
            bytes.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        }

        if let Some(key) = mask {
            bytes.extend_from_slice(&key);
            bytes.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        } else {
            bytes.extend_from_slice(payload);
        }
        bytes
    }

    fn decode_one<R: RolePolicy>(bytes: &[u8]) -> Result<Option<Frame>> {
        let mut decoder = FrameDecoder::<R>::new(MAX);
        decoder.push_bytes(bytes);
        decoder.next_frame()
    }

    #[test]
    fn decodes_masked_client_frame() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let bytes = build_frame_bytes(Opcode::Text, b"Hello", true, Some(key));
        let frame = decode_one::<Server>(&bytes).unwrap().unwrap();

        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload_len, 5);
        assert_eq!(frame.mask, Some(key));
        assert_eq!(&frame.payload[..], b"Hello");
    }

    #[test]
    fn decodes_extended_lengths() {
        for len in [126, 65_535, 65_536] {
            let payload = vec![7u8; len];
            let bytes = build_frame_bytes(Opcode::Bin, &payload, true, Some([1, 2, 3, 4]));
            let frame = decode_one::<Server>(&bytes).unwrap().unwrap();
            assert_eq!(frame.payload_len, len as u64);
            assert_eq!(frame.payload, payload);
        }
    }

    #[test]
    fn unmasked_client_frame_is_malformed() {
        let bytes = build_frame_bytes(Opcode::Text, b"hi", true, None);
        assert_eq!(decode_one::<Server>(&bytes), Err(Violation::Unmasked));
    }

    #[test]
    fn masked_server_frame_is_malformed() {
        let bytes = build_frame_bytes(Opcode::Text, b"hi", true, Some([0; 4]));
        assert_eq!(decode_one::<Client>(&bytes), Err(Violation::UnexpectedMask));
    }

    #[test]
    fn reserved_bits_are_malformed() {
        for rsv in [0x40, 0x20, 0x10] {
            let mut bytes = build_frame_bytes(Opcode::Text, b"", true, Some([0; 4]));
            bytes[0] |= rsv;
            assert_eq!(decode_one::<Server>(&bytes), Err(Violation::ReservedBits));
        }
    }

    #[test]
    fn unknown_opcode_is_malformed() {
        assert_eq!(
            decode_one::<Server>(&[0x83, 0x80, 0, 0, 0, 0]),
            Err(Violation::Opcode(0x3))
        );
    }

    #[test]
    fn length_high_bit_is_malformed() {
        let mut bytes = vec![0x82, 0xFF];
        bytes.extend_from_slice(&(1u64 << 63).to_be_bytes());
        assert_eq!(decode_one::<Server>(&bytes), Err(Violation::LengthHighBit));
    }

    #[test]
    fn oversized_frame_is_rejected_before_payload_arrives() {
        let mut bytes = vec![0x82, 0xFF];
        bytes.extend_from_slice(&(MAX as u64 + 1).to_be_bytes());
        assert_eq!(
            decode_one::<Server>(&bytes),
            Err(Violation::FrameTooLarge(MAX as u64 + 1))
        );
    }

    #[test]
    fn control_frames_must_be_final_and_short() {
        let bytes = build_frame_bytes(Opcode::Ping, b"x", false, Some([0; 4]));
        assert_eq!(decode_one::<Server>(&bytes), Err(Violation::FragmentedControl));

        let bytes = build_frame_bytes(Opcode::Pong, &[0; 126], true, Some([0; 4]));
        assert_eq!(decode_one::<Server>(&bytes), Err(Violation::ControlTooLong));
    }

    #[test]
    fn invalid_close_payload_is_malformed() {
        let bytes = build_frame_bytes(Opcode::Close, &[0x03], true, Some([9; 4]));
        assert_eq!(decode_one::<Server>(&bytes), Err(Violation::ClosePayload));
    }

    #[test]
    fn waits_for_more_bytes_across_every_step() {
        let bytes = build_frame_bytes(Opcode::Bin, &[5; 300], false, Some([1, 2, 3, 4]));
        let mut decoder = FrameDecoder::<Server>::new(MAX);
        for b in &bytes[..bytes.len() - 1] {
            decoder.push_bytes(&[*b]);
            assert_eq!(decoder.next_frame(), Ok(None));
            assert!(decoder.is_mid_frame());
        }
        decoder.push_bytes(&bytes[bytes.len() - 1..]);
        let frame = decoder.next_frame().unwrap().unwrap();
        assert!(!frame.fin);
        assert_eq!(frame.payload.len(), 300);
        assert!(!decoder.is_mid_frame());
    }

    #[tokio::test]
    async fn reader_reports_truncated_payload() {
        let mut bytes = build_frame_bytes(Opcode::Text, b"hello world", true, Some([1; 4]));
        bytes.truncate(bytes.len() - 3);
        let mut reader = FrameReader::<_, Server>::new(&bytes[..], &[], MAX);
        assert!(matches!(reader.read_frame().await, Err(FrameError::Truncated)));
    }

    #[tokio::test]
    async fn reader_reports_truncated_extended_length() {
        let bytes = [0x82, 0xFE, 0x01];
        let mut reader = FrameReader::<_, Server>::new(&bytes[..], &[], MAX);
        assert!(matches!(reader.read_frame().await, Err(FrameError::Truncated)));
    }

    #[tokio::test]
    async fn reader_eof_between_frames_is_clean() {
        let bytes = build_frame_bytes(Opcode::Ping, b"p", true, Some([3; 4]));
        let mut reader = FrameReader::<_, Server>::new(&bytes[..], &[], MAX);
        assert!(reader.read_frame().await.unwrap().is_some());
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_decodes_pre_buffered_bytes_first() {
        let first = build_frame_bytes(Opcode::Text, b"early", true, Some([4; 4]));
        let second = build_frame_bytes(Opcode::Text, b"late", true, Some([5; 4]));
        // first frame plus half of the second were buffered by the HTTP layer
        let (head, tail) = second.split_at(3);
        let mut pre = first;
        pre.extend_from_slice(head);

        let mut reader = FrameReader::<_, Server>::new(tail, &pre, MAX);
        let a = reader.read_frame().await.unwrap().unwrap();
        let b = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(&a.payload[..], b"early");
        assert_eq!(&b.payload[..], b"late");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn decoder_handles_random_frames(
            opcode in opcode_strategy(),
            fin in any::<bool>(),
            key in any::<[u8; 4]>(),
            payload in vec(any::<u8>(), 0..=125),
        ) {
            let fin = fin || opcode.is_control();
            let bytes = build_frame_bytes(opcode, &payload, fin, Some(key));
            let frame = decode_one::<Server>(&bytes).unwrap().unwrap();

            prop_assert_eq!(&frame.payload[..], &payload[..]);
            prop_assert_eq!(frame.payload_len, payload.len() as u64);
            prop_assert_eq!(frame.opcode, opcode);
            prop_assert_eq!(frame.fin, fin);
        }

        #[test]
        fn fuzz_decoder(buf in vec(any::<u8>(), 0..2048)) {
            let mut fd = FrameDecoder::<Server>::new(MAX);
            fd.push_bytes(&buf);
            while let Ok(Some(_)) = fd.next_frame() {}
        }
    }
}
