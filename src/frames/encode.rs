use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::Frame;
use crate::error::{Error, Result};

/// Appends the wire form of `frame` to `dst`.
///
/// Uses the shortest length encoding and never sets the mask bit: frames
/// sent by a server are unmasked, whatever `frame.mask` holds.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    let payload = &frame.payload;
    dst.reserve(payload.len() + 10);

    let fin = if frame.fin { 0x80 } else { 0 };
    dst.put_u8(fin | frame.opcode as u8);

    #[allow(clippy::cast_possible_truncation)]
    match payload.len() {
        0..=125 => dst.put_u8(payload.len() as u8),
        126..=65535 => {
            dst.put_u8(126);
            dst.put_u16(payload.len() as u16);
        }
        _ => {
            dst.put_u8(127);
            dst.put_u64(payload.len() as u64);
        }
    }

    dst.extend_from_slice(payload);
}

/// Encodes `frame` and writes it out in full.
pub async fn write_frame<W: AsyncWrite + Unpin>(frame: &Frame, writer: &mut W) -> Result<()> {
    let mut buf = BytesMut::new();
    encode_frame(frame, &mut buf);
    writer.write_all(&buf).await.map_err(Error::WriteFailed)?;
    writer.flush().await.map_err(Error::WriteFailed)
}
