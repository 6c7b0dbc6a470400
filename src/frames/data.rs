use bytes::{Bytes, BytesMut};

use super::{Frame, Opcode, encode_frame};

// -- SLOW PATH --
// Data messages may exceed the frame size limit, so they are split into a
// Text/Binary frame followed by Continuation frames.
pub(crate) struct DataFrame {
    opcode: Opcode,
    payload: Bytes,
    max_frame: usize,
}

impl DataFrame {
    pub(crate) fn new(payload: Bytes, opcode: Opcode, max_frame: usize) -> Self {
        Self {
            opcode,
            payload,
            max_frame: max_frame.max(1),
        }
    }

    /// Fragments in send order: FIN on the last, Continuation after the first.
    pub(crate) fn fragments(&self) -> Vec<Frame> {
        if self.payload.is_empty() {
            return vec![Frame::new(true, self.opcode, Bytes::new())];
        }

        let count = self.payload.len().div_ceil(self.max_frame);
        (0..count)
            .map(|i| {
                let start = i * self.max_frame;
                let end = (start + self.max_frame).min(self.payload.len());
                let opcode = if i == 0 { self.opcode } else { Opcode::Cont };
                Frame::new(i + 1 == count, opcode, self.payload.slice(start..end))
            })
            .collect()
    }

    /// All fragments encoded back to back, ready for a single write.
    pub(crate) fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 14);
        let frames = self.fragments();
        for frame in &frames {
            encode_frame(frame, &mut buf);
        }

        tracing::debug!(
            opcode = ?self.opcode,
            len = self.payload.len(),
            frames = frames.len(),
            "encoded DATA"
        );
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_message_is_one_final_frame() {
        let frames = DataFrame::new(Bytes::from_static(b"hello"), Opcode::Text, 16).fragments();
        assert_eq!(frames, vec![Frame::new(true, Opcode::Text, "hello")]);
    }

    #[test]
    fn empty_message_is_one_empty_frame() {
        let frames = DataFrame::new(Bytes::new(), Opcode::Bin, 16).fragments();
        assert_eq!(frames, vec![Frame::new(true, Opcode::Bin, Bytes::new())]);
    }

    #[test]
    fn large_message_is_split_with_continuations() {
        let payload = Bytes::from(vec![9u8; 10]);
        let frames = DataFrame::new(payload, Opcode::Bin, 4).fragments();

        let shape: Vec<_> = frames
            .iter()
            .map(|f| (f.fin, f.opcode, f.payload.len()))
            .collect();
        assert_eq!(
            shape,
            [
                (false, Opcode::Bin, 4),
                (false, Opcode::Cont, 4),
                (true, Opcode::Cont, 2),
            ]
        );
    }

    #[test]
    fn encode_concatenates_fragments() {
        let buf = DataFrame::new(Bytes::from_static(b"abc"), Opcode::Text, 2).encode();
        assert_eq!(&buf[..], &[0x01, 0x02, b'a', b'b', 0x80, 0x01, b'c']);
    }
}
