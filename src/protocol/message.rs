use bytes::Bytes;

use crate::{error::Violation, frames::Opcode};

/// Assembled messages received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Valid UTF-8 message.
    Text(String),
    /// Binary message bytes.
    Binary(Vec<u8>),
}

impl Message {
    /// If the type is `Message::Text`, returns a reference to the internal `String`, otherwise
    /// `None`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Message::Binary(..) => None,
            Message::Text(s) => Some(s),
        }
    }

    /// Returns a reference to the data as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Binary(b) => b,
            Message::Text(s) => s.as_bytes(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize { self.as_bytes().len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub(crate) fn opcode(&self) -> Opcode {
        match self {
            Message::Text(_) => Opcode::Text,
            Message::Binary(_) => Opcode::Bin,
        }
    }

    pub(crate) fn into_payload(self) -> Bytes {
        match self {
            Message::Text(s) => Bytes::from(s),
            Message::Binary(b) => Bytes::from(b),
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self { Message::Text(s) }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self { Message::Text(s.to_owned()) }
}

impl From<Vec<u8>> for Message {
    fn from(b: Vec<u8>) -> Self { Message::Binary(b) }
}

/// A message whose final fragment has not arrived yet.
#[derive(Debug)]
pub(crate) enum PartialMessage {
    Text(Vec<u8>),
    Binary(Vec<u8>),
}

impl PartialMessage {
    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) {
        match self {
            Self::Text(buf) | Self::Binary(buf) => buf.extend_from_slice(bytes),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Text(buf) | Self::Binary(buf) => buf.len(),
        }
    }

    pub(crate) fn into_message(self) -> Result<Message, Violation> {
        match self {
            Self::Binary(buf) => Ok(Message::Binary(buf)),
            Self::Text(buf) => String::from_utf8(buf)
                .map(Message::Text)
                .map_err(|_| Violation::InvalidUtf8),
        }
    }
}
