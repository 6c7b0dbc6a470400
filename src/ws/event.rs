use bytes::Bytes;

use crate::{error::Error, frames::CloseFrame, protocol::Message};

/// `Event`s are produced by [`WebSocket::recv`](crate::WebSocket::recv)
/// and [`WebSocket::recv_timeout`](crate::WebSocket::recv_timeout)
#[derive(Debug)]
pub enum Event {
    /// A complete Text or Binary message.
    Message(Message),
    /// A Pong arrived. `latency` is set when it answers our last ping.
    Pong { payload: Bytes, latency: Option<u16> },
    /// The connection is closed. Holds the peer's Close status, if it sent one.
    Closed(Option<CloseFrame>),
    /// The session ended on an error.
    Error(Error),
}
