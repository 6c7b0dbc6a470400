use bytes::Bytes;

use super::{Message, PartialMessage};
use crate::{
    error::Violation,
    frames::{CloseFrame, Frame, Opcode},
};

/// What the session must do after a frame has been folded in.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    /// A fragment was buffered; nothing to deliver yet.
    Continue,
    /// A complete message for the application.
    Message(Message),
    /// Reply with a Pong carrying this payload.
    Pong(Bytes),
    /// A Pong arrived; a liveness signal for the application.
    PongReceived(Bytes),
    /// The peer closed; echo and shut down.
    Close(Option<CloseFrame>),
}

#[derive(Debug)]
enum State {
    Idle,
    Assembling(PartialMessage),
    Closed,
}

/// Folds decoded frames into messages and routes control frames.
///
/// Control frames never touch fragmentation state, so a Ping may arrive
/// between two fragments of a message.
#[derive(Debug)]
pub struct Reassembler {
    state: State,
    max_message: usize,
}

impl Reassembler {
    #[must_use]
    pub fn new(max_message: usize) -> Self {
        Self {
            state: State::Idle,
            max_message,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool { matches!(self.state, State::Closed) }

    /// True while a fragmented message is waiting for more frames.
    #[must_use]
    pub fn is_assembling(&self) -> bool { matches!(self.state, State::Assembling(_)) }

    pub fn push(&mut self, frame: Frame) -> Result<Action, Violation> {
        if self.is_closed() {
            return Err(Violation::AfterClose);
        }

        match frame.opcode {
            Opcode::Ping => {
                tracing::debug!(len = frame.payload.len(), "received PING, scheduling PONG");
                Ok(Action::Pong(frame.payload))
            }
            Opcode::Pong => {
                tracing::debug!("received PONG");
                Ok(Action::PongReceived(frame.payload))
            }
            Opcode::Close => {
                // payload was validated by the decoder
                let close = CloseFrame::parse(&frame.payload)?;
                tracing::info!(reason = ?close, "received Close frame");
                if self.is_assembling() {
                    tracing::debug!("discarding unfinished message");
                }
                self.state = State::Closed;
                Ok(Action::Close(close))
            }
            Opcode::Text | Opcode::Bin | Opcode::Cont => self.push_data(&frame),
        }
    }

    // Build message out of frames
    fn push_data(&mut self, frame: &Frame) -> Result<Action, Violation> {
        tracing::trace!(
            partial = self.is_assembling(),
            opcode = ?frame.opcode,
            "handling message"
        );

        match (&self.state, frame.opcode) {
            (State::Idle, Opcode::Text) => {
                self.state = State::Assembling(PartialMessage::Text(Vec::new()));
            }
            (State::Idle, Opcode::Bin) => {
                self.state = State::Assembling(PartialMessage::Binary(Vec::new()));
            }
            (State::Assembling(_), Opcode::Cont) => {}
            (State::Idle, _) => return Err(Violation::UnexpectedContinuation),
            _ => return Err(Violation::UnfinishedMessage),
        }

        let max_message = self.max_message;
        let State::Assembling(partial) = &mut self.state else {
            unreachable!("state is Assembling once a data frame is accepted");
        };

        if partial.len() + frame.payload.len() > max_message {
            return Err(Violation::MessageTooLarge);
        }
        partial.push_bytes(&frame.payload);
        tracing::trace!(
            current_len = partial.len(),
            added = frame.payload.len(),
            "message fragment appended"
        );

        if !frame.fin {
            return Ok(Action::Continue);
        }

        let State::Assembling(partial) = std::mem::replace(&mut self.state, State::Idle) else {
            unreachable!("state is Assembling after a fragment was appended");
        };
        let msg = partial.into_message()?;
        tracing::debug!(total_len = msg.len(), "message assembly complete");
        Ok(Action::Message(msg))
    }
}
