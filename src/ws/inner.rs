use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt, WriteHalf},
    sync::{Mutex, Notify},
};

use crate::{
    config::Config,
    error::{Error, Result},
    frames::{CloseFrame, DataFrame, Frame, write_frame},
    protocol::{Message, PingStats},
};

/// State shared between the handle, the receive task and the ping task.
///
/// Every write goes through `writer`, so frames from different tasks never
/// interleave on the wire.
pub(crate) struct ConnInner<S> {
    writer: Mutex<WriteHalf<S>>,
    pub(crate) ping_stats: Mutex<PingStats>,
    /// Our Close frame has been sent.
    closing: AtomicBool,
    /// The stream has been shut down.
    closed: AtomicBool,
    cancel: Notify,
    pub(crate) config: Arc<Config>,
    pub(crate) peer: Option<SocketAddr>,
}

impl<S> ConnInner<S> {
    pub(crate) fn is_closing(&self) -> bool { self.closing.load(Ordering::Acquire) }

    pub(crate) fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    /// Asks the receive task to stop.
    pub(crate) fn cancel(&self) { self.cancel.notify_one(); }

    pub(crate) async fn cancelled(&self) { self.cancel.notified().await; }
}

impl<S: AsyncWrite + Send> ConnInner<S> {
    pub(crate) fn new(writer: WriteHalf<S>, config: Arc<Config>, peer: Option<SocketAddr>) -> Self {
        Self {
            writer: Mutex::new(writer),
            ping_stats: Mutex::new(PingStats::new()),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: Notify::new(),
            config,
            peer,
        }
    }

    // send a message, fragmented at the frame size limit
    pub(crate) async fn send(&self, msg: Message) -> Result<()> {
        if self.is_closing() {
            return Err(Error::Closed);
        }
        let opcode = msg.opcode();
        let frame = DataFrame::new(msg.into_payload(), opcode, self.config.max_frame_payload);
        self.write_once(&frame.encode()).await
    }

    /// Sends our Close frame. Only the first call writes anything; the
    /// return value says whether this call did.
    pub(crate) async fn close(&self, close: Option<&CloseFrame>) -> Result<bool> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        tracing::debug!(close = ?close, "sending close");
        self.write_frame(&Frame::close(close)).await?;
        Ok(true)
    }

    pub(crate) async fn pong(&self, payload: Bytes) -> Result<()> {
        if self.is_closing() {
            return Ok(());
        }
        self.write_frame(&Frame::pong(payload)).await
    }

    // send ping with a fresh nonce
    pub(crate) async fn ping(&self) -> Result<()> {
        if self.is_closing() {
            return Err(Error::Closed);
        }
        let nonce = self.ping_stats.lock().await.new_ping();
        self.write_frame(&Frame::ping(nonce.to_vec())).await
    }

    async fn write_frame(&self, frame: &Frame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(frame, &mut *writer).await
    }

    async fn write_once(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await.map_err(Error::WriteFailed)?;
        writer.flush().await.map_err(Error::WriteFailed)
    }

    /// Shuts the stream down. Runs once; later calls return immediately.
    pub(crate) async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closing.store(true, Ordering::Release);
        if let Err(e) = self.writer.lock().await.shutdown().await {
            tracing::debug!(error = %e, "shutdown failed");
        }
        tracing::debug!("connection shut down");
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, duplex, split};

    use super::*;
    use crate::{error::CloseReason, frames::FrameDecoder, role::Client};

    fn inner(max_frame: usize) -> (tokio::io::DuplexStream, ConnInner<tokio::io::DuplexStream>) {
        let (client, server) = duplex(1 << 16);
        let (_, writer) = split(server);
        let config = Config {
            max_frame_payload: max_frame,
            ..Config::default()
        };
        (client, ConnInner::new(writer, Arc::new(config), None))
    }

    async fn frames(client: &mut tokio::io::DuplexStream) -> Vec<Frame> {
        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        let mut decoder = FrameDecoder::<Client>::new(1 << 16);
        decoder.push_bytes(&raw);
        std::iter::from_fn(|| decoder.next_frame().unwrap()).collect()
    }

    #[tokio::test]
    async fn close_is_sent_once() {
        let (mut client, inner) = inner(1024);
        let close = CloseFrame::new(CloseReason::Normal, "done");
        assert!(inner.close(Some(&close)).await.unwrap());
        assert!(!inner.close(None).await.unwrap());
        assert!(matches!(inner.send(Message::from("late")).await, Err(Error::Closed)));
        inner.shutdown().await;
        inner.shutdown().await;
        assert!(inner.is_closed());

        let frames = frames(&mut client).await;
        assert_eq!(frames, [Frame::close(Some(&close))]);
    }

    #[tokio::test]
    async fn large_messages_are_fragmented() {
        let (mut client, inner) = inner(4);
        inner.send(Message::from("hello world")).await.unwrap();
        inner.shutdown().await;

        let frames = frames(&mut client).await;
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.payload.len() <= 4));
        assert!(frames[..2].iter().all(|f| !f.fin));
        assert!(frames[2].fin);
    }

    #[tokio::test]
    async fn ping_carries_a_nonce() {
        let (mut client, inner) = inner(1024);
        inner.ping().await.unwrap();
        assert!(inner.ping_stats.lock().await.awaiting_pong());
        inner.shutdown().await;

        let frames = frames(&mut client).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.len(), 8);
    }
}
