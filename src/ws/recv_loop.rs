use std::{sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf},
    sync::mpsc::Sender,
};
use tracing::Instrument;

use super::{ConnInner, Event};
use crate::{
    error::{CloseReason, Error, FrameError, Violation},
    frames::{CloseFrame, Frame, FrameReader},
    protocol::{Action, Reassembler},
};

enum Next {
    Frame(Result<Option<Frame>, FrameError>),
    Idle,
    Cancelled,
}

/// Spawns the task that owns the read half of the connection.
///
/// The task ends when either side closes, the stream fails, or the handle
/// asks it to stop. It always shuts the stream down and reports
/// [`Event::Closed`] on its way out.
pub(crate) fn recv_loop<S>(
    inner: Arc<ConnInner<S>>,
    mut reader: FrameReader<ReadHalf<S>>,
    event_tx: Sender<Event>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let span = tracing::info_span!("recv", peer = ?inner.peer);

    tokio::spawn(
        async move {
            let mut assembler = Reassembler::new(inner.config.max_message_size);
            let mut peer_close = None;

            loop {
                // once our Close is out, only wait so long for the answer
                let deadline = if inner.is_closing() {
                    Some(inner.config.close_timeout)
                } else {
                    inner.config.read_timeout
                };

                let next = tokio::select! {
                    () = inner.cancelled() => Next::Cancelled,
                    next = read_within(&mut reader, deadline) => next,
                };

                let frame = match next {
                    Next::Frame(Ok(Some(frame))) => frame,
                    Next::Frame(Ok(None)) => {
                        tracing::info!("TCP FIN");
                        break;
                    }
                    Next::Frame(Err(FrameError::Malformed(v))) => {
                        protocol_error(&inner, v).await;
                        let _ = event_tx.send(Event::Error(FrameError::Malformed(v).into())).await;
                        break;
                    }
                    Next::Frame(Err(e)) => {
                        tracing::warn!(error = %e, "reader error");
                        let _ = event_tx.send(Event::Error(e.into())).await;
                        break;
                    }
                    Next::Idle if inner.is_closing() => {
                        tracing::info!("peer did not answer close in time");
                        break;
                    }
                    Next::Idle => {
                        tracing::info!("read timed out, closing");
                        let close = CloseFrame::new(CloseReason::GoingAway, "idle timeout");
                        let _ = inner.close(Some(&close)).await;
                        break;
                    }
                    Next::Cancelled => {
                        tracing::debug!("receive task cancelled");
                        let close = CloseFrame::new(CloseReason::GoingAway, "");
                        let _ = inner.close(Some(&close)).await;
                        break;
                    }
                };

                tracing::trace!(
                    opcode = ?frame.opcode,
                    fin = frame.fin,
                    len = frame.payload.len(),
                    "frame decoded"
                );
                match assembler.push(frame) {
                    Ok(Action::Continue) => {}
                    Ok(Action::Message(msg)) => {
                        if event_tx.send(Event::Message(msg)).await.is_err() {
                            tracing::debug!("event receiver dropped");
                        }
                    }
                    Ok(Action::Pong(payload)) => {
                        if let Err(e) = inner.pong(payload).await {
                            tracing::warn!(error = %e, "failed to send PONG");
                            let _ = event_tx.send(Event::Error(e)).await;
                            break;
                        }
                    }
                    Ok(Action::PongReceived(payload)) => {
                        let latency = inner.ping_stats.lock().await.on_pong(&payload);
                        let _ = event_tx.send(Event::Pong { payload, latency }).await;
                    }
                    Ok(Action::Close(close)) => {
                        // echo the peer's status unless we started the close
                        match inner.close(close.as_ref()).await {
                            Ok(true) => tracing::debug!("close echoed"),
                            Ok(false) => tracing::debug!("close handshake complete"),
                            Err(e) => tracing::debug!(error = %e, "failed to echo close"),
                        }
                        peer_close = close;
                        break;
                    }
                    Err(v) => {
                        protocol_error(&inner, v).await;
                        let _ = event_tx.send(Event::Error(Error::Frame(v.into()))).await;
                        break;
                    }
                }
            }

            inner.shutdown().await;
            let _ = event_tx.send(Event::Closed(peer_close)).await;
        }
        .instrument(span),
    );
}

async fn read_within<S: AsyncRead>(
    reader: &mut FrameReader<ReadHalf<S>>,
    deadline: Option<Duration>,
) -> Next {
    match deadline {
        Some(d) => tokio::time::timeout(d, reader.read_frame())
            .await
            .map_or(Next::Idle, Next::Frame),
        None => Next::Frame(reader.read_frame().await),
    }
}

// Best effort: the peer broke the protocol, so the write may well fail too.
async fn protocol_error<S: AsyncWrite + Send>(inner: &ConnInner<S>, violation: Violation) {
    tracing::warn!(%violation, "protocol violation detected, entering closing state");
    let close = CloseFrame::new(violation.close_reason(), violation.to_string());
    if let Err(e) = inner.close(Some(&close)).await {
        tracing::debug!(error = %e, "failed to send close");
    }
}
