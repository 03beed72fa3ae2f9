//! One channel = one spawned task driving a [`ChannelIo`].
//!
//! The task reports back through `emit` and never touches manager state.
//! Every channel gets a fresh epoch; the manager drops events whose epoch is
//! not the current channel's.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use envmon_core::constants::CLOSE_ABNORMAL;

use crate::error::LinkError;
use crate::transport::{ChannelIo, Connector, InboundFrame, OutboundFrame};

/// Upper bound on a graceful close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// What a channel task reports.
#[derive(Debug)]
pub(crate) enum ChannelEvent {
    Opened,
    Message(String),
    Closed { code: u16, reason: String },
    /// The channel never opened.
    ConnectFailed(LinkError),
    /// The read side errored; a `Closed` follows.
    Failed(LinkError),
    /// A write failed; the task has exited.
    SendFailed(LinkError),
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SendError {
    Full,
    NotOpen,
}

pub(crate) struct ChannelHandle {
    pub(crate) epoch: u64,
    pub(crate) conn_id: Uuid,
    pub(crate) open: bool,
    outbound: mpsc::Sender<OutboundFrame>,
    cancel: CancellationToken,
    closing: bool,
}

impl ChannelHandle {
    /// Spawn the channel task and return its handle.
    pub(crate) fn open<F>(
        epoch: u64,
        url: String,
        connector: Arc<dyn Connector>,
        capacity: usize,
        emit: F,
    ) -> Self
    where
        F: Fn(ChannelEvent) + Send + Sync + 'static,
    {
        let (outbound, outbound_rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let conn_id = Uuid::now_v7();
        let span = info_span!("channel", epoch, conn_id = %conn_id);

        drop(tokio::spawn(
            run_channel(url, connector, outbound_rx, cancel.clone(), emit).instrument(span),
        ));

        Self {
            epoch,
            conn_id,
            open: false,
            outbound,
            cancel,
            closing: false,
        }
    }

    /// Queue a text frame without waiting.
    pub(crate) fn send_text(&self, text: String) -> Result<(), SendError> {
        if !self.open {
            return Err(SendError::NotOpen);
        }
        self.outbound
            .try_send(OutboundFrame::Text(text))
            .map_err(|e| match e {
                TrySendError::Full(_) => SendError::Full,
                TrySendError::Closed(_) => SendError::NotOpen,
            })
    }

    /// Close the channel: a close handshake when open, otherwise abort.
    pub(crate) fn close(mut self, code: u16, reason: &str) {
        if self.open {
            let frame = OutboundFrame::Close {
                code,
                reason: reason.to_owned(),
            };
            self.closing = self.outbound.try_send(frame).is_ok();
        }
        debug!(
            epoch = self.epoch,
            conn_id = %self.conn_id,
            graceful = self.closing,
            "closing channel"
        );
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        if !self.closing {
            self.cancel.cancel();
        }
    }
}

async fn run_channel<F>(
    url: String,
    connector: Arc<dyn Connector>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    cancel: CancellationToken,
    emit: F,
) where
    F: Fn(ChannelEvent) + Send + Sync + 'static,
{
    debug!("opening channel");
    let io = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("cancelled before open");
            return;
        }
        result = connector.connect(&url) => match result {
            Ok(io) => io,
            Err(err) => {
                debug!(error = %err, "channel failed to open");
                emit(ChannelEvent::ConnectFailed(err));
                return;
            }
        },
    };

    emit(ChannelEvent::Opened);
    let ChannelIo {
        mut sink,
        mut stream,
    } = io;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("channel aborted");
                return;
            }
            frame = outbound.recv() => match frame {
                Some(OutboundFrame::Close { code, reason }) => {
                    let handshake = async {
                        sink.send(OutboundFrame::Close { code, reason }).await?;
                        sink.close().await
                    };
                    match tokio::time::timeout(CLOSE_GRACE, handshake).await {
                        Ok(Ok(())) => debug!(code, "channel closed"),
                        Ok(Err(err)) => debug!(error = %err, "close handshake failed"),
                        Err(_) => debug!("close handshake timed out"),
                    }
                    return;
                }
                Some(frame) => {
                    if let Err(err) = sink.send(frame).await {
                        warn!(error = %err, "channel write failed");
                        emit(ChannelEvent::SendFailed(err));
                        return;
                    }
                }
                None => {
                    debug!("channel handle dropped");
                    return;
                }
            },
            item = stream.next() => match item {
                Some(Ok(InboundFrame::Text(text))) => emit(ChannelEvent::Message(text)),
                Some(Ok(InboundFrame::Close { code, reason })) => {
                    debug!(code, %reason, "peer closed channel");
                    emit(ChannelEvent::Closed { code, reason });
                    return;
                }
                Some(Err(err)) => {
                    warn!(error = %err, "channel read failed");
                    emit(ChannelEvent::Failed(err));
                    emit(ChannelEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: String::new(),
                    });
                    return;
                }
                None => {
                    emit(ChannelEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "connection lost".to_owned(),
                    });
                    return;
                }
            },
        }
    }
}
