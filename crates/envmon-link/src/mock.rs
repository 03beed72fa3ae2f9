//! In-memory connector for driving the manager in tests.
//!
//! Every `connect` call shows up as a [`PendingConnect`] that the test
//! accepts, rejects or leaves hanging. Accepting yields a [`MockRemote`]
//! playing the server side of the channel.

use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc as remote_mpsc;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::error::{LinkError, Result};
use crate::transport::{ChannelIo, Connector, InboundFrame, OutboundFrame};

pub(crate) struct MockConnector {
    requests: mpsc::UnboundedSender<PendingConnect>,
}

impl MockConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PendingConnect>) {
        let (requests, pending) = mpsc::unbounded_channel();
        (Arc::new(Self { requests }), pending)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<ChannelIo> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(PendingConnect {
                url: url.to_owned(),
                reply,
            })
            .map_err(|_| LinkError::Connect("mock connector gone".into()))?;
        answer
            .await
            .unwrap_or_else(|_| Err(LinkError::Connect("attempt abandoned".into())))
    }
}

pub(crate) struct PendingConnect {
    pub(crate) url: String,
    reply: oneshot::Sender<Result<ChannelIo>>,
}

impl PendingConnect {
    pub(crate) fn accept(self) -> MockRemote {
        let (to_remote, from_client) = remote_mpsc::unbounded::<OutboundFrame>();
        let (to_client, from_remote) = remote_mpsc::unbounded::<Result<InboundFrame>>();
        let sink = to_remote.sink_map_err(|e| LinkError::Transport(e.to_string()));
        let _ = self.reply.send(Ok(ChannelIo::new(sink, from_remote)));
        MockRemote {
            inbound: to_client,
            outbound: from_client,
        }
    }

    pub(crate) fn reject(self, reason: &str) {
        let _ = self.reply.send(Err(LinkError::Connect(reason.to_owned())));
    }
}

pub(crate) struct MockRemote {
    inbound: remote_mpsc::UnboundedSender<Result<InboundFrame>>,
    outbound: remote_mpsc::UnboundedReceiver<OutboundFrame>,
}

impl MockRemote {
    pub(crate) fn send_text(&self, text: &str) {
        let _ = self
            .inbound
            .unbounded_send(Ok(InboundFrame::Text(text.to_owned())));
    }

    pub(crate) fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.unbounded_send(Ok(InboundFrame::Close {
            code,
            reason: reason.to_owned(),
        }));
    }

    pub(crate) fn fail(&self, error: &str) {
        let _ = self
            .inbound
            .unbounded_send(Err(LinkError::Transport(error.to_owned())));
    }

    /// Stop accepting writes; the client's next write fails.
    pub(crate) fn stop_reading(&mut self) {
        self.outbound.close();
    }

    pub(crate) async fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.outbound.next().await
    }
}
