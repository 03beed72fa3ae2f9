//! Transport seam.
//!
//! The manager only sees a [`Connector`] that turns a URL into a pair of
//! boxed frame sink/stream ([`ChannelIo`]). [`WsConnector`] is the real
//! WebSocket transport; tests plug in an in-memory one.

use std::pin::Pin;

use async_trait::async_trait;
use futures::future;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

use envmon_core::constants::CLOSE_NO_STATUS;

use crate::error::{LinkError, Result};

/// Frame written to the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// UTF-8 text message.
    Text(String),
    /// Close handshake with status code and reason.
    Close {
        /// Close status code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Frame read from the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 text message (binary frames are decoded lossily).
    Text(String),
    /// Peer closed the channel.
    Close {
        /// Close status code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Write half of an open channel.
pub type FrameSink = Pin<Box<dyn Sink<OutboundFrame, Error = LinkError> + Send>>;
/// Read half of an open channel.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<InboundFrame>> + Send>>;

/// An open channel.
pub struct ChannelIo {
    /// Outbound frames.
    pub sink: FrameSink,
    /// Inbound frames; ends when the peer goes away.
    pub stream: FrameStream,
}

impl ChannelIo {
    /// Box a sink/stream pair.
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<OutboundFrame, Error = LinkError> + Send + 'static,
        St: Stream<Item = Result<InboundFrame>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Opens channels.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel to `url`. Resolves once the channel is usable.
    async fn connect(&self, url: &str) -> Result<ChannelIo>;
}

/// WebSocket transport over `tokio-tungstenite` (`ws://` and `wss://`).
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<ChannelIo> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| LinkError::Connect(e.to_string()))?;
        debug!(status = %response.status(), "websocket handshake complete");

        let (sink, stream) = ws.split();
        let sink = sink
            .with(|frame: OutboundFrame| future::ready(Ok::<_, WsError>(to_message(frame))))
            .sink_map_err(|e| LinkError::Transport(e.to_string()));
        let stream = stream.filter_map(|item| future::ready(from_message(item)));

        Ok(ChannelIo::new(sink, stream))
    }
}

fn to_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::text(text),
        OutboundFrame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}

fn from_message(item: std::result::Result<Message, WsError>) -> Option<Result<InboundFrame>> {
    match item {
        Ok(Message::Text(text)) => Some(Ok(InboundFrame::Text(text.as_str().to_owned()))),
        Ok(Message::Binary(bytes)) => Some(Ok(InboundFrame::Text(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))),
        Ok(Message::Close(frame)) => Some(Ok(frame.map_or(
            InboundFrame::Close {
                code: CLOSE_NO_STATUS,
                reason: String::new(),
            },
            |frame| InboundFrame::Close {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_owned(),
            },
        ))),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(LinkError::Transport(e.to_string()))),
    }
}
