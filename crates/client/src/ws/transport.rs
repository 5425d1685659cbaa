//! Streaming socket abstraction and the tokio-tungstenite implementation.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use matchwire_shared::TransportError;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Frame observed on the inbound half of a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    Text(String),
    /// Peer sent a close frame.
    Close,
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<TransportFrame, TransportError>> + Send>>;

/// An open full-duplex text socket.
pub struct Transport {
    pub(crate) sink: FrameSink,
    pub(crate) stream: FrameStream,
}

impl Transport {
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<String, Error = TransportError> + Send + 'static,
        R: Stream<Item = Result<TransportFrame, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Transport, TransportError>;
}

/// Bound on the TCP, TLS and upgrade handshake together.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Real WebSocket connector.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Transport, TransportError> {
        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::Connect("handshake timed out".to_string()))?
                .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| TransportError::Protocol(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::text(text))));

        let stream = read.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(TransportFrame::Text(text.as_str().to_owned()))),
                Ok(Message::Close(_)) => Some(Ok(TransportFrame::Close)),
                // Protocol ping/pong is answered by tungstenite; binary is not part of the protocol.
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Protocol(e.to_string()))),
            })
        });

        Ok(Transport::new(sink, stream))
    }
}
