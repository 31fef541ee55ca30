//! WebSocket connector built on `tokio-tungstenite`

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{LinkError, Result};
use crate::transport::{Connector, OutboundFrame, SocketChannel};

use super::config::WebSocketConfig;
use super::reader::read_frames;

pub(super) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector opening real WebSocket connections
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Create a connector with the given configuration
    #[must_use]
    pub const fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Connector configuration
    #[must_use]
    pub const fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<SocketChannel> {
        let (ws, _response) = tokio::time::timeout(self.config.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                LinkError::timeout(format!(
                    "WebSocket handshake did not complete within {:?}",
                    self.config.connect_timeout
                ))
            })?
            .map_err(|e| LinkError::connection(format!("WebSocket connect failed: {e}")))?;

        log::debug!("WebSocket opened");

        let (sink, stream) = ws.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_frames(sink, outbound_rx));
        tokio::spawn(read_frames(stream, inbound_tx, self.config.max_message_size));

        Ok(SocketChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Forward outbound frames to the socket until closed
async fn write_frames(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
) {
    while let Some(frame) = outbound.recv().await {
        match frame {
            OutboundFrame::Text(text) => {
                if let Err(e) = sink.send(Message::text(text)).await {
                    log::warn!("WebSocket write failed: {e}");
                    return;
                }
            }
            OutboundFrame::Close => break,
        }
    }

    // Either an explicit close or the owner dropped its sender.
    let close = Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: Utf8Bytes::from_static("client closed"),
    }));
    if let Err(e) = sink.send(close).await {
        log::debug!("WebSocket close frame not sent: {e}");
    }
    let _ = sink.close().await;
}
