//! Frame reading logic for the WebSocket transport

use futures::StreamExt;
use futures::stream::SplitStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::transport::{CloseInfo, SocketEvent};

use super::transport::WsStream;

/// Read frames from the socket and report them as [`SocketEvent`]s
///
/// Always finishes with exactly one `Closed` event unless the receiver was
/// dropped first.
pub(super) async fn read_frames(
    mut stream: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<SocketEvent>,
    max_message_size: usize,
) {
    let close = loop {
        let Some(next) = stream.next().await else {
            break CloseInfo::abnormal("stream ended without close frame");
        };

        let event = match next {
            Ok(Message::Text(text)) => {
                if text.len() > max_message_size {
                    SocketEvent::Error(format!(
                        "Message exceeded maximum size of {max_message_size} bytes"
                    ))
                } else {
                    SocketEvent::Text(text.to_string())
                }
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) if text.len() <= max_message_size => SocketEvent::Text(text),
                Ok(_) => SocketEvent::Error(format!(
                    "Message exceeded maximum size of {max_message_size} bytes"
                )),
                Err(_) => SocketEvent::Error("Binary frame is not valid UTF-8".to_string()),
            },
            Ok(Message::Close(frame)) => {
                break frame.map_or_else(
                    || CloseInfo::abnormal("closed without status"),
                    |f| CloseInfo::new(u16::from(f.code), f.reason.to_string()),
                );
            }
            // Pings are answered by tungstenite itself.
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            Err(e) => {
                let _ = events.send(SocketEvent::Error(e.to_string()));
                break CloseInfo::abnormal(e.to_string());
            }
        };

        if events.send(event).is_err() {
            // Owner went away
            return;
        }
    };

    log::debug!("WebSocket closed: code={} reason={}", close.code, close.reason);
    let _ = events.send(SocketEvent::Closed(close));
}
