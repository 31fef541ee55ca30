//! Message parser for realtime socket frames

use crate::error::{LinkError, Result};
use crate::types::events::{EventKind, InboundEvent, OutboundMessage};

/// Parse a text frame into a typed inbound event
///
/// # Arguments
/// * `text` - Raw text frame received from the socket
///
/// # Returns
/// Parsed event or error
///
/// # Errors
/// Returns `LinkError::JsonDecode` if the frame is not JSON,
/// `LinkError::UnknownMessageType` if its `type` tag is not recognised and
/// `LinkError::MessageParse` if it is missing the tag or the fields for it
pub fn parse_inbound(text: &str) -> Result<InboundEvent> {
    let data: serde_json::Value = serde_json::from_str(text)?;

    let Some(tag) = data.get("type").and_then(serde_json::Value::as_str) else {
        return Err(LinkError::message_parse(
            "Frame has no string `type` field",
            Some(data),
        ));
    };

    if EventKind::from_tag(tag).is_none() {
        return Err(LinkError::UnknownMessageType(tag.to_string()));
    }

    let tag = tag.to_string();
    serde_json::from_value(data.clone()).map_err(|e| {
        LinkError::message_parse(format!("Failed to parse `{tag}` frame: {e}"), Some(data))
    })
}

/// Serialize an outbound message into a text frame
///
/// # Errors
/// Returns `LinkError::JsonDecode` if serialization fails
pub fn encode_outbound(message: &OutboundMessage) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}
