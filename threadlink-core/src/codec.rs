//! Codec for thread frames
//!
//! Outbound payloads are opaque to threadlink: anything `Serialize` becomes a
//! JSON text frame. Inbound text is parsed into a JSON value first and then
//! classified by [`InboundFrame::from_record`], so a frame that is valid JSON
//! but has an unexpected shape is never an error, it is just untagged.
//!
//! # Error Handling
//!
//! - Unparsable inbound text → `Error::Decode`
//! - Unserializable outbound payload → `Error::Serialization`
//!
//! # Examples
//!
//! ```rust
//! use threadlink_core::{codec, InboundFrame};
//! use serde_json::json;
//!
//! let text = codec::encode(&json!({"action": "seen", "message_id": 3})).unwrap();
//! assert_eq!(text, r#"{"action":"seen","message_id":3}"#);
//!
//! let frame = codec::decode(r#"{"event":"typing"}"#).unwrap();
//! assert_eq!(frame.event_name(), Some("typing"));
//!
//! assert!(codec::decode("not json").is_err());
//! ```

use crate::error::{Error, Result};
use crate::frame::InboundFrame;
use serde::Serialize;

/// Encode any serializable payload as a JSON text frame
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    serde_json::to_string(payload).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode an inbound text frame
pub fn decode(text: &str) -> Result<InboundFrame> {
    let record: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::Decode(e.to_string()))?;
    Ok(InboundFrame::from_record(record))
}

/// Decode an inbound binary frame carrying UTF-8 JSON
pub fn decode_bytes(bytes: &[u8]) -> Result<InboundFrame> {
    let record: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;
    Ok(InboundFrame::from_record(record))
}
