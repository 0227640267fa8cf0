//! Inbound frame interpretation and outbound thread actions
//!
//! The thread server speaks loosely-typed JSON. Each inbound record carries a
//! logical event name under `event` or, for older producers, `type` (`event`
//! wins when both are present), plus event-specific fields. `InboundFrame`
//! turns such a record into a closed set of known shapes with a catch-all for
//! everything else, keeping the raw record around because subscribers always
//! receive it.
//!
//! # Fan-out
//!
//! A decoded frame produces one or two emissions, in this order:
//!
//! 1. the logical event name with the full raw record
//! 2. for `message_new`, `message_seen` and `message_deleted` only, the same
//!    name again with a simplified payload
//!
//! | logical event     | simplified payload                  |
//! |-------------------|-------------------------------------|
//! | `message_new`     | the record's `message` field        |
//! | `message_seen`    | `{"message_id": record.message_id}` |
//! | `message_deleted` | `{"message_id": record.message_id}` |
//!
//! # Examples
//!
//! ```rust
//! use threadlink_core::InboundFrame;
//! use serde_json::json;
//!
//! let frame = InboundFrame::from_record(json!({
//!     "event": "message_new",
//!     "message": {"id": 1, "body": "hi"}
//! }));
//!
//! let emissions = frame.emissions();
//! assert_eq!(emissions.len(), 2);
//! assert_eq!(emissions[1].1, json!({"id": 1, "body": "hi"}));
//! ```

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{json, Value};

/// Emitted when a transport becomes ready
pub const OPEN: &str = "open";
/// Emitted when a transport ends or a connect attempt fails
pub const CLOSE: &str = "close";
/// A new message was posted to the thread
pub const MESSAGE_NEW: &str = "message_new";
/// A participant has seen a message
pub const MESSAGE_SEEN: &str = "message_seen";
/// A message was removed from the thread
pub const MESSAGE_DELETED: &str = "message_deleted";
/// The server accepted the socket for a thread
pub const READY: &str = "ready";
/// The server stored a message this socket sent
pub const MESSAGE_SENT: &str = "message_sent";
/// The server rejected an action
pub const SERVER_ERROR: &str = "error";

/// Longest message body the server accepts, in characters
pub const MAX_BODY_CHARS: usize = 5000;

/// A decoded inbound record
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `message_new`: a message was posted
    MessageNew {
        /// The record's `message` field, `null` when absent
        message: Value,
        /// Full record as received
        record: Value,
    },
    /// `message_seen`: a message was read
    MessageSeen {
        /// The record's `message_id` field, `null` when absent
        message_id: Value,
        /// Full record as received
        record: Value,
    },
    /// `message_deleted`: a message was removed
    MessageDeleted {
        /// The record's `message_id` field, `null` when absent
        message_id: Value,
        /// Full record as received
        record: Value,
    },
    /// `ready`: the socket joined its thread
    Ready {
        /// Thread identifier echoed by the server
        thread: Value,
        /// Username the server authenticated
        user: Option<String>,
        /// Full record as received
        record: Value,
    },
    /// `message_sent`: confirmation of this socket's own send
    MessageSent {
        /// Identifier the server assigned to the new message
        id: Value,
        /// Full record as received
        record: Value,
    },
    /// `error`: the server refused an action
    ServerError {
        /// Human-readable reason, empty when the server gave none
        detail: String,
        /// Full record as received
        record: Value,
    },
    /// Any other named event
    Other {
        /// Logical event name
        event: String,
        /// Full record as received
        record: Value,
    },
    /// A well-formed record with no usable event name
    Untagged(Value),
}

impl InboundFrame {
    /// Classify a parsed record
    pub fn from_record(record: Value) -> Self {
        let Some(event) = logical_event(&record).map(str::to_owned) else {
            return InboundFrame::Untagged(record);
        };

        let field = |name: &str| record.get(name).cloned().unwrap_or(Value::Null);

        match event.as_str() {
            MESSAGE_NEW => InboundFrame::MessageNew {
                message: field("message"),
                record,
            },
            MESSAGE_SEEN => InboundFrame::MessageSeen {
                message_id: field("message_id"),
                record,
            },
            MESSAGE_DELETED => InboundFrame::MessageDeleted {
                message_id: field("message_id"),
                record,
            },
            READY => InboundFrame::Ready {
                thread: field("thread"),
                user: record.get("user").and_then(Value::as_str).map(str::to_owned),
                record,
            },
            MESSAGE_SENT => InboundFrame::MessageSent {
                id: field("id"),
                record,
            },
            SERVER_ERROR => InboundFrame::ServerError {
                detail: record
                    .get("detail")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                record,
            },
            _ => InboundFrame::Other { event, record },
        }
    }

    /// Logical event name, `None` for untagged records
    pub fn event_name(&self) -> Option<&str> {
        match self {
            InboundFrame::MessageNew { .. } => Some(MESSAGE_NEW),
            InboundFrame::MessageSeen { .. } => Some(MESSAGE_SEEN),
            InboundFrame::MessageDeleted { .. } => Some(MESSAGE_DELETED),
            InboundFrame::Ready { .. } => Some(READY),
            InboundFrame::MessageSent { .. } => Some(MESSAGE_SENT),
            InboundFrame::ServerError { .. } => Some(SERVER_ERROR),
            InboundFrame::Other { event, .. } => Some(event),
            InboundFrame::Untagged(_) => None,
        }
    }

    /// The record exactly as it arrived
    pub fn record(&self) -> &Value {
        match self {
            InboundFrame::MessageNew { record, .. }
            | InboundFrame::MessageSeen { record, .. }
            | InboundFrame::MessageDeleted { record, .. }
            | InboundFrame::Ready { record, .. }
            | InboundFrame::MessageSent { record, .. }
            | InboundFrame::ServerError { record, .. }
            | InboundFrame::Other { record, .. } => record,
            InboundFrame::Untagged(record) => record,
        }
    }

    /// Convenience payload re-emitted after the raw record, if any
    pub fn simplified(&self) -> Option<Value> {
        match self {
            InboundFrame::MessageNew { message, .. } => Some(message.clone()),
            InboundFrame::MessageSeen { message_id, .. }
            | InboundFrame::MessageDeleted { message_id, .. } => {
                Some(json!({ "message_id": message_id }))
            }
            _ => None,
        }
    }

    /// Every `(event, payload)` pair this frame publishes, in emission order
    pub fn emissions(&self) -> Vec<(String, Value)> {
        let Some(event) = self.event_name() else {
            return Vec::new();
        };

        let mut out = vec![(event.to_owned(), self.record().clone())];
        if let Some(simple) = self.simplified() {
            out.push((event.to_owned(), simple));
        }
        out
    }
}

/// Event name under `event`, falling back to `type`; empty and non-string
/// values do not count
fn logical_event(record: &Value) -> Option<&str> {
    let named = |key: &str| record.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
    named("event").or_else(|| named("type"))
}

/// Outbound actions understood by the thread server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ThreadAction {
    /// Post a message to the thread
    Send {
        /// Message text
        body: String,
    },
    /// Mark a message as seen
    Seen {
        /// Identifier of the message
        message_id: i64,
    },
}

impl ThreadAction {
    /// Build a `send` action, trimming the body and enforcing the server's
    /// length limits
    pub fn send(body: impl AsRef<str>) -> Result<Self> {
        let body = body.as_ref().trim();
        let chars = body.chars().count();
        if chars == 0 || chars > MAX_BODY_CHARS {
            return Err(Error::InvalidMessage(format!(
                "message must be between 1 and {} characters, got {}",
                MAX_BODY_CHARS, chars
            )));
        }
        Ok(ThreadAction::Send {
            body: body.to_owned(),
        })
    }

    /// Build a `seen` action
    pub fn seen(message_id: i64) -> Self {
        ThreadAction::Seen { message_id }
    }
}
