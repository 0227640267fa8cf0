//! Error types for threadlink
//!
//! Almost nothing in threadlink is surfaced to the caller: transport faults,
//! malformed frames and failing subscribers are all logged and absorbed by
//! the connection driver. The `Error` enum still names every one of those
//! faults so that internal functions can use `?` and the driver has a single
//! type to log.
//!
//! # Error Categories
//!
//! - **Caller errors**: Serialization, InvalidEndpoint, InvalidMessage
//! - **Transport errors**: Connect, WebSocket, ConnectionClosed
//! - **Inbound errors**: Decode
//! - **Subscriber errors**: Handler
//! - **Setup errors**: Observability
//!
//! # Examples
//!
//! ```rust
//! use threadlink_core::Error;
//!
//! let error = Error::Decode("expected value at line 1 column 1".into());
//! assert!(error.is_inbound());
//! ```

use thiserror::Error;

/// Result type for threadlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for threadlink operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A caller-supplied payload could not be serialized to JSON
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An inbound frame could not be parsed
    ///
    /// The frame is dropped; the connection is unaffected.
    #[error("Decode error: {0}")]
    Decode(String),

    /// WebSocket transport layer error on an established transport
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Establishing a transport failed
    #[error("Connect error: {0}")]
    Connect(String),

    /// The origin or thread identifier cannot form a valid endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A typed thread action was rejected before it reached the wire
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A subscriber failed while handling an event
    #[error("Handler for '{event}' failed: {reason}")]
    Handler {
        /// The event being dispatched
        event: String,
        /// Error message or panic payload
        reason: String,
    },

    /// The transport is gone and cannot carry the frame
    #[error("Connection closed")]
    ConnectionClosed,

    /// OpenTelemetry could not be initialized
    #[error("Observability error: {0}")]
    Observability(String),
}

impl Error {
    /// True for faults in the underlying transport
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::WebSocket(_) | Error::Connect(_) | Error::ConnectionClosed
        )
    }

    /// True for faults caused by what the peer sent
    pub fn is_inbound(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
