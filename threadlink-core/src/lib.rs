//! Core types for threadlink
//!
//! This crate holds everything about a conversation thread socket that does
//! not depend on a live connection:
//!
//! - **Endpoint**: where a thread's WebSocket lives (`Origin`)
//! - **Frames**: interpretation of inbound records (`InboundFrame`) and the
//!   typed outbound actions the server understands (`ThreadAction`)
//! - **Codec**: JSON text encoding and decoding of frames
//! - **Error handling**: the shared `Error` type
//! - **Observability**: OpenTelemetry and `tracing` bootstrap
//!
//! The `threadlink-client` crate builds the reconnecting connection manager
//! on top of this.
//!
//! # Example
//!
//! ```rust
//! use threadlink_core::{codec, InboundFrame, Origin};
//!
//! let url = Origin::parse("https://chat.example.com").unwrap().thread_url(12).unwrap();
//! assert_eq!(url, "wss://chat.example.com/ws/threads/12/");
//!
//! let frame = codec::decode(r#"{"event":"message_seen","message_id":5}"#).unwrap();
//! assert!(matches!(frame, InboundFrame::MessageSeen { .. }));
//! ```

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod observability;

pub use endpoint::Origin;
pub use error::{Error, Result};
pub use frame::{InboundFrame, ThreadAction};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
