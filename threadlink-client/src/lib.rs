//! Reconnecting WebSocket client for conversation threads
//!
//! This crate keeps a long-lived WebSocket connection to one chat thread
//! alive across network failures, dispatches the server's events to
//! subscribers, and holds outbound payloads while the connection is down.
//!
//! # Core Features
//!
//! - **Event Registry**: Subscribe to events by name; one registry per client
//! - **Auto-Reconnection**: Exponential backoff (500ms base, 30s cap), unbounded
//! - **Deferred Sends**: Payloads sent while disconnected go out on the next open
//! - **Decoded Events**: Known message events are re-emitted in simplified form
//! - **Observability**: OpenTelemetry integration for traces and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use threadlink_client::ThreadClient;
//! use threadlink_core::Origin;
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ThreadClient::new(Origin::parse("https://chat.example.com")?);
//!
//!     client.on("open", |_: &Value| println!("connected"));
//!     client.on("message_new", |payload: &Value| {
//!         println!("Event: {:?}", payload);
//!     });
//!
//!     let conn = client.connect(42)?;
//!     conn.send_message("hello")?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     conn.close();
//!     Ok(())
//! }
//! ```
//!
//! # Custom Reconnection
//!
//! ```rust,no_run
//! use threadlink_client::{ClientBuilder, ExponentialBackoff};
//! use threadlink_core::Origin;
//! use std::time::Duration;
//!
//! # fn example() -> threadlink_core::Result<()> {
//! let client = ClientBuilder::new(Origin::insecure("localhost:8000"))
//!     .with_reconnect(
//!         ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(30))
//!             .with_max_attempts(10)
//!             .with_jitter(),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod client_builder;
mod connection;
mod connection_state;
mod metrics;
mod reconnect;
mod registry;
mod transport;

pub use client::ThreadClient;
pub use client_builder::ClientBuilder;
pub use connection::ConnectionHandle;
pub use connection_state::ConnectionState;
pub use metrics::ClientMetrics;
pub use reconnect::{
    ExponentialBackoff, FixedDelay, ReconnectionStrategy, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY,
};
pub use registry::{EmitOutcome, EventRegistry, HandlerFn, HandlerOutcome, Subscription};
pub use transport::{Connector, FrameSink, FrameStream, Message, Transport, WebSocketConnector};
