//! threadlink - Resilient WebSocket connections to conversation threads
//!
//! This is the main convenience crate that re-exports the threadlink
//! sub-crates. Use it if you want a single dependency.
//!
//! # Architecture
//!
//! - **threadlink-core**: Errors, thread addressing, frame decoding, observability
//! - **threadlink-client**: Event registry, reconnecting connection handles, client facade
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use threadlink::{Origin, ThreadClient};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tracing_subscriber::fmt().init();
//!
//!     let client = ThreadClient::new(Origin::parse("https://chat.example.com")?);
//!
//!     client.on("message_new", |payload: &Value| {
//!         println!("{}", payload);
//!     });
//!     client.on("close", |payload: &Value| {
//!         println!("connection lost: {}", payload["reason"]);
//!     });
//!
//!     let conn = client.connect(42)?;
//!     conn.send_message("hello")?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```

// Re-export all public APIs from sub-crates
pub use threadlink_client as client;
pub use threadlink_core as core;

// Convenience re-exports of the most commonly used types
pub use threadlink_client::{ClientBuilder, ConnectionHandle, ConnectionState, ThreadClient};
pub use threadlink_core::{Error, Origin, Result};
