//! Thread client facade
//!
//! `ThreadClient` is the entry point: it turns a thread identifier into a
//! WebSocket address, starts a [`ConnectionHandle`] for it, and exposes the
//! event registry that every connection it creates publishes to.
//!
//! # Cloning
//!
//! `ThreadClient` is cheaply cloneable using `Arc` internally. All clones
//! share the same registry, connector and reconnection strategy.
//!
//! # Examples
//!
//! ```rust,no_run
//! use threadlink_client::ThreadClient;
//! use threadlink_core::Origin;
//! use serde_json::Value;
//!
//! # async fn example() -> threadlink_core::Result<()> {
//! let client = ThreadClient::new(Origin::secure("chat.example.com"));
//!
//! client.on("message_new", |payload: &Value| {
//!     println!("new message: {}", payload);
//! });
//!
//! let conn = client.connect(42)?;
//! conn.send_message("hello")?;
//! # Ok(())
//! # }
//! ```

use crate::client_builder::ClientBuilder;
use crate::connection::{ConnectionContext, ConnectionHandle};
use crate::registry::{EventRegistry, HandlerOutcome, Subscription};
use serde_json::Value;
use std::fmt;
use threadlink_core::{Origin, Result};

/// Client for conversation thread connections
#[derive(Clone)]
pub struct ThreadClient {
    pub(crate) origin: Origin,
    pub(crate) context: ConnectionContext,
}

impl ThreadClient {
    /// Create a client with the default strategy and WebSocket connector
    pub fn new(origin: Origin) -> Self {
        ClientBuilder::new(origin).build_without_observability()
    }

    /// Start configuring a client
    pub fn builder(origin: Origin) -> ClientBuilder {
        ClientBuilder::new(origin)
    }

    /// Origin that thread addresses are built from
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Connect to a thread
    ///
    /// Returns immediately with a handle in the `Connecting` state; the
    /// connection is established in the background and re-established
    /// after every loss until the handle is closed or dropped. Keep the
    /// handle alive for as long as the connection is wanted: dropping it
    /// closes the connection. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// `Error::InvalidEndpoint` when `thread_id` is empty or contains `/`,
    /// `?` or `#`.
    #[must_use = "dropping the handle closes the connection"]
    #[tracing::instrument(skip(self, thread_id), fields(thread = %thread_id))]
    pub fn connect(&self, thread_id: impl fmt::Display) -> Result<ConnectionHandle> {
        let url = self.origin.thread_url(&thread_id)?;
        Ok(ConnectionHandle::spawn(thread_id.to_string(), url, &self.context))
    }

    /// Subscribe to an event from every connection of this client
    ///
    /// Handlers run on the connection's driver task in registration order.
    /// A handler returning `Err` or panicking is logged and skipped; later
    /// handlers still run.
    pub fn on<F, R>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Value) -> R + Send + Sync + 'static,
        R: HandlerOutcome,
    {
        self.context.registry.on(event, handler)
    }

    /// The registry shared by this client's connections
    pub fn registry(&self) -> &EventRegistry {
        &self.context.registry
    }
}

impl fmt::Debug for ThreadClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadClient")
            .field("origin", &self.origin)
            .field("registry", &self.context.registry)
            .field("metrics", &self.context.metrics.is_some())
            .finish()
    }
}
