//! Client builder for configuring reconnection and other options
//!
//! The `ClientBuilder` provides a fluent API for configuring client behavior
//! before connecting. It allows you to:
//! - Swap the reconnection strategy (exponential backoff by default)
//! - Plug in a different transport connector
//! - Share an event registry between clients
//! - Configure observability (OpenTelemetry)
//!
//! # Examples
//!
//! ```rust,no_run
//! use threadlink_client::{ClientBuilder, ExponentialBackoff};
//! use threadlink_core::Origin;
//! use std::time::Duration;
//!
//! # fn example() -> threadlink_core::Result<()> {
//! let origin = Origin::parse("https://chat.example.com")?;
//!
//! // Faster retries with jitter
//! let client = ClientBuilder::new(origin.clone())
//!     .with_reconnect(
//!         ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(10))
//!             .with_jitter(),
//!     )
//!     .build()?;
//!
//! // With observability
//! let client2 = ClientBuilder::new(origin)
//!     .with_default_observability()
//!     .service_name("chat-ui")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::connection::ConnectionContext;
use crate::metrics::ClientMetrics;
use crate::reconnect::{ExponentialBackoff, ReconnectionStrategy};
use crate::registry::EventRegistry;
use crate::transport::{Connector, WebSocketConnector};
use crate::ThreadClient;
use std::sync::Arc;
use threadlink_core::{Error, ObservabilityConfig, Origin, Result};

/// Builder for configuring and creating a ThreadClient
pub struct ClientBuilder {
    origin: Origin,
    reconnect_strategy: Option<Arc<dyn ReconnectionStrategy>>,
    connector: Option<Arc<dyn Connector>>,
    registry: Option<EventRegistry>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            reconnect_strategy: None,
            connector: None,
            registry: None,
            observability_config: None,
            service_name: None,
        }
    }

    /// Use the given reconnection strategy
    pub fn with_reconnect(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Arc::new(strategy));
        self
    }

    /// Use the given transport connector
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Publish events to an existing registry
    pub fn with_registry(mut self, registry: EventRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Fails only when observability is enabled and cannot be initialized.
    pub fn build(self) -> Result<ThreadClient> {
        let metrics = match self.observability_config {
            Some(ref config) => {
                let mut config = config.clone();
                if let Some(ref name) = self.service_name {
                    config.service_name = name.clone();
                }

                threadlink_core::init_observability(config.clone()).map_err(|e| {
                    Error::Observability(format!("Failed to initialize observability: {}", e))
                })?;

                Some(Arc::new(ClientMetrics::new(&config.service_name)))
            }
            None => None,
        };

        Ok(self.assemble(metrics))
    }

    /// Build the client, ignoring any observability configuration
    pub(crate) fn build_without_observability(self) -> ThreadClient {
        self.assemble(None)
    }

    fn assemble(self, metrics: Option<Arc<ClientMetrics>>) -> ThreadClient {
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WebSocketConnector),
        };
        let strategy: Arc<dyn ReconnectionStrategy> = match self.reconnect_strategy {
            Some(strategy) => strategy,
            None => Arc::new(ExponentialBackoff::default()),
        };

        let context = ConnectionContext {
            registry: self.registry.unwrap_or_default(),
            connector,
            strategy,
            metrics,
        };

        tracing::debug!(origin = %self.origin, "Thread client configured");

        ThreadClient {
            origin: self.origin,
            context,
        }
    }
}
