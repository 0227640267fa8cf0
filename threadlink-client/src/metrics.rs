//! Client metrics definitions
//!
//! OpenTelemetry instruments describing connection health. They are created
//! when observability is enabled via `ClientBuilder::with_observability()`
//! and exported to the configured OTLP endpoint.
//!
//! # Metrics Collected
//!
//! - **connection.state**: Current connection state (gauge)
//! - **connect.attempts**: Connection attempts, first one included (counter)
//! - **connections.opened**: Successful opens (counter)
//! - **reconnects.scheduled**: Backoff delays scheduled (counter)
//! - **frames.received**: Inbound events by name (counter)
//! - **frames.sent**: Outbound payloads by delivery path (counter)
//! - **decode.errors**: Inbound frames dropped as malformed (counter)
//! - **handler.failures**: Handlers that returned an error or panicked (counter)
//!
//! # Examples
//!
//! ```rust,no_run
//! use threadlink_client::ClientMetrics;
//!
//! let metrics = ClientMetrics::new("chat-ui");
//! metrics.record_connect_attempt();
//! ```

use crate::connection_state::ConnectionState;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Meter},
    KeyValue,
};
use std::time::Duration;

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// Connection state (1=connecting, 2=open, 3=retry wait, 4=closed)
    pub connection_state: Gauge<i64>,
    /// Total number of connection attempts
    pub connect_attempts: Counter<u64>,
    /// Total number of successful opens
    pub connections_opened: Counter<u64>,
    /// Total number of reconnects scheduled
    pub reconnects_scheduled: Counter<u64>,
    /// Total number of inbound events dispatched
    pub frames_received: Counter<u64>,
    /// Total number of outbound payloads
    pub frames_sent: Counter<u64>,
    /// Total number of malformed inbound frames
    pub decode_errors: Counter<u64>,
    /// Total number of failed handler invocations
    pub handler_failures: Counter<u64>,
}

impl ClientMetrics {
    /// Create a new ClientMetrics instance
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create a new ClientMetrics instance with a custom meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("threadlink.client.connection.state")
                .with_description("Connection state (1=connecting, 2=open, 3=retry wait, 4=closed)")
                .build(),
            connect_attempts: meter
                .u64_counter("threadlink.client.connect.attempts")
                .with_description("Total number of connection attempts")
                .build(),
            connections_opened: meter
                .u64_counter("threadlink.client.connections.opened")
                .with_description("Total number of successful opens")
                .build(),
            reconnects_scheduled: meter
                .u64_counter("threadlink.client.reconnects.scheduled")
                .with_description("Total number of reconnects scheduled after a transport ended")
                .build(),
            frames_received: meter
                .u64_counter("threadlink.client.frames.received")
                .with_description("Total number of inbound events dispatched")
                .build(),
            frames_sent: meter
                .u64_counter("threadlink.client.frames.sent")
                .with_description("Total number of outbound payloads")
                .build(),
            decode_errors: meter
                .u64_counter("threadlink.client.decode.errors")
                .with_description("Total number of malformed inbound frames")
                .build(),
            handler_failures: meter
                .u64_counter("threadlink.client.handler.failures")
                .with_description("Total number of handler invocations that failed")
                .build(),
        }
    }

    /// Update connection state
    pub fn update_connection_state(&self, state: ConnectionState) {
        self.connection_state.record(state.as_gauge(), &[]);
    }

    /// Record a connection attempt
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.add(1, &[]);
    }

    /// Record a successful open
    pub fn record_open(&self) {
        self.connections_opened.add(1, &[]);
    }

    /// Record a scheduled reconnect
    pub fn record_reconnect_scheduled(&self, delay: Duration) {
        let attributes = &[KeyValue::new("delay_ms", delay.as_millis() as i64)];
        self.reconnects_scheduled.add(1, attributes);
    }

    /// Record an inbound event
    pub fn record_event(&self, event: &str) {
        let attributes = &[KeyValue::new("event", event.to_string())];
        self.frames_received.add(1, attributes);
    }

    /// Record an outbound payload (`path` is `immediate`, `deferred` or `flushed`)
    pub fn record_send(&self, path: &'static str) {
        let attributes = &[KeyValue::new("path", path)];
        self.frames_sent.add(1, attributes);
    }

    /// Record a malformed inbound frame
    pub fn record_decode_error(&self) {
        self.decode_errors.add(1, &[]);
    }

    /// Record failed handler invocations for an event
    pub fn record_handler_failures(&self, event: &str, count: usize) {
        let attributes = &[KeyValue::new("event", event.to_string())];
        self.handler_failures.add(count as u64, attributes);
    }
}
