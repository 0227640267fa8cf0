//! Transport abstraction
//!
//! A `Transport` is one established bidirectional frame channel: a sink for
//! outbound frames and a stream of inbound frames. A `Connector` creates a
//! fresh transport for every connection attempt. The production connector
//! dials a WebSocket with `tokio-tungstenite`; tests plug in scripted
//! in-memory transports.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, StreamExt};
use std::pin::Pin;
use threadlink_core::{Error, Result};
use tokio_tungstenite::connect_async;

pub use tokio_tungstenite::tungstenite::Message;

/// Outbound half of a transport
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = Error> + Send>>;

/// Inbound half of a transport
pub type FrameStream = BoxStream<'static, Result<Message>>;

/// An established transport
pub struct Transport {
    /// Outbound frames
    pub sink: FrameSink,
    /// Inbound frames; the transport has ended when this yields `None`
    pub stream: FrameStream,
}

impl Transport {
    /// Assemble a transport from its halves
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Factory for transports
pub trait Connector: Send + Sync {
    /// Establish a new transport to `url`
    ///
    /// The returned future may be dropped before it settles when the
    /// connection is closed mid-attempt.
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Transport>>;
}

/// Connector that dials WebSockets
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Transport>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws_stream, _) = connect_async(url.as_str())
                .await
                .map_err(|e| Error::Connect(e.to_string()))?;

            let (sink, stream) = ws_stream.split();
            let sink = sink.sink_map_err(|e| Error::WebSocket(e.to_string()));
            let stream = stream.map(|frame| frame.map_err(|e| Error::WebSocket(e.to_string())));

            Ok::<_, Error>(Transport::new(Box::pin(sink), stream.boxed()))
        })
    }
}
