//! Thread connection handle and its driver task
//!
//! `ThreadClient::connect` spawns one driver task per handle. The driver owns
//! the transport and performs every transition, emission and transmission for
//! that connection, so a handle's events reach subscribers in transport order
//! and its sends leave in call order. Callers talk to it through the
//! synchronous methods on [`ConnectionHandle`].
//!
//! # Lifecycle
//!
//! 1. **Connect**: ask the connector for a transport
//! 2. **Open**: reset `tries`, emit `"open"`, flush deferred sends
//! 3. **Read**: dispatch inbound frames until the transport ends
//! 4. **Retry**: emit `"close"`, wait out the backoff, go back to 1
//!
//! `close()` cancels the handle's token; the driver observes it while
//! connecting, reading and waiting, so no transport is created afterwards.

use crate::connection_state::{ConnectionManager, ConnectionState, Retry, Submission};
use crate::metrics::ClientMetrics;
use crate::reconnect::ReconnectionStrategy;
use crate::registry::EventRegistry;
use crate::transport::{Connector, Message, Transport};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use threadlink_core::frame::{CLOSE, OPEN};
use threadlink_core::{codec, Result, ThreadAction};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_util::sync::CancellationToken;

/// Everything a connection shares with the client that created it
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub(crate) registry: EventRegistry,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) strategy: Arc<dyn ReconnectionStrategy>,
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
}

/// A live connection to one thread
///
/// Dropping the handle closes the connection.
#[must_use = "dropping the handle closes the connection"]
pub struct ConnectionHandle {
    thread_id: String,
    manager: Arc<ConnectionManager>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl ConnectionHandle {
    /// Start connecting to `url`; must be called within a Tokio runtime
    pub(crate) fn spawn(thread_id: String, url: String, ctx: &ConnectionContext) -> Self {
        let manager = Arc::new(ConnectionManager::new(url, ctx.strategy.clone()));
        let cancel = CancellationToken::new();

        let driver = Driver {
            thread_id: thread_id.clone(),
            manager: manager.clone(),
            registry: ctx.registry.clone(),
            connector: ctx.connector.clone(),
            cancel: cancel.clone(),
            metrics: ctx.metrics.clone(),
        };

        tracing::info!(thread = %thread_id, url = %manager.url(), "Connecting to thread");
        let task = tokio::spawn(driver.run());

        Self {
            thread_id,
            manager,
            cancel,
            task,
            metrics: ctx.metrics.clone(),
        }
    }

    /// Thread this handle is connected to
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// WebSocket address of the thread
    pub fn url(&self) -> &str {
        self.manager.url()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Consecutive failed or ended attempts since the last open
    pub fn tries(&self) -> u32 {
        self.manager.tries()
    }

    /// Check if the connection is open
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Payloads waiting for the next open
    pub fn pending_sends(&self) -> usize {
        self.manager.pending_len()
    }

    /// Send a JSON payload to the thread
    ///
    /// When the connection is open the payload goes out right away;
    /// otherwise it is transmitted once, right after the next `"open"`.
    /// After [`close`](Self::close) this does nothing.
    ///
    /// # Errors
    ///
    /// Only [`Error::Serialization`](threadlink_core::Error::Serialization)
    /// when `payload` cannot be encoded. Transport faults are never returned.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let frame = codec::encode(payload)?;

        match self.manager.submit(frame) {
            Submission::Sent => {
                tracing::debug!(thread = %self.thread_id, "Payload queued for transmission");
                if let Some(ref m) = self.metrics {
                    m.record_send("immediate");
                }
            }
            Submission::Deferred => {
                tracing::debug!(
                    thread = %self.thread_id,
                    pending = self.manager.pending_len(),
                    "Connection not open, deferring payload"
                );
                if let Some(ref m) = self.metrics {
                    m.record_send("deferred");
                }
            }
            Submission::Dropped => {
                tracing::debug!(thread = %self.thread_id, "Connection closed, payload dropped");
            }
        }

        Ok(())
    }

    /// Post a message to the thread
    ///
    /// # Errors
    ///
    /// `Error::InvalidMessage` when the trimmed body is empty or longer than
    /// 5000 characters.
    pub fn send_message(&self, body: impl AsRef<str>) -> Result<()> {
        self.send(&ThreadAction::send(body)?)
    }

    /// Mark a message as seen
    pub fn mark_seen(&self, message_id: i64) -> Result<()> {
        self.send(&ThreadAction::seen(message_id))
    }

    /// Close the connection for good
    ///
    /// Cancels a pending retry, abandons an in-flight connect attempt and
    /// asks the live transport to terminate. Idempotent.
    pub fn close(&self) {
        if self.manager.close() {
            tracing::info!(thread = %self.thread_id, "Closing connection");
            if let Some(ref m) = self.metrics {
                m.update_connection_state(ConnectionState::Closed);
            }
        }
        self.cancel.cancel();
    }

    /// Check if the driver task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("thread_id", &self.thread_id)
            .field("url", &self.manager.url())
            .field("state", &self.state())
            .finish()
    }
}

/// How a transport stopped
enum Ended {
    /// The handle was closed
    Cancelled,
    /// The transport went away; carries the `"close"` payload
    Lost(Value),
}

struct Driver {
    thread_id: String,
    manager: Arc<ConnectionManager>,
    registry: EventRegistry,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Driver {
    async fn run(self) {
        loop {
            if !self.manager.connecting() {
                break;
            }
            self.record_state();
            if let Some(ref m) = self.metrics {
                m.record_connect_attempt();
            }

            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect(self.manager.url()) => result,
            };

            let ended = match attempt {
                Ok(transport) => self.drive(transport).await,
                Err(e) => {
                    tracing::warn!(thread = %self.thread_id, error = %e, "Connection attempt failed");
                    Ended::Lost(close_payload(None, ""))
                }
            };
            self.manager.ended();

            let payload = match ended {
                Ended::Cancelled => break,
                Ended::Lost(payload) => payload,
            };
            if self.manager.state().is_closed() {
                break;
            }
            self.emit(CLOSE, &payload);

            let delay = match self.manager.schedule_retry() {
                Retry::After(delay) => delay,
                Retry::Closed => break,
                Retry::GaveUp => {
                    tracing::error!(
                        thread = %self.thread_id,
                        tries = self.manager.tries(),
                        "Reconnection abandoned (strategy gave up)"
                    );
                    self.record_state();
                    break;
                }
            };

            tracing::info!(
                thread = %self.thread_id,
                attempt = self.manager.tries(),
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            self.record_state();
            if let Some(ref m) = self.metrics {
                m.record_reconnect_scheduled(delay);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!(thread = %self.thread_id, "Connection driver stopped");
    }

    /// Run one transport from open until it ends
    async fn drive(&self, transport: Transport) -> Ended {
        let Transport {
            mut sink,
            mut stream,
        } = transport;
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let Some(deferred) = self.manager.opened(tx) else {
            let _ = sink.close().await;
            return Ended::Cancelled;
        };

        tracing::info!(thread = %self.thread_id, "Connection open");
        self.record_state();
        if let Some(ref m) = self.metrics {
            m.record_open();
        }
        self.emit(OPEN, &Value::Null);

        for frame in deferred {
            // An "open" handler may have closed the handle
            if self.cancel.is_cancelled() {
                break;
            }
            match sink.send(Message::Text(frame)).await {
                Ok(()) => {
                    if let Some(ref m) = self.metrics {
                        m.record_send("flushed");
                    }
                }
                Err(e) => {
                    tracing::warn!(thread = %self.thread_id, error = %e, "Failed to transmit deferred payload");
                }
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    if let Err(e) = sink.close().await {
                        tracing::debug!(thread = %self.thread_id, error = %e, "Error while terminating transport");
                    }
                    return Ended::Cancelled;
                }
                Some(frame) = rx.recv() => {
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        tracing::warn!(thread = %self.thread_id, error = %e, "Failed to transmit payload");
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.dispatch(codec::decode(&text)),
                    Some(Ok(Message::Binary(bytes))) => self.dispatch(codec::decode_bytes(&bytes)),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(thread = %self.thread_id, "Connection closed by server");
                        return Ended::Lost(peer_close_payload(frame));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(thread = %self.thread_id, error = %e, "WebSocket error");
                        return Ended::Lost(close_payload(None, &e.to_string()));
                    }
                    None => {
                        tracing::info!(thread = %self.thread_id, "Connection closed");
                        return Ended::Lost(close_payload(None, ""));
                    }
                },
            }
        }
    }

    fn dispatch(&self, decoded: Result<threadlink_core::InboundFrame>) {
        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(thread = %self.thread_id, error = %e, "Dropping malformed frame");
                if let Some(ref m) = self.metrics {
                    m.record_decode_error();
                }
                return;
            }
        };

        let emissions = frame.emissions();
        if emissions.is_empty() {
            tracing::debug!(thread = %self.thread_id, "Ignoring frame without event name");
            return;
        }

        tracing::debug!(thread = %self.thread_id, event = ?frame.event_name(), "Frame received");
        for (event, payload) in emissions {
            if let Some(ref m) = self.metrics {
                m.record_event(&event);
            }
            self.emit(&event, &payload);
        }
    }

    fn emit(&self, event: &str, payload: &Value) {
        let outcome = self.registry.emit(event, payload);
        if outcome.failed > 0 {
            if let Some(ref m) = self.metrics {
                m.record_handler_failures(event, outcome.failed);
            }
        }
    }

    fn record_state(&self) {
        if let Some(ref m) = self.metrics {
            m.update_connection_state(self.manager.state());
        }
    }
}

fn close_payload(code: Option<u16>, reason: &str) -> Value {
    json!({ "code": code, "reason": reason })
}

fn peer_close_payload(frame: Option<CloseFrame<'_>>) -> Value {
    match frame {
        Some(frame) => close_payload(Some(u16::from(frame.code)), &frame.reason),
        None => close_payload(None, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::{ExponentialBackoff, FixedDelay};
    use crate::transport::testing::{pair, Peer, ScriptedConnector, Step};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    const URL: &str = "ws://localhost:8000/ws/threads/42/";

    fn context(connector: Arc<ScriptedConnector>) -> ConnectionContext {
        ConnectionContext {
            registry: EventRegistry::new(),
            connector,
            strategy: Arc::new(ExponentialBackoff::default()),
            metrics: None,
        }
    }

    fn spawn(ctx: &ConnectionContext) -> ConnectionHandle {
        ConnectionHandle::spawn("42".to_string(), URL.to_string(), ctx)
    }

    /// Forward every payload of `event` into a channel
    fn watch(registry: &EventRegistry, event: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.on(event, move |payload: &Value| {
            let _ = tx.send(payload.clone());
        });
        rx
    }

    async fn next_text(peer: &mut Peer) -> Option<String> {
        match peer.outbound.next().await {
            Some(Message::Text(text)) => Some(text),
            Some(other) => panic!("unexpected frame: {:?}", other),
            None => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_double_between_failed_attempts() {
        let steps = (0..5).map(|_| Step::Fail).collect();
        let (connector, mut attempts) = ScriptedConnector::new(steps);
        let handle = spawn(&context(connector));

        let mut times = Vec::new();
        for _ in 0..6 {
            times.push(attempts.recv().await.unwrap());
        }
        let gaps: Vec<u128> = times.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();

        assert_eq!(gaps, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(handle.tries(), 5);
        assert_eq!(handle.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let steps = (0..8).map(|_| Step::Fail).collect();
        let (connector, mut attempts) = ScriptedConnector::new(steps);
        let _handle = spawn(&context(connector));

        let mut times = Vec::new();
        for _ in 0..9 {
            times.push(attempts.recv().await.unwrap());
        }

        assert_eq!((times[6] - times[5]).as_millis(), 30_000);
        assert_eq!((times[8] - times[7]).as_millis(), 30_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_resets_backoff() {
        let (transport, peer) = pair();
        let steps = vec![Step::Fail, Step::Fail, Step::Open(transport), Step::Fail];
        let (connector, mut attempts) = ScriptedConnector::new(steps);
        let ctx = context(connector);
        let mut opens = watch(&ctx.registry, OPEN);
        let handle = spawn(&ctx);

        for _ in 0..3 {
            attempts.recv().await.unwrap();
        }
        opens.recv().await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Open);
        assert_eq!(handle.tries(), 0);

        let lost_at = Instant::now();
        drop(peer);

        let retried_at = attempts.recv().await.unwrap();
        assert_eq!((retried_at - lost_at).as_millis(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_and_close_events() {
        let (transport, peer) = pair();
        let (connector, _attempts) = ScriptedConnector::new(vec![Step::Open(transport)]);
        let ctx = context(connector);
        let mut opens = watch(&ctx.registry, OPEN);
        let mut closes = watch(&ctx.registry, CLOSE);
        let handle = spawn(&ctx);

        assert_eq!(opens.recv().await.unwrap(), Value::Null);

        peer.inbound
            .unbounded_send(Ok(Message::Close(Some(CloseFrame {
                code: CloseCode::from(4003),
                reason: "forbidden".into(),
            }))))
            .unwrap();

        assert_eq!(closes.recv().await.unwrap(), json!({"code": 4003, "reason": "forbidden"}));
        assert_eq!(handle.state(), ConnectionState::RetryWait { attempt: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_emits_close() {
        let (connector, _attempts) = ScriptedConnector::new(vec![Step::Fail]);
        let ctx = context(connector);
        let mut closes = watch(&ctx.registry, CLOSE);
        let _handle = spawn(&ctx);

        assert_eq!(closes.recv().await.unwrap(), json!({"code": null, "reason": ""}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_open_transmits_once() {
        let (transport, mut peer) = pair();
        let (connector, _attempts) = ScriptedConnector::new(vec![Step::Open(transport)]);
        let ctx = context(connector);
        let mut opens = watch(&ctx.registry, OPEN);
        let handle = spawn(&ctx);
        opens.recv().await.unwrap();

        handle.send(&json!({"action": "typing"})).unwrap();
        assert_eq!(next_text(&mut peer).await.unwrap(), r#"{"action":"typing"}"#);

        handle.close();
        assert_eq!(next_text(&mut peer).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_keep_call_order() {
        let (transport, mut peer) = pair();
        let (connector, _attempts) = ScriptedConnector::new(vec![Step::Open(transport)]);
        let ctx = context(connector);
        let mut opens = watch(&ctx.registry, OPEN);
        let handle = spawn(&ctx);
        opens.recv().await.unwrap();

        for n in 0..5 {
            handle.send(&json!({ "n": n })).unwrap();
        }
        for n in 0..5 {
            assert_eq!(next_text(&mut peer).await.unwrap(), format!(r#"{{"n":{}}}"#, n));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_send_follows_next_open() {
        let (transport, mut peer) = pair();
        let steps = vec![Step::Fail, Step::Open(transport)];
        let (connector, mut attempts) = ScriptedConnector::new(steps);
        let ctx = context(connector);

        let log = Arc::new(Mutex::new(Vec::new()));
        let open_log = log.clone();
        ctx.registry.on(OPEN, move |_: &Value| {
            open_log.lock().unwrap().push("open");
        });

        let handle = spawn(&ctx);
        attempts.recv().await.unwrap();
        handle.send_message("  hello  ").unwrap();
        handle.mark_seen(7).unwrap();
        assert_eq!(handle.pending_sends(), 2);

        assert_eq!(
            next_text(&mut peer).await.unwrap(),
            r#"{"action":"send","body":"hello"}"#
        );
        assert_eq!(*log.lock().unwrap(), vec!["open"]);
        assert_eq!(
            next_text(&mut peer).await.unwrap(),
            r#"{"action":"seen","message_id":7}"#
        );
        assert_eq!(handle.pending_sends(), 0);

        handle.close();
        assert_eq!(next_text(&mut peer).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_send_not_repeated_on_later_opens() {
        let (first, mut first_peer) = pair();
        let (second, mut second_peer) = pair();
        let steps = vec![Step::Fail, Step::Open(first), Step::Open(second)];
        let (connector, mut attempts) = ScriptedConnector::new(steps);
        let ctx = context(connector);
        let mut opens = watch(&ctx.registry, OPEN);
        let handle = spawn(&ctx);

        attempts.recv().await.unwrap();
        handle.send(&json!("once")).unwrap();

        opens.recv().await.unwrap();
        assert_eq!(next_text(&mut first_peer).await.unwrap(), r#""once""#);

        first_peer.inbound.close_channel();
        opens.recv().await.unwrap();

        handle.close();
        assert_eq!(next_text(&mut second_peer).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_handler_during_open_goes_after_deferred() {
        let (transport, mut peer) = pair();
        let steps = vec![Step::Fail, Step::Open(transport)];
        let (connector, mut attempts) = ScriptedConnector::new(steps);
        let ctx = context(connector);
        let handle = Arc::new(spawn(&ctx));

        let weak = Arc::downgrade(&handle);
        ctx.registry.on(OPEN, move |_: &Value| {
            if let Some(handle) = weak.upgrade() {
                handle.send(&json!("hello from open")).unwrap();
            }
        });

        attempts.recv().await.unwrap();
        handle.send(&json!("queued")).unwrap();

        assert_eq!(next_text(&mut peer).await.unwrap(), r#""queued""#);
        assert_eq!(next_text(&mut peer).await.unwrap(), r#""hello from open""#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_from_open_handler_discards_deferred() {
        let (transport, mut peer) = pair();
        let steps = vec![Step::Fail, Step::Open(transport)];
        let (connector, mut attempts) = ScriptedConnector::new(steps);
        let ctx = context(connector);
        let mut closes = watch(&ctx.registry, CLOSE);
        let handle = Arc::new(spawn(&ctx));

        let weak = Arc::downgrade(&handle);
        ctx.registry.on(OPEN, move |_: &Value| {
            if let Some(handle) = weak.upgrade() {
                handle.close();
            }
        });

        attempts.recv().await.unwrap();
        closes.recv().await.unwrap();
        handle.send(&json!("queued")).unwrap();
        assert_eq!(handle.pending_sends(), 1);

        assert_eq!(next_text(&mut peer).await, None);
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert_eq!(handle.pending_sends(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(handle.is_finished());
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_retry_wait() {
        let (transport, _peer) = pair();
        let steps = vec![Step::Fail, Step::Open(transport)];
        let (connector, mut attempts) = ScriptedConnector::new(steps);
        let ctx = context(connector);
        let mut opens = watch(&ctx.registry, OPEN);
        let handle = spawn(&ctx);

        attempts.recv().await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(handle.state(), ConnectionState::RetryWait { attempt: 1 });

        handle.close();
        handle.close();
        assert_eq!(handle.state(), ConnectionState::Closed);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(attempts.try_recv().is_err());
        assert!(opens.try_recv().is_err());
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_connecting() {
        let (connector, mut attempts) = ScriptedConnector::new(vec![Step::Hang]);
        let ctx = context(connector);
        let mut closes = watch(&ctx.registry, CLOSE);
        let handle = spawn(&ctx);

        attempts.recv().await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Connecting);

        handle.close();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(handle.is_finished());
        assert!(attempts.try_recv().is_err());
        assert!(closes.try_recv().is_err());
        assert_eq!(handle.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_open_terminates_transport() {
        let (transport, mut peer) = pair();
        let (connector, mut attempts) = ScriptedConnector::new(vec![Step::Open(transport)]);
        let ctx = context(connector);
        let mut opens = watch(&ctx.registry, OPEN);
        let mut closes = watch(&ctx.registry, CLOSE);
        let handle = spawn(&ctx);

        attempts.recv().await.unwrap();
        opens.recv().await.unwrap();

        handle.close();
        assert_eq!(next_text(&mut peer).await, None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(handle.is_finished());
        assert!(attempts.try_recv().is_err());
        assert!(closes.try_recv().is_err());

        handle.send(&json!("ignored")).unwrap();
        assert_eq!(handle.pending_sends(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_closes() {
        let (connector, mut attempts) = ScriptedConnector::new(vec![Step::Fail]);
        let handle = spawn(&context(connector));

        attempts.recv().await.unwrap();
        drop(handle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_giving_up_closes_handle() {
        let steps = (0..3).map(|_| Step::Fail).collect();
        let (connector, mut attempts) = ScriptedConnector::new(steps);
        let mut ctx = context(connector);
        ctx.strategy = Arc::new(FixedDelay::new(Duration::from_millis(100)).with_max_attempts(2));
        let handle = spawn(&ctx);

        for _ in 0..3 {
            attempts.recv().await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(handle.is_finished());
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_new_emits_record_then_message() {
        let (transport, peer) = pair();
        let (connector, _attempts) = ScriptedConnector::new(vec![Step::Open(transport)]);
        let ctx = context(connector);
        let mut received = watch(&ctx.registry, "message_new");
        let _handle = spawn(&ctx);

        let record = json!({"event": "message_new", "message": {"id": 3, "body": "hi"}});
        peer.push_text(record.to_string());

        assert_eq!(received.recv().await.unwrap(), record);
        assert_eq!(received.recv().await.unwrap(), json!({"id": 3, "body": "hi"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_key_and_unknown_events() {
        let (transport, peer) = pair();
        let (connector, _attempts) = ScriptedConnector::new(vec![Step::Open(transport)]);
        let ctx = context(connector);
        let mut typing = watch(&ctx.registry, "typing");
        let mut deleted = watch(&ctx.registry, "message_deleted");
        let _handle = spawn(&ctx);

        peer.push_text(r#"{"type":"typing","user":"ana"}"#);
        peer.push_text(r#"{"event":"message_deleted","message_id":5}"#);

        assert_eq!(typing.recv().await.unwrap(), json!({"type": "typing", "user": "ana"}));
        assert_eq!(
            deleted.recv().await.unwrap(),
            json!({"event": "message_deleted", "message_id": 5})
        );
        assert_eq!(deleted.recv().await.unwrap(), json!({"message_id": 5}));
        assert!(typing.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_is_dropped() {
        let (transport, peer) = pair();
        let (connector, mut attempts) = ScriptedConnector::new(vec![Step::Open(transport)]);
        let ctx = context(connector);
        let mut pings = watch(&ctx.registry, "ping");
        let mut closes = watch(&ctx.registry, CLOSE);
        let handle = spawn(&ctx);
        attempts.recv().await.unwrap();

        peer.push_text("{not json");
        peer.push_text(r#"{"no_event": true}"#);
        peer.push_text(r#"{"event":"ping"}"#);

        assert_eq!(pings.recv().await.unwrap(), json!({"event": "ping"}));
        assert!(pings.try_recv().is_err());
        assert!(closes.try_recv().is_err());
        assert_eq!(handle.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_binary_frames_are_decoded() {
        let (transport, peer) = pair();
        let (connector, _attempts) = ScriptedConnector::new(vec![Step::Open(transport)]);
        let ctx = context(connector);
        let mut seen = watch(&ctx.registry, "message_seen");
        let _handle = spawn(&ctx);

        peer.inbound
            .unbounded_send(Ok(Message::Binary(
                br#"{"event":"message_seen","message_id":11}"#.to_vec(),
            )))
            .unwrap();

        seen.recv().await.unwrap();
        assert_eq!(seen.recv().await.unwrap(), json!({"message_id": 11}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_handler_does_not_disturb_connection() {
        let (transport, peer) = pair();
        let (connector, _attempts) = ScriptedConnector::new(vec![Step::Open(transport)]);
        let ctx = context(connector);
        ctx.registry.on("ping", |_: &Value| -> () { panic!("subscriber bug") });
        let mut pings = watch(&ctx.registry, "ping");
        let handle = spawn(&ctx);

        peer.push_text(r#"{"event":"ping","n":1}"#);
        peer.push_text(r#"{"event":"ping","n":2}"#);

        assert_eq!(pings.recv().await.unwrap()["n"], 1);
        assert_eq!(pings.recv().await.unwrap()["n"], 2);
        assert_eq!(handle.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_triggers_retry() {
        let (transport, peer) = pair();
        let (connector, mut attempts) = ScriptedConnector::new(vec![Step::Open(transport)]);
        let ctx = context(connector);
        let mut closes = watch(&ctx.registry, CLOSE);
        let _handle = spawn(&ctx);
        attempts.recv().await.unwrap();

        peer.inbound
            .unbounded_send(Err(threadlink_core::Error::WebSocket("reset".into())))
            .unwrap();

        let payload = closes.recv().await.unwrap();
        assert_eq!(payload["code"], Value::Null);
        assert_eq!(payload["reason"], "WebSocket error: reset");
        assert!(attempts.recv().await.is_some());
    }
}
