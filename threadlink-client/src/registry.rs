//! Event registry shared by thread connections
//!
//! Maps a logical event name (`"open"`, `"close"`, `"message_new"`, any name
//! the server sends) to an ordered list of subscriber callbacks. A single
//! registry is owned by a `ThreadClient` and every connection created by that
//! client publishes into it, so one set of handlers observes all threads.
//!
//! # Dispatch Rules
//!
//! - Handlers run in registration order.
//! - A handler that returns an error or panics is logged and skipped; the
//!   remaining handlers still run and `emit` itself never fails.
//! - Emitting an event nobody subscribed to does nothing.
//!
//! # Re-entrancy
//!
//! Handlers run without any registry lock held, so they may subscribe,
//! unsubscribe, send or close from inside a callback. `emit` walks a snapshot
//! of the subscriber list: a handler added during an emit first runs on the
//! next emit, while a handler removed during an emit is skipped immediately.
//!
//! # Examples
//!
//! ```rust
//! use threadlink_client::EventRegistry;
//! use serde_json::json;
//!
//! let registry = EventRegistry::new();
//! let sub = registry.on("message_new", |payload| {
//!     println!("new message: {}", payload);
//! });
//!
//! registry.emit("message_new", &json!({"body": "hi"}));
//! sub.unsubscribe();
//! assert_eq!(registry.handler_count("message_new"), 0);
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use threadlink_core::Error;

/// Type for event handler functions
pub type HandlerFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// What a subscriber closure may return
///
/// Implemented for `()` (infallible handlers) and for `Result<(), E>` where
/// the error can be displayed.
pub trait HandlerOutcome {
    /// Collapse into the registry's internal result
    fn into_outcome(self) -> Result<(), String>;
}

impl HandlerOutcome for () {
    fn into_outcome(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: fmt::Display> HandlerOutcome for Result<(), E> {
    fn into_outcome(self) -> Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

struct Entry {
    id: u64,
    handler: HandlerFn,
    active: AtomicBool,
}

struct Inner {
    handlers: Mutex<HashMap<String, Vec<Arc<Entry>>>>,
    next_id: AtomicU64,
}

impl Inner {
    fn handlers(&self) -> MutexGuard<'_, HashMap<String, Vec<Arc<Entry>>>> {
        // Handlers never run under this lock
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of a single `emit`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOutcome {
    /// Handlers that ran to completion
    pub delivered: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

/// Registry of event subscribers
#[derive(Clone)]
pub struct EventRegistry {
    inner: Arc<Inner>,
}

impl EventRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a handler for an event
    ///
    /// Registering the same closure twice yields two independent
    /// subscriptions, each invoked once per emit.
    pub fn on<F, R>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Value) -> R + Send + Sync + 'static,
        R: HandlerOutcome,
    {
        let event = event.into();
        let entry = Arc::new(Entry {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            handler: Arc::new(move |payload: &Value| handler(payload).into_outcome()),
            active: AtomicBool::new(true),
        });

        self.inner
            .handlers()
            .entry(event.clone())
            .or_default()
            .push(Arc::clone(&entry));

        tracing::trace!(event = %event, id = entry.id, "Handler registered");

        Subscription {
            registry: Arc::downgrade(&self.inner),
            event,
            entry,
        }
    }

    /// Invoke every handler registered for `event` with `payload`
    pub fn emit(&self, event: &str, payload: &Value) -> EmitOutcome {
        let snapshot = match self.inner.handlers().get(event) {
            Some(entries) => entries.clone(),
            None => return EmitOutcome::default(),
        };

        let mut outcome = EmitOutcome::default();
        for entry in snapshot {
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }

            let reason = match catch_unwind(AssertUnwindSafe(|| (entry.handler)(payload))) {
                Ok(Ok(())) => {
                    outcome.delivered += 1;
                    continue;
                }
                Ok(Err(reason)) => reason,
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };

            outcome.failed += 1;
            let error = Error::Handler {
                event: event.to_string(),
                reason,
            };
            tracing::error!(event = %event, handler = entry.id, error = %error, "Event handler failed");
        }

        outcome
    }

    /// Number of live handlers for an event
    pub fn handler_count(&self, event: &str) -> usize {
        self.inner.handlers().get(event).map_or(0, Vec::len)
    }

    /// Event names that currently have at least one handler
    pub fn events(&self) -> Vec<String> {
        self.inner.handlers().keys().cloned().collect()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.events())
            .finish()
    }
}

/// Handle returned by [`EventRegistry::on`]
///
/// Dropping a `Subscription` does not unsubscribe; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove the handler.
pub struct Subscription {
    registry: Weak<Inner>,
    event: String,
    entry: Arc<Entry>,
}

impl Subscription {
    /// Remove exactly this handler; later calls are no-ops
    pub fn unsubscribe(&self) {
        if !self.entry.active.swap(false, Ordering::AcqRel) {
            return;
        }

        let Some(inner) = self.registry.upgrade() else {
            return;
        };

        let mut handlers = inner.handlers();
        if let Some(entries) = handlers.get_mut(&self.event) {
            entries.retain(|e| e.id != self.entry.id);
            if entries.is_empty() {
                handlers.remove(&self.event);
            }
        }

        tracing::trace!(event = %self.event, id = self.entry.id, "Handler removed");
    }

    /// Event this subscription listens to
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether the handler is still registered
    pub fn is_active(&self) -> bool {
        self.entry.active.load(Ordering::Acquire) && self.registry.strong_count() > 0
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("active", &self.is_active())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
