//! Connection state management
//!
//! This module tracks one thread connection's lifecycle and owns the pieces
//! of state that callers and the connection driver both touch: the current
//! state, the `tries` counter, the outbound channel of the live transport,
//! and the queue of deferred sends.
//!
//! # Connection States
//!
//! - **Connecting**: Establishing a transport
//! - **Open**: Transport established; sends go straight out
//! - **RetryWait**: Transport ended or failed; waiting out the backoff delay
//! - **Closed**: Closed by the caller (or the strategy gave up); terminal
//!
//! # State Transitions
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            ▼                              │
//!       Connecting ──► Open ──► RetryWait ──┘
//!            │          │          │
//!            └──────────┴──────────┴──► Closed
//! ```
//!
//! All methods are synchronous and hold the internal lock only for the
//! duration of the bookkeeping, never across an `.await` or an event emit.

use crate::reconnect::ReconnectionStrategy;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting to establish a transport
    Connecting,
    /// Transport established
    Open,
    /// Waiting before reconnect attempt number `attempt`
    RetryWait {
        /// Value of `tries` the delay was computed from
        attempt: u32,
    },
    /// Closed for good
    Closed,
}

impl ConnectionState {
    /// Whether sends go out immediately
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Whether the connection has terminated
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    /// Numeric encoding used by the connection state gauge
    pub(crate) fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Connecting => 1,
            ConnectionState::Open => 2,
            ConnectionState::RetryWait { .. } => 3,
            ConnectionState::Closed => 4,
        }
    }
}

/// What happened to a payload handed to [`ConnectionManager::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Submission {
    /// Queued on the live transport
    Sent,
    /// Held until the next open
    Deferred,
    /// The connection is closed
    Dropped,
}

/// Decision taken after a transport ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retry {
    /// Reconnect after this delay
    After(Duration),
    /// The connection was closed meanwhile
    Closed,
    /// The strategy refused another attempt; the connection is now closed
    GaveUp,
}

struct Lifecycle {
    state: ConnectionState,
    tries: u32,
    outbound: Option<mpsc::UnboundedSender<String>>,
    pending: VecDeque<String>,
}

/// Manages connection state and reconnection bookkeeping
pub(crate) struct ConnectionManager {
    url: String,
    strategy: Arc<dyn ReconnectionStrategy>,
    lifecycle: Mutex<Lifecycle>,
}

impl ConnectionManager {
    /// Create a manager in the `Connecting` state
    pub(crate) fn new(url: String, strategy: Arc<dyn ReconnectionStrategy>) -> Self {
        Self {
            url,
            strategy,
            lifecycle: Mutex::new(Lifecycle {
                state: ConnectionState::Connecting,
                tries: 0,
                outbound: None,
                pending: VecDeque::new(),
            }),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.lifecycle().state
    }

    pub(crate) fn tries(&self) -> u32 {
        self.lifecycle().tries
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.lifecycle().pending.len()
    }

    /// Enter `Connecting`; false if the connection is closed
    pub(crate) fn connecting(&self) -> bool {
        let mut lc = self.lifecycle();
        if lc.state.is_closed() {
            return false;
        }
        lc.state = ConnectionState::Connecting;
        true
    }

    /// Enter `Open` with the live transport's outbound channel
    ///
    /// Resets `tries` and hands back every deferred payload, oldest first.
    /// Returns `None` if the connection was closed while connecting.
    pub(crate) fn opened(&self, outbound: mpsc::UnboundedSender<String>) -> Option<Vec<String>> {
        let mut lc = self.lifecycle();
        if lc.state.is_closed() {
            return None;
        }
        lc.state = ConnectionState::Open;
        lc.tries = 0;
        lc.outbound = Some(outbound);
        Some(lc.pending.drain(..).collect())
    }

    /// The live transport is gone
    pub(crate) fn ended(&self) {
        self.lifecycle().outbound = None;
    }

    /// Count the failure and pick the reconnect delay
    pub(crate) fn schedule_retry(&self) -> Retry {
        let mut lc = self.lifecycle();
        if lc.state.is_closed() {
            return Retry::Closed;
        }

        lc.tries = lc.tries.saturating_add(1);
        match self.strategy.next_delay(lc.tries) {
            Some(delay) => {
                lc.state = ConnectionState::RetryWait { attempt: lc.tries };
                Retry::After(delay)
            }
            None => {
                lc.state = ConnectionState::Closed;
                lc.pending.clear();
                Retry::GaveUp
            }
        }
    }

    /// Transmit now if open, otherwise defer until the next open
    pub(crate) fn submit(&self, frame: String) -> Submission {
        let mut lc = self.lifecycle();
        match lc.state {
            ConnectionState::Closed => Submission::Dropped,
            ConnectionState::Open => {
                // A transport that stopped reading is no longer ready
                let frame = match lc.outbound.as_ref() {
                    Some(tx) => match tx.send(frame) {
                        Ok(()) => return Submission::Sent,
                        Err(mpsc::error::SendError(frame)) => frame,
                    },
                    None => frame,
                };
                lc.pending.push_back(frame);
                Submission::Deferred
            }
            _ => {
                lc.pending.push_back(frame);
                Submission::Deferred
            }
        }
    }

    /// Enter `Closed`; returns false if it already was
    pub(crate) fn close(&self) -> bool {
        let mut lc = self.lifecycle();
        if lc.state.is_closed() {
            return false;
        }
        lc.state = ConnectionState::Closed;
        lc.outbound = None;
        lc.pending.clear();
        true
    }
}
