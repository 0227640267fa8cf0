//! Thread endpoint addressing
//!
//! Every conversation thread lives at its own WebSocket path on the host the
//! application was served from:
//!
//! ```text
//! {scheme}://{host}/ws/threads/{thread_id}/
//! ```
//!
//! `scheme` is `wss` when the origin was reached securely and `ws` otherwise.
//!
//! # Examples
//!
//! ```rust
//! use threadlink_core::Origin;
//!
//! let origin = Origin::parse("https://chat.example.com/inbox").unwrap();
//! assert_eq!(
//!     origin.thread_url(42).unwrap(),
//!     "wss://chat.example.com/ws/threads/42/"
//! );
//! ```

use crate::error::{Error, Result};
use std::fmt;

/// The network origin thread connections are made against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    secure: bool,
    host: String,
}

impl Origin {
    /// Create an origin from a host (`name` or `name:port`) and a security flag
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            secure,
            host: host.into(),
        }
    }

    /// Origin reached over TLS
    pub fn secure(host: impl Into<String>) -> Self {
        Self::new(host, true)
    }

    /// Origin reached in plain text
    pub fn insecure(host: impl Into<String>) -> Self {
        Self::new(host, false)
    }

    /// Parse a page origin such as `https://example.com` or `ws://127.0.0.1:8000`
    ///
    /// Anything after the host (path, query, fragment) is ignored.
    pub fn parse(origin: &str) -> Result<Self> {
        let (scheme, rest) = origin
            .split_once("://")
            .ok_or_else(|| Error::InvalidEndpoint(format!("missing scheme in '{}'", origin)))?;

        let secure = match scheme.to_ascii_lowercase().as_str() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(Error::InvalidEndpoint(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        };

        let host = rest
            .split(|c: char| c == '/' || c == '?' || c == '#')
            .next()
            .unwrap_or_default();
        if host.is_empty() {
            return Err(Error::InvalidEndpoint(format!("missing host in '{}'", origin)));
        }

        Ok(Self::new(host, secure))
    }

    /// Whether connections use `wss`
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Host, including the port when one was given
    pub fn host(&self) -> &str {
        &self.host
    }

    /// WebSocket scheme for this origin
    pub fn ws_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// Build the WebSocket URL of a thread
    ///
    /// Thread identifiers are path segments, so they may not be empty or
    /// contain `/`, `?` or `#`.
    pub fn thread_url(&self, thread_id: impl fmt::Display) -> Result<String> {
        let thread_id = thread_id.to_string();
        if thread_id.is_empty() || thread_id.contains(|c: char| matches!(c, '/' | '?' | '#')) {
            return Err(Error::InvalidEndpoint(format!(
                "invalid thread id '{}'",
                thread_id
            )));
        }

        Ok(format!(
            "{}://{}/ws/threads/{}/",
            self.ws_scheme(),
            self.host,
            thread_id
        ))
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::insecure("localhost:8000")
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "https" } else { "http" };
        write!(f, "{}://{}", scheme, self.host)
    }
}
