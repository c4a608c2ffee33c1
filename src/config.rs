//! Server configuration and its defaults.

use std::time::Duration;

/// How long `start` waits for the transport to become ready.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the bounded inbound request buffer.
pub const DEFAULT_INBOUND_CAPACITY: usize = 500;

/// Server-level configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Service name the server listens under. Immutable once the server is built.
    pub name: String,
    /// Free-form description, for operators.
    pub description: String,
    /// Upper bound on waiting for transport readiness, at start and on reconnect.
    pub connect_timeout: Duration,
    /// Requests the transport may buffer before the worker picks them up.
    pub inbound_capacity: usize,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }
}
