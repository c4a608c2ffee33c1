//! The transport capability the server runs on.
//!
//! The server never touches sockets or framing. It asks a [`Transport`] to
//! become ready, to deliver requests addressed to a service name into a
//! channel, and to carry each response back to whoever sent the request.
//! [`MemoryTransport`] is a complete in-process implementation, used by the
//! test suite and handy for wiring services together inside one binary.

mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::request::Request;
use crate::response::Response;

pub use memory::MemoryTransport;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Resolves once the transport can accept listeners. May never resolve;
    /// callers bound the wait themselves.
    async fn ready(&self);

    /// Starts delivering requests addressed to `service` into `inbound`.
    ///
    /// Dropping every sender for `inbound` tells the listener its channel is
    /// gone; the server then tries to listen again.
    async fn listen(&self, service: &str, inbound: mpsc::Sender<Request>) -> Result<(), TransportError>;

    /// Stops delivering to `service`. Returns whether a listener existed.
    async fn stop_listening(&self, service: &str) -> bool;

    /// Delivers `rsp` to the sender of `req`.
    async fn respond(&self, req: &Request, rsp: Response) -> Result<(), TransportError>;
}
