//! # courier
//!
//! The request-handling core of an RPC service. Requests arrive from a
//! [`Transport`], pass a middleware chain, reach the endpoint registered
//! under their name and leave as a [`Response`]. Nothing about sockets or
//! framing lives here.
//!
//! What courier does:
//!
//! - Endpoint registry with exact name lookup and a legacy `/name` fallback
//! - Ordered middleware with request short-circuit and reverse-order responses
//! - Content-type-driven codecs (JSON seeded, MessagePack on request)
//! - One canonical error shape, [`Fault`], always encoded as JSON
//! - A supervised worker loop: one task per request, reconnect once on
//!   channel loss, clean stop without cancelling in-flight work
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use courier::{Endpoint, Fault, MemoryTransport, Request, Server};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Deserialize, Serialize)]
//! struct Greet {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), courier::Error> {
//!     let server = Server::builder("svc.greeter")
//!         .middleware(courier::middleware::Trace)
//!         .build();
//!
//!     server.add_endpoints([
//!         Endpoint::new("greet", greet).with_request::<Greet>(),
//!     ]);
//!
//!     server.run(Arc::new(MemoryTransport::new())).await
//! }
//!
//! async fn greet(req: Request) -> Result<courier::Response, Fault> {
//!     let greet = req
//!         .body_as::<Greet>()
//!         .ok_or_else(|| Fault::bad_request("missing_body", "Nothing to greet"))?;
//!     Ok(req.reply(format!("hello, {}", greet.name)))
//! }
//! ```

mod body;
mod config;
mod context;
mod endpoint;
mod envelope;
mod error;
mod fault;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod codec;
pub mod compat;
pub mod headers;
pub mod middleware;
pub mod transport;

pub use body::{Body, Template};
pub use codec::CodecRegistry;
pub use config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_INBOUND_CAPACITY, ServerConfig};
pub use context::{CancelHandle, Context, ContextError};
pub use endpoint::Endpoint;
pub use envelope::Envelope;
pub use error::{Error, TransportError};
pub use fault::{BoxError, Fault, error_response};
pub use handler::{Handler, HandlerResult, IntoHandlerResult};
pub use headers::Headers;
pub use middleware::Middleware;
pub use request::Request;
pub use response::Response;
pub use router::Router;
pub use server::{Server, ServerBuilder, State};
pub use status::Status;
pub use transport::{MemoryTransport, Transport};
