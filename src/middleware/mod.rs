//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: structured tracing, request-id injection,
//! authentication-header inspection.
//!
//! A [`Chain`] wraps the router like an onion:
//!
//! ```text
//! request  ─▶ m1 ─▶ m2 ─▶ m3 ─▶ router/handler
//! response ◀─ m1 ◀─ m2 ◀─ m3 ◀─┘
//! ```
//!
//! Any request-phase step may answer on its own by returning a response.
//! The remaining request-phase steps and the router are skipped, but the
//! response phase still runs over the whole chain.
//!
//! Chains are replaced wholesale, never edited element by element, so a
//! request always sees one consistent chain from start to finish.
//!
//! [`set_default`] installs a process-wide chain that every server built
//! afterwards starts with. Like [`CodecRegistry::global`](crate::CodecRegistry::global)
//! it is meant for top-level wiring only.

mod trace;

use std::fmt;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;

use crate::request::Request;
use crate::response::Response;

pub use trace::Trace;

/// A bidirectional request/response interceptor.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the (possibly rewritten) request to continue with, or a
    /// response that short-circuits the rest of the chain and the router.
    fn process_request(&self, req: Request) -> (Request, Option<Response>);

    /// Rewrites the response on its way out. `rsp` is `None` when no reply
    /// will be sent; returning `None` suppresses the reply.
    fn process_response(&self, rsp: Option<Response>, req: &Request) -> Option<Response>;
}

pub type BoxedMiddleware = Arc<dyn Middleware>;

static DEFAULTS: LazyLock<ArcSwap<Vec<BoxedMiddleware>>> =
    LazyLock::new(|| ArcSwap::from_pointee(Vec::new()));

/// Replaces the process-wide default chain. Servers already built keep
/// the chain they started with.
pub fn set_default(layers: Vec<BoxedMiddleware>) {
    DEFAULTS.store(Arc::new(layers));
}

/// A copy of the process-wide default chain.
pub fn defaults() -> Vec<BoxedMiddleware> {
    Vec::clone(&DEFAULTS.load())
}

/// An ordered middleware list shared by concurrent requests.
pub struct Chain {
    layers: ArcSwap<Vec<BoxedMiddleware>>,
}

impl Chain {
    pub fn new(layers: Vec<BoxedMiddleware>) -> Self {
        Self { layers: ArcSwap::from_pointee(layers) }
    }

    /// The current chain. Later replacements do not affect it.
    pub fn snapshot(&self) -> Arc<Vec<BoxedMiddleware>> {
        self.layers.load_full()
    }

    pub fn set(&self, layers: Vec<BoxedMiddleware>) {
        self.layers.store(Arc::new(layers));
    }

    pub fn push(&self, layer: BoxedMiddleware) {
        self.layers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&layer));
            next
        });
    }

    pub fn len(&self) -> usize {
        self.layers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Chain {
    fn default() -> Self { Self::new(Vec::new()) }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("len", &self.len()).finish()
    }
}

/// Runs the request phase in registration order, stopping at the first
/// middleware that answers.
pub fn apply_request(layers: &[BoxedMiddleware], mut req: Request) -> (Request, Option<Response>) {
    for layer in layers {
        let (next, rsp) = layer.process_request(req);
        if rsp.is_some() {
            return (next, rsp);
        }
        req = next;
    }
    (req, None)
}

/// Runs the response phase in reverse registration order.
pub fn apply_response(layers: &[BoxedMiddleware], mut rsp: Option<Response>, req: &Request) -> Option<Response> {
    for layer in layers.iter().rev() {
        rsp = layer.process_response(rsp, req);
    }
    rsp
}
