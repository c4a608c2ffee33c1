//! Inbound RPC request type.

use std::ops::{Deref, DerefMut};

use bytes::Bytes;
use serde::Serialize;
use tokio::time::Instant;
use tracing::error;

use crate::body::Body;
use crate::codec::{CodecRegistry, JSON_CONTENT_TYPE};
use crate::context::{Context, ContextError};
use crate::envelope::Envelope;
use crate::headers::ACCEPT;
use crate::response::Response;

/// An RPC call: an [`Envelope`] plus the context it executes in.
///
/// Dereferences to [`Envelope`] for ids, headers and payload. Header and
/// payload mutation needs `&mut Request`, which only the current owner has;
/// once a request is dispatched, handlers work on their own clone.
#[derive(Clone, Debug)]
pub struct Request {
    envelope: Envelope,
    context: Context,
    codecs: CodecRegistry,
}

impl Request {
    /// An empty request with a fresh UUID, a background context and the
    /// process-wide codec registry.
    pub fn new() -> Self {
        let mut envelope = Envelope::default();
        envelope.set_id(uuid::Uuid::new_v4().to_string());
        Self {
            envelope,
            context: Context::background(),
            codecs: CodecRegistry::global().clone(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.envelope.set_id(id);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.envelope.set_service(service);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.envelope.set_origin(origin);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.envelope.set_endpoint(endpoint);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.envelope.set_header(name, value);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.envelope.set_payload(payload);
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.envelope.set_body(Some(body));
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn context(&self) -> &Context { &self.context }
    pub fn set_context(&mut self, context: Context) { self.context = context; }
    pub fn codecs(&self) -> &CodecRegistry { &self.codecs }

    // ── Context delegation ────────────────────────────────────────────────────

    pub fn deadline(&self) -> Option<Instant> {
        self.context.deadline()
    }

    pub async fn done(&self) {
        self.context.done().await;
    }

    pub fn err(&self) -> Option<ContextError> {
        self.context.err()
    }

    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.context.value::<T>()
    }

    // ── Replies ───────────────────────────────────────────────────────────────

    /// A response to this request: same id, addressed back to the origin.
    ///
    /// With a body, the body is encoded by the codec named in the request's
    /// `Accept` header, or JSON if that is missing or unregistered. An
    /// encoding failure is logged and leaves the payload empty.
    pub fn response(&self, body: Option<Body>) -> Response {
        let mut rsp = Response::new();
        rsp.set_id(self.id());
        rsp.set_service(self.origin());
        rsp.set_origin(self.service());
        rsp.set_endpoint(self.endpoint());

        let Some(body) = body else { return rsp };
        rsp.set_body(Some(body));

        let accept = self.header(ACCEPT).unwrap_or_default();
        let marshaler = self
            .codecs
            .marshaler(accept)
            .or_else(|| self.codecs.marshaler(JSON_CONTENT_TYPE));
        match marshaler {
            None => error!(id = %rsp.id(), accept, "no marshaler for response"),
            Some(m) => {
                if let Err(err) = m.marshal_body(&mut rsp) {
                    error!(id = %rsp.id(), error = %err, "failed to marshal response");
                }
            }
        }
        rsp
    }

    /// Shorthand for `response(Some(Body::new(value)))`.
    pub fn reply<T>(&self, value: T) -> Response
    where
        T: Serialize + Send + Sync + std::fmt::Debug + 'static,
    {
        self.response(Some(Body::new(value)))
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Request {
    type Target = Envelope;
    fn deref(&self) -> &Envelope { &self.envelope }
}

impl DerefMut for Request {
    fn deref_mut(&mut self) -> &mut Envelope { &mut self.envelope }
}
