//! Named handler bindings.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::body::Template;
use crate::codec::JSON_CONTENT_TYPE;
use crate::fault::Fault;
use crate::handler::{BoxedHandler, Handler, HandlerResult};
use crate::headers::CONTENT_TYPE;
use crate::request::Request;

/// A handler bound to an endpoint name, with optional body templates.
///
/// The name is the routing key. A request template makes
/// [`handle`](Endpoint::handle) decode the payload before the handler runs;
/// the response template documents the reply shape for callers.
///
/// ```rust
/// use courier::{Endpoint, Fault, Request, Response};
/// use serde_json::Value;
///
/// async fn echo(req: Request) -> Result<Response, Fault> {
///     let body = req.body_as::<Value>().cloned().unwrap_or(Value::Null);
///     Ok(req.reply(body))
/// }
///
/// let ep = Endpoint::new("echo", echo).with_request::<Value>();
/// assert_eq!(ep.name(), "echo");
/// ```
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    handler: BoxedHandler,
    request: Option<Template>,
    response: Option<Template>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            name: name.into(),
            handler: handler.into_boxed_handler(),
            request: None,
            response: None,
        }
    }

    /// Decode request payloads into `T` before invoking the handler.
    pub fn with_request<T>(mut self) -> Self
    where
        T: DeserializeOwned + Serialize + Send + Sync + fmt::Debug + 'static,
    {
        self.request = Some(Template::of::<T>());
        self
    }

    pub fn with_response<T>(mut self) -> Self
    where
        T: DeserializeOwned + Serialize + Send + Sync + fmt::Debug + 'static,
    {
        self.response = Some(Template::of::<T>());
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn request_template(&self) -> Option<Template> { self.request }
    pub fn response_template(&self) -> Option<Template> { self.response }

    /// Decodes the payload (if needed) and runs the handler.
    ///
    /// Decoding happens only when the request has no body yet and this
    /// endpoint declares a request template. The codec is chosen by the
    /// request's `Content-Type`, falling back to JSON. If no codec is
    /// available or decoding fails, a `bad_request` fault is returned and the
    /// handler is not called. Otherwise the handler's result is returned
    /// unchanged.
    pub async fn handle(&self, req: &mut Request) -> HandlerResult {
        if let (true, Some(template)) = (req.body().is_none(), self.request) {
            let content_type = req.header(CONTENT_TYPE).unwrap_or_default().to_owned();
            let unmarshaler = req
                .codecs()
                .unmarshaler(&content_type, template)
                .or_else(|| req.codecs().unmarshaler(JSON_CONTENT_TYPE, template));

            let Some(unmarshaler) = unmarshaler else {
                warn!(id = %req.id(), content_type = %content_type, "no unmarshaler for request payload");
                return Err(Fault::bad_request(
                    "unsupported_content_type",
                    format!("no codec for content type {content_type:?}"),
                )
                .into());
            };

            if let Err(err) = unmarshaler.unmarshal_payload(req) {
                warn!(id = %req.id(), endpoint = %self.name, error = %err, "cannot unmarshal request payload");
                return Err(Fault::bad_request("invalid_payload", err.to_string()).into());
            }
        }

        self.handler.call(req.clone()).await
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("request", &self.request)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}
