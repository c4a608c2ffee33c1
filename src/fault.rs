//! Canonical per-request errors and the error-response builder.
//!
//! Whatever a handler fails with (a decode error, an `io::Error`, a
//! hand-built [`Fault`]) leaves the server as a `Fault` serialised with the
//! JSON codec, regardless of what the client asked for in `Accept`. Clients
//! decode every error body the same way:
//!
//! ```json
//! {"status":"bad_request","code":"endpoint_not_found","message":"Endpoint not found"}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::body::Body;
use crate::codec::{JsonMarshaler, Marshaler};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Any error a handler may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A classified, serialisable per-request error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub status: Status,
    /// Optional detail below the classification, e.g. `"endpoint_not_found"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl Fault {
    pub fn new(status: Status, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Status::NotFound, code, message)
    }

    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Status::Forbidden, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Status::InternalService, code, message)
    }

    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Status::Timeout, code, message)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Keeps an existing `Fault` as is; anything else becomes an
    /// `internal_service` fault carrying the error's message.
    pub fn wrap(err: BoxError) -> Self {
        match err.downcast::<Fault>() {
            Ok(fault) => *fault,
            Err(other) => Self::internal("", other.to_string()),
        }
    }

    /// `"<status>.<code>"`, or just `"<status>"` without a detail code.
    pub fn dotted_code(&self) -> String {
        if self.code.is_empty() {
            self.status.as_str().to_owned()
        } else {
            format!("{}.{}", self.status, self.code)
        }
    }

    pub fn is_client_fault(&self) -> bool {
        self.status.is_client_fault()
    }

    /// Reads a fault back from an error response payload.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.dotted_code(), self.message)
    }
}

impl std::error::Error for Fault {}

pub(crate) fn endpoint_not_found() -> Fault {
    Fault::bad_request("endpoint_not_found", "Endpoint not found")
}

/// Builds the error response for `req`.
///
/// The response shares the request's id, carries the wrapped [`Fault`] both
/// in its error slot and JSON-encoded as its payload, and has `is_error` set.
/// Returns `None` if the fault cannot be encoded; a reply the client cannot
/// parse is never sent.
pub fn error_response(req: &Request, err: impl Into<BoxError>) -> Option<Response> {
    build_error_response(req, err.into(), &JsonMarshaler)
}

fn build_error_response(req: &Request, err: BoxError, marshaler: &dyn Marshaler) -> Option<Response> {
    let fault = Fault::wrap(err);
    let mut rsp = req.response(None);
    rsp.set_body(Some(Body::new(fault.clone())));
    if let Err(err) = marshaler.marshal_body(&mut rsp) {
        error!(id = %req.id(), error = %err, "failed to marshal error response");
        return None;
    }
    rsp.set_error(Some(fault));
    rsp.set_is_error(true);
    Some(rsp)
}
