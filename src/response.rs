//! Outgoing RPC response type.
//!
//! Handlers rarely build one from scratch: [`Request::response`] and
//! [`Request::reply`](crate::Request::reply) produce a correctly addressed
//! response, and [`error_response`](crate::error_response) the error variant.
//!
//! [`Request::response`]: crate::Request::response

use std::ops::{Deref, DerefMut};

use crate::envelope::Envelope;
use crate::fault::Fault;

/// A reply envelope.
///
/// `is_error` is an explicit flag, set only by the error-response builder,
/// so a transport can tell "the handler failed" from "no error" without
/// decoding the payload.
#[derive(Clone, Debug, Default)]
pub struct Response {
    envelope: Envelope,
    error: Option<Fault>,
    is_error: bool,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self) -> Option<&Fault> { self.error.as_ref() }
    pub fn set_error(&mut self, error: Option<Fault>) { self.error = error; }
    pub fn is_error(&self) -> bool { self.is_error }
    pub fn set_is_error(&mut self, is_error: bool) { self.is_error = is_error; }
}

impl Deref for Response {
    type Target = Envelope;
    fn deref(&self) -> &Envelope { &self.envelope }
}

impl DerefMut for Response {
    fn deref_mut(&mut self) -> &mut Envelope { &mut self.envelope }
}
