//! The JSON codec, seeded in every new registry.

use bytes::Bytes;
use serde_json::Value;

use super::{CodecError, Marshaler, Unmarshaler};
use crate::body::Template;
use crate::envelope::Envelope;
use crate::headers::CONTENT_TYPE;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Encodes the body as JSON and stamps `Content-Type: application/json`.
///
/// An envelope without a body gets an empty payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonMarshaler;

impl Marshaler for JsonMarshaler {
    fn marshal_body(&self, envelope: &mut Envelope) -> Result<(), CodecError> {
        let payload = match envelope.body() {
            Some(body) => serde_json::to_vec(&body.to_value()?)?,
            None => Vec::new(),
        };
        envelope.set_payload(Bytes::from(payload));
        envelope.set_header(CONTENT_TYPE, JSON_CONTENT_TYPE);
        Ok(())
    }
}

/// Decodes a JSON payload into its template's type.
#[derive(Clone, Copy, Debug)]
pub struct JsonUnmarshaler {
    template: Template,
}

impl JsonUnmarshaler {
    pub fn new(template: Template) -> Self {
        Self { template }
    }
}

impl Unmarshaler for JsonUnmarshaler {
    fn unmarshal_payload(&self, envelope: &mut Envelope) -> Result<(), CodecError> {
        let value: Value = serde_json::from_slice(envelope.payload())?;
        let body = self.template.decode(value)?;
        envelope.set_body(Some(body));
        Ok(())
    }
}
