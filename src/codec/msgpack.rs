//! The MessagePack codec. Opt in with
//! [`CodecRegistry::register_msgpack`](super::CodecRegistry::register_msgpack).

use bytes::Bytes;
use serde_json::Value;

use super::{CodecError, Marshaler, Unmarshaler};
use crate::body::Template;
use crate::envelope::Envelope;
use crate::headers::CONTENT_TYPE;

pub const MSGPACK_CONTENT_TYPE: &str = "application/msgpack";

/// Encodes the body as MessagePack (maps keyed by field name).
#[derive(Clone, Copy, Debug, Default)]
pub struct MsgPackMarshaler;

impl Marshaler for MsgPackMarshaler {
    fn marshal_body(&self, envelope: &mut Envelope) -> Result<(), CodecError> {
        let payload = match envelope.body() {
            Some(body) => rmp_serde::to_vec_named(&body.to_value()?)?,
            None => Vec::new(),
        };
        envelope.set_payload(Bytes::from(payload));
        envelope.set_header(CONTENT_TYPE, MSGPACK_CONTENT_TYPE);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MsgPackUnmarshaler {
    template: Template,
}

impl MsgPackUnmarshaler {
    pub fn new(template: Template) -> Self {
        Self { template }
    }
}

impl Unmarshaler for MsgPackUnmarshaler {
    fn unmarshal_payload(&self, envelope: &mut Envelope) -> Result<(), CodecError> {
        let value: Value = rmp_serde::from_slice(envelope.payload())?;
        let body = self.template.decode(value)?;
        envelope.set_body(Some(body));
        Ok(())
    }
}
