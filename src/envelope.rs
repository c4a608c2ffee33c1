//! Fields shared by requests and responses.

use bytes::Bytes;

use crate::body::Body;
use crate::headers::Headers;

/// Identity, addressing, headers and payload of one message.
///
/// [`Request`](crate::Request) and [`Response`](crate::Response) both
/// dereference to an `Envelope`, which is also what codecs read and write.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    id: String,
    service: String,
    origin: String,
    endpoint: String,
    headers: Headers,
    payload: Bytes,
    body: Option<Body>,
}

impl Envelope {
    pub fn id(&self) -> &str { &self.id }
    /// Destination service.
    pub fn service(&self) -> &str { &self.service }
    /// Originating service.
    pub fn origin(&self) -> &str { &self.origin }
    pub fn endpoint(&self) -> &str { &self.endpoint }
    pub fn headers(&self) -> &Headers { &self.headers }
    pub fn payload(&self) -> &Bytes { &self.payload }
    pub fn body(&self) -> Option<&Body> { self.body.as_ref() }

    /// The body as a `T`, if one is attached and has that type.
    pub fn body_as<T: 'static>(&self) -> Option<&T> {
        self.body.as_ref()?.downcast_ref::<T>()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn set_id(&mut self, id: impl Into<String>) { self.id = id.into(); }
    pub fn set_service(&mut self, service: impl Into<String>) { self.service = service.into(); }
    pub fn set_origin(&mut self, origin: impl Into<String>) { self.origin = origin.into(); }
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) { self.endpoint = endpoint.into(); }
    pub fn set_headers(&mut self, headers: Headers) { self.headers = headers; }
    pub fn headers_mut(&mut self) -> &mut Headers { &mut self.headers }
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) { self.payload = payload.into(); }
    pub fn set_body(&mut self, body: Option<Body>) { self.body = body; }
}
