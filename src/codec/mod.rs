//! Content-type driven codec selection.
//!
//! A [`CodecRegistry`] maps a content type (`"application/json"`) to a pair
//! of factories: one building a [`Marshaler`] that encodes an envelope's body
//! into its payload, one building an [`Unmarshaler`] that decodes a payload
//! into a [`Template`]'s type.
//!
//! Lookups never fail loudly. An unregistered content type resolves to
//! `None` and every call site applies its own fallback (usually JSON).
//!
//! Registries are cheap handles (`Clone` shares the same table). Writers
//! build a fresh table and swap it in; readers work on whichever snapshot
//! they loaded and never wait on a writer.

mod json;
mod msgpack;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::body::Template;
use crate::envelope::Envelope;

pub use json::{JSON_CONTENT_TYPE, JsonMarshaler, JsonUnmarshaler};
pub use msgpack::{MSGPACK_CONTENT_TYPE, MsgPackMarshaler, MsgPackUnmarshaler};

/// Failure to encode a body or decode a payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("msgpack encode: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
    #[error("no codec registered for content type {0:?}")]
    Unsupported(String),
}

/// Encodes an envelope's body into its payload.
pub trait Marshaler: Send + Sync {
    fn marshal_body(&self, envelope: &mut Envelope) -> Result<(), CodecError>;
}

/// Decodes an envelope's payload into its body.
pub trait Unmarshaler: Send + Sync {
    fn unmarshal_payload(&self, envelope: &mut Envelope) -> Result<(), CodecError>;
}

pub type MarshalerFactory = Arc<dyn Fn() -> Box<dyn Marshaler> + Send + Sync>;
pub type UnmarshalerFactory = Arc<dyn Fn(Template) -> Box<dyn Unmarshaler> + Send + Sync>;

#[derive(Clone)]
struct CodecPair {
    marshaler: MarshalerFactory,
    unmarshaler: UnmarshalerFactory,
}

static GLOBAL: LazyLock<CodecRegistry> = LazyLock::new(CodecRegistry::new);

/// Content type → codec factory table.
#[derive(Clone)]
pub struct CodecRegistry {
    entries: Arc<ArcSwap<HashMap<String, CodecPair>>>,
}

impl CodecRegistry {
    /// A registry seeded with the JSON codec.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register(
            JSON_CONTENT_TYPE,
            || Box::new(JsonMarshaler) as Box<dyn Marshaler>,
            |template| Box::new(JsonUnmarshaler::new(template)) as Box<dyn Unmarshaler>,
        );
        registry
    }

    /// A registry with no codecs at all, not even JSON.
    pub fn empty() -> Self {
        Self { entries: Arc::new(ArcSwap::from_pointee(HashMap::new())) }
    }

    /// The process-wide default registry. Reserved for top-level wiring;
    /// components receive a registry explicitly.
    pub fn global() -> &'static CodecRegistry {
        &GLOBAL
    }

    /// Registers (or replaces) the codec for `content_type`. An empty content
    /// type is ignored.
    pub fn register<M, U>(&self, content_type: &str, marshaler: M, unmarshaler: U)
    where
        M: Fn() -> Box<dyn Marshaler> + Send + Sync + 'static,
        U: Fn(Template) -> Box<dyn Unmarshaler> + Send + Sync + 'static,
    {
        if content_type.is_empty() {
            debug!("ignoring codec registration without a content type");
            return;
        }
        let pair = CodecPair {
            marshaler: Arc::new(marshaler),
            unmarshaler: Arc::new(unmarshaler),
        };
        self.entries.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(content_type.to_owned(), pair.clone());
            next
        });
    }

    /// Registers the MessagePack codec under [`MSGPACK_CONTENT_TYPE`].
    pub fn register_msgpack(&self) {
        self.register(
            MSGPACK_CONTENT_TYPE,
            || Box::new(MsgPackMarshaler) as Box<dyn Marshaler>,
            |template| Box::new(MsgPackUnmarshaler::new(template)) as Box<dyn Unmarshaler>,
        );
    }

    pub fn marshaler(&self, content_type: &str) -> Option<Box<dyn Marshaler>> {
        let pair = self.entries.load().get(content_type).cloned()?;
        Some((pair.marshaler)())
    }

    pub fn unmarshaler(&self, content_type: &str, template: Template) -> Option<Box<dyn Unmarshaler>> {
        let pair = self.entries.load().get(content_type).cloned()?;
        Some((pair.unmarshaler)(template))
    }

    pub fn contains(&self, content_type: &str) -> bool {
        self.entries.load().contains_key(content_type)
    }

    /// Registered content types, sorted.
    pub fn content_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.entries.load().keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("content_types", &self.content_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::body::Body;

    #[test]
    fn new_registry_is_seeded_with_json() {
        let registry = CodecRegistry::new();
        assert_eq!(registry.content_types(), vec![JSON_CONTENT_TYPE.to_owned()]);
        assert!(registry.marshaler(JSON_CONTENT_TYPE).is_some());
        assert!(registry.unmarshaler(JSON_CONTENT_TYPE, Template::of::<Value>()).is_some());
    }

    #[test]
    fn unregistered_content_type_resolves_to_none() {
        let registry = CodecRegistry::new();
        assert!(registry.marshaler("text/csv").is_none());
        assert!(registry.unmarshaler("text/csv", Template::of::<Value>()).is_none());
        assert!(CodecRegistry::empty().marshaler(JSON_CONTENT_TYPE).is_none());
    }

    #[test]
    fn empty_content_type_is_ignored() {
        let registry = CodecRegistry::empty();
        registry.register(
            "",
            || Box::new(JsonMarshaler) as Box<dyn Marshaler>,
            |t| Box::new(JsonUnmarshaler::new(t)) as Box<dyn Unmarshaler>,
        );
        assert!(registry.content_types().is_empty());
    }

    #[test]
    fn clones_share_registrations() {
        let registry = CodecRegistry::new();
        let handle = registry.clone();
        handle.register_msgpack();
        assert!(registry.contains(MSGPACK_CONTENT_TYPE));
        assert!(!CodecRegistry::new().contains(MSGPACK_CONTENT_TYPE));
    }

    #[test]
    fn registration_replaces_existing_entry() {
        struct Fixed;
        impl Marshaler for Fixed {
            fn marshal_body(&self, envelope: &mut Envelope) -> Result<(), CodecError> {
                envelope.set_payload(&b"fixed"[..]);
                Ok(())
            }
        }

        let registry = CodecRegistry::new();
        registry.register(
            JSON_CONTENT_TYPE,
            || Box::new(Fixed) as Box<dyn Marshaler>,
            |t| Box::new(JsonUnmarshaler::new(t)) as Box<dyn Unmarshaler>,
        );

        let mut env = Envelope::default();
        env.set_body(Some(Body::new(json!(1))));
        registry.marshaler(JSON_CONTENT_TYPE).unwrap().marshal_body(&mut env).unwrap();
        assert_eq!(env.payload().as_ref(), b"fixed");
    }
}
