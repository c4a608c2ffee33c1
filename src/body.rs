//! Decoded bodies and the templates that produce them.
//!
//! # How typed bodies travel through untyped codecs
//!
//! Codecs know about bytes; handlers know about their own request and
//! response structs. The two meet at a neutral data tree, a
//! [`serde_json::Value`]:
//!
//! ```text
//! payload bytes ──codec──▶ Value ──Template::of::<T>()──▶ Body(T)   (decode)
//! Body(T) ──Body::to_value──▶ Value ──codec──▶ payload bytes        (encode)
//! ```
//!
//! A [`Body`] is type-erased (`Arc<dyn ErasedBody>`) so an envelope can hold
//! any serialisable value; handlers get their concrete type back with
//! [`Body::downcast_ref`].

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Object-safe view of a serialisable body value.
trait ErasedBody: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn to_value(&self) -> Result<Value, serde_json::Error>;
}

impl<T> ErasedBody for T
where
    T: Serialize + Any + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// A decoded, shareable envelope body.
///
/// Cloning is one atomic increment.
#[derive(Clone, Debug)]
pub struct Body(Arc<dyn ErasedBody>);

impl Body {
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + fmt::Debug + 'static,
    {
        Self(Arc::new(value))
    }

    /// The concrete value, if this body holds a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// The neutral data tree codecs serialise.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        self.0.to_value()
    }
}

/// The shape a request or response payload decodes into.
#[derive(Clone, Copy)]
pub struct Template {
    type_name: &'static str,
    decode: fn(Value) -> Result<Body, serde_json::Error>,
}

impl Template {
    /// A template decoding into `T`.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Serialize + Send + Sync + fmt::Debug + 'static,
    {
        Self { type_name: type_name::<T>(), decode: decode_as::<T> }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn decode(&self, value: Value) -> Result<Body, serde_json::Error> {
        (self.decode)(value)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Template").field(&self.type_name).finish()
    }
}

fn decode_as<T>(value: Value) -> Result<Body, serde_json::Error>
where
    T: DeserializeOwned + Serialize + Send + Sync + fmt::Debug + 'static,
{
    serde_json::from_value::<T>(value).map(Body::new)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Greeting {
        name: String,
    }

    #[test]
    fn template_decodes_into_concrete_type() {
        let body = Template::of::<Greeting>()
            .decode(json!({ "name": "alice" }))
            .unwrap();
        assert_eq!(
            body.downcast_ref::<Greeting>(),
            Some(&Greeting { name: "alice".into() })
        );
        assert!(body.downcast_ref::<Value>().is_none());
    }

    #[test]
    fn template_rejects_wrong_shape() {
        let err = Template::of::<Greeting>().decode(json!([1, 2, 3]));
        assert!(err.is_err());
    }

    #[test]
    fn body_exposes_neutral_tree() {
        let body = Body::new(Greeting { name: "bob".into() });
        assert_eq!(body.to_value().unwrap(), json!({ "name": "bob" }));
    }

    #[test]
    fn template_debug_names_type() {
        let t = Template::of::<Greeting>();
        assert!(format!("{t:?}").contains("Greeting"));
    }
}
