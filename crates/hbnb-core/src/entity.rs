//! The entity contract every storage backend works against.
//!
//! Backends only ever see [`Entity`] trait objects: something with an id, a
//! type name and a flat attribute mapping. Concrete record types implement the
//! typed [`Model`] trait instead and receive [`Entity`] through a blanket impl,
//! so serialization lives in one place.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::models::Base;

/// Reserved attribute naming an entity's type inside its attribute mapping.
pub const CLASS_KEY: &str = "__class__";

/// Flat, JSON-representable attribute mapping of one entity.
pub type Attributes = serde_json::Map<String, Value>;

/// Shared handle to a live entity.
pub type EntityRef = Arc<dyn Entity>;

/// A uniquely identified record managed by a storage backend.
pub trait Entity: fmt::Debug + Send + Sync + 'static {
    /// The registered type name, e.g. `"User"`.
    fn type_name(&self) -> &'static str;

    /// The immutable identity of this entity.
    fn id(&self) -> &str;

    /// Flat attribute mapping, including the reserved [`CLASS_KEY`] entry.
    fn to_attributes(&self) -> Result<Attributes, CoreError>;

    /// Upcast used for downcasting back to the concrete model.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Entity {
    /// Returns the concrete model if this entity is an `M`.
    pub fn downcast_ref<M: Model>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }
}

/// A concrete, serde-backed record type that can be registered in a
/// [`ClassRegistry`](crate::registry::ClassRegistry).
pub trait Model:
    Serialize + DeserializeOwned + Clone + Default + fmt::Debug + Send + Sync + 'static
{
    /// Logical type name, used in object keys and the `__class__` attribute.
    const TYPE_NAME: &'static str;

    /// Table backing this type in relational stores.
    const TABLE: &'static str;

    /// Identity and timestamp fields shared by every model.
    fn base(&self) -> &Base;

    fn base_mut(&mut self) -> &mut Base;

    /// Wraps the model into a shared [`EntityRef`].
    fn into_ref(self) -> EntityRef {
        Arc::new(self)
    }
}

impl<M: Model> Entity for M {
    fn type_name(&self) -> &'static str {
        M::TYPE_NAME
    }

    fn id(&self) -> &str {
        &self.base().id
    }

    fn to_attributes(&self) -> Result<Attributes, CoreError> {
        match serde_json::to_value(self)? {
            Value::Object(mut map) => {
                map.insert(CLASS_KEY.to_string(), Value::String(M::TYPE_NAME.to_string()));
                Ok(map)
            }
            other => Err(CoreError::InvalidRecord {
                type_name: M::TYPE_NAME.to_string(),
                reason: format!("serialized to {other} instead of an object"),
            }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Rebuilds a typed model from its attribute mapping.
///
/// The [`CLASS_KEY`] entry is dropped before deserializing; unknown attributes
/// are ignored.
pub fn from_attributes<M: Model>(mut attributes: Attributes) -> Result<M, CoreError> {
    attributes.remove(CLASS_KEY);
    serde_json::from_value(Value::Object(attributes)).map_err(|e| CoreError::InvalidRecord {
        type_name: M::TYPE_NAME.to_string(),
        reason: e.to_string(),
    })
}
