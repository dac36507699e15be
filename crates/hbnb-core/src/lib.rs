//! Entity model, class registry and object key codec shared by every hbnb
//! storage backend.
//!
//! # Modules
//!
//! - [`error`]: CoreError enum with all model-level failure modes
//! - [`entity`]: the object-safe [`Entity`] contract and the typed [`Model`] trait
//! - [`key`]: the `TypeName.id` composite key codec
//! - [`registry`]: closed type-name → constructor mapping and class filters
//! - [`models`]: the reference entity set (User, State, City, ...)

pub mod entity;
pub mod error;
pub mod key;
pub mod models;
pub mod registry;

// Re-export commonly used types
pub use entity::{Attributes, Entity, EntityRef, Model, CLASS_KEY};
pub use error::CoreError;
pub use key::ObjectKey;
pub use models::{Amenity, Base, BaseModel, City, Place, Review, State, User};
pub use registry::{ClassEntry, ClassFilter, ClassRegistry};
