//! Storage-layer result types.

use hbnb_core::{Entity, EntityRef, ObjectKey};
use indexmap::IndexMap;

/// Entities keyed by their object key, as returned by `all`.
///
/// Insertion-ordered: the document backend yields its working-set order, the
/// session backend yields registry order then row order.
pub type Objects = IndexMap<ObjectKey, EntityRef>;

/// The object key addressing `entity`.
pub fn key_of(entity: &dyn Entity) -> ObjectKey {
    ObjectKey::encode(entity.type_name(), entity.id())
}
