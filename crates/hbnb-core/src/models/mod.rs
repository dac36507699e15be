//! Reference entity set.
//!
//! Every model embeds a flattened [`Base`] (id plus timestamps) and
//! implements [`Model`](crate::entity::Model) through `impl_model!`.

/// Implements [`Model`](crate::entity::Model) for a struct with a `base: Base`
/// field.
macro_rules! impl_model {
    ($ty:ty, $name:literal, $table:literal) => {
        impl $crate::entity::Model for $ty {
            const TYPE_NAME: &'static str = $name;
            const TABLE: &'static str = $table;

            fn base(&self) -> &$crate::models::Base {
                &self.base
            }

            fn base_mut(&mut self) -> &mut $crate::models::Base {
                &mut self.base
            }
        }
    };
}

pub(crate) use impl_model;

mod base;
mod place;
mod state;
mod user;

pub use base::{Base, BaseModel};
pub use place::{Amenity, Place, Review};
pub use state::{City, State};
pub use user::User;
