//! Identity and timestamps shared by all models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::impl_model;

/// Fields every model carries, flattened into its attribute mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Base {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Base {
    /// A fresh identity: random UUID v4, both timestamps set to now.
    pub fn new() -> Self {
        Base::with_id(Uuid::new_v4().to_string())
    }

    /// Same as [`Base::new`] with a caller-chosen id.
    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Base {
            id: id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the record as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Base {
    fn default() -> Self {
        Base::new()
    }
}

/// A model with no attributes beyond its [`Base`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseModel {
    #[serde(flatten)]
    pub base: Base,
}

impl_model!(BaseModel, "BaseModel", "base_models");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(Base::new().id, Base::new().id);
    }

    #[test]
    fn touch_moves_updated_at_forward() {
        let mut base = Base::with_id("b1");
        let before = base.updated_at;
        base.touch();
        assert!(base.updated_at >= before);
        assert_eq!(base.created_at, before);
    }

    #[test]
    fn base_fields_are_flattened() {
        let model = BaseModel {
            base: Base::with_id("b1"),
        };
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["id"], "b1");
        assert!(json.get("base").is_none());
    }
}
