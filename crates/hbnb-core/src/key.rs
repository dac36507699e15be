//! Composite object keys.
//!
//! An [`ObjectKey`] is the pair `(type name, id)` rendered as `TypeName.id`.
//! It is the only addressing scheme the backends use, and this module is the
//! only place that formats or splits the string form.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::CoreError;

/// Separator between the type name and the id.
const SEPARATOR: char = '.';

/// Identity of one entity within a storage instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    type_name: String,
    id: String,
}

impl ObjectKey {
    /// Builds the key for an entity of `type_name` with the given `id`.
    pub fn encode(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        ObjectKey {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// Parses a `TypeName.id` string.
    ///
    /// Splits on the first separator, so ids may themselves contain dots.
    /// Either half being empty is an error.
    pub fn decode(key: &str) -> Result<Self, CoreError> {
        match key.split_once(SEPARATOR) {
            Some((type_name, id)) if !type_name.is_empty() && !id.is_empty() => {
                Ok(ObjectKey::encode(type_name, id))
            }
            _ => Err(CoreError::InvalidKey {
                key: key.to_string(),
            }),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.type_name, SEPARATOR, self.id)
    }
}

impl FromStr for ObjectKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectKey::decode(s)
    }
}

// Keys travel as their string form so they can be JSON object keys.

impl Serialize for ObjectKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ObjectKey::decode(&raw).map_err(de::Error::custom)
    }
}
