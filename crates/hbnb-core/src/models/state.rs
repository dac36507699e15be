use serde::{Deserialize, Serialize};

use super::{impl_model, Base};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(flatten)]
    pub base: Base,
    #[serde(default)]
    pub name: String,
}

impl_model!(State, "State", "states");

/// A city, owned by a [`State`] through `state_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct City {
    #[serde(flatten)]
    pub base: Base,
    #[serde(default)]
    pub state_id: String,
    #[serde(default)]
    pub name: String,
}

impl_model!(City, "City", "cities");
