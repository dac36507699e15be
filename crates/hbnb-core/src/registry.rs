//! ClassRegistry and ClassFilter.
//!
//! The [`ClassRegistry`] is the closed mapping from logical type name to the
//! constructor able to rebuild an entity from its attribute mapping. Backends
//! use it to turn stored records back into live entities and to resolve the
//! class filter callers pass to `all`/`count`.
//!
//! The registry is built once and then only read; share it as
//! `Arc<ClassRegistry>`.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::entity::{from_attributes, Attributes, Entity, EntityRef, Model, CLASS_KEY};
use crate::error::CoreError;
use crate::models::{Amenity, BaseModel, City, Place, Review, State, User};

/// Attributes `revise` refuses to change.
const PROTECTED: [&str; 4] = ["id", "created_at", "updated_at", CLASS_KEY];

/// Builds an entity from its attribute mapping.
pub type Constructor = fn(Attributes) -> Result<EntityRef, CoreError>;

/// One registered type.
#[derive(Debug, Clone)]
pub struct ClassEntry {
    name: &'static str,
    table: &'static str,
    type_id: TypeId,
    construct: Constructor,
    touched: Constructor,
    defaults: fn() -> Result<Attributes, CoreError>,
}

impl ClassEntry {
    fn of<M: Model>() -> Self {
        ClassEntry {
            name: M::TYPE_NAME,
            table: M::TABLE,
            type_id: TypeId::of::<M>(),
            construct: construct_model::<M>,
            touched: construct_touched::<M>,
            defaults: default_attributes::<M>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rebuilds an entity of this type from its attribute mapping.
    ///
    /// A `__class__` entry naming a different type is rejected.
    pub fn construct(&self, attributes: Attributes) -> Result<EntityRef, CoreError> {
        if let Some(class) = attributes.get(CLASS_KEY) {
            if class.as_str() != Some(self.name) {
                return Err(CoreError::InvalidRecord {
                    type_name: self.name.to_string(),
                    reason: format!("record is tagged as {class}"),
                });
            }
        }
        (self.construct)(attributes)
    }

    /// The attribute mapping of a default instance: every attribute the
    /// type declares, with its default value.
    pub fn defaults(&self) -> Result<Attributes, CoreError> {
        (self.defaults)()
    }

    /// Creates a new entity: a default instance (fresh id, current
    /// timestamps) with `overrides` laid over its attributes.
    ///
    /// Names the type does not declare are rejected rather than dropped.
    pub fn instantiate(&self, overrides: Attributes) -> Result<EntityRef, CoreError> {
        let mut attributes = (self.defaults)()?;
        for (name, value) in overrides {
            if name == CLASS_KEY {
                continue;
            }
            if !attributes.contains_key(&name) {
                return Err(self.unknown_attribute(name));
            }
            attributes.insert(name, value);
        }
        self.construct(attributes)
    }

    /// Returns a copy of `entity` with `changes` applied and `updated_at`
    /// refreshed.
    ///
    /// Identity and timestamp attributes are read-only, and names the type
    /// does not declare are rejected.
    pub fn revise(&self, entity: &dyn Entity, changes: Attributes) -> Result<EntityRef, CoreError> {
        if !self.matches(entity) {
            return Err(CoreError::InvalidRecord {
                type_name: self.name.to_string(),
                reason: format!("cannot revise a {}", entity.type_name()),
            });
        }
        let mut attributes = entity.to_attributes()?;
        for (name, value) in changes {
            if PROTECTED.contains(&name.as_str()) {
                return Err(CoreError::ReadOnlyAttribute {
                    type_name: self.name.to_string(),
                    name,
                });
            }
            if !attributes.contains_key(&name) {
                return Err(self.unknown_attribute(name));
            }
            attributes.insert(name, value);
        }
        (self.touched)(attributes)
    }

    fn unknown_attribute(&self, name: String) -> CoreError {
        CoreError::UnknownAttribute {
            type_name: self.name.to_string(),
            name,
        }
    }

    /// True when `entity` is an instance of this type.
    pub fn matches(&self, entity: &dyn Entity) -> bool {
        entity.as_any().type_id() == self.type_id
    }
}

fn construct_model<M: Model>(attributes: Attributes) -> Result<EntityRef, CoreError> {
    Ok(Arc::new(from_attributes::<M>(attributes)?))
}

fn construct_touched<M: Model>(attributes: Attributes) -> Result<EntityRef, CoreError> {
    let mut model = from_attributes::<M>(attributes)?;
    model.base_mut().touch();
    Ok(Arc::new(model))
}

fn default_attributes<M: Model>() -> Result<Attributes, CoreError> {
    M::default().to_attributes()
}

/// Which types an `all`/`count` call is restricted to.
///
/// Callers name the type either by string or by the Rust type itself; the
/// registry normalizes both through [`ClassRegistry::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClassFilter {
    /// Every registered type.
    #[default]
    All,
    /// A type given by its registered name.
    Name(String),
    /// A type given as the model type itself.
    Type { type_id: TypeId, name: &'static str },
}

impl ClassFilter {
    /// Filter for the model type `M`.
    pub fn of<M: Model>() -> Self {
        ClassFilter::Type {
            type_id: TypeId::of::<M>(),
            name: M::TYPE_NAME,
        }
    }
}

impl From<&str> for ClassFilter {
    fn from(name: &str) -> Self {
        ClassFilter::Name(name.to_string())
    }
}

impl From<String> for ClassFilter {
    fn from(name: String) -> Self {
        ClassFilter::Name(name)
    }
}

impl From<Option<&str>> for ClassFilter {
    fn from(name: Option<&str>) -> Self {
        name.map_or(ClassFilter::All, ClassFilter::from)
    }
}

/// Closed mapping from type name to [`ClassEntry`].
///
/// Entries keep their registration order, which is also the order backends
/// visit types in when no filter is given.
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    entries: Vec<ClassEntry>,
    names: HashMap<&'static str, usize>,
}

impl ClassRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry holding every reference model.
    pub fn standard() -> Self {
        let mut registry = ClassRegistry::new();
        // Built-in names and tables are distinct and valid.
        registry.insert(ClassEntry::of::<BaseModel>());
        registry.insert(ClassEntry::of::<Amenity>());
        registry.insert(ClassEntry::of::<City>());
        registry.insert(ClassEntry::of::<Place>());
        registry.insert(ClassEntry::of::<Review>());
        registry.insert(ClassEntry::of::<State>());
        registry.insert(ClassEntry::of::<User>());
        registry
    }

    /// Registers the model type `M`.
    ///
    /// Returns an error if the name is taken or the table name is not a plain
    /// identifier (it is interpolated into DDL).
    pub fn register<M: Model>(&mut self) -> Result<(), CoreError> {
        if self.names.contains_key(M::TYPE_NAME) {
            return Err(CoreError::DuplicateTypeName {
                name: M::TYPE_NAME.to_string(),
            });
        }
        if !is_identifier(M::TABLE) {
            return Err(CoreError::InvalidTableName {
                table: M::TABLE.to_string(),
            });
        }
        self.insert(ClassEntry::of::<M>());
        Ok(())
    }

    fn insert(&mut self, entry: ClassEntry) {
        self.names.insert(entry.name, self.entries.len());
        self.entries.push(entry);
    }

    /// Looks up a type by name.
    pub fn resolve(&self, name: &str) -> Result<&ClassEntry, CoreError> {
        self.names
            .get(name)
            .map(|&index| &self.entries[index])
            .ok_or_else(|| CoreError::UnknownType {
                name: name.to_string(),
            })
    }

    /// Looks up a type by its Rust type.
    pub fn resolve_type<M: Model>(&self) -> Result<&ClassEntry, CoreError> {
        self.resolve_type_id(TypeId::of::<M>(), M::TYPE_NAME)
    }

    fn resolve_type_id(&self, type_id: TypeId, name: &str) -> Result<&ClassEntry, CoreError> {
        self.entries
            .iter()
            .find(|entry| entry.type_id == type_id)
            .ok_or_else(|| CoreError::UnknownType {
                name: name.to_string(),
            })
    }

    /// Resolves the entry an entity belongs to, checking that the registered
    /// type under its name really is its Rust type.
    pub fn entry_for(&self, entity: &dyn Entity) -> Result<&ClassEntry, CoreError> {
        let entry = self.resolve(entity.type_name())?;
        if entry.matches(entity) {
            Ok(entry)
        } else {
            Err(CoreError::UnknownType {
                name: entity.type_name().to_string(),
            })
        }
    }

    /// Normalizes a class filter: `None` for "all types", otherwise the single
    /// matching entry.
    pub fn normalize(&self, filter: &ClassFilter) -> Result<Option<&ClassEntry>, CoreError> {
        match filter {
            ClassFilter::All => Ok(None),
            ClassFilter::Name(name) => self.resolve(name).map(Some),
            ClassFilter::Type { type_id, name } => self.resolve_type_id(*type_id, name).map(Some),
        }
    }

    /// Rebuilds an entity from an attribute mapping tagged with `__class__`.
    pub fn construct(&self, attributes: Attributes) -> Result<EntityRef, CoreError> {
        let entry = match attributes.get(CLASS_KEY) {
            Some(Value::String(name)) => self.resolve(name)?,
            Some(other) => {
                return Err(CoreError::UnknownType {
                    name: other.to_string(),
                })
            }
            None => return Err(CoreError::MissingClass),
        };
        entry.construct(attributes)
    }

    /// All entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &ClassEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_identifier(table: &str) -> bool {
    !table.is_empty() && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Base;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Bogus {
        #[serde(flatten)]
        base: Base,
    }

    impl Model for Bogus {
        const TYPE_NAME: &'static str = "Bogus";
        const TABLE: &'static str = "bogus; DROP TABLE users";

        fn base(&self) -> &Base {
            &self.base
        }

        fn base_mut(&mut self) -> &mut Base {
            &mut self.base
        }
    }

    #[test]
    fn standard_registry_has_all_models() {
        let registry = ClassRegistry::standard();
        let names: Vec<_> = registry.entries().map(ClassEntry::name).collect();
        assert_eq!(
            names,
            ["BaseModel", "Amenity", "City", "Place", "Review", "State", "User"]
        );
        assert_eq!(registry.resolve("City").unwrap().table(), "cities");
    }

    #[test]
    fn resolve_unknown_type_is_an_error() {
        let registry = ClassRegistry::standard();
        let err = registry.resolve("Nonexistent").unwrap_err();
        assert!(matches!(err, CoreError::UnknownType { ref name } if name == "Nonexistent"));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = ClassRegistry::standard();
        let err = registry.register::<User>().unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTypeName { .. }));
    }

    #[test]
    fn unsafe_table_name_rejected() {
        let mut registry = ClassRegistry::new();
        let err = registry.register::<Bogus>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidTableName { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn normalize_accepts_name_type_and_absent() {
        let registry = ClassRegistry::standard();
        assert!(registry.normalize(&ClassFilter::All).unwrap().is_none());
        let by_name = registry.normalize(&"State".into()).unwrap().unwrap();
        let by_type = registry.normalize(&ClassFilter::of::<State>()).unwrap().unwrap();
        assert_eq!(by_name.name(), by_type.name());
        assert_eq!(ClassFilter::from(None), ClassFilter::All);
    }

    #[test]
    fn normalize_unregistered_type_is_an_error() {
        let mut registry = ClassRegistry::new();
        registry.register::<User>().unwrap();
        let err = registry.normalize(&ClassFilter::of::<State>()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownType { ref name } if name == "State"));
    }

    #[test]
    fn construct_dispatches_on_class_attribute() {
        let registry = ClassRegistry::standard();
        let city = City {
            name: "Fresno".into(),
            ..Default::default()
        };
        let rebuilt = registry.construct(city.to_attributes().unwrap()).unwrap();
        assert_eq!(rebuilt.type_name(), "City");
        assert_eq!(rebuilt.downcast_ref::<City>(), Some(&city));
    }

    #[test]
    fn construct_reports_missing_or_unknown_class() {
        let registry = ClassRegistry::standard();
        let mut attrs = BaseModel::default().to_attributes().unwrap();
        attrs.remove(CLASS_KEY);
        assert!(matches!(
            registry.construct(attrs.clone()),
            Err(CoreError::MissingClass)
        ));

        attrs.insert(CLASS_KEY.into(), Value::String("Ghost".into()));
        assert!(matches!(
            registry.construct(attrs),
            Err(CoreError::UnknownType { ref name }) if name == "Ghost"
        ));
    }

    #[test]
    fn entry_rejects_foreign_class_tag() {
        let registry = ClassRegistry::standard();
        let attrs = State::default().to_attributes().unwrap();
        let err = registry.resolve("City").unwrap().construct(attrs).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRecord { .. }));
    }

    #[test]
    fn instantiate_overlays_attributes_on_defaults() {
        let registry = ClassRegistry::standard();
        let mut overrides = Attributes::new();
        overrides.insert("name".into(), Value::String("Wifi".into()));
        let entity = registry.resolve("Amenity").unwrap().instantiate(overrides).unwrap();
        let amenity = entity.downcast_ref::<Amenity>().unwrap();
        assert_eq!(amenity.name, "Wifi");
        assert!(!amenity.base.id.is_empty());
    }

    #[test]
    fn revise_applies_changes_and_touches() {
        let registry = ClassRegistry::standard();
        let original = State {
            name: "Texas".into(),
            ..Default::default()
        };
        let mut changes = Attributes::new();
        changes.insert("name".into(), Value::String("Ohio".into()));

        let entry = registry.resolve("State").unwrap();
        let revised = entry.revise(&original, changes).unwrap();
        let state = revised.downcast_ref::<State>().unwrap();
        assert_eq!(state.name, "Ohio");
        assert_eq!(state.base.id, original.base.id);
        assert_eq!(state.base.created_at, original.base.created_at);
        assert!(state.base.updated_at >= original.base.updated_at);

        let err = registry
            .resolve("City")
            .unwrap()
            .revise(&original, Attributes::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRecord { .. }));
    }

    #[test]
    fn revise_rejects_identity_and_undeclared_attributes() {
        let registry = ClassRegistry::standard();
        let entry = registry.resolve("State").unwrap();
        let original = State::default();

        let mut changes = Attributes::new();
        changes.insert("id".into(), Value::String("hijacked".into()));
        let err = entry.revise(&original, changes).unwrap_err();
        assert!(matches!(err, CoreError::ReadOnlyAttribute { ref name, .. } if name == "id"));

        let mut changes = Attributes::new();
        changes.insert("population".into(), Value::from(29_000_000));
        let err = entry.revise(&original, changes).unwrap_err();
        assert!(matches!(err, CoreError::UnknownAttribute { ref name, .. } if name == "population"));
    }

    #[test]
    fn instantiate_rejects_undeclared_attributes() {
        let registry = ClassRegistry::standard();
        let mut overrides = Attributes::new();
        overrides.insert("nmae".into(), Value::String("Texas".into()));
        let err = registry.resolve("State").unwrap().instantiate(overrides).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnknownAttribute { ref type_name, ref name }
                if type_name == "State" && name == "nmae"
        ));
    }

    #[test]
    fn defaults_list_every_declared_attribute() {
        let registry = ClassRegistry::standard();
        let defaults = registry.resolve("User").unwrap().defaults().unwrap();
        for name in ["id", "created_at", "updated_at", "email", "first_name", CLASS_KEY] {
            assert!(defaults.contains_key(name), "{name}");
        }
    }
}
