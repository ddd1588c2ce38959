//! Runtime type information for values.
//!
//! The interpreter needs two answers about an object: its declared type name
//! and every type it inherits from. How an object declares its type is the
//! embedding application's business, so the lookup sits behind a trait.

use std::collections::{BTreeSet, HashMap};

use crate::value::Value;

/// Maps a runtime value to its declared type name and supertypes.
pub trait TypeProvider: Send + Sync {
    /// Declared type name, if the value has one.
    fn type_of(&self, value: &Value) -> Option<String>;

    /// Every supertype name of the value's type, transitively. Does not
    /// include the type itself.
    fn inherited_types_of(&self, value: &Value) -> BTreeSet<String>;
}

/// Type name reported for scalar values.
pub fn primitive_type_name(value: &Value) -> Option<&'static str> {
    match value {
        Value::Null | Value::Entity(_) => None,
        Value::Boolean(_) => Some("Boolean"),
        Value::Integer(_) => Some("Integer"),
        Value::Decimal(_) => Some("Decimal"),
        Value::Money(_) => Some("Money"),
        Value::Text(_) => Some("String"),
        Value::Date(_) => Some("Date"),
        Value::DateTime(_) => Some("DateTime"),
        Value::Collection(_) => Some("Collection"),
        Value::Map(_) => Some("Map"),
    }
}

/// Table driven provider: entities report their own type tag, supertypes come
/// from a registered inheritance table.
#[derive(Debug, Clone, Default)]
pub struct StaticTypeProvider {
    parents: HashMap<String, Vec<String>>,
}

impl StaticTypeProvider {
    /// Provider without inheritance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the direct parents of a type.
    pub fn with_type<I, S>(mut self, name: impl Into<String>, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents
            .insert(name.into(), parents.into_iter().map(Into::into).collect());
        self
    }

    /// Transitive supertypes of a type name. Cycles in the table are tolerated.
    pub fn supertypes_of(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<&str> = vec![name];
        while let Some(current) = pending.pop() {
            for parent in self.parents.get(current).into_iter().flatten() {
                if parent != name && seen.insert(parent.clone()) {
                    pending.push(parent);
                }
            }
        }
        seen
    }
}

impl TypeProvider for StaticTypeProvider {
    fn type_of(&self, value: &Value) -> Option<String> {
        match value {
            Value::Entity(entity) => Some(entity.type_name().to_string()),
            other => primitive_type_name(other).map(str::to_string),
        }
    }

    fn inherited_types_of(&self, value: &Value) -> BTreeSet<String> {
        match value {
            Value::Entity(entity) => self.supertypes_of(entity.type_name()),
            Value::Integer(_) | Value::Decimal(_) => BTreeSet::from(["Number".to_string()]),
            _ => BTreeSet::new(),
        }
    }
}
