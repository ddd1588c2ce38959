//! Shared, mutable object handles: domain entities and string-keyed maps.
//!
//! Both are reference types. Cloning a handle never copies the fields, so the
//! interpreter can hand out the same live object many times and the `set`
//! operation writes straight into the caller's object graph.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::value::Value;

/// A domain object: a runtime type tag plus named fields.
pub struct Entity {
    type_name: Arc<str>,
    fields: RwLock<IndexMap<String, Value>>,
}

impl Entity {
    /// The declared type tag; interpretation is up to the [`TypeProvider`](crate::TypeProvider).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// Shared handle to an [`Entity`].
#[derive(Clone)]
pub struct EntityRef(Arc<Entity>);

impl EntityRef {
    /// Create an entity without fields.
    pub fn new(type_name: impl AsRef<str>) -> Self {
        Self(Arc::new(Entity {
            type_name: Arc::from(type_name.as_ref()),
            fields: RwLock::new(IndexMap::new()),
        }))
    }

    /// Builder-style field initialisation.
    pub fn with(self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    /// Type tag of the entity.
    pub fn type_name(&self) -> &str {
        self.0.type_name()
    }

    /// Read a field. Missing fields read as `None`.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.0.fields.read().get(field).cloned()
    }

    /// Whether the field is present.
    pub fn has(&self, field: &str) -> bool {
        self.0.fields.read().contains_key(field)
    }

    /// Write a field in place.
    pub fn set(&self, field: impl Into<String>, value: Value) {
        self.0.fields.write().insert(field.into(), value);
    }

    /// Copy of the current field values.
    pub fn fields(&self) -> IndexMap<String, Value> {
        self.0.fields.read().clone()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

thread_local! {
    static FORMATTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a handle as being formatted on the current thread, so a cyclic
/// object graph prints `<cycle>` instead of recursing forever.
struct FormatGuard(usize);

impl FormatGuard {
    /// `None` when the handle at `address` is already being formatted.
    fn enter(address: usize) -> Option<Self> {
        FORMATTING.with_borrow_mut(|active| {
            if active.contains(&address) {
                None
            } else {
                active.push(address);
                Some(Self(address))
            }
        })
    }
}

impl Drop for FormatGuard {
    fn drop(&mut self) {
        FORMATTING.with_borrow_mut(|active| {
            if let Some(position) = active.iter().rposition(|address| *address == self.0) {
                active.remove(position);
            }
        });
    }
}

const CYCLE: &str = "<cycle>";

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_guard) = FormatGuard::enter(Arc::as_ptr(&self.0).addr()) else {
            return f.write_str(CYCLE);
        };
        f.debug_struct("Entity")
            .field("type", &self.type_name())
            .field("fields", &*self.0.fields.read())
            .finish()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_guard) = FormatGuard::enter(Arc::as_ptr(&self.0).addr()) else {
            return f.write_str(CYCLE);
        };
        write!(f, "{}{{", self.type_name())?;
        for (i, (key, value)) in self.0.fields.read().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}

/// Shared handle to a string-keyed map.
#[derive(Clone, Default)]
pub struct SharedMap(Arc<RwLock<IndexMap<String, Value>>>);

impl SharedMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an entry.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    /// Insert or replace an entry in place.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.0.write().insert(key.into(), value);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Copy of the current entries, in insertion order.
    pub fn entries(&self) -> IndexMap<String, Value> {
        self.0.read().clone()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl FromIterator<(String, Value)> for SharedMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(Arc::new(RwLock::new(iter.into_iter().collect())))
    }
}

impl PartialEq for SharedMap {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let left = self.entries();
        let right = other.entries();
        left.len() == right.len()
            && left
                .iter()
                .all(|(key, value)| right.get(key).is_some_and(|other| other == value))
    }
}

impl fmt::Debug for SharedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_guard) = FormatGuard::enter(Arc::as_ptr(&self.0).addr()) else {
            return f.write_str(CYCLE);
        };
        f.debug_map().entries(self.0.read().iter()).finish()
    }
}

impl fmt::Display for SharedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_guard) = FormatGuard::enter(Arc::as_ptr(&self.0).addr()) else {
            return f.write_str(CYCLE);
        };
        f.write_str("{")?;
        for (i, (key, value)) in self.0.read().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_fields() {
        let policy = EntityRef::new("Policy").with("state", Value::text("CA"));
        let alias = policy.clone();
        alias.set("state", Value::text("NY"));
        assert_eq!(policy.get("state"), Some(Value::text("NY")));
        assert!(policy.ptr_eq(&alias));
    }

    #[test]
    fn map_equality_is_by_content() {
        let a: SharedMap = [("a".to_string(), Value::integer(1))].into_iter().collect();
        let b: SharedMap = [("a".to_string(), Value::integer(1))].into_iter().collect();
        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn display_lists_fields_in_order() {
        let entity = EntityRef::new("Coverage")
            .with("code", Value::text("COLL"))
            .with("limit", Value::integer(5));
        assert_eq!(entity.to_string(), "Coverage{code: COLL, limit: 5}");
    }

    #[test]
    fn cyclic_graphs_format_without_recursing() {
        let policy = EntityRef::new("Policy").with("state", Value::text("CA"));
        let item = EntityRef::new("RiskItem").with("policy", Value::Entity(policy.clone()));
        policy.set("item", Value::Entity(item));
        assert_eq!(
            policy.to_string(),
            "Policy{state: CA, item: RiskItem{policy: <cycle>}}"
        );
        assert!(format!("{policy:?}").contains("<cycle>"));

        let map = SharedMap::new();
        map.insert("self", Value::Map(map.clone()));
        assert_eq!(map.to_string(), "{self: <cycle>}");
    }

    #[test]
    fn shared_values_that_are_not_cyclic_print_in_full() {
        let address = EntityRef::new("Address").with("zip", Value::integer(94105));
        let owner = EntityRef::new("Owner")
            .with("home", Value::Entity(address.clone()))
            .with("mail", Value::Entity(address));
        assert_eq!(
            owner.to_string(),
            "Owner{home: Address{zip: 94105}, mail: Address{zip: 94105}}"
        );
    }
}
