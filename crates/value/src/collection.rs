//! Collections with a concrete kind.

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// The concrete representation of a collection.
///
/// The interpreter treats every kind the same way; the distinction only
/// matters to the coercer, which supports a fixed set of target kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Ordered, duplicates allowed
    List,
    /// Hash-based set, order irrelevant
    Set,
    /// FIFO queue
    Queue,
    /// Insertion-ordered set
    OrderedSet,
    /// Any other host collection, identified by name
    Custom(Arc<str>),
}

impl CollectionKind {
    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        match self {
            Self::List => "List",
            Self::Set => "Set",
            Self::Queue => "Queue",
            Self::OrderedSet => "OrderedSet",
            Self::Custom(name) => name,
        }
    }

    /// Kinds that never hold the same element twice.
    pub fn is_unique(&self) -> bool {
        matches!(self, Self::Set | Self::OrderedSet)
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A materialized, finite collection of values.
#[derive(Debug, Clone)]
pub struct Collection {
    kind: CollectionKind,
    items: Vec<Value>,
}

impl Collection {
    /// Build a collection of the given kind. Unique kinds drop duplicates,
    /// keeping the first occurrence.
    pub fn new(kind: CollectionKind, items: impl IntoIterator<Item = Value>) -> Self {
        let items = if kind.is_unique() {
            let mut unique: Vec<Value> = Vec::new();
            for item in items {
                if !unique.contains(&item) {
                    unique.push(item);
                }
            }
            unique
        } else {
            items.into_iter().collect()
        };
        Self { kind, items }
    }

    /// Ordered list.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::new(CollectionKind::List, items)
    }

    /// Empty list.
    pub fn empty() -> Self {
        Self {
            kind: CollectionKind::List,
            items: Vec::new(),
        }
    }

    /// The concrete kind.
    pub fn kind(&self) -> &CollectionKind {
        &self.kind
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Element at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Iterate over the elements in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// Borrow the elements.
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Take the elements.
    pub fn into_items(self) -> Vec<Value> {
        self.items
    }

    /// Whether some element equals `value`.
    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains(value)
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        if self.items.len() != other.items.len() {
            return false;
        }
        if self.kind == CollectionKind::Set || other.kind == CollectionKind::Set {
            return self.items.iter().all(|item| other.items.contains(item));
        }
        self.items == other.items
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Value> for Collection {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Self::list(iter)
    }
}
