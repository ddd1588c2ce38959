//! The static type model.
//!
//! Types live in a [`TypeTable`] keyed by name. Supertypes and entity types
//! embedded in symbols are stored as names and resolved through a
//! [`TypeResolver`] when needed, so mutually referencing context definitions
//! never form ownership cycles.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;

use crate::symbol::VariableSymbol;

/// Name of the universal type.
pub const ANY: &str = "Any";
/// Name of the type of expressions that could not be typed.
pub const UNKNOWN: &str = "Unknown";
/// Boolean primitive.
pub const BOOLEAN: &str = "Boolean";
/// Any number; supertype of [`INTEGER`] and [`DECIMAL`].
pub const NUMBER: &str = "Number";
/// Whole numbers.
pub const INTEGER: &str = "Integer";
/// Exact decimals.
pub const DECIMAL: &str = "Decimal";
/// Amount with currency.
pub const MONEY: &str = "Money";
/// Text.
pub const STRING: &str = "String";
/// Calendar date.
pub const DATE: &str = "Date";
/// Date and time of day.
pub const DATETIME: &str = "DateTime";

/// Structural kind of a [`Type`].
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// Built-in scalar
    Primitive,
    /// Context definition, external context or other named object type
    Entity,
    /// Collection of the element type
    Array(Arc<Type>),
    /// Either of two types
    Union(Arc<Type>, Arc<Type>),
    /// Type parameter of a generic function, optionally bounded
    Generic {
        /// Upper bound, `None` for an unbounded parameter
        bound: Option<Arc<Type>>,
    },
    /// Universal type, no static checking
    Any,
    /// Type of an expression that failed to type
    Unknown,
}

/// A named type with its directly declared properties.
#[derive(Debug, Clone)]
pub struct Type {
    name: Arc<str>,
    kind: TypeKind,
    properties: HashMap<String, VariableSymbol>,
    supertypes: Vec<Arc<str>>,
    reference: bool,
}

macro_rules! builtin {
    ($id:ident, $name:expr, $kind:expr) => {
        static $id: LazyLock<Arc<Type>> =
            LazyLock::new(|| Arc::new(Type::special($name, $kind, &[])));
    };
    ($id:ident, $name:expr, $kind:expr, $($parent:expr),+) => {
        static $id: LazyLock<Arc<Type>> =
            LazyLock::new(|| Arc::new(Type::special($name, $kind, &[$($parent),+])));
    };
}

builtin!(ANY_TYPE, ANY, TypeKind::Any);
builtin!(UNKNOWN_TYPE, UNKNOWN, TypeKind::Unknown);
builtin!(BOOLEAN_TYPE, BOOLEAN, TypeKind::Primitive);
builtin!(NUMBER_TYPE, NUMBER, TypeKind::Primitive);
builtin!(INTEGER_TYPE, INTEGER, TypeKind::Primitive, NUMBER);
builtin!(DECIMAL_TYPE, DECIMAL, TypeKind::Primitive, NUMBER);
builtin!(MONEY_TYPE, MONEY, TypeKind::Primitive);
builtin!(STRING_TYPE, STRING, TypeKind::Primitive);
builtin!(DATE_TYPE, DATE, TypeKind::Primitive);
builtin!(DATETIME_TYPE, DATETIME, TypeKind::Primitive);

impl Type {
    fn special(name: &str, kind: TypeKind, parents: &[&str]) -> Self {
        Self {
            name: Arc::from(name),
            kind,
            properties: HashMap::new(),
            supertypes: parents.iter().map(|p| Arc::from(*p)).collect(),
            reference: false,
        }
    }

    // ==================== Built-in types ====================

    /// The universal type.
    pub fn any() -> Arc<Type> {
        Arc::clone(&ANY_TYPE)
    }

    /// The type of untypeable expressions.
    pub fn unknown() -> Arc<Type> {
        Arc::clone(&UNKNOWN_TYPE)
    }

    /// `Boolean`
    pub fn boolean() -> Arc<Type> {
        Arc::clone(&BOOLEAN_TYPE)
    }

    /// `Number`
    pub fn number() -> Arc<Type> {
        Arc::clone(&NUMBER_TYPE)
    }

    /// `Integer`
    pub fn integer() -> Arc<Type> {
        Arc::clone(&INTEGER_TYPE)
    }

    /// `Decimal`
    pub fn decimal() -> Arc<Type> {
        Arc::clone(&DECIMAL_TYPE)
    }

    /// `Money`
    pub fn money() -> Arc<Type> {
        Arc::clone(&MONEY_TYPE)
    }

    /// `String`
    pub fn string() -> Arc<Type> {
        Arc::clone(&STRING_TYPE)
    }

    /// `Date`
    pub fn date() -> Arc<Type> {
        Arc::clone(&DATE_TYPE)
    }

    /// `DateTime`
    pub fn datetime() -> Arc<Type> {
        Arc::clone(&DATETIME_TYPE)
    }

    /// Every built-in type.
    pub fn builtins() -> [Arc<Type>; 10] {
        [
            Self::any(),
            Self::unknown(),
            Self::boolean(),
            Self::number(),
            Self::integer(),
            Self::decimal(),
            Self::money(),
            Self::string(),
            Self::date(),
            Self::datetime(),
        ]
    }

    /// Built-in type by name.
    pub fn builtin(name: &str) -> Option<Arc<Type>> {
        Some(match name {
            ANY => Self::any(),
            UNKNOWN => Self::unknown(),
            BOOLEAN => Self::boolean(),
            NUMBER => Self::number(),
            INTEGER => Self::integer(),
            DECIMAL => Self::decimal(),
            MONEY => Self::money(),
            STRING => Self::string(),
            DATE => Self::date(),
            DATETIME => Self::datetime(),
            _ => return None,
        })
    }

    // ==================== Construction ====================

    /// Entity type with its own properties and the names of its supertypes.
    pub fn entity<P, S>(name: impl AsRef<str>, properties: P, supertypes: S) -> Arc<Type>
    where
        P: IntoIterator<Item = VariableSymbol>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        Arc::new(Self {
            name: Arc::from(name.as_ref()),
            kind: TypeKind::Entity,
            properties: properties
                .into_iter()
                .map(|symbol| (symbol.name().to_string(), symbol))
                .collect(),
            supertypes: supertypes
                .into_iter()
                .map(|s| Arc::from(s.as_ref()))
                .collect(),
            reference: false,
        })
    }

    /// Entity type known only by name; properties and supertypes come from
    /// the resolver when the type is used.
    pub fn reference(name: impl AsRef<str>) -> Arc<Type> {
        Arc::new(Self {
            name: Arc::from(name.as_ref()),
            kind: TypeKind::Entity,
            properties: HashMap::new(),
            supertypes: Vec::new(),
            reference: true,
        })
    }

    /// Collection of `element`.
    pub fn array(element: Arc<Type>) -> Arc<Type> {
        let name = if element.is_union() {
            format!("({})[]", element.name)
        } else {
            format!("{}[]", element.name)
        };
        Arc::new(Self {
            name: Arc::from(name),
            kind: TypeKind::Array(element),
            properties: HashMap::new(),
            supertypes: Vec::new(),
            reference: false,
        })
    }

    /// Either `left` or `right`.
    pub fn union(left: Arc<Type>, right: Arc<Type>) -> Arc<Type> {
        Arc::new(Self {
            name: Arc::from(format!("{} | {}", left.name, right.name)),
            kind: TypeKind::Union(left, right),
            properties: HashMap::new(),
            supertypes: Vec::new(),
            reference: false,
        })
    }

    /// Generic type parameter.
    pub fn generic(name: impl AsRef<str>, bound: Option<Arc<Type>>) -> Arc<Type> {
        Arc::new(Self {
            name: Arc::from(name.as_ref()),
            kind: TypeKind::Generic { bound },
            properties: HashMap::new(),
            supertypes: Vec::new(),
            reference: false,
        })
    }

    /// `T | T[]`, the type of a reference that may be single or multiple.
    pub fn single_or_multiple(self: &Arc<Self>) -> Arc<Type> {
        if self.is_dynamic() {
            return Arc::clone(self);
        }
        Self::union(Arc::clone(self), Self::array(Arc::clone(self)))
    }

    // ==================== Accessors ====================

    /// Type name. Arrays and unions have structural names (`T[]`, `A | B`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Structural kind.
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Directly declared properties.
    pub fn properties(&self) -> impl Iterator<Item = &VariableSymbol> {
        self.properties.values()
    }

    /// Directly declared property by name.
    pub fn own_property(&self, name: &str) -> Option<&VariableSymbol> {
        self.properties.get(name)
    }

    /// Names of the direct supertypes.
    pub fn supertypes(&self) -> &[Arc<str>] {
        &self.supertypes
    }

    /// Whether this is a by-name entity reference.
    pub fn is_reference(&self) -> bool {
        self.reference
    }

    /// Built-in scalar.
    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive)
    }

    /// Collection type.
    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array(_))
    }

    /// Union type.
    pub fn is_union(&self) -> bool {
        matches!(self.kind, TypeKind::Union(..))
    }

    /// Generic type parameter.
    pub fn is_generic(&self) -> bool {
        matches!(self.kind, TypeKind::Generic { .. })
    }

    /// `Any` or `Unknown`: nothing can be checked statically.
    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, TypeKind::Any | TypeKind::Unknown)
    }

    /// Whether values of this type are numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self.name(), NUMBER | INTEGER | DECIMAL)
    }

    /// Element type of an array.
    pub fn element_type(&self) -> Option<&Arc<Type>> {
        match &self.kind {
            TypeKind::Array(element) => Some(element),
            _ => None,
        }
    }

    /// The type a single element has once collections are flattened:
    /// `T[]` and `T | T[]` give `T`, everything else is returned unchanged.
    pub fn unwrap_array(self: &Arc<Self>) -> Arc<Type> {
        match &self.kind {
            TypeKind::Array(element) => element.unwrap_array(),
            TypeKind::Union(left, right) => {
                let left = left.unwrap_array();
                let right = right.unwrap_array();
                if left == right { left } else { Self::any() }
            }
            _ => Arc::clone(self),
        }
    }

    /// Whether values of this type may be collections.
    pub fn may_be_collection(&self) -> bool {
        match &self.kind {
            TypeKind::Array(_) | TypeKind::Any | TypeKind::Unknown => true,
            TypeKind::Union(left, right) => left.may_be_collection() || right.may_be_collection(),
            TypeKind::Generic { bound } => bound.as_ref().is_none_or(|b| b.may_be_collection()),
            _ => false,
        }
    }

    // ==================== Resolution ====================

    fn expand(&self, resolver: &dyn TypeResolver) -> Option<Arc<Type>> {
        if !self.reference {
            return None;
        }
        resolver
            .resolve_type(&self.name)
            .filter(|full| !full.reference)
    }

    /// Find a property on this type or, breadth first, on its supertypes.
    pub fn resolve_property(
        &self,
        name: &str,
        resolver: &dyn TypeResolver,
    ) -> Option<VariableSymbol> {
        if let Some(full) = self.expand(resolver) {
            return full.resolve_property(name, resolver);
        }
        if let Some(symbol) = self.properties.get(name) {
            return Some(symbol.clone());
        }
        self.all_supertypes(resolver)
            .into_iter()
            .find_map(|parent| parent.properties.get(name).cloned())
    }

    /// Every property visible on this type, own properties shadowing inherited ones.
    pub fn all_properties(&self, resolver: &dyn TypeResolver) -> IndexMap<String, VariableSymbol> {
        if let Some(full) = self.expand(resolver) {
            return full.all_properties(resolver);
        }
        let mut merged: IndexMap<String, VariableSymbol> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for parent in self.all_supertypes(resolver) {
            for (name, symbol) in &parent.properties {
                merged.entry(name.clone()).or_insert_with(|| symbol.clone());
            }
        }
        merged
    }

    /// Transitive supertypes, nearest first. Cycles are cut at the first
    /// repeated name and unresolvable names are skipped.
    pub fn all_supertypes(&self, resolver: &dyn TypeResolver) -> Vec<Arc<Type>> {
        if let Some(full) = self.expand(resolver) {
            return full.all_supertypes(resolver);
        }
        let mut seen: HashSet<Arc<str>> = HashSet::from([Arc::clone(&self.name)]);
        let mut queue: VecDeque<Arc<str>> = self.supertypes.iter().cloned().collect();
        let mut result = Vec::new();
        while let Some(name) = queue.pop_front() {
            if !seen.insert(Arc::clone(&name)) {
                continue;
            }
            let Some(parent) = resolver
                .resolve_type(&name)
                .or_else(|| Self::builtin(&name))
            else {
                continue;
            };
            queue.extend(parent.supertypes.iter().cloned());
            result.push(parent);
        }
        result
    }

    /// Whether a value of type `other` can be used where `self` is expected.
    pub fn is_assignable_from(&self, other: &Type, resolver: &dyn TypeResolver) -> bool {
        if self.is_dynamic() || other.is_dynamic() {
            return true;
        }
        match (&self.kind, &other.kind) {
            (TypeKind::Generic { bound }, _) => bound
                .as_ref()
                .is_none_or(|bound| bound.is_assignable_from(other, resolver)),
            (_, TypeKind::Generic { bound }) => bound
                .as_ref()
                .is_none_or(|bound| self.is_assignable_from(bound, resolver)),
            (_, TypeKind::Union(left, right)) => {
                self.is_assignable_from(left, resolver) && self.is_assignable_from(right, resolver)
            }
            (TypeKind::Union(left, right), _) => {
                left.is_assignable_from(other, resolver) || right.is_assignable_from(other, resolver)
            }
            (TypeKind::Array(target), TypeKind::Array(source)) => {
                target.is_assignable_from(source, resolver)
            }
            (TypeKind::Array(_), _) | (_, TypeKind::Array(_)) => false,
            _ => {
                self.name == other.name
                    || other
                        .all_supertypes(resolver)
                        .iter()
                        .any(|parent| parent.name == self.name)
            }
        }
    }

    // ==================== Generics ====================

    /// Replace bound type parameters; unbound parameters fall back to their bound.
    pub fn rewrite_generics(self: &Arc<Self>, bindings: &HashMap<String, Arc<Type>>) -> Arc<Type> {
        match &self.kind {
            TypeKind::Generic { bound } => bindings
                .get(self.name())
                .cloned()
                .or_else(|| bound.clone())
                .unwrap_or_else(Self::any),
            TypeKind::Array(element) => Self::array(element.rewrite_generics(bindings)),
            TypeKind::Union(left, right) => Self::union(
                left.rewrite_generics(bindings),
                right.rewrite_generics(bindings),
            ),
            _ => Arc::clone(self),
        }
    }

    /// The type with every parameter replaced by its bound (or `Any`).
    pub fn bounded(self: &Arc<Self>) -> Arc<Type> {
        self.rewrite_generics(&HashMap::new())
    }

    /// Unify a declared parameter type against an actual argument type,
    /// recording what each type parameter stands for. A parameter seen twice
    /// with different types widens to the more general one, or to `Any` when
    /// neither is assignable to the other.
    pub fn unify(
        declared: &Type,
        actual: &Arc<Type>,
        bindings: &mut HashMap<String, Arc<Type>>,
        resolver: &dyn TypeResolver,
    ) {
        match &declared.kind {
            TypeKind::Generic { .. } => {
                let widened = match bindings.get(declared.name()) {
                    None => Arc::clone(actual),
                    Some(existing) if existing.is_assignable_from(actual, resolver) => {
                        Arc::clone(existing)
                    }
                    Some(existing) if actual.is_assignable_from(existing, resolver) => {
                        Arc::clone(actual)
                    }
                    Some(_) => Self::any(),
                };
                bindings.insert(declared.name().to_string(), widened);
            }
            TypeKind::Array(element) => {
                if let TypeKind::Array(actual_element) = &actual.kind {
                    Self::unify(element, actual_element, bindings, resolver);
                } else if actual.is_union() {
                    Self::unify(element, &actual.unwrap_array(), bindings, resolver);
                }
            }
            TypeKind::Union(left, right) => {
                let (collection, single) = if left.is_array() {
                    (left, right)
                } else {
                    (right, left)
                };
                if actual.is_array() {
                    Self::unify(collection, actual, bindings, resolver);
                } else {
                    Self::unify(single, &actual.unwrap_array(), bindings, resolver);
                }
            }
            _ => {}
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (TypeKind::Array(a), TypeKind::Array(b)) => a == b,
            (TypeKind::Union(a1, b1), TypeKind::Union(a2, b2)) => a1 == a2 && b1 == b2,
            (TypeKind::Generic { bound: a }, TypeKind::Generic { bound: b }) => {
                self.name == other.name && a == b
            }
            (TypeKind::Array(_) | TypeKind::Union(..), _)
            | (_, TypeKind::Array(_) | TypeKind::Union(..)) => false,
            _ => self.name == other.name,
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Resolves type names to types.
pub trait TypeResolver {
    /// Type registered under `name`.
    fn resolve_type(&self, name: &str) -> Option<Arc<Type>>;
}

impl TypeResolver for HashMap<String, Arc<Type>> {
    fn resolve_type(&self, name: &str) -> Option<Arc<Type>> {
        self.get(name).cloned().or_else(|| Type::builtin(name))
    }
}

/// Arena of types keyed by name.
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: IndexMap<String, Arc<Type>>,
}

impl TypeTable {
    /// Table holding the built-in types.
    pub fn new() -> Self {
        Self {
            types: Type::builtins()
                .into_iter()
                .map(|ty| (ty.name().to_string(), ty))
                .collect(),
        }
    }

    /// Register a type under its own name.
    pub fn insert(&mut self, ty: Arc<Type>) {
        self.types.insert(ty.name().to_string(), ty);
    }

    /// Register a type under an alias, as done for untyped contexts.
    pub fn insert_as(&mut self, name: impl Into<String>, ty: Arc<Type>) {
        self.types.insert(name.into(), ty);
    }

    /// Type registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<Type>> {
        self.types.get(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// All registered types, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Type>)> {
        self.types.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeResolver for TypeTable {
    fn resolve_type(&self, name: &str) -> Option<Arc<Type>> {
        self.types.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> TypeTable {
        let mut table = TypeTable::new();
        table.insert(Type::entity(
            "Policy",
            [VariableSymbol::new("policyNumber", Type::string())],
            ["Root"],
        ));
        table.insert(Type::entity(
            "AutoPolicy",
            [VariableSymbol::new("vehicles", Type::array(Type::reference("Vehicle")))],
            ["Policy"],
        ));
        table.insert(Type::entity(
            "Root",
            [VariableSymbol::new("id", Type::string())],
            ["AutoPolicy"],
        ));
        table
    }

    #[test]
    fn properties_resolve_through_cyclic_supertypes() {
        let table = table();
        let auto = table.get("AutoPolicy").unwrap();

        assert_eq!(
            auto.resolve_property("policyNumber", &table).unwrap().ty().name(),
            STRING
        );
        assert_eq!(auto.resolve_property("id", &table).unwrap().ty().name(), STRING);
        assert!(auto.resolve_property("missing", &table).is_none());
        assert_eq!(auto.all_supertypes(&table).len(), 2);
    }

    #[test]
    fn references_expand_through_the_table() {
        let table = table();
        let reference = Type::reference("AutoPolicy");
        assert!(reference.resolve_property("vehicles", &table).is_some());
        assert_eq!(reference.as_ref(), table.get("AutoPolicy").unwrap().as_ref());
    }

    #[test]
    fn structural_equality_for_arrays_and_unions() {
        assert_eq!(Type::array(Type::string()), Type::array(Type::string()));
        assert_ne!(Type::array(Type::string()), Type::array(Type::number()));
        assert_eq!(
            Type::number().single_or_multiple().name(),
            "Number | Number[]"
        );
        assert_eq!(
            Type::array(Type::number().single_or_multiple()).name(),
            "(Number | Number[])[]"
        );
    }

    #[test]
    fn assignability_follows_inheritance() {
        let table = table();
        let policy = table.get("Policy").unwrap();
        let auto = table.get("AutoPolicy").unwrap();

        assert!(policy.is_assignable_from(auto, &table));
        assert!(Type::number().is_assignable_from(&Type::integer(), &table));
        assert!(!Type::integer().is_assignable_from(&Type::number(), &table));
        assert!(!Type::string().is_assignable_from(&Type::array(Type::string()), &table));
        assert!(
            Type::string()
                .single_or_multiple()
                .is_assignable_from(&Type::array(Type::string()), &table)
        );
    }

    #[test]
    fn generics_unify_and_rewrite() {
        let table = TypeTable::new();
        let t = Type::generic("T", Some(Type::number()));
        let declared = Type::array(Arc::clone(&t));
        let mut bindings = HashMap::new();

        Type::unify(&declared, &Type::array(Type::integer()), &mut bindings, &table);
        assert_eq!(t.rewrite_generics(&bindings), Type::integer());

        Type::unify(&t, &Type::decimal(), &mut bindings, &table);
        assert_eq!(t.rewrite_generics(&bindings), Type::any());

        assert_eq!(t.bounded(), Type::number());
        assert_eq!(Type::generic("U", None).bounded(), Type::any());
    }

    #[test]
    fn generics_with_different_bounds_differ() {
        let bounded = Type::generic("T", Some(Type::number()));
        assert_eq!(bounded, Type::generic("T", Some(Type::number())));
        assert_ne!(bounded, Type::generic("T", None));
        assert_ne!(Type::generic("T", None), Type::generic("U", None));
    }

    #[test]
    fn unwrap_array_flattens_single_or_multiple() {
        let coverage = Type::reference("Coverage");
        assert_eq!(coverage.single_or_multiple().unwrap_array(), coverage);
        assert_eq!(Type::array(Type::array(Type::string())).unwrap_array(), Type::string());
    }
}
