//! Conversion of runtime values to declared parameter and field types.
//!
//! Coercion converts by value, never by parsing: a money amount becomes a
//! number, a decimal truncates to an integer, but the string `"10"` never
//! becomes `10`. A value that already is an instance of the target comes back
//! as the very same value.

use std::fmt;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use verdict_types::{Type, TypeKind};
use verdict_value::{Collection, CollectionKind, SharedMap, TypeProvider, Value};

use crate::error::CoercionError;

/// A type values can be coerced to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetType {
    /// Anything, unchanged
    Any,
    /// `Boolean`
    Boolean,
    /// `Integer`
    Integer,
    /// Exact decimal (`Decimal`, `BigDecimal`)
    Decimal,
    /// Integer or decimal
    Number,
    /// Amount with currency
    Money,
    /// Host monetary amount type; only money values pass
    MonetaryAmount,
    /// `String`
    String,
    /// `Date`
    Date,
    /// `DateTime`
    DateTime,
    /// Binary floating point, never a target
    Float,
    /// Binary floating point, never a target
    Double,
    /// Arbitrary precision integer, never a target
    BigInteger,
    /// Entity of the named type or one of its subtypes
    Entity(Arc<str>),
    /// Collection of the given kind with coerced elements
    Collection {
        /// Target collection kind
        kind: CollectionKind,
        /// Element target
        element: Box<TargetType>,
    },
    /// String-keyed map with coerced values
    Map(Box<TargetType>),
    /// Type parameter; values are checked against the bound
    Generic {
        /// Parameter name
        name: Arc<str>,
        /// Upper bound, `None` accepts anything
        bound: Option<Box<TargetType>>,
    },
    /// First alternative the value is an instance of, else the first that
    /// accepts it
    OneOf(Vec<TargetType>),
}

impl TargetType {
    /// List of `element`.
    pub fn list(element: TargetType) -> Self {
        Self::Collection {
            kind: CollectionKind::List,
            element: Box::new(element),
        }
    }

    /// Target for a static type.
    pub fn from_type(ty: &Type) -> Self {
        match ty.kind() {
            TypeKind::Any | TypeKind::Unknown => Self::Any,
            TypeKind::Array(element) => Self::list(Self::from_type(element)),
            TypeKind::Union(left, right) => {
                Self::OneOf(vec![Self::from_type(left), Self::from_type(right)])
            }
            TypeKind::Generic { bound } => Self::Generic {
                name: Arc::from(ty.name()),
                bound: bound.as_deref().map(|b| Box::new(Self::from_type(b))),
            },
            TypeKind::Primitive => match ty.name() {
                "Boolean" => Self::Boolean,
                "Integer" => Self::Integer,
                "Decimal" => Self::Decimal,
                "Number" => Self::Number,
                "Money" => Self::Money,
                "String" => Self::String,
                "Date" => Self::Date,
                "DateTime" => Self::DateTime,
                _ => Self::Any,
            },
            TypeKind::Entity => Self::Entity(Arc::from(ty.name())),
        }
    }

    /// Target named in a host type system. Unknown names are entity types.
    pub fn named(name: &str) -> Self {
        match name {
            "Object" | "Any" => Self::Any,
            "Boolean" => Self::Boolean,
            "Integer" | "Long" => Self::Integer,
            "Decimal" | "BigDecimal" => Self::Decimal,
            "Number" => Self::Number,
            "Money" => Self::Money,
            "MonetaryAmount" => Self::MonetaryAmount,
            "String" => Self::String,
            "Date" | "LocalDate" => Self::Date,
            "DateTime" | "LocalDateTime" => Self::DateTime,
            "Float" => Self::Float,
            "Double" => Self::Double,
            "BigInteger" => Self::BigInteger,
            other => Self::Entity(Arc::from(other)),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Boolean => f.write_str("Boolean"),
            Self::Integer => f.write_str("Integer"),
            Self::Decimal => f.write_str("Decimal"),
            Self::Number => f.write_str("Number"),
            Self::Money => f.write_str("Money"),
            Self::MonetaryAmount => f.write_str("MonetaryAmount"),
            Self::String => f.write_str("String"),
            Self::Date => f.write_str("Date"),
            Self::DateTime => f.write_str("DateTime"),
            Self::Float => f.write_str("Float"),
            Self::Double => f.write_str("Double"),
            Self::BigInteger => f.write_str("BigInteger"),
            Self::Entity(name) => f.write_str(name),
            Self::Collection { kind, element } => write!(f, "{kind}<{element}>"),
            Self::Map(value) => write!(f, "Map<String, {value}>"),
            Self::Generic { name, .. } => f.write_str(name),
            Self::OneOf(alternatives) => {
                for (i, alternative) in alternatives.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{alternative}")?;
                }
                Ok(())
            }
        }
    }
}

/// Converts values to [`TargetType`]s.
#[derive(Clone, Copy)]
pub struct Coercer<'a> {
    types: &'a dyn TypeProvider,
}

impl fmt::Debug for Coercer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coercer").finish_non_exhaustive()
    }
}

impl<'a> Coercer<'a> {
    /// Coercer using `types` for entity type checks.
    pub fn new(types: &'a dyn TypeProvider) -> Self {
        Self { types }
    }

    /// Whether `value` is already an instance of `target`. `null` is an
    /// instance of nothing.
    pub fn is_instance(&self, value: &Value, target: &TargetType) -> bool {
        match (target, value) {
            (_, Value::Null) => false,
            (TargetType::Any, _)
            | (TargetType::Boolean, Value::Boolean(_))
            | (TargetType::Integer, Value::Integer(_))
            | (TargetType::Decimal, Value::Decimal(_))
            | (TargetType::Number, Value::Integer(_) | Value::Decimal(_))
            | (TargetType::Money | TargetType::MonetaryAmount, Value::Money(_))
            | (TargetType::String, Value::Text(_))
            | (TargetType::Date, Value::Date(_))
            | (TargetType::DateTime, Value::DateTime(_)) => true,
            (TargetType::Entity(name), Value::Entity(_)) => self.is_entity_of(value, name),
            (TargetType::Collection { kind, element }, Value::Collection(collection)) => {
                collection.kind() == kind
                    && collection
                        .iter()
                        .all(|item| item.is_null() || self.is_instance(item, element))
            }
            (TargetType::Map(element), Value::Map(map)) => map
                .entries()
                .values()
                .all(|item| item.is_null() || self.is_instance(item, element)),
            (TargetType::Generic { bound, .. }, _) => bound
                .as_deref()
                .is_none_or(|bound| self.is_instance(value, bound)),
            (TargetType::OneOf(alternatives), _) => alternatives
                .iter()
                .any(|alternative| self.is_instance(value, alternative)),
            _ => false,
        }
    }

    fn is_entity_of(&self, value: &Value, name: &str) -> bool {
        self.types.type_of(value).as_deref() == Some(name)
            || self.types.inherited_types_of(value).contains(name)
    }

    /// Convert `value` to `target`.
    pub fn coerce(&self, value: &Value, target: &TargetType) -> Result<Value, CoercionError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if matches!(
            target,
            TargetType::Float | TargetType::Double | TargetType::BigInteger
        ) {
            return Err(CoercionError::UnsupportedTarget {
                target: target.to_string(),
            });
        }
        if self.is_instance(value, target) {
            return Ok(value.clone());
        }

        let incompatible = || CoercionError::incompatible(value.kind().name(), target.to_string());
        match target {
            TargetType::Integer => match value {
                Value::Decimal(_) | Value::Money(_) => {
                    let number = value.as_number().ok_or_else(incompatible)?;
                    number
                        .trunc()
                        .to_i64()
                        .map(Value::Integer)
                        .ok_or_else(|| CoercionError::OutOfRange {
                            value: value.to_string(),
                        })
                }
                _ => Err(incompatible()),
            },
            TargetType::Decimal => match value {
                Value::Integer(_) | Value::Money(_) => value
                    .as_number()
                    .map(Value::Decimal)
                    .ok_or_else(incompatible),
                _ => Err(incompatible()),
            },
            TargetType::Number => match value {
                Value::Money(money) => Ok(Value::Decimal(money.amount())),
                _ => Err(incompatible()),
            },
            TargetType::Entity(name) => match value {
                Value::Entity(entity) => Err(CoercionError::UnrelatedEntity {
                    actual: entity.type_name().to_string(),
                    target: name.to_string(),
                }),
                _ => Err(incompatible()),
            },
            TargetType::Collection { kind, element } => {
                let Value::Collection(collection) = value else {
                    return Err(incompatible());
                };
                self.coerce_collection(value, collection, kind, element)
            }
            TargetType::Map(element) => {
                let Value::Map(map) = value else {
                    return Err(incompatible());
                };
                self.coerce_map(value, map, element)
            }
            TargetType::Generic { bound, .. } => match bound.as_deref() {
                Some(bound) => self.coerce(value, bound),
                None => Ok(value.clone()),
            },
            TargetType::OneOf(alternatives) => alternatives
                .iter()
                .find_map(|alternative| self.coerce(value, alternative).ok())
                .ok_or_else(incompatible),
            _ => Err(incompatible()),
        }
    }

    fn coerce_collection(
        &self,
        value: &Value,
        collection: &Collection,
        kind: &CollectionKind,
        element: &TargetType,
    ) -> Result<Value, CoercionError> {
        if !matches!(
            kind,
            CollectionKind::List | CollectionKind::Set | CollectionKind::Queue
        ) {
            return Err(CoercionError::UnsupportedCollection {
                kind: kind.to_string(),
            });
        }
        let items = collection
            .iter()
            .map(|item| self.coerce(item, element))
            .collect::<Result<Vec<_>, _>>()?;
        let unchanged = collection.kind() == kind
            && items
                .iter()
                .zip(collection.iter())
                .all(|(new, old)| new.same_instance(old));
        if unchanged {
            return Ok(value.clone());
        }
        Ok(Value::Collection(Collection::new(kind.clone(), items)))
    }

    fn coerce_map(
        &self,
        value: &Value,
        map: &SharedMap,
        element: &TargetType,
    ) -> Result<Value, CoercionError> {
        let entries = map.entries();
        let mut unchanged = true;
        let mut coerced = Vec::with_capacity(entries.len());
        for (key, item) in entries {
            let new = self.coerce(&item, element)?;
            unchanged &= new.same_instance(&item);
            coerced.push((key, new));
        }
        if unchanged {
            return Ok(value.clone());
        }
        Ok(Value::Map(coerced.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use verdict_value::{Decimal, EntityRef, StaticTypeProvider};

    fn provider() -> StaticTypeProvider {
        StaticTypeProvider::new()
            .with_type("AutoPolicy", ["Policy"])
            .with_type("Policy", ["Root"])
    }

    #[test]
    fn money_becomes_its_amount() {
        let types = provider();
        let coercer = Coercer::new(&types);
        let money = Value::money(Decimal::TEN, "USD").unwrap();

        assert_eq!(
            coercer.coerce(&money, &TargetType::named("BigDecimal")).unwrap(),
            Value::Decimal(Decimal::TEN)
        );
        assert_eq!(
            coercer.coerce(&money, &TargetType::Integer).unwrap(),
            Value::Integer(10)
        );
    }

    #[rstest]
    #[case("Float", "COERCE:UNSUPPORTED_TARGET")]
    #[case("Double", "COERCE:UNSUPPORTED_TARGET")]
    #[case("BigInteger", "COERCE:UNSUPPORTED_TARGET")]
    #[case("MonetaryAmount", "COERCE:INCOMPATIBLE")]
    fn integers_do_not_widen_to_unsupported_targets(#[case] target: &str, #[case] code: &str) {
        let types = provider();
        let err = Coercer::new(&types)
            .coerce(&Value::Integer(10), &TargetType::named(target))
            .unwrap_err();
        assert_eq!(err.code(), code);
    }

    #[test]
    fn strings_are_never_parsed() {
        let types = provider();
        let err = Coercer::new(&types)
            .coerce(&Value::text("10"), &TargetType::Integer)
            .unwrap_err();
        assert_eq!(err.code(), "COERCE:INCOMPATIBLE");
    }

    #[test]
    fn decimals_truncate_to_integers() {
        let types = provider();
        let coercer = Coercer::new(&types);
        assert_eq!(
            coercer
                .coerce(&Value::Decimal(Decimal::new(-275, 2)), &TargetType::Integer)
                .unwrap(),
            Value::Integer(-2)
        );
        assert_eq!(
            coercer
                .coerce(&Value::Decimal(Decimal::MAX), &TargetType::Integer)
                .unwrap_err()
                .code(),
            "COERCE:RANGE"
        );
    }

    #[test]
    fn entities_coerce_to_supertypes_only() {
        let types = provider();
        let coercer = Coercer::new(&types);
        let auto = Value::Entity(EntityRef::new("AutoPolicy"));

        let coerced = coercer.coerce(&auto, &TargetType::named("Root")).unwrap();
        assert!(coerced.same_instance(&auto));

        let err = coercer
            .coerce(&auto, &TargetType::named("HomePolicy"))
            .unwrap_err();
        assert_eq!(err.code(), "COERCE:ENTITY");
    }

    #[test]
    fn collections_coerce_element_wise() {
        let types = provider();
        let coercer = Coercer::new(&types);
        let source = Value::collection(
            CollectionKind::Queue,
            [Value::Integer(1), Value::Integer(1), Value::Null],
        );
        let target = TargetType::Collection {
            kind: CollectionKind::Set,
            element: Box::new(TargetType::Decimal),
        };

        let coerced = coercer.coerce(&source, &target).unwrap();
        let collection = coerced.as_collection().unwrap();
        assert_eq!(collection.kind(), &CollectionKind::Set);
        assert_eq!(
            collection.items(),
            &[Value::Decimal(Decimal::ONE), Value::Null]
        );
    }

    #[test]
    fn ordered_sets_are_not_a_supported_target() {
        let types = provider();
        let source = Value::list([Value::Integer(1)]);
        let target = TargetType::Collection {
            kind: CollectionKind::OrderedSet,
            element: Box::new(TargetType::Integer),
        };
        let err = Coercer::new(&types).coerce(&source, &target).unwrap_err();
        assert_eq!(err.code(), "COERCE:UNSUPPORTED_COLLECTION");
    }

    #[test]
    fn maps_and_scalars_do_not_mix() {
        let types = provider();
        let coercer = Coercer::new(&types);
        let map = Value::map([("a", Value::Integer(1))]);

        assert!(coercer.coerce(&map, &TargetType::list(TargetType::Any)).is_err());
        assert!(
            coercer
                .coerce(&Value::Integer(1), &TargetType::Map(Box::new(TargetType::Any)))
                .is_err()
        );

        let widened = coercer
            .coerce(&map, &TargetType::Map(Box::new(TargetType::Decimal)))
            .unwrap();
        assert_eq!(
            widened.member("a"),
            Some(Value::Decimal(Decimal::ONE))
        );
        assert!(!widened.same_instance(&map));
    }

    #[test]
    fn generic_bounds_check_without_converting() {
        let types = provider();
        let coercer = Coercer::new(&types);
        let target = TargetType::from_type(&Type::generic("T", Some(Type::number())));

        let coerced = coercer.coerce(&Value::Integer(3), &target).unwrap();
        assert_eq!(coerced.kind(), verdict_value::ValueKind::Integer);
        assert!(coercer.coerce(&Value::text("x"), &target).is_err());
    }

    #[test]
    fn single_or_multiple_targets_accept_both_shapes() {
        let types = provider();
        let coercer = Coercer::new(&types);
        let target = TargetType::from_type(&Type::decimal().single_or_multiple());

        assert_eq!(
            coercer.coerce(&Value::Integer(2), &target).unwrap(),
            Value::Decimal(Decimal::TWO)
        );
        let list = coercer
            .coerce(&Value::list([Value::Integer(2)]), &target)
            .unwrap();
        assert_eq!(list.as_collection().map(Collection::len), Some(1));
    }
}
