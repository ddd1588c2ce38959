//! The dynamically typed runtime value.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::collection::{Collection, CollectionKind};
use crate::entity::{EntityRef, SharedMap};
use crate::error::{ValueError, ValueResult};
use crate::kind::ValueKind;
use crate::money::Money;

/// Any value a rule expression can produce or navigate.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    /// Boolean
    Boolean(bool),
    /// Whole number
    Integer(i64),
    /// Exact decimal number
    Decimal(Decimal),
    /// Amount with currency
    Money(Money),
    /// UTF-8 text
    Text(Arc<str>),
    /// Calendar date
    Date(NaiveDate),
    /// Local date-time
    DateTime(NaiveDateTime),
    /// Materialized collection
    Collection(Collection),
    /// String-keyed map, shared
    Map(SharedMap),
    /// Domain object, shared
    Entity(EntityRef),
}

impl Value {
    // ==================== Constructors ====================

    /// `null`
    pub const fn null() -> Self {
        Self::Null
    }

    /// Boolean value
    pub const fn boolean(v: bool) -> Self {
        Self::Boolean(v)
    }

    /// Integer value
    pub const fn integer(v: i64) -> Self {
        Self::Integer(v)
    }

    /// Decimal value
    pub const fn decimal(v: Decimal) -> Self {
        Self::Decimal(v)
    }

    /// Text value
    pub fn text(v: impl AsRef<str>) -> Self {
        Self::Text(Arc::from(v.as_ref()))
    }

    /// Money value
    pub fn money(amount: Decimal, currency: impl AsRef<str>) -> ValueResult<Self> {
        Money::new(amount, currency).map(Self::Money)
    }

    /// Date value
    pub const fn date(v: NaiveDate) -> Self {
        Self::Date(v)
    }

    /// Date-time value
    pub const fn datetime(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }

    /// Ordered list
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Collection(Collection::list(items))
    }

    /// Collection of an explicit kind
    pub fn collection(kind: CollectionKind, items: impl IntoIterator<Item = Value>) -> Self {
        Self::Collection(Collection::new(kind, items))
    }

    /// Map from key/value pairs
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Entity value
    pub fn entity(entity: EntityRef) -> Self {
        Self::Entity(entity)
    }

    // ==================== Queries ====================

    /// The runtime kind
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Integer(_) => ValueKind::Integer,
            Self::Decimal(_) => ValueKind::Decimal,
            Self::Money(_) => ValueKind::Money,
            Self::Text(_) => ValueKind::Text,
            Self::Date(_) => ValueKind::Date,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::Collection(_) => ValueKind::Collection,
            Self::Map(_) => ValueKind::Map,
            Self::Entity(_) => ValueKind::Entity,
        }
    }

    /// Whether this is `null`
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is a collection
    #[inline]
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of integers, decimals and money amounts.
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Decimal(d) => Some(*d),
            Self::Money(m) => Some(m.amount()),
            _ => None,
        }
    }

    /// Text payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Collection payload
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Entity payload
    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }

    /// Map payload
    pub fn as_map(&self) -> Option<&SharedMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Identity for shared handles, equality for everything else.
    pub fn same_instance(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Entity(a), Self::Entity(b)) => a.ptr_eq(b),
            (Self::Map(a), Self::Map(b)) => a.ptr_eq(b),
            (Self::Collection(a), Self::Collection(b)) => {
                a.kind() == b.kind()
                    && a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.same_instance(y))
            }
            (a, b) => a.kind() == b.kind() && a == b,
        }
    }

    /// Read a named member of a map or entity. Other values have no members.
    pub fn member(&self, name: &str) -> Option<Value> {
        match self {
            Self::Entity(e) => e.get(name),
            Self::Map(m) => m.get(name),
            _ => None,
        }
    }

    // ==================== JSON ====================

    /// Convert JSON data. Objects become maps, whole numbers become integers
    /// and every other number becomes an exact decimal.
    pub fn from_json(json: serde_json::Value) -> ValueResult<Self> {
        Ok(match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    let text = n.to_string();
                    let decimal = Decimal::from_str(&text)
                        .or_else(|_| Decimal::from_scientific(&text))
                        .map_err(|_| ValueError::InvalidNumber(text))?;
                    Self::Decimal(decimal)
                }
            }
            serde_json::Value::String(s) => Self::text(s),
            serde_json::Value::Array(items) => Self::list(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<ValueResult<Vec<_>>>()?,
            ),
            serde_json::Value::Object(fields) => Self::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| Ok((k, Self::from_json(v)?)))
                    .collect::<ValueResult<SharedMap>>()?,
            ),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Integer(_) | Self::Decimal(_), Self::Integer(_) | Self::Decimal(_)) => {
                self.as_number() == other.as_number()
            }
            (Self::Money(a), Self::Money(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::Collection(a), Self::Collection(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Entity(a), Self::Entity(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{}", d.normalize()),
            Self::Money(m) => write!(f, "{m}"),
            Self::Text(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            Self::Collection(c) => {
                f.write_str("[")?;
                for (i, item) in c.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(m) => write!(f, "{m}"),
            Self::Entity(e) => write!(f, "{e}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::text(v)
    }
}

impl From<Money> for Value {
    fn from(v: Money) -> Self {
        Self::Money(v)
    }
}

impl From<EntityRef> for Value {
    fn from(v: EntityRef) -> Self {
        Self::Entity(v)
    }
}

impl From<Collection> for Value {
    fn from(v: Collection) -> Self {
        Self::Collection(v)
    }
}
