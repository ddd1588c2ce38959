//! Discriminant of a [`Value`](crate::Value), used in diagnostics.

use std::fmt;

/// The runtime kind of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean,
    /// 64-bit integer
    Integer,
    /// Exact decimal
    Decimal,
    /// Amount with currency
    Money,
    /// UTF-8 text
    Text,
    /// Calendar date
    Date,
    /// Date and time of day
    DateTime,
    /// List, set, queue or another collection
    Collection,
    /// String-keyed map
    Map,
    /// Domain object
    Entity,
}

impl ValueKind {
    /// Human readable name for error messages
    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Money => "money",
            Self::Text => "string",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Collection => "collection",
            Self::Map => "map",
            Self::Entity => "entity",
        }
    }

    /// Whether values of this kind take part in arithmetic.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Decimal | Self::Money)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
