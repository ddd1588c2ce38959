#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Verdict Value
//!
//! Runtime value model the rule interpreter operates on.
//!
//! - [`Value`] is the dynamically typed value: numbers, money, text, dates,
//!   collections, string-keyed maps and entities
//! - [`Collection`] keeps track of the concrete collection kind (list, set,
//!   queue, ...) because coercion rules depend on it
//! - [`EntityRef`] and [`SharedMap`] are shared handles: cloning them keeps
//!   identity, and the single mutating operation of the language writes
//!   through them
//! - [`TypeProvider`] maps a runtime object to its declared type name and
//!   supertypes; the engine never inspects how objects declare their type

pub mod collection;
pub mod entity;
pub mod error;
pub mod kind;
pub mod money;
pub mod provider;
pub mod value;

pub use collection::{Collection, CollectionKind};
pub use entity::{Entity, EntityRef, SharedMap};
pub use error::{ValueError, ValueResult};
pub use kind::ValueKind;
pub use money::Money;
pub use provider::{StaticTypeProvider, TypeProvider, primitive_type_name};
pub use value::Value;

// Re-exported so downstream crates name the same decimal type.
pub use rust_decimal::Decimal;
