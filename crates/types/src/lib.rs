#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Verdict Types
//!
//! Static side of the rules engine: the type model, symbol tables and the
//! scopes rules are type checked in.
//!
//! ## Building a project
//!
//! 1. Describe contexts, external contexts and functions with a
//!    [`ProjectModel`]
//! 2. Build a [`NavigationGraph`] (or supply another
//!    [`CrossContextPathResolver`])
//! 3. Build a [`TypeRegistry`] with the natively available functions
//! 4. Ask a [`ScopeBuilder`] for rule and function scopes
//!
//! Types live in a [`TypeTable`] arena; entity types refer to each other by
//! name and are expanded through a [`TypeResolver`], so cyclic models never
//! create ownership cycles.

pub mod builder;
pub mod error;
pub mod model;
pub mod paths;
pub mod registry;
pub mod scope;
pub mod symbol;
pub mod types;

pub use builder::{EXTERNAL_CONTEXT_VARIABLE, InvocationKey, ScopeBuilder};
pub use error::{TypeError, TypeResult};
pub use model::{
    Cardinality, ChildNavigation, ContextDefinition, ContextProjection,
    ExternalContextDefinition, FieldDefinition, FunctionDefinition, FunctionSignature,
    GenericTypeBound, ParameterDefinition, ProjectModel,
};
pub use paths::{
    ContextPath, CrossContextPath, CrossContextPathResolver, NavigationGraph,
    ReferenceCardinality,
};
pub use registry::{ImplementedFunction, NativeFunctionTable, TypeRegistry};
pub use scope::{ResolvedReference, Scope, ScopeKind};
pub use symbol::{FunctionHeader, FunctionParameter, FunctionSymbol, SymbolTable, VariableSymbol};
pub use types::{Type, TypeKind, TypeResolver, TypeTable};
