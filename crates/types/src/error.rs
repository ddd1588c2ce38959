//! Project build errors.
//!
//! Everything here is fatal for the project being converted: a registry or
//! scope builder is never handed out in a half-valid state.

use thiserror::Error;

use crate::symbol::FunctionHeader;

/// Errors raised while building types and scopes for a project.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TypeError {
    /// The designated root context does not exist.
    #[error("root context definition '{root}' does not exist")]
    MissingRoot {
        /// Declared root name.
        root: String,
    },

    /// A context definition was requested that the project does not declare.
    #[error("context definition '{name}' does not exist")]
    UnknownContext {
        /// Requested name.
        name: String,
    },

    /// A field, parameter or return type names a type nobody declares.
    #[error("type '{name}' referenced by '{owner}' does not exist")]
    UnknownType {
        /// Unresolved type name.
        name: String,
        /// Field, function or context that references it.
        owner: String,
    },

    /// A context inherits from a definition that does not exist.
    #[error("context definition '{context}' inherits from unknown definition '{parent}'")]
    UnknownParent {
        /// Inheriting context.
        context: String,
        /// Missing parent.
        parent: String,
    },

    /// A declared function signature has no implementation.
    #[error("function '{function}' is declared but not implemented")]
    MissingFunctionImplementation {
        /// Header of the declared function.
        function: FunctionHeader,
    },

    /// A function implementation does not match its declared signature.
    #[error("function '{function}' is declared as {expected} but implemented as {actual}")]
    FunctionSignatureMismatch {
        /// Header of the declared function.
        function: FunctionHeader,
        /// Rendered declared symbol.
        expected: String,
        /// Rendered implementation symbol.
        actual: String,
    },

    /// A function scope was requested for a function without a definition.
    #[error("function '{name}' has no definition")]
    UnknownFunction {
        /// Requested function name.
        name: String,
    },
}

impl TypeError {
    /// Get error code for categorization
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRoot { .. } => "TYPE:MISSING_ROOT",
            Self::UnknownContext { .. } => "TYPE:UNKNOWN_CONTEXT",
            Self::UnknownType { .. } => "TYPE:UNKNOWN_TYPE",
            Self::UnknownParent { .. } => "TYPE:UNKNOWN_PARENT",
            Self::MissingFunctionImplementation { .. } => "TYPE:MISSING_FUNCTION",
            Self::FunctionSignatureMismatch { .. } => "TYPE:SIGNATURE_MISMATCH",
            Self::UnknownFunction { .. } => "TYPE:UNKNOWN_FUNCTION",
        }
    }

    /// Create an unknown type error
    pub fn unknown_type(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::UnknownType {
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Create an unknown context error
    pub fn unknown_context(name: impl Into<String>) -> Self {
        Self::UnknownContext { name: name.into() }
    }
}

/// Result type for type and scope building
pub type TypeResult<T> = Result<T, TypeError>;
