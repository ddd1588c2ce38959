//! Expression build and evaluation errors.
//!
//! Every error raised while evaluating carries the rendered text of the
//! sub-expression that failed, because rule authors never see a stack trace.

use thiserror::Error;

// ============================================================================
// Coercion Errors
// ============================================================================

/// A value cannot be represented as the requested type.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoercionError {
    /// No conversion exists between the value's kind and the target.
    #[error("cannot coerce {value} value to {target}")]
    Incompatible {
        /// Runtime kind of the value.
        value: String,
        /// Requested target type.
        target: String,
    },

    /// The target type is never a valid coercion target.
    #[error("coercion to {target} is not supported")]
    UnsupportedTarget {
        /// Requested target type.
        target: String,
    },

    /// The collection kind is outside the supported set.
    #[error("collection kind {kind} is not supported for coercion")]
    UnsupportedCollection {
        /// Offending collection kind.
        kind: String,
    },

    /// An entity is neither the target type nor one of its subtypes.
    #[error("entity of type {actual} is not a {target}")]
    UnrelatedEntity {
        /// Declared type of the entity.
        actual: String,
        /// Requested target type.
        target: String,
    },

    /// A decimal does not fit the integer range.
    #[error("{value} is out of integer range")]
    OutOfRange {
        /// Rendered value.
        value: String,
    },
}

impl CoercionError {
    /// Get error code for categorization
    pub fn code(&self) -> &'static str {
        match self {
            Self::Incompatible { .. } => "COERCE:INCOMPATIBLE",
            Self::UnsupportedTarget { .. } => "COERCE:UNSUPPORTED_TARGET",
            Self::UnsupportedCollection { .. } => "COERCE:UNSUPPORTED_COLLECTION",
            Self::UnrelatedEntity { .. } => "COERCE:ENTITY",
            Self::OutOfRange { .. } => "COERCE:RANGE",
        }
    }

    /// Create an incompatible coercion error
    pub fn incompatible(value: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Incompatible {
            value: value.into(),
            target: target.into(),
        }
    }
}

// ============================================================================
// Main Error Type
// ============================================================================

/// Expression build and evaluation errors
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExpressionError {
    /// Operand of the wrong runtime type
    #[error("'{expression}': expected {expected}, found {actual}")]
    TypeMismatch {
        expression: String,
        expected: String,
        actual: String,
    },

    /// `null` where a value is required (strict mode)
    #[error("'{expression}': {operation} requires a value, found null")]
    NullOperand {
        expression: String,
        operation: String,
    },

    /// Division or modulus by zero
    #[error("'{expression}': division by zero")]
    DivisionByZero { expression: String },

    /// Arithmetic result outside the representable range
    #[error("'{expression}': arithmetic overflow")]
    Overflow { expression: String },

    /// Collection index outside the collection (strict mode)
    #[error("'{expression}': index {index} is out of range for collection of length {length}")]
    IndexOutOfBounds {
        expression: String,
        index: i64,
        length: usize,
    },

    /// No function with this name and arity
    #[error("'{expression}': function {name}/{arity} not found")]
    FunctionNotFound {
        expression: String,
        name: String,
        arity: usize,
    },

    /// A function rejected its arguments
    #[error("'{expression}': invalid argument for {function}: {message}")]
    InvalidArgument {
        expression: String,
        function: String,
        message: String,
    },

    /// Invalid or rejected regular expression
    #[error("'{expression}': regex error: {message}")]
    Regex { expression: String, message: String },

    /// A value could not be coerced to the required type
    #[error("'{expression}': {source}")]
    Coercion {
        expression: String,
        #[source]
        source: CoercionError,
    },

    /// The target of a set expression cannot be assigned
    #[error("'{expression}': cannot assign: {message}")]
    InvalidAssignment { expression: String, message: String },

    /// Evaluation nested deeper than the configured limit
    #[error("'{expression}': maximum evaluation depth ({limit}) exceeded")]
    RecursionLimit { expression: String, limit: usize },

    /// An identifier that no enclosing scope declares
    #[error("'{expression}': unknown symbol '{name}'")]
    UnknownSymbol { expression: String, name: String },

    /// A property the object's type does not declare
    #[error("'{expression}': type {owner} has no property '{property}'")]
    UnknownProperty {
        expression: String,
        owner: String,
        property: String,
    },

    /// A type name nobody declares
    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    /// Invalid engine configuration
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl ExpressionError {
    /// Get error code for categorization
    pub fn code(&self) -> &'static str {
        match self {
            Self::TypeMismatch { .. } => "EXPR:TYPE",
            Self::NullOperand { .. } => "EXPR:NULL",
            Self::DivisionByZero { .. } => "EXPR:DIV_ZERO",
            Self::Overflow { .. } => "EXPR:OVERFLOW",
            Self::IndexOutOfBounds { .. } => "EXPR:INDEX_OOB",
            Self::FunctionNotFound { .. } => "EXPR:FUNC_NOT_FOUND",
            Self::InvalidArgument { .. } => "EXPR:INVALID_ARG",
            Self::Regex { .. } => "EXPR:REGEX",
            Self::Coercion { .. } => "EXPR:COERCION",
            Self::InvalidAssignment { .. } => "EXPR:ASSIGN",
            Self::RecursionLimit { .. } => "EXPR:DEPTH",
            Self::UnknownSymbol { .. } => "EXPR:UNKNOWN_SYMBOL",
            Self::UnknownProperty { .. } => "EXPR:UNKNOWN_PROPERTY",
            Self::UnknownType { .. } => "EXPR:UNKNOWN_TYPE",
            Self::Config { .. } => "EXPR:CONFIG",
        }
    }

    /// Whether the failure is a coercion failure ("wrong data type
    /// configured") rather than a rule logic failure.
    pub fn is_coercion(&self) -> bool {
        matches!(self, Self::Coercion { .. })
    }

    /// Rendered text of the failing sub-expression, if the error has one.
    pub fn expression(&self) -> Option<&str> {
        match self {
            Self::TypeMismatch { expression, .. }
            | Self::NullOperand { expression, .. }
            | Self::DivisionByZero { expression }
            | Self::Overflow { expression }
            | Self::IndexOutOfBounds { expression, .. }
            | Self::FunctionNotFound { expression, .. }
            | Self::InvalidArgument { expression, .. }
            | Self::Regex { expression, .. }
            | Self::Coercion { expression, .. }
            | Self::InvalidAssignment { expression, .. }
            | Self::RecursionLimit { expression, .. }
            | Self::UnknownSymbol { expression, .. }
            | Self::UnknownProperty { expression, .. } => Some(expression),
            Self::UnknownType { .. } | Self::Config { .. } => None,
        }
    }

    /// Attach the failing expression text where none was recorded yet.
    ///
    /// Built-in functions raise errors without knowing the call site; the
    /// evaluator fills it in on the way out.
    #[must_use]
    pub fn in_expression(mut self, text: &str) -> Self {
        match &mut self {
            Self::TypeMismatch { expression, .. }
            | Self::NullOperand { expression, .. }
            | Self::DivisionByZero { expression }
            | Self::Overflow { expression }
            | Self::IndexOutOfBounds { expression, .. }
            | Self::FunctionNotFound { expression, .. }
            | Self::InvalidArgument { expression, .. }
            | Self::Regex { expression, .. }
            | Self::Coercion { expression, .. }
            | Self::InvalidAssignment { expression, .. }
            | Self::RecursionLimit { expression, .. }
            | Self::UnknownSymbol { expression, .. }
            | Self::UnknownProperty { expression, .. } => {
                if expression.is_empty() {
                    text.clone_into(expression);
                }
            }
            Self::UnknownType { .. } | Self::Config { .. } => {}
        }
        self
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create a type mismatch error
    pub fn type_mismatch(
        expression: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            expression: expression.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a null operand error
    pub fn null_operand(expression: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NullOperand {
            expression: expression.into(),
            operation: operation.into(),
        }
    }

    /// Create a division by zero error
    pub fn division_by_zero(expression: impl Into<String>) -> Self {
        Self::DivisionByZero {
            expression: expression.into(),
        }
    }

    /// Create an overflow error
    pub fn overflow(expression: impl Into<String>) -> Self {
        Self::Overflow {
            expression: expression.into(),
        }
    }

    /// Create an invalid argument error; the call site is filled in later
    pub fn invalid_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            expression: String::new(),
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a regex error
    pub fn regex(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Regex {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Wrap a coercion error
    pub fn coercion(expression: impl Into<String>, source: CoercionError) -> Self {
        Self::Coercion {
            expression: expression.into(),
            source,
        }
    }

    /// Create an invalid assignment error
    pub fn invalid_assignment(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAssignment {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create an unknown type error
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// Result type for expression operations
pub type ExpressionResult<T> = Result<T, ExpressionError>;
