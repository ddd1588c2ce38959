#![forbid(unsafe_code)]

//! # Verdict Expression
//!
//! Typed expression trees and the interpreter that evaluates them.
//!
//! ## Pipeline
//!
//! 1. Build expressions with an [`AstBuilder`] over a [`Scope`] from
//!    `verdict-types`; every node records its scope and static type
//! 2. Analyse or rewrite them with the visitors in [`ast`] and [`deps`]
//! 3. Evaluate them with an [`Evaluator`] against an [`EvaluationContext`]
//!
//! ```text
//! Sum(riskItems.coverages[limitAmount > 2].limitAmount)
//! ```
//!
//! Path navigation over a collection flattens one level, so the expression
//! above sums the limits of every matching coverage of every risk item.
//!
//! ## Modes
//!
//! [`EvaluationConfig`] selects strict or non-strict `null` handling, the
//! opt-in automatic iteration of scalar functions over collections and the
//! decimal precision of `/`, `%` and `**`.
//!
//! [`Scope`]: verdict_types::Scope

pub mod ast;
pub mod builtins;
pub mod coerce;
pub mod config;
pub mod deps;
pub mod error;
pub mod eval;
pub mod invoker;

pub use ast::{AstBuilder, BinaryOp, Expression, Node, TemplatePart, UnaryOp};
pub use builtins::BuiltinRegistry;
pub use coerce::{Coercer, TargetType};
pub use config::{DecimalPolicy, EvaluationConfig, EvaluationMode, RoundingMode};
pub use deps::{AstDependency, CrossContextReference, DependencyExtractor};
pub use error::{CoercionError, ExpressionError, ExpressionResult};
pub use eval::{EvaluationContext, EvaluationContextBuilder, Evaluator};
pub use invoker::{FunctionImplementation, FunctionInvoker};
