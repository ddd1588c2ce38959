//! Function dispatch.
//!
//! A call resolves by name and arity. Functions implemented in the rule
//! language take precedence over native ones with the same header.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};
use verdict_types::{FunctionHeader, FunctionSymbol, ImplementedFunction, NativeFunctionTable};
use verdict_value::Value;

use crate::ast::Expression;
use crate::builtins::{self, Builtin, BuiltinRegistry};
use crate::coerce::{Coercer, TargetType};
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{EvaluationContext, Evaluator};

/// A function implemented in the rule language, ready to run.
#[derive(Debug, Clone)]
pub struct FunctionImplementation {
    symbol: FunctionSymbol,
    parameter_names: Vec<Arc<str>>,
    body: Expression,
}

impl FunctionImplementation {
    /// Pair a resolved function with its compiled body. The body must be
    /// built in the function's scope.
    pub fn new(function: &ImplementedFunction, body: Expression) -> Self {
        Self {
            symbol: function.symbol.clone(),
            parameter_names: function
                .definition
                .parameters
                .iter()
                .map(|p| Arc::from(p.name.as_str()))
                .collect(),
            body,
        }
    }

    /// Resolved signature.
    pub fn symbol(&self) -> &FunctionSymbol {
        &self.symbol
    }

    /// Body expression.
    pub fn body(&self) -> &Expression {
        &self.body
    }

    fn invoke(
        &self,
        args: Vec<Value>,
        text: &str,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> ExpressionResult<Value> {
        let coercer = Coercer::new(context.types());
        let mut bindings = Vec::with_capacity(args.len());
        for ((name, parameter), value) in self
            .parameter_names
            .iter()
            .zip(self.symbol.parameters())
            .zip(args)
        {
            let coerced = coercer
                .coerce(&value, &TargetType::from_type(parameter.ty()))
                .map_err(|e| ExpressionError::coercion(text, e))?;
            bindings.push((Arc::clone(name), coerced));
        }

        trace!(function = %self.symbol.header(), "Evaluating function body");
        let body_context = context.for_function_body(bindings);
        let result = evaluator.evaluate(&self.body, &body_context)?;
        coercer
            .coerce(&result, &TargetType::from_type(self.symbol.return_type()))
            .map_err(|e| ExpressionError::coercion(self.body.text(), e))
    }
}

/// What a call resolved to.
#[derive(Debug, Clone, Copy)]
pub enum ResolvedFunction<'a> {
    /// Implemented in the rule language
    Implemented(&'a FunctionImplementation),
    /// Native
    Native(&'a Builtin),
}

impl ResolvedFunction<'_> {
    /// Signature of the resolved function.
    pub fn symbol(&self) -> &FunctionSymbol {
        match self {
            Self::Implemented(function) => function.symbol(),
            Self::Native(builtin) => builtin.symbol(),
        }
    }

    /// Call with evaluated arguments. `text` is the rendered call, used
    /// in argument coercion errors.
    pub fn invoke(
        &self,
        args: Vec<Value>,
        text: &str,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> ExpressionResult<Value> {
        match self {
            Self::Implemented(function) => function.invoke(args, text, evaluator, context),
            Self::Native(builtin) => builtin.call(&args, evaluator, context),
        }
    }
}

/// Callable functions of one project.
#[derive(Debug, Clone)]
pub struct FunctionInvoker {
    natives: Arc<BuiltinRegistry>,
    implemented: IndexMap<FunctionHeader, FunctionImplementation>,
}

impl FunctionInvoker {
    /// Invoker over the given native functions.
    pub fn new(natives: Arc<BuiltinRegistry>) -> Self {
        Self {
            natives,
            implemented: IndexMap::new(),
        }
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_function(mut self, function: FunctionImplementation) -> Self {
        self.register(function);
        self
    }

    /// Register a function implemented in the rule language.
    pub fn register(&mut self, function: FunctionImplementation) {
        let header = function.symbol.header();
        if self.natives.has_function(header.name(), header.arity()) {
            debug!(function = %header, "Implemented function shadows a native one");
        }
        self.implemented.insert(header, function);
    }

    /// Function by name and arity.
    pub fn resolve(&self, name: &str, arity: usize) -> Option<ResolvedFunction<'_>> {
        self.implemented
            .get(&FunctionHeader::new(name, arity))
            .map(ResolvedFunction::Implemented)
            .or_else(|| self.natives.get(name, arity).map(ResolvedFunction::Native))
    }

    /// Native functions.
    pub fn natives(&self) -> &Arc<BuiltinRegistry> {
        &self.natives
    }

    /// Signatures of the native functions, for building a type registry.
    pub fn native_table(&self) -> NativeFunctionTable {
        self.natives.function_table()
    }
}

impl Default for FunctionInvoker {
    fn default() -> Self {
        Self::new(builtins::standard())
    }
}
