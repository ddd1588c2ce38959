//! AST evaluation module
//!
//! A tree-walking interpreter over typed expressions. The evaluator holds
//! no per-call state, so one instance serves any number of threads; each
//! call threads its own [`EvaluationContext`].

mod context;
mod ops;

pub use context::{EvaluationContext, EvaluationContextBuilder};

use moka::sync::Cache;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::trace;
use verdict_types::ScopeKind;
use verdict_value::{Collection, CollectionKind, Value};

use crate::ast::{BinaryOp, Expression, Node, TemplatePart};
use crate::coerce::{Coercer, TargetType};
use crate::config::EvaluationConfig;
use crate::error::{ExpressionError, ExpressionResult};
use crate::invoker::ResolvedFunction;

/// Maximum recursion depth for expression evaluation
pub const MAX_RECURSION_DEPTH: usize = 256;

/// Maximum number of cached regex patterns
const MAX_REGEX_CACHE_SIZE: u64 = 256;

/// Evaluator for typed expressions
pub struct Evaluator {
    config: EvaluationConfig,
    /// Compiled `matches` patterns, anchored
    regex_cache: Cache<String, Regex>,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("config", &self.config)
            .field("cached_patterns", &self.regex_cache.entry_count())
            .finish()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EvaluationConfig::default())
    }
}

impl Evaluator {
    /// Create a new evaluator with the given configuration
    pub fn new(config: EvaluationConfig) -> Self {
        Self {
            config,
            regex_cache: Cache::builder().max_capacity(MAX_REGEX_CACHE_SIZE).build(),
        }
    }

    /// The configuration this evaluator was built with
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Apply the configured decimal precision policy.
    pub fn round_decimal(&self, value: Decimal) -> Decimal {
        let policy = self.config.decimal;
        value
            .round_sf_with_strategy(policy.significant_digits, policy.rounding.strategy())
            .unwrap_or(value)
            .normalize()
    }

    /// Evaluate an expression in the given context
    pub fn evaluate(
        &self,
        expression: &Expression,
        context: &EvaluationContext,
    ) -> ExpressionResult<Value> {
        trace!(expression = %expression, "Evaluating expression");
        let result = self.eval(expression, context, context.depth());
        trace!(expression = %expression, ok = result.is_ok(), "Evaluation finished");
        result
    }

    /// Assign `value`, coerced to the path's static type, to the field
    /// `path` denotes on `target`. This is the only operation that mutates
    /// data; it either writes the field or fails without writing anything.
    pub fn evaluate_set_expression(
        &self,
        value: &Value,
        path: &Expression,
        target: &Value,
        context: &EvaluationContext,
    ) -> ExpressionResult<()> {
        let context = context.with_this(target.clone());
        let mut step = path;
        while let Node::ReferenceValue { reference, .. } = step.node() {
            step = reference;
        }

        let (owner, property) = match step.node() {
            Node::Identifier {
                name,
                origin: ScopeKind::Local,
                this_depth,
            } => (context.this_at(*this_depth), name),
            Node::Path {
                object, property, ..
            } => (self.evaluate(object, &context)?, property),
            other => {
                return Err(ExpressionError::invalid_assignment(
                    path.text(),
                    format!("{} is not a field path", other.kind_name()),
                ));
            }
        };

        let coerced = Coercer::new(context.types())
            .coerce(value, &TargetType::from_type(path.evaluation_type()))
            .map_err(|e| ExpressionError::coercion(path.text(), e))?;

        match owner {
            Value::Entity(entity) => entity.set(property.as_ref(), coerced),
            Value::Map(map) => map.insert(property.as_ref(), coerced),
            Value::Null => {
                return Err(ExpressionError::invalid_assignment(
                    path.text(),
                    "the object holding the field is null",
                ));
            }
            other => {
                return Err(ExpressionError::invalid_assignment(
                    path.text(),
                    format!("cannot set a field on a {} value", other.kind()),
                ));
            }
        }
        trace!(path = %path, "Assigned value");
        Ok(())
    }

    /// Evaluate with recursion depth tracking; errors raised below without
    /// a call site get this node's text
    fn eval(
        &self,
        expression: &Expression,
        context: &EvaluationContext,
        depth: usize,
    ) -> ExpressionResult<Value> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(ExpressionError::RecursionLimit {
                expression: expression.text().to_string(),
                limit: MAX_RECURSION_DEPTH,
            });
        }
        self.eval_node(expression, context, depth)
            .map_err(|e| e.in_expression(expression.text()))
    }

    fn eval_node(
        &self,
        expression: &Expression,
        context: &EvaluationContext,
        depth: usize,
    ) -> ExpressionResult<Value> {
        let text = expression.text();
        let next = depth + 1;
        match expression.node() {
            Node::Literal(value) => Ok(value.clone()),
            Node::Null => Ok(Value::Null),
            Node::This => Ok(context.this().clone()),

            Node::Identifier {
                name,
                origin,
                this_depth,
            } => Ok(match origin {
                ScopeKind::Local => context
                    .this_at(*this_depth)
                    .member(name)
                    .unwrap_or_default(),
                ScopeKind::Global | ScopeKind::VariablesMap => {
                    context.variable(name).unwrap_or_default()
                }
            }),

            Node::ReferenceValue { reference, .. } => self.eval(reference, context, next),

            Node::Path {
                object,
                property,
                null_safe,
            } => {
                let object = self.eval(object, context, next)?;
                self.navigate(object, property, *null_safe, text)
            }

            Node::AccessByIndex { collection, index } => {
                let collection = self.eval(collection, context, next)?;
                let index = self.eval(index, context, next)?;
                self.access_index(collection, &index, text)
            }

            Node::Filter {
                collection,
                predicate,
            } => {
                let collection = self.eval(collection, context, next)?;
                self.filter(collection, predicate, context, next)
            }

            Node::Unary { op, operand } => {
                let value = self.eval(operand, context, next)?;
                self.apply_unary(*op, value, text)
            }

            Node::Binary { op, left, right } => {
                let left_value = self.eval(left, context, next)?;
                match op {
                    // Short-circuit evaluation for logical operators
                    BinaryOp::And => {
                        if !self.truth(&left_value, text, op.name())? {
                            return Ok(Value::Boolean(false));
                        }
                        let right_value = self.eval(right, context, next)?;
                        Ok(Value::Boolean(self.truth(&right_value, text, op.name())?))
                    }
                    BinaryOp::Or => {
                        if self.truth(&left_value, text, op.name())? {
                            return Ok(Value::Boolean(true));
                        }
                        let right_value = self.eval(right, context, next)?;
                        Ok(Value::Boolean(self.truth(&right_value, text, op.name())?))
                    }
                    _ => {
                        let right_value = self.eval(right, context, next)?;
                        self.apply_binary(*op, left_value, right_value, text)
                    }
                }
            }

            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.eval(condition, context, next)?;
                if self.truth(&condition, text, "if")? {
                    self.eval(then_branch, context, next)
                } else if let Some(else_branch) = else_branch {
                    self.eval(else_branch, context, next)
                } else {
                    Ok(Value::Null)
                }
            }

            Node::ForEach {
                variable,
                collection,
                body,
            } => {
                let items = items_of(self.eval(collection, context, next)?);
                let results = items
                    .into_iter()
                    .map(|item| self.eval(body, &context.with_variable(variable, item), next))
                    .collect::<ExpressionResult<Vec<_>>>()?;
                Ok(Value::list(results))
            }

            Node::ForSome {
                variable,
                collection,
                predicate,
            } => {
                let items = items_of(self.eval(collection, context, next)?);
                for item in items {
                    let scoped = context.with_variable(variable, item);
                    if self.satisfies(predicate, &scoped, next)? {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }

            Node::ForEvery {
                variable,
                collection,
                predicate,
            } => {
                let items = items_of(self.eval(collection, context, next)?);
                for item in items {
                    let scoped = context.with_variable(variable, item);
                    if !self.satisfies(predicate, &scoped, next)? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }

            Node::FunctionCall { name, arguments } => {
                let args = arguments
                    .iter()
                    .map(|argument| self.eval(argument, context, next))
                    .collect::<ExpressionResult<Vec<_>>>()?;
                let function = context.invoker().resolve(name, args.len()).ok_or_else(|| {
                    ExpressionError::FunctionNotFound {
                        expression: text.to_string(),
                        name: name.to_string(),
                        arity: args.len(),
                    }
                })?;
                self.call(function, args, text, &context.at_depth(next))
            }

            Node::Cast { operand, .. } => {
                let value = self.eval(operand, context, next)?;
                Coercer::new(context.types())
                    .coerce(&value, &TargetType::from_type(expression.evaluation_type()))
                    .map_err(|e| ExpressionError::coercion(text, e))
            }

            Node::InstanceOf { type_name, operand } => {
                let value = self.eval(operand, context, next)?;
                Ok(Value::Boolean(is_instance_of(&value, type_name, context)))
            }

            Node::TypeOf { type_name, operand } => {
                let value = self.eval(operand, context, next)?;
                let actual = context.types().type_of(&value);
                Ok(Value::Boolean(actual.as_deref() == Some(type_name.as_ref())))
            }

            Node::InlineArray(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, context, next))
                    .collect::<ExpressionResult<Vec<_>>>()?;
                Ok(Value::list(values))
            }

            Node::InlineMap(entries) => {
                let values = entries
                    .iter()
                    .map(|(key, value)| Ok((key.to_string(), self.eval(value, context, next)?)))
                    .collect::<ExpressionResult<Vec<_>>>()?;
                Ok(Value::map(values))
            }

            Node::Template(parts) => {
                let mut rendered = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(literal) => rendered.push_str(literal),
                        TemplatePart::Expression(part) => match self.eval(part, context, next)? {
                            Value::Null => {}
                            value => rendered.push_str(&value.to_string()),
                        },
                    }
                }
                Ok(Value::text(rendered))
            }

            Node::ValueBlock { bindings, body } => {
                let mut scoped = context.clone();
                for (name, value) in bindings {
                    let value = self.eval(value, &scoped, next)?;
                    scoped = scoped.with_variable(name, value);
                }
                self.eval(body, &scoped, next)
            }
        }
    }

    /// `object.property`, flattening one level over collections.
    fn navigate(
        &self,
        object: Value,
        property: &str,
        null_safe: bool,
        text: &str,
    ) -> ExpressionResult<Value> {
        match object {
            Value::Null if null_safe || !self.config.is_strict() => Ok(Value::Null),
            Value::Null => Err(ExpressionError::null_operand(text, format!("reading '{property}'"))),
            Value::Entity(_) | Value::Map(_) => Ok(object.member(property).unwrap_or_default()),
            Value::Collection(collection) => {
                let mut flattened = Vec::with_capacity(collection.len());
                for item in collection.into_items() {
                    match item {
                        Value::Null => {}
                        nested @ Value::Collection(_) => {
                            flattened.push(self.navigate(nested, property, null_safe, text)?);
                        }
                        item => match self.navigate(item, property, null_safe, text)? {
                            Value::Collection(values) => flattened.extend(values.into_items()),
                            value => flattened.push(value),
                        },
                    }
                }
                Ok(Value::list(flattened))
            }
            _ if !self.config.is_strict() => Ok(Value::Null),
            other => Err(ExpressionError::type_mismatch(
                text,
                "an object",
                other.kind().name(),
            )),
        }
    }

    fn access_index(&self, collection: Value, index: &Value, text: &str) -> ExpressionResult<Value> {
        let lenient = !self.config.is_strict();
        let collection = match collection {
            Value::Collection(collection) => collection,
            Value::Null if lenient => return Ok(Value::Null),
            Value::Null => return Err(ExpressionError::null_operand(text, "indexing")),
            _ if lenient => return Ok(Value::Null),
            other => {
                return Err(ExpressionError::type_mismatch(
                    text,
                    "a collection",
                    other.kind().name(),
                ));
            }
        };
        let position = match index {
            Value::Integer(i) => *i,
            Value::Null if lenient => return Ok(Value::Null),
            Value::Null => return Err(ExpressionError::null_operand(text, "indexing")),
            other => {
                return Err(ExpressionError::type_mismatch(text, "integer", other.kind().name()));
            }
        };

        let item = usize::try_from(position)
            .ok()
            .and_then(|i| collection.get(i));
        match item {
            Some(value) => Ok(value.clone()),
            None if lenient => Ok(Value::Null),
            None => Err(ExpressionError::IndexOutOfBounds {
                expression: text.to_string(),
                index: position,
                length: collection.len(),
            }),
        }
    }

    /// Keep the elements the predicate holds for, with each element as
    /// `this`. A single value filters like a one-element collection.
    fn filter(
        &self,
        collection: Value,
        predicate: &Expression,
        context: &EvaluationContext,
        depth: usize,
    ) -> ExpressionResult<Value> {
        let (kind, items) = match collection {
            Value::Null => return Ok(Value::Null),
            Value::Collection(collection) => {
                (collection.kind().clone(), collection.into_items())
            }
            single => (CollectionKind::List, vec![single]),
        };
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            if self.satisfies(predicate, &context.with_this(item.clone()), depth)? {
                kept.push(item);
            }
        }
        Ok(Value::Collection(Collection::new(kind, kept)))
    }

    /// Predicate result; `null` counts as not satisfied.
    fn satisfies(
        &self,
        predicate: &Expression,
        context: &EvaluationContext,
        depth: usize,
    ) -> ExpressionResult<bool> {
        match self.eval(predicate, context, depth)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(ExpressionError::type_mismatch(
                predicate.text(),
                "boolean",
                other.kind().name(),
            )),
        }
    }

    /// Invoke a resolved function. With automatic iteration on, a collection
    /// passed for a scalar parameter maps the call over its elements.
    fn call(
        &self,
        function: ResolvedFunction<'_>,
        args: Vec<Value>,
        text: &str,
        context: &EvaluationContext,
    ) -> ExpressionResult<Value> {
        if self.config.automatic_iteration {
            let iterated = function
                .symbol()
                .parameters()
                .iter()
                .zip(&args)
                .position(|(parameter, arg)| {
                    !parameter.ty().may_be_collection() && arg.is_collection()
                });
            if let Some(position) = iterated {
                let items = items_of(args[position].clone());
                trace!(
                    function = function.symbol().name(),
                    position,
                    elements = items.len(),
                    "Iterating function over collection argument"
                );
                let results = items
                    .into_iter()
                    .map(|item| {
                        let mut element_args = args.clone();
                        element_args[position] = item;
                        self.call(function, element_args, text, context)
                    })
                    .collect::<ExpressionResult<Vec<_>>>()?;
                return Ok(Value::list(results));
            }
        }
        function.invoke(args, text, self, context)
    }
}

/// Elements of a collection; `null` has none and anything else is a
/// single element.
fn items_of(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Collection(collection) => collection.into_items(),
        single => vec![single],
    }
}

/// `value instanceof type_name`; a `T[]` name checks every non-null element.
fn is_instance_of(value: &Value, type_name: &str, context: &EvaluationContext) -> bool {
    let coercer = Coercer::new(context.types());
    match type_name.strip_suffix("[]") {
        Some(element) => value.as_collection().is_some_and(|collection| {
            let target = TargetType::named(element);
            collection
                .iter()
                .all(|item| item.is_null() || coercer.is_instance(item, &target))
        }),
        None => coercer.is_instance(value, &TargetType::named(type_name)),
    }
}
