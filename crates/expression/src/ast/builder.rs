//! Typed construction of expression trees.
//!
//! The rule DSL front end builds its trees through [`AstBuilder`]: every
//! node is resolved against the builder's scope when it is created, so the
//! tree carries its static types from the start.

use std::sync::Arc;

use verdict_types::{Scope, ScopeKind, Type, TypeResolver, VariableSymbol};
use verdict_value::Value;

use super::{BinaryOp, Expression, Node, TemplatePart, Token, UnaryOp};
use crate::error::{ExpressionError, ExpressionResult};

/// Builds nodes resolved against one scope.
#[derive(Debug, Clone)]
pub struct AstBuilder {
    scope: Arc<Scope>,
}

impl AstBuilder {
    /// Builder over `scope`.
    pub fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }

    /// Scope new nodes are resolved in.
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    fn resolver(&self) -> &dyn TypeResolver {
        self.scope.types().as_ref()
    }

    fn make(&self, node: Node, ty: Arc<Type>) -> Expression {
        let token = Token::new(node.render());
        Expression::new(node, Arc::clone(&self.scope), ty, token)
    }

    // ==================== Literals ====================

    /// Literal value.
    pub fn literal(&self, value: impl Into<Value>) -> Expression {
        let value = value.into();
        let ty = match &value {
            Value::Boolean(_) => Type::boolean(),
            Value::Integer(_) => Type::integer(),
            Value::Decimal(_) => Type::decimal(),
            Value::Money(_) => Type::money(),
            Value::Text(_) => Type::string(),
            Value::Date(_) => Type::date(),
            Value::DateTime(_) => Type::datetime(),
            Value::Collection(_) => Type::array(Type::any()),
            Value::Null | Value::Map(_) | Value::Entity(_) => Type::any(),
        };
        if value.is_null() {
            return self.null();
        }
        self.make(Node::Literal(value), ty)
    }

    /// String literal.
    pub fn string(&self, text: &str) -> Expression {
        self.literal(Value::text(text))
    }

    /// `null`
    pub fn null(&self) -> Expression {
        self.make(Node::Null, Type::any())
    }

    // ==================== References ====================

    /// `this`
    pub fn this(&self) -> Expression {
        self.make(Node::This, self.scope.this_type())
    }

    /// Bare identifier resolved against the scope chain.
    pub fn identifier(&self, name: &str) -> ExpressionResult<Expression> {
        let resolved =
            self.scope
                .resolve_reference(name)
                .ok_or_else(|| ExpressionError::UnknownSymbol {
                    expression: name.to_string(),
                    name: name.to_string(),
                })?;
        let this_depth = if resolved.origin == ScopeKind::Local {
            self.this_depth(name)
        } else {
            0
        };
        Ok(self.make(
            Node::Identifier {
                name: Arc::from(name),
                origin: resolved.origin,
                this_depth,
            },
            Arc::clone(resolved.symbol.ty()),
        ))
    }

    /// How many local scopes sit between this builder and the local scope
    /// that declares `name`. Mirrors the dynamic-scope rule of
    /// [`Scope::resolve_reference`].
    fn this_depth(&self, name: &str) -> usize {
        let mut locals = Vec::new();
        let mut current = Some(self.scope.as_ref());
        while let Some(scope) = current {
            if scope.kind() == ScopeKind::Local {
                locals.push(scope);
            }
            current = scope.parent().map(Arc::as_ref);
        }
        locals
            .iter()
            .position(|scope| scope.ty().resolve_property(name, self.resolver()).is_some())
            .or_else(|| locals.iter().position(|scope| scope.ty().is_dynamic()))
            .unwrap_or(0)
    }

    /// Mark the root of a reference chain.
    pub fn reference(&self, reference: Expression) -> Expression {
        let explicit_this = chain_root(&reference).is_some_and(|root| matches!(root.node(), Node::This));
        let ty = Arc::clone(reference.evaluation_type());
        self.make(
            Node::ReferenceValue {
                explicit_this,
                reference: Box::new(reference),
            },
            ty,
        )
    }

    /// `object.property`
    pub fn path(&self, object: Expression, property: &str) -> ExpressionResult<Expression> {
        self.navigate(object, property, false)
    }

    /// `object?.property`
    pub fn null_safe_path(&self, object: Expression, property: &str) -> ExpressionResult<Expression> {
        self.navigate(object, property, true)
    }

    fn navigate(
        &self,
        object: Expression,
        property: &str,
        null_safe: bool,
    ) -> ExpressionResult<Expression> {
        let object_type = object.evaluation_type().bounded();
        let ty = if object_type.is_dynamic() {
            Type::any()
        } else {
            let element = object_type.unwrap_array();
            if element.is_dynamic() {
                Type::any()
            } else {
                let symbol = element.resolve_property(property, self.resolver()).ok_or_else(|| {
                    ExpressionError::UnknownProperty {
                        expression: format!("{}.{property}", object.text()),
                        owner: element.name().to_string(),
                        property: property.to_string(),
                    }
                })?;
                let property_type = Arc::clone(symbol.ty());
                if object_type.is_array() {
                    Type::array(property_type.unwrap_array())
                } else if object_type.is_union() {
                    property_type.unwrap_array().single_or_multiple()
                } else {
                    property_type
                }
            }
        };
        Ok(self.make(
            Node::Path {
                object: Box::new(object),
                property: Arc::from(property),
                null_safe,
            },
            ty,
        ))
    }

    /// `collection[index]`
    pub fn index(&self, collection: Expression, index: Expression) -> Expression {
        let ty = collection
            .evaluation_type()
            .element_type()
            .cloned()
            .unwrap_or_else(|| collection.evaluation_type().unwrap_array());
        self.make(
            Node::AccessByIndex {
                collection: Box::new(collection),
                index: Box::new(index),
            },
            ty,
        )
    }

    /// `collection[predicate]`; the predicate is built in a scope whose
    /// `this` is the element type.
    pub fn filter<F>(&self, collection: Expression, predicate: F) -> ExpressionResult<Expression>
    where
        F: FnOnce(&AstBuilder) -> ExpressionResult<Expression>,
    {
        let element = collection.evaluation_type().unwrap_array();
        let inner = Self::new(Scope::local(Arc::clone(&element), &self.scope));
        let predicate = predicate(&inner)?;
        Ok(self.make(
            Node::Filter {
                collection: Box::new(collection),
                predicate: Box::new(predicate),
            },
            Type::array(element),
        ))
    }

    // ==================== Operators ====================

    /// Unary operation.
    pub fn unary(&self, op: UnaryOp, operand: Expression) -> Expression {
        let ty = match op {
            UnaryOp::Not => Type::boolean(),
            UnaryOp::Negate => Arc::clone(operand.evaluation_type()),
        };
        self.make(
            Node::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    /// Binary operation.
    pub fn binary(&self, op: BinaryOp, left: Expression, right: Expression) -> Expression {
        let ty = if op.is_arithmetic() {
            arithmetic_type(op, left.evaluation_type(), right.evaluation_type())
        } else {
            Type::boolean()
        };
        self.make(
            Node::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    /// `if condition then a [else b]`
    pub fn if_then(
        &self,
        condition: Expression,
        then_branch: Expression,
        else_branch: Option<Expression>,
    ) -> Expression {
        let ty = match &else_branch {
            Some(otherwise) if otherwise.evaluation_type() != then_branch.evaluation_type() => {
                Type::any()
            }
            _ => Arc::clone(then_branch.evaluation_type()),
        };
        self.make(
            Node::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            },
            ty,
        )
    }

    // ==================== Iteration ====================

    fn iteration_scope(&self, variable: &str, collection: &Expression) -> AstBuilder {
        let element = collection.evaluation_type().unwrap_array();
        Self::new(Scope::variables_map(
            format!("for {variable}"),
            [VariableSymbol::new(variable, element)],
            &self.scope,
        ))
    }

    /// `for variable in collection return body`
    pub fn for_each<F>(
        &self,
        variable: &str,
        collection: Expression,
        body: F,
    ) -> ExpressionResult<Expression>
    where
        F: FnOnce(&AstBuilder) -> ExpressionResult<Expression>,
    {
        let body = body(&self.iteration_scope(variable, &collection))?;
        let ty = Type::array(body.evaluation_type().unwrap_array());
        Ok(self.make(
            Node::ForEach {
                variable: Arc::from(variable),
                collection: Box::new(collection),
                body: Box::new(body),
            },
            ty,
        ))
    }

    /// `for some variable in collection satisfies predicate`
    pub fn for_some<F>(
        &self,
        variable: &str,
        collection: Expression,
        predicate: F,
    ) -> ExpressionResult<Expression>
    where
        F: FnOnce(&AstBuilder) -> ExpressionResult<Expression>,
    {
        let predicate = predicate(&self.iteration_scope(variable, &collection))?;
        Ok(self.make(
            Node::ForSome {
                variable: Arc::from(variable),
                collection: Box::new(collection),
                predicate: Box::new(predicate),
            },
            Type::boolean(),
        ))
    }

    /// `for every variable in collection satisfies predicate`
    pub fn for_every<F>(
        &self,
        variable: &str,
        collection: Expression,
        predicate: F,
    ) -> ExpressionResult<Expression>
    where
        F: FnOnce(&AstBuilder) -> ExpressionResult<Expression>,
    {
        let predicate = predicate(&self.iteration_scope(variable, &collection))?;
        Ok(self.make(
            Node::ForEvery {
                variable: Arc::from(variable),
                collection: Box::new(collection),
                predicate: Box::new(predicate),
            },
            Type::boolean(),
        ))
    }

    // ==================== Calls and types ====================

    /// Function call resolved by name and arity; generic return types are
    /// bound from the argument types.
    pub fn call(&self, name: &str, arguments: Vec<Expression>) -> ExpressionResult<Expression> {
        let function = self
            .scope
            .resolve_function(name, arguments.len())
            .ok_or_else(|| ExpressionError::FunctionNotFound {
                expression: name.to_string(),
                name: name.to_string(),
                arity: arguments.len(),
            })?;
        let argument_types: Vec<Arc<Type>> = arguments
            .iter()
            .map(|argument| Arc::clone(argument.evaluation_type()))
            .collect();
        let ty = function.resolve_return_type(&argument_types, self.resolver());
        Ok(self.make(
            Node::FunctionCall {
                name: Arc::from(name),
                arguments,
            },
            ty,
        ))
    }

    fn resolve_type_name(&self, name: &str) -> ExpressionResult<Arc<Type>> {
        if let Some(element) = name.strip_suffix("[]") {
            return self.resolve_type_name(element).map(Type::array);
        }
        self.resolver()
            .resolve_type(name)
            .or_else(|| Type::builtin(name))
            .ok_or_else(|| ExpressionError::unknown_type(name))
    }

    /// `(Type) operand`
    pub fn cast(&self, type_name: &str, operand: Expression) -> ExpressionResult<Expression> {
        let ty = self.resolve_type_name(type_name)?;
        Ok(self.make(
            Node::Cast {
                type_name: Arc::from(type_name),
                operand: Box::new(operand),
            },
            ty,
        ))
    }

    /// `operand instanceof Type`
    pub fn instance_of(&self, type_name: &str, operand: Expression) -> ExpressionResult<Expression> {
        self.resolve_type_name(type_name)?;
        Ok(self.make(
            Node::InstanceOf {
                type_name: Arc::from(type_name),
                operand: Box::new(operand),
            },
            Type::boolean(),
        ))
    }

    /// `operand typeof Type`
    pub fn type_of(&self, type_name: &str, operand: Expression) -> ExpressionResult<Expression> {
        self.resolve_type_name(type_name)?;
        Ok(self.make(
            Node::TypeOf {
                type_name: Arc::from(type_name),
                operand: Box::new(operand),
            },
            Type::boolean(),
        ))
    }

    // ==================== Constructors ====================

    /// `{a, b, c}`
    pub fn array(&self, items: Vec<Expression>) -> Expression {
        let element = items
            .split_first()
            .map_or_else(Type::any, |(first, rest)| {
                let ty = first.evaluation_type();
                if rest.iter().all(|item| item.evaluation_type() == ty) {
                    Arc::clone(ty)
                } else {
                    Type::any()
                }
            });
        self.make(Node::InlineArray(items), Type::array(element))
    }

    /// `{key: value, ...}`
    pub fn map(&self, entries: Vec<(&str, Expression)>) -> Expression {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (Arc::from(key), value))
            .collect();
        self.make(Node::InlineMap(entries), Type::any())
    }

    /// Template string.
    pub fn template(&self, parts: Vec<TemplatePart>) -> Expression {
        self.make(Node::Template(parts), Type::string())
    }

    /// Start a `set ... return ...` block.
    pub fn value_block(&self) -> ValueBlockBuilder {
        ValueBlockBuilder {
            outer: self.clone(),
            current: self.clone(),
            bindings: Vec::new(),
        }
    }
}

/// Builds a value block one binding at a time; each binding is visible to
/// the bindings after it and to the body.
#[derive(Debug)]
pub struct ValueBlockBuilder {
    outer: AstBuilder,
    current: AstBuilder,
    bindings: Vec<(Arc<str>, Expression)>,
}

impl ValueBlockBuilder {
    /// Builder for the next binding's value or the body.
    pub fn builder(&self) -> &AstBuilder {
        &self.current
    }

    /// `set name to value`
    #[must_use]
    pub fn bind(mut self, name: &str, value: Expression) -> Self {
        let scope = Scope::variables_map(
            format!("set {name}"),
            [VariableSymbol::new(name, Arc::clone(value.evaluation_type()))],
            self.current.scope(),
        );
        self.current = AstBuilder::new(scope);
        self.bindings.push((Arc::from(name), value));
        self
    }

    /// `return body`
    pub fn finish(self, body: Expression) -> Expression {
        let ty = Arc::clone(body.evaluation_type());
        self.outer.make(
            Node::ValueBlock {
                bindings: self.bindings,
                body: Box::new(body),
            },
            ty,
        )
    }
}

/// First node of a reference chain.
fn chain_root(expression: &Expression) -> Option<&Expression> {
    match expression.node() {
        Node::This | Node::Identifier { .. } => Some(expression),
        Node::ReferenceValue { reference, .. } => chain_root(reference),
        Node::Path { object, .. } => chain_root(object),
        Node::AccessByIndex { collection, .. } | Node::Filter { collection, .. } => {
            chain_root(collection)
        }
        _ => None,
    }
}

fn arithmetic_type(op: BinaryOp, left: &Arc<Type>, right: &Arc<Type>) -> Arc<Type> {
    let money = Type::money();
    let integer = Type::integer();
    if *left == money || *right == money {
        return money;
    }
    if op == BinaryOp::Add && (*left == Type::string() || *right == Type::string()) {
        return Type::string();
    }
    if !left.is_numeric() || !right.is_numeric() {
        return Type::any();
    }
    match op {
        BinaryOp::Divide | BinaryOp::Power => Type::decimal(),
        _ if *left == integer && *right == integer => integer,
        _ if *left == Type::decimal() || *right == Type::decimal() => Type::decimal(),
        _ => Type::number(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use verdict_types::{SymbolTable, TypeTable};
    use verdict_value::Decimal;

    fn coverage() -> Arc<Type> {
        Type::entity(
            "Coverage",
            [
                VariableSymbol::new("limitAmount", Type::decimal()),
                VariableSymbol::new("code", Type::string()),
            ],
            std::iter::empty::<&str>(),
        )
    }

    fn policy_builder() -> AstBuilder {
        let mut types = TypeTable::new();
        types.insert(coverage());
        let policy = Type::entity(
            "Policy",
            [
                VariableSymbol::new("state", Type::string()),
                VariableSymbol::new("coverages", Type::array(Type::reference("Coverage"))),
            ],
            std::iter::empty::<&str>(),
        );
        types.insert(Arc::clone(&policy));
        let global = Scope::global("global", SymbolTable::new(), Arc::new(types));
        AstBuilder::new(Scope::local(policy, &global))
    }

    #[test]
    fn paths_over_collections_are_collections() {
        let b = policy_builder();
        let limits = b.path(b.identifier("coverages").unwrap(), "limitAmount").unwrap();
        assert_eq!(limits.evaluation_type().name(), "Decimal[]");
        assert_eq!(limits.text(), "coverages.limitAmount");
    }

    #[test]
    fn unknown_property_is_an_error() {
        let b = policy_builder();
        let err = b.path(b.identifier("state").unwrap(), "length").unwrap_err();
        assert_eq!(err.code(), "EXPR:UNKNOWN_PROPERTY");
    }

    #[test]
    fn filter_predicate_sees_element_and_outer_fields() {
        let b = policy_builder();
        let filtered = b
            .filter(b.identifier("coverages").unwrap(), |inner| {
                let limit = inner.identifier("limitAmount")?;
                let state = inner.identifier("state")?;
                if let Node::Identifier { this_depth, .. } = state.node() {
                    assert_eq!(*this_depth, 1);
                }
                Ok(inner.binary(
                    BinaryOp::And,
                    inner.binary(BinaryOp::GreaterThan, limit, inner.literal(Decimal::TWO)),
                    inner.binary(BinaryOp::Equal, state, inner.string("CA")),
                ))
            })
            .unwrap();
        assert_eq!(filtered.evaluation_type().name(), "Coverage[]");
        assert_eq!(filtered.text(), "coverages[limitAmount > 2 and state = 'CA']");
    }

    #[test]
    fn value_block_bindings_chain() {
        let b = policy_builder();
        let block = b.value_block();
        let first = block.builder().literal(2_i64);
        let block = block.bind("x", first);
        let second = block.builder().binary(
            BinaryOp::Multiply,
            block.builder().identifier("x").unwrap(),
            block.builder().literal(3_i64),
        );
        let block = block.bind("y", second);
        let body = block.builder().identifier("y").unwrap();
        let expression = block.finish(body);

        assert_eq!(expression.evaluation_type(), &Type::integer());
        assert_eq!(expression.text(), "set x to 2 set y to x * 3 return y");
    }

    #[test]
    fn rendering_keeps_grouping() {
        let b = policy_builder();
        let sum = b.binary(BinaryOp::Add, b.literal(1_i64), b.literal(2_i64));
        let product = b.binary(BinaryOp::Multiply, sum, b.literal(3_i64));
        assert_eq!(product.text(), "(1 + 2) * 3");
        assert_eq!(product.evaluation_type(), &Type::integer());

        let negated = b.unary(UnaryOp::Not, b.this());
        assert_eq!(negated.text(), "!this");
    }
}
