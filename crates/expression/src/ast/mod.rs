//! Abstract Syntax Tree (AST) node types
//!
//! Every node carries the scope it was resolved in, its statically inferred
//! type and the source text it was built from. Nodes are immutable; rewrites
//! build new trees (see [`rewrite`]).

pub mod builder;
pub mod queued;
pub mod rewrite;
pub mod visit;

use std::fmt;
use std::sync::Arc;

use verdict_types::{Scope, ScopeKind, Type};
use verdict_value::Value;

pub use builder::{AstBuilder, ValueBlockBuilder};

/// Source text of a node, used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(Arc<str>);

impl Token {
    /// Token over the given text.
    pub fn new(text: impl AsRef<str>) -> Self {
        Self(Arc::from(text.as_ref()))
    }

    /// Source text.
    pub fn text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    // Membership
    In,
    Matches,

    // Logical
    And,
    Or,
}

impl BinaryOp {
    /// Get a human-readable name for the operator
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Power => "**",
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::In => "in",
            Self::Matches => "matches",
            Self::And => "and",
            Self::Or => "or",
        }
    }

    /// `+ - * / % **`
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulo | Self::Power
        )
    }

    /// `< > <= >=`
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            Self::LessThan | Self::GreaterThan | Self::LessEqual | Self::GreaterEqual
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Negate,
    /// `!x`
    Not,
}

impl UnaryOp {
    /// Get a human-readable name for the operator
    pub fn name(self) -> &'static str {
        match self {
            Self::Negate => "-",
            Self::Not => "!",
        }
    }
}

/// Piece of a template string.
#[derive(Debug, Clone)]
pub enum TemplatePart {
    /// Literal text
    Text(Arc<str>),
    /// Interpolated expression
    Expression(Expression),
}

/// The closed set of node kinds.
#[derive(Debug, Clone)]
pub enum Node {
    // Literals
    /// String, boolean, number, money, date or date-time literal
    Literal(Value),
    /// `null`
    Null,

    // References
    /// Bare name. `origin` is the kind of scope that declared it; for
    /// fields of `this`, `this_depth` counts the nearer `this` objects
    /// (filter elements) that do not declare the name
    Identifier {
        name: Arc<str>,
        origin: ScopeKind,
        this_depth: usize,
    },
    /// `this`
    This,
    /// Root of a reference chain such as `this.coverages[0].limit`
    ReferenceValue {
        explicit_this: bool,
        reference: Box<Expression>,
    },
    /// `object.property`, or `object?.property` when `null_safe`
    Path {
        object: Box<Expression>,
        property: Arc<str>,
        null_safe: bool,
    },
    /// `collection[index]`
    AccessByIndex {
        collection: Box<Expression>,
        index: Box<Expression>,
    },
    /// `collection[predicate]`
    Filter {
        collection: Box<Expression>,
        predicate: Box<Expression>,
    },

    // Operators
    /// Unary operation
    Unary { op: UnaryOp, operand: Box<Expression> },
    /// Binary operation
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `if c then a else b`
    If {
        condition: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Option<Box<Expression>>,
    },

    // Collections
    /// `for x in c return body`
    ForEach {
        variable: Arc<str>,
        collection: Box<Expression>,
        body: Box<Expression>,
    },
    /// `for some x in c satisfies predicate`
    ForSome {
        variable: Arc<str>,
        collection: Box<Expression>,
        predicate: Box<Expression>,
    },
    /// `for every x in c satisfies predicate`
    ForEvery {
        variable: Arc<str>,
        collection: Box<Expression>,
        predicate: Box<Expression>,
    },

    // Calls and types
    /// `Name(arguments...)`
    FunctionCall {
        name: Arc<str>,
        arguments: Vec<Expression>,
    },
    /// `(Type) operand`
    Cast {
        type_name: Arc<str>,
        operand: Box<Expression>,
    },
    /// `operand instanceof Type`
    InstanceOf {
        type_name: Arc<str>,
        operand: Box<Expression>,
    },
    /// `operand typeof Type`
    TypeOf {
        type_name: Arc<str>,
        operand: Box<Expression>,
    },

    // Constructors
    /// `{a, b, c}`
    InlineArray(Vec<Expression>),
    /// `{key: value, ...}`
    InlineMap(Vec<(Arc<str>, Expression)>),
    /// `` `text ${expression}` ``
    Template(Vec<TemplatePart>),
    /// `set x to e1 set y to e2 return body`
    ValueBlock {
        bindings: Vec<(Arc<str>, Expression)>,
        body: Box<Expression>,
    },
}

impl Node {
    /// Node-type discriminant.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "Literal",
            Self::Null => "Null",
            Self::Identifier { .. } => "Identifier",
            Self::This => "This",
            Self::ReferenceValue { .. } => "ReferenceValue",
            Self::Path { .. } => "Path",
            Self::AccessByIndex { .. } => "AccessByIndex",
            Self::Filter { .. } => "Filter",
            Self::Unary { .. } => "Unary",
            Self::Binary { .. } => "Binary",
            Self::If { .. } => "If",
            Self::ForEach { .. } => "ForEach",
            Self::ForSome { .. } => "ForSome",
            Self::ForEvery { .. } => "ForEvery",
            Self::FunctionCall { .. } => "FunctionCall",
            Self::Cast { .. } => "Cast",
            Self::InstanceOf { .. } => "InstanceOf",
            Self::TypeOf { .. } => "TypeOf",
            Self::InlineArray(_) => "InlineArray",
            Self::InlineMap(_) => "InlineMap",
            Self::Template(_) => "Template",
            Self::ValueBlock { .. } => "ValueBlock",
        }
    }

    /// Canonical source text, built from the children's tokens.
    pub fn render(&self) -> String {
        match self {
            Self::Literal(value) => render_literal(value),
            Self::Null => "null".to_string(),
            Self::Identifier { name, .. } => name.to_string(),
            Self::This => "this".to_string(),
            Self::ReferenceValue { reference, .. } => reference.text().to_string(),
            Self::Path {
                object,
                property,
                null_safe,
            } => {
                let dot = if *null_safe { "?." } else { "." };
                format!("{}{dot}{property}", operand_text(object, u8::MAX))
            }
            Self::AccessByIndex { collection, index } => {
                format!("{}[{}]", operand_text(collection, u8::MAX), index.text())
            }
            Self::Filter {
                collection,
                predicate,
            } => format!("{}[{}]", operand_text(collection, u8::MAX), predicate.text()),
            Self::Unary { op, operand } => format!("{}{}", op.name(), operand_text(operand, u8::MAX)),
            Self::Binary { op, left, right } => {
                let precedence = precedence(*op);
                // Power is right associative, everything else left
                let (left_min, right_min) = if *op == BinaryOp::Power {
                    (precedence + 1, precedence)
                } else {
                    (precedence, precedence + 1)
                };
                format!(
                    "{} {op} {}",
                    operand_text(left, left_min),
                    operand_text(right, right_min)
                )
            }
            Self::If {
                condition,
                then_branch,
                else_branch,
            } => match else_branch {
                Some(otherwise) => format!(
                    "if {} then {} else {}",
                    condition.text(),
                    then_branch.text(),
                    otherwise.text()
                ),
                None => format!("if {} then {}", condition.text(), then_branch.text()),
            },
            Self::ForEach {
                variable,
                collection,
                body,
            } => format!("for {variable} in {} return {}", collection.text(), body.text()),
            Self::ForSome {
                variable,
                collection,
                predicate,
            } => format!(
                "for some {variable} in {} satisfies {}",
                collection.text(),
                predicate.text()
            ),
            Self::ForEvery {
                variable,
                collection,
                predicate,
            } => format!(
                "for every {variable} in {} satisfies {}",
                collection.text(),
                predicate.text()
            ),
            Self::FunctionCall { name, arguments } => {
                let arguments: Vec<&str> = arguments.iter().map(Expression::text).collect();
                format!("{name}({})", arguments.join(", "))
            }
            Self::Cast { type_name, operand } => {
                format!("({type_name}) {}", operand_text(operand, u8::MAX))
            }
            Self::InstanceOf { type_name, operand } => {
                format!("{} instanceof {type_name}", operand_text(operand, u8::MAX))
            }
            Self::TypeOf { type_name, operand } => {
                format!("{} typeof {type_name}", operand_text(operand, u8::MAX))
            }
            Self::InlineArray(items) => {
                let items: Vec<&str> = items.iter().map(Expression::text).collect();
                format!("{{{}}}", items.join(", "))
            }
            Self::InlineMap(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(key, value)| format!("{key}: {}", value.text()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            Self::Template(parts) => {
                let mut text = String::from("`");
                for part in parts {
                    match part {
                        TemplatePart::Text(literal) => text.push_str(literal),
                        TemplatePart::Expression(expression) => {
                            text.push_str("${");
                            text.push_str(expression.text());
                            text.push('}');
                        }
                    }
                }
                text.push('`');
                text
            }
            Self::ValueBlock { bindings, body } => {
                let mut text = String::new();
                for (name, value) in bindings {
                    text.push_str(&format!("set {name} to {} ", value.text()));
                }
                text.push_str("return ");
                text.push_str(body.text());
                text
            }
        }
    }
}

fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Equal | BinaryOp::NotEqual | BinaryOp::In | BinaryOp::Matches => 3,
        BinaryOp::LessThan
        | BinaryOp::GreaterThan
        | BinaryOp::LessEqual
        | BinaryOp::GreaterEqual => 4,
        BinaryOp::Add | BinaryOp::Subtract => 5,
        BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 6,
        BinaryOp::Power => 7,
    }
}

/// Child text, parenthesised when it binds looser than `min_precedence`.
fn operand_text(expression: &Expression, min_precedence: u8) -> String {
    let binds = match expression.node() {
        Node::Binary { op, .. } => precedence(*op),
        Node::If { .. }
        | Node::ForEach { .. }
        | Node::ForSome { .. }
        | Node::ForEvery { .. }
        | Node::ValueBlock { .. }
        | Node::Cast { .. }
        | Node::InstanceOf { .. }
        | Node::TypeOf { .. } => 0,
        _ => u8::MAX,
    };
    if binds < min_precedence {
        format!("({})", expression.text())
    } else {
        expression.text().to_string()
    }
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Text(text) => format!("'{}'", text.replace('\'', "\\'")),
        other => other.to_string(),
    }
}

/// An expression node with its static information.
#[derive(Debug, Clone)]
pub struct Expression {
    node: Node,
    scope: Arc<Scope>,
    evaluation_type: Arc<Type>,
    token: Token,
}

impl Expression {
    /// Assemble a node. Prefer [`AstBuilder`], which infers the type.
    pub fn new(node: Node, scope: Arc<Scope>, evaluation_type: Arc<Type>, token: Token) -> Self {
        Self {
            node,
            scope,
            evaluation_type,
            token,
        }
    }

    /// The node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Scope the node was resolved in.
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// Statically inferred type.
    pub fn evaluation_type(&self) -> &Arc<Type> {
        &self.evaluation_type
    }

    /// Source token.
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Source text.
    pub fn text(&self) -> &str {
        self.token.text()
    }

    /// Same scope, type and token over a different node.
    pub fn with_node(&self, node: Node) -> Self {
        Self {
            node,
            scope: Arc::clone(&self.scope),
            evaluation_type: Arc::clone(&self.evaluation_type),
            token: self.token.clone(),
        }
    }

    /// Replace the source token.
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = token;
        self
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Expression> {
        match &self.node {
            Node::Literal(_) | Node::Null | Node::Identifier { .. } | Node::This => Vec::new(),
            Node::ReferenceValue { reference, .. } => vec![reference],
            Node::Path { object, .. } => vec![object],
            Node::AccessByIndex { collection, index } => vec![collection, index],
            Node::Filter {
                collection,
                predicate,
            } => vec![collection, predicate],
            Node::Unary { operand, .. }
            | Node::Cast { operand, .. }
            | Node::InstanceOf { operand, .. }
            | Node::TypeOf { operand, .. } => vec![operand],
            Node::Binary { left, right, .. } => vec![left, right],
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut children: Vec<&Expression> = vec![condition, then_branch];
                children.extend(else_branch.as_deref());
                children
            }
            Node::ForEach {
                collection, body, ..
            } => vec![collection, body],
            Node::ForSome {
                collection,
                predicate,
                ..
            }
            | Node::ForEvery {
                collection,
                predicate,
                ..
            } => vec![collection, predicate],
            Node::FunctionCall { arguments, .. } => arguments.iter().collect(),
            Node::InlineArray(items) => items.iter().collect(),
            Node::InlineMap(entries) => entries.iter().map(|(_, value)| value).collect(),
            Node::Template(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    TemplatePart::Expression(expression) => Some(expression),
                    TemplatePart::Text(_) => None,
                })
                .collect(),
            Node::ValueBlock { bindings, body } => bindings
                .iter()
                .map(|(_, value)| value)
                .chain(std::iter::once(body.as_ref()))
                .collect(),
        }
    }

    /// Whether the node is a reference (identifier, `this`, path, index
    /// access, filter or reference value).
    pub fn is_reference(&self) -> bool {
        matches!(
            self.node,
            Node::Identifier { .. }
                | Node::This
                | Node::ReferenceValue { .. }
                | Node::Path { .. }
                | Node::AccessByIndex { .. }
                | Node::Filter { .. }
        )
    }

    /// Whether a reference chain starts at `this`, explicitly or through a
    /// field of the local scope.
    pub fn is_rooted_at_this(&self) -> bool {
        match &self.node {
            Node::This => true,
            Node::Identifier { origin, .. } => *origin == ScopeKind::Local,
            Node::ReferenceValue { reference, .. } => reference.is_rooted_at_this(),
            Node::Path { object, .. } => object.is_rooted_at_this(),
            Node::AccessByIndex { collection, .. } | Node::Filter { collection, .. } => {
                collection.is_rooted_at_this()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}
