//! Tree rewriting.
//!
//! Rewrites never touch the input tree. [`rebuild_with`] produces a new node
//! of the same kind from rewritten children, keeping the original scope and
//! static type and re-rendering the source text.

use std::sync::Arc;

use verdict_types::ScopeKind;

use super::queued::NodeQueue;
use super::{Expression, Node, TemplatePart, Token};

/// Produces a new tree from an existing one.
///
/// Override [`Rewriter::rewrite`] for the node kinds being changed and fall
/// back to [`rebuild`] for the rest.
pub trait Rewriter {
    /// Rewrite a node. The default rebuilds it from rewritten children.
    fn rewrite(&mut self, expression: &Expression) -> Expression {
        rebuild(self, expression)
    }
}

/// Rebuild `expression` from children rewritten by `rewriter`.
pub fn rebuild<R: Rewriter + ?Sized>(rewriter: &mut R, expression: &Expression) -> Expression {
    rebuild_with(expression, |child| rewriter.rewrite(child))
}

/// Rebuild `expression` with every direct child replaced by `f(child)`.
pub fn rebuild_with<'a, F>(expression: &'a Expression, mut f: F) -> Expression
where
    F: FnMut(&'a Expression) -> Expression,
{
    let mut boxed = |child: &'a Expression| Box::new(f(child));
    let node = match expression.node() {
        Node::Literal(value) => Node::Literal(value.clone()),
        Node::Null => Node::Null,
        Node::This => Node::This,
        Node::Identifier {
            name,
            origin,
            this_depth,
        } => Node::Identifier {
            name: Arc::clone(name),
            origin: *origin,
            this_depth: *this_depth,
        },
        Node::ReferenceValue { reference, .. } => {
            let reference = boxed(reference);
            Node::ReferenceValue {
                explicit_this: starts_at_this(&reference),
                reference,
            }
        }
        Node::Path {
            object,
            property,
            null_safe,
        } => Node::Path {
            object: boxed(object),
            property: Arc::clone(property),
            null_safe: *null_safe,
        },
        Node::AccessByIndex { collection, index } => Node::AccessByIndex {
            collection: boxed(collection),
            index: boxed(index),
        },
        Node::Filter {
            collection,
            predicate,
        } => Node::Filter {
            collection: boxed(collection),
            predicate: boxed(predicate),
        },
        Node::Unary { op, operand } => Node::Unary {
            op: *op,
            operand: boxed(operand),
        },
        Node::Binary { op, left, right } => Node::Binary {
            op: *op,
            left: boxed(left),
            right: boxed(right),
        },
        Node::If {
            condition,
            then_branch,
            else_branch,
        } => Node::If {
            condition: boxed(condition),
            then_branch: boxed(then_branch),
            else_branch: else_branch.as_deref().map(&mut boxed),
        },
        Node::ForEach {
            variable,
            collection,
            body,
        } => Node::ForEach {
            variable: Arc::clone(variable),
            collection: boxed(collection),
            body: boxed(body),
        },
        Node::ForSome {
            variable,
            collection,
            predicate,
        } => Node::ForSome {
            variable: Arc::clone(variable),
            collection: boxed(collection),
            predicate: boxed(predicate),
        },
        Node::ForEvery {
            variable,
            collection,
            predicate,
        } => Node::ForEvery {
            variable: Arc::clone(variable),
            collection: boxed(collection),
            predicate: boxed(predicate),
        },
        Node::FunctionCall { name, arguments } => Node::FunctionCall {
            name: Arc::clone(name),
            arguments: arguments.iter().map(|argument| *boxed(argument)).collect(),
        },
        Node::Cast { type_name, operand } => Node::Cast {
            type_name: Arc::clone(type_name),
            operand: boxed(operand),
        },
        Node::InstanceOf { type_name, operand } => Node::InstanceOf {
            type_name: Arc::clone(type_name),
            operand: boxed(operand),
        },
        Node::TypeOf { type_name, operand } => Node::TypeOf {
            type_name: Arc::clone(type_name),
            operand: boxed(operand),
        },
        Node::InlineArray(items) => {
            Node::InlineArray(items.iter().map(|item| *boxed(item)).collect())
        }
        Node::InlineMap(entries) => Node::InlineMap(
            entries
                .iter()
                .map(|(key, value)| (Arc::clone(key), *boxed(value)))
                .collect(),
        ),
        Node::Template(parts) => Node::Template(
            parts
                .iter()
                .map(|part| match part {
                    TemplatePart::Text(text) => TemplatePart::Text(Arc::clone(text)),
                    TemplatePart::Expression(expression) => {
                        TemplatePart::Expression(*boxed(expression))
                    }
                })
                .collect(),
        ),
        Node::ValueBlock { bindings, body } => Node::ValueBlock {
            bindings: bindings
                .iter()
                .map(|(name, value)| (Arc::clone(name), *boxed(value)))
                .collect(),
            body: boxed(body),
        },
    };
    let token = Token::new(node.render());
    expression.with_node(node).with_token(token)
}

fn starts_at_this(expression: &Expression) -> bool {
    match expression.node() {
        Node::This => true,
        Node::Path { object, .. } => starts_at_this(object),
        Node::AccessByIndex { collection, .. } | Node::Filter { collection, .. } => {
            starts_at_this(collection)
        }
        Node::ReferenceValue { reference, .. } => starts_at_this(reference),
        _ => false,
    }
}

/// A rewriter that knows the chain of nodes enclosing the one being
/// rewritten.
pub trait QueuedRewriter<'a> {
    /// Ancestors of the node being rewritten.
    fn queue(&mut self) -> &mut NodeQueue<'a>;

    /// Rewrite a node. The default rebuilds it from rewritten children.
    fn rewrite_queued(&mut self, expression: &'a Expression) -> Expression {
        rebuild_queued(self, expression)
    }
}

/// Rebuild `expression` from children rewritten by `rewriter`, with
/// `expression` on the queue while they are rewritten.
pub fn rebuild_queued<'a, R: QueuedRewriter<'a> + ?Sized>(
    rewriter: &mut R,
    expression: &'a Expression,
) -> Expression {
    rewriter.queue().push(expression);
    let rebuilt = rebuild_with(expression, |child| rewriter.rewrite_queued(child));
    rewriter.queue().pop();
    rebuilt
}

/// Turns bare identifiers that name fields of the current `this` object
/// into explicit `this.<field>` paths.
///
/// Identifiers that name fields of an outer `this` (a filter element's
/// enclosing object) have no explicit spelling and are left alone.
#[derive(Debug, Default)]
pub struct ThisPathNormalizer<'a> {
    queue: NodeQueue<'a>,
}

impl ThisPathNormalizer<'_> {
    /// Normalizer with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite a whole tree.
    pub fn normalize(expression: &Expression) -> Expression {
        ThisPathNormalizer::new().rewrite_queued(expression)
    }
}

impl<'a> QueuedRewriter<'a> for ThisPathNormalizer<'a> {
    fn queue(&mut self) -> &mut NodeQueue<'a> {
        &mut self.queue
    }

    fn rewrite_queued(&mut self, expression: &'a Expression) -> Expression {
        let Node::Identifier {
            name,
            origin: ScopeKind::Local,
            this_depth: 0,
        } = expression.node()
        else {
            return rebuild_queued(self, expression);
        };

        let scope = expression.scope();
        let this = Expression::new(
            Node::This,
            Arc::clone(scope),
            scope.this_type(),
            Token::new("this"),
        );
        let path = Node::Path {
            object: Box::new(this),
            property: Arc::clone(name),
            null_safe: false,
        };
        let token = Token::new(path.render());
        let path = expression.with_node(path).with_token(token);

        // Bare field names used outside any reference chain get their own
        // chain root.
        if self.queue.enclosing_reference().is_some() {
            path
        } else {
            let reference = Node::ReferenceValue {
                explicit_this: true,
                reference: Box::new(path.clone()),
            };
            path.with_node(reference)
        }
    }
}
