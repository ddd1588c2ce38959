//! Read-only traversal.

use super::Expression;

/// Side-effecting analysis over a tree.
///
/// Implementors match on [`Expression::node`] for the kinds they care about
/// and call [`walk`] to continue into the children.
pub trait Visitor {
    /// Visit a node. The default visits every child.
    fn visit(&mut self, expression: &Expression) {
        walk(self, expression);
    }
}

/// Visit the direct children of `expression` in evaluation order.
pub fn walk<V: Visitor + ?Sized>(visitor: &mut V, expression: &Expression) {
    for child in expression.children() {
        visitor.visit(child);
    }
}
