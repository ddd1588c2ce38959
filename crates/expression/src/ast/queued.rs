//! Traversal that remembers where it is.
//!
//! Several analyses need to know which nodes enclose the current one, most
//! often the nearest [`Node::ReferenceValue`]. A [`NodeQueue`] keeps that
//! stack so nobody has to walk down from the root again.

use super::{Expression, Node};

/// Stack of the nodes enclosing the current one, outermost first.
#[derive(Debug, Default)]
pub struct NodeQueue<'a> {
    stack: Vec<&'a Expression>,
}

impl<'a> NodeQueue<'a> {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a node.
    pub fn push(&mut self, expression: &'a Expression) {
        self.stack.push(expression);
    }

    /// Leave the innermost node.
    pub fn pop(&mut self) -> Option<&'a Expression> {
        self.stack.pop()
    }

    /// Innermost enclosing node.
    pub fn parent(&self) -> Option<&'a Expression> {
        self.stack.last().copied()
    }

    /// Enclosing nodes, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = &'a Expression> + '_ {
        self.stack.iter().rev().copied()
    }

    /// Nearest enclosing reference chain root.
    pub fn enclosing_reference(&self) -> Option<&'a Expression> {
        self.ancestors()
            .find(|expression| matches!(expression.node(), Node::ReferenceValue { .. }))
    }

    /// Number of enclosing nodes.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// A visitor that knows the chain of nodes enclosing the one being visited.
pub trait QueuedVisitor<'a> {
    /// Ancestors of the node being visited.
    fn queue(&mut self) -> &mut NodeQueue<'a>;

    /// Visit a node. The default visits every child.
    fn visit_queued(&mut self, expression: &'a Expression) {
        traverse_queued(self, expression);
    }
}

/// Visit the children of `expression` with `expression` on the queue.
pub fn traverse_queued<'a, V: QueuedVisitor<'a> + ?Sized>(
    visitor: &mut V,
    expression: &'a Expression,
) {
    visitor.queue().push(expression);
    for child in expression.children() {
        visitor.visit_queued(child);
    }
    visitor.queue().pop();
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ast::AstBuilder;
    use pretty_assertions::assert_eq;
    use verdict_types::{Scope, TypeTable};

    #[derive(Default)]
    struct ReferenceTracker<'a> {
        queue: NodeQueue<'a>,
        seen: Vec<(String, Option<String>, usize)>,
    }

    impl<'a> QueuedVisitor<'a> for ReferenceTracker<'a> {
        fn queue(&mut self) -> &mut NodeQueue<'a> {
            &mut self.queue
        }

        fn visit_queued(&mut self, expression: &'a Expression) {
            if let Node::Identifier { name, .. } = expression.node() {
                let enclosing = self
                    .queue
                    .enclosing_reference()
                    .map(|reference| reference.text().to_string());
                self.seen.push((name.to_string(), enclosing, self.queue.depth()));
            }
            traverse_queued(self, expression);
        }
    }

    #[test]
    fn tracks_nearest_enclosing_reference() {
        let b = AstBuilder::new(Scope::dynamic(Arc::new(TypeTable::new())));
        let chain = b.reference(
            b.path(b.identifier("Vehicle").unwrap(), "model").unwrap(),
        );
        let call = b.call("Count", vec![chain]);
        // Dynamic scopes carry no functions.
        assert!(call.is_err());

        let chain = b.reference(
            b.path(b.identifier("Vehicle").unwrap(), "model").unwrap(),
        );
        let expression = b.array(vec![chain, b.identifier("loose").unwrap()]);

        let mut tracker = ReferenceTracker::default();
        tracker.visit_queued(&expression);
        assert_eq!(
            tracker.seen,
            vec![
                ("Vehicle".to_string(), Some("Vehicle.model".to_string()), 3),
                ("loose".to_string(), None, 1),
            ]
        );
        assert_eq!(tracker.queue.depth(), 0);
    }
}
