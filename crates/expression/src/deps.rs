//! Field and context dependencies of an expression.
//!
//! A rule must be re-evaluated whenever a field it reads changes. The
//! extractor reports every context it references across contexts and every
//! `(type, field)` pair it reads through a path or a bare field name.

use std::sync::Arc;

use indexmap::IndexSet;
use verdict_types::{ScopeKind, Type};

use crate::ast::queued::{NodeQueue, QueuedVisitor, traverse_queued};
use crate::ast::{Expression, Node};

/// One read performed by an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AstDependency {
    /// Context (or other entity type) the read goes to.
    pub context_name: String,
    /// Field read, `None` when the whole context is referenced.
    pub field_name: Option<String>,
    /// Whether the context is referenced from another context.
    pub cross_context: bool,
}

impl AstDependency {
    /// Reference to a whole context from another context.
    pub fn context(name: impl Into<String>) -> Self {
        Self {
            context_name: name.into(),
            field_name: None,
            cross_context: true,
        }
    }

    /// Read of a field.
    pub fn field(context: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            context_name: context.into(),
            field_name: Some(field.into()),
            cross_context: false,
        }
    }
}

/// A cross-context reference and the chain it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrossContextReference {
    /// Referenced context.
    pub context_name: String,
    /// Text of the enclosing reference chain, or of the bare name.
    pub reference: String,
}

/// Collects [`AstDependency`] and [`CrossContextReference`] values.
#[derive(Debug, Default)]
pub struct DependencyExtractor<'a> {
    queue: NodeQueue<'a>,
    dependencies: IndexSet<AstDependency>,
    references: IndexSet<CrossContextReference>,
}

impl<'a> DependencyExtractor<'a> {
    /// Empty extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dependencies of `expression`, in first-read order without duplicates.
    pub fn extract(expression: &'a Expression) -> Vec<AstDependency> {
        let mut extractor = Self::new();
        extractor.visit_queued(expression);
        extractor.dependencies.into_iter().collect()
    }

    /// Cross-context references of `expression`.
    pub fn cross_context_references(expression: &'a Expression) -> Vec<CrossContextReference> {
        let mut extractor = Self::new();
        extractor.visit_queued(expression);
        extractor.references.into_iter().collect()
    }

    fn record_field(&mut self, owner: &Arc<Type>, field: &str) {
        let owner = owner.unwrap_array();
        if owner.is_dynamic() || owner.is_primitive() {
            return;
        }
        self.dependencies
            .insert(AstDependency::field(owner.name(), field));
    }
}

impl<'a> QueuedVisitor<'a> for DependencyExtractor<'a> {
    fn queue(&mut self) -> &mut NodeQueue<'a> {
        &mut self.queue
    }

    fn visit_queued(&mut self, expression: &'a Expression) {
        match expression.node() {
            Node::Identifier {
                name,
                origin: ScopeKind::Global,
                ..
            } => {
                // Cross-context references bind a context name to its own type.
                let ty = expression.evaluation_type().unwrap_array();
                if !ty.is_dynamic() && ty.name() == name.as_ref() {
                    self.dependencies.insert(AstDependency::context(name.as_ref()));
                    let reference = self
                        .queue
                        .enclosing_reference()
                        .unwrap_or(expression)
                        .text()
                        .to_string();
                    self.references.insert(CrossContextReference {
                        context_name: name.to_string(),
                        reference,
                    });
                }
            }
            Node::Identifier {
                name,
                origin: ScopeKind::Local,
                this_depth,
            } => {
                if let Some(owner) = local_owner(expression, *this_depth) {
                    self.record_field(&owner, name);
                }
            }
            Node::Path {
                object, property, ..
            } => {
                let owner = object.evaluation_type().bounded();
                self.record_field(&owner, property);
            }
            _ => {}
        }
        traverse_queued(self, expression);
    }
}

/// Type of the `this` object a local identifier reads from.
fn local_owner(expression: &Expression, this_depth: usize) -> Option<Arc<Type>> {
    let mut remaining = this_depth;
    let mut current = Some(expression.scope().as_ref());
    while let Some(scope) = current {
        if scope.kind() == ScopeKind::Local {
            if remaining == 0 {
                return Some(Arc::clone(scope.ty()));
            }
            remaining -= 1;
        }
        current = scope.parent().map(Arc::as_ref);
    }
    None
}
