//! Layered, parent-linked symbol environments.
//!
//! A scope answers two questions for the expression typer: what type does an
//! identifier have, and which scope level does it come from. The level tells
//! the interpreter where to read the value at runtime (a field of `this`, or
//! a bound variable).

use std::sync::Arc;

use indexmap::IndexMap;

use crate::symbol::{FunctionHeader, FunctionSymbol, SymbolTable, VariableSymbol};
use crate::types::{Type, TypeTable};

/// Level a scope sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Project wide variables and functions
    Global,
    /// Fields of the current `this` object
    Local,
    /// Explicitly bound variables: function arguments, iteration variables,
    /// value-block bindings
    VariablesMap,
}

/// An identifier resolved against a scope chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    /// The symbol found.
    pub symbol: VariableSymbol,
    /// Kind of the scope that declared it.
    pub origin: ScopeKind,
}

/// Immutable symbol environment with an optional parent.
#[derive(Debug)]
pub struct Scope {
    kind: ScopeKind,
    ty: Arc<Type>,
    functions: IndexMap<FunctionHeader, FunctionSymbol>,
    parent: Option<Arc<Scope>>,
    types: Arc<TypeTable>,
}

impl Scope {
    /// Root scope: its type is a synthetic object named `name` whose
    /// properties are the table's variables.
    pub fn global(name: impl AsRef<str>, table: SymbolTable, types: Arc<TypeTable>) -> Arc<Self> {
        let (variables, functions) = table.into_parts();
        Arc::new(Self {
            kind: ScopeKind::Global,
            ty: Type::entity(name, variables.into_values(), std::iter::empty::<&str>()),
            functions,
            parent: None,
            types,
        })
    }

    /// Root scope that accepts any identifier as `Any`, used where nothing
    /// is known statically.
    pub fn dynamic(types: Arc<TypeTable>) -> Arc<Self> {
        Arc::new(Self {
            kind: ScopeKind::Global,
            ty: Type::any(),
            functions: IndexMap::new(),
            parent: None,
            types,
        })
    }

    /// Scope of a `this` object of type `ty`.
    pub fn local(ty: Arc<Type>, parent: &Arc<Scope>) -> Arc<Self> {
        Arc::new(Self {
            kind: ScopeKind::Local,
            ty,
            functions: IndexMap::new(),
            parent: Some(Arc::clone(parent)),
            types: Arc::clone(&parent.types),
        })
    }

    /// Scope of explicitly bound variables.
    pub fn variables_map(
        name: impl AsRef<str>,
        variables: impl IntoIterator<Item = VariableSymbol>,
        parent: &Arc<Scope>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind: ScopeKind::VariablesMap,
            ty: Type::entity(name, variables, std::iter::empty::<&str>()),
            functions: IndexMap::new(),
            parent: Some(Arc::clone(parent)),
            types: Arc::clone(&parent.types),
        })
    }

    /// Scope level.
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Type whose properties this scope declares.
    pub fn ty(&self) -> &Arc<Type> {
        &self.ty
    }

    /// Name of the scope's type.
    pub fn name(&self) -> &str {
        self.ty.name()
    }

    /// Enclosing scope.
    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    /// Types known to this scope chain.
    pub fn types(&self) -> &Arc<TypeTable> {
        &self.types
    }

    /// Functions declared at this level.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionSymbol> {
        self.functions.values()
    }

    /// Resolve an identifier, nearest scope first.
    ///
    /// A scope with a dynamic type claims only names no enclosing scope
    /// declares; everything is then resolved as `Any` at the innermost such
    /// scope.
    pub fn resolve_reference(&self, name: &str) -> Option<ResolvedReference> {
        let mut dynamic = None;
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(symbol) = scope.ty.resolve_property(name, self.types.as_ref()) {
                return Some(ResolvedReference {
                    symbol,
                    origin: scope.kind,
                });
            }
            if scope.ty.is_dynamic() && dynamic.is_none() {
                dynamic = Some(scope.kind);
            }
            current = scope.parent.as_deref();
        }
        dynamic.map(|origin| ResolvedReference {
            symbol: VariableSymbol::new(name, Type::any()),
            origin,
        })
    }

    /// Resolve a function by name and arity, nearest scope first.
    pub fn resolve_function(&self, name: &str, arity: usize) -> Option<&FunctionSymbol> {
        let header = FunctionHeader::new(name, arity);
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(function) = scope.functions.get(&header) {
                return Some(function);
            }
            current = scope.parent.as_deref();
        }
        None
    }

    /// Type of `this`: the nearest local scope's type, `Any` when there is none.
    pub fn this_type(&self) -> Arc<Type> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.kind == ScopeKind::Local {
                return Arc::clone(&scope.ty);
            }
            current = scope.parent.as_deref();
        }
        Type::any()
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent.as_deref();
        while let Some(scope) = current {
            depth += 1;
            current = scope.parent.as_deref();
        }
        depth
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.ty == other.ty
            && self.ty.properties().count() == other.ty.properties().count()
            && self
                .ty
                .properties()
                .all(|symbol| other.ty.own_property(symbol.name()) == Some(symbol))
            && self.functions == other.functions
            && self.parent == other.parent
    }
}
