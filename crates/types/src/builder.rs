//! Memoized construction of rule, function and invocation scopes.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{TypeError, TypeResult};
use crate::paths::{CrossContextPathResolver, ReferenceCardinality};
use crate::registry::{ImplementedFunction, TypeRegistry};
use crate::scope::Scope;
use crate::symbol::{SymbolTable, VariableSymbol};
use crate::types::Type;

/// Name the external context is bound to in rule scopes.
pub const EXTERNAL_CONTEXT_VARIABLE: &str = "context";

/// Cache key of a function scope specialised for actual argument types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationKey {
    /// Function name.
    pub function: String,
    /// Actual argument type names, in parameter order.
    pub arguments: Vec<String>,
}

impl InvocationKey {
    fn new(function: &str, arguments: &[Arc<Type>]) -> Self {
        Self {
            function: function.to_string(),
            arguments: arguments.iter().map(|ty| ty.name().to_string()).collect(),
        }
    }
}

/// Builds scopes for one project and memoizes them.
///
/// Every cache entry is computed at most once per key in the common case;
/// concurrent first calls may compute the same scope twice, in which case the
/// first inserted value is kept and returned to everybody.
pub struct ScopeBuilder {
    registry: Arc<TypeRegistry>,
    paths: Arc<dyn CrossContextPathResolver>,
    functions_scope: Arc<Scope>,
    scopes: DashMap<String, Arc<Scope>>,
    function_scopes: DashMap<String, Arc<Scope>>,
    invocation_scopes: DashMap<InvocationKey, Arc<Scope>>,
}

impl ScopeBuilder {
    /// Create a builder over a registry and the path resolver it was built with.
    pub fn new(registry: Arc<TypeRegistry>, paths: Arc<dyn CrossContextPathResolver>) -> Self {
        let mut table = SymbolTable::new();
        table.merge_functions(registry.functions());
        let functions_scope = Scope::global(
            registry.global_scope_name(),
            table,
            Arc::clone(registry.types()),
        );
        Self {
            registry,
            paths,
            functions_scope,
            scopes: DashMap::new(),
            function_scopes: DashMap::new(),
            invocation_scopes: DashMap::new(),
        }
    }

    /// Registry the scopes are built from.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Global scope holding only the project's functions; the parent of
    /// every function scope.
    pub fn functions_scope(&self) -> &Arc<Scope> {
        &self.functions_scope
    }

    /// Scope a rule on context `context` is type checked in: the context's
    /// fields over a global scope of cross-context references, functions and
    /// the external context.
    pub fn build_scope(&self, context: &str) -> TypeResult<Arc<Scope>> {
        if let Some(scope) = self.scopes.get(context) {
            return Ok(Arc::clone(scope.value()));
        }

        let this_type = self
            .registry
            .context_type(context)
            .cloned()
            .ok_or_else(|| TypeError::unknown_context(context))?;

        let table = if self.registry.is_connected(context) {
            self.exact_table(context)
        } else {
            warn!(
                context = %context,
                "context is not reachable from root, using approximate scope"
            );
            self.approximate_table()
        };

        let global = Scope::global(
            self.registry.global_scope_name(),
            table,
            Arc::clone(self.registry.types()),
        );
        let scope = Scope::local(this_type, &global);
        debug!(context = %context, "built rule scope");

        Ok(Arc::clone(
            self.scopes
                .entry(context.to_string())
                .or_insert(scope)
                .value(),
        ))
    }

    /// Scope a function body is type checked in, with parameters bound to
    /// their declared types (type parameters replaced by their bounds).
    pub fn build_function_scope(&self, function: &str) -> TypeResult<Arc<Scope>> {
        if let Some(scope) = self.function_scopes.get(function) {
            return Ok(Arc::clone(scope.value()));
        }

        let implemented = self.implemented(function)?;
        let variables = implemented
            .definition
            .parameters
            .iter()
            .zip(implemented.symbol.parameters())
            .map(|(definition, parameter)| {
                VariableSymbol::new(&definition.name, parameter.ty().bounded())
            });
        let scope = Scope::variables_map(function, variables, &self.functions_scope);
        debug!(function = %function, "built function scope");

        Ok(Arc::clone(
            self.function_scopes
                .entry(function.to_string())
                .or_insert(scope)
                .value(),
        ))
    }

    /// Scope of a function body for one call site, with parameters bound to
    /// the actual argument types. Parameters without an actual type keep
    /// their declared type.
    pub fn build_function_invocation_scope(
        &self,
        function: &str,
        arguments: &[Arc<Type>],
    ) -> TypeResult<Arc<Scope>> {
        let key = InvocationKey::new(function, arguments);
        if let Some(scope) = self.invocation_scopes.get(&key) {
            return Ok(Arc::clone(scope.value()));
        }

        let implemented = self.implemented(function)?;
        let variables = implemented
            .definition
            .parameters
            .iter()
            .zip(implemented.symbol.parameters())
            .map(|(definition, parameter)| {
                let ty = arguments
                    .get(parameter.index())
                    .cloned()
                    .unwrap_or_else(|| parameter.ty().bounded());
                VariableSymbol::new(&definition.name, ty)
            });
        let scope = Scope::variables_map(function, variables, &self.functions_scope);
        debug!(
            function = %function,
            arguments = ?key.arguments,
            "specialised function scope for invocation"
        );

        Ok(Arc::clone(
            self.invocation_scopes.entry(key).or_insert(scope).value(),
        ))
    }

    fn implemented(&self, function: &str) -> TypeResult<&ImplementedFunction> {
        self.registry
            .implemented_function(function)
            .ok_or_else(|| TypeError::UnknownFunction {
                name: function.to_string(),
            })
    }

    /// Cross-context references typed by the cardinality of every route from
    /// `context` to each connected context.
    fn exact_table(&self, context: &str) -> SymbolTable {
        let from_paths = self.paths.paths_for(context);
        let mut table = SymbolTable::new();

        for (name, ty) in self.registry.global_types() {
            let bound = if ty.is_dynamic() {
                Arc::clone(ty)
            } else {
                let cardinality = ReferenceCardinality::aggregate(
                    from_paths
                        .iter()
                        .flat_map(|path| self.paths.resolve_paths(path, name))
                        .map(|route| route.cardinality()),
                );
                let reference = Type::reference(name);
                match cardinality {
                    Some(ReferenceCardinality::Single) => reference,
                    Some(ReferenceCardinality::Multiple) => Type::array(reference),
                    Some(ReferenceCardinality::SingleOrMultiple) | None => {
                        reference.single_or_multiple()
                    }
                }
            };
            table.add_variable(VariableSymbol::new(name, bound));
        }

        self.finish_table(table)
    }

    /// Every context, each possibly single or multiple.
    fn approximate_table(&self) -> SymbolTable {
        let mut table = SymbolTable::new();
        for (name, ty) in self.registry.context_types() {
            let bound = if ty.is_dynamic() {
                Arc::clone(ty)
            } else {
                Type::reference(name).single_or_multiple()
            };
            table.add_variable(VariableSymbol::new(name, bound));
        }
        self.finish_table(table)
    }

    fn finish_table(&self, mut table: SymbolTable) -> SymbolTable {
        if let Some(external) = self.registry.external_context_type() {
            table.add_variable(VariableSymbol::new(
                EXTERNAL_CONTEXT_VARIABLE,
                Type::reference(external.name()),
            ));
        }
        table.merge_functions(self.registry.functions());
        table
    }
}

impl std::fmt::Debug for ScopeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeBuilder")
            .field("project", &self.registry.global_scope_name())
            .field("scopes", &self.scopes.len())
            .field("function_scopes", &self.function_scopes.len())
            .field("invocation_scopes", &self.invocation_scopes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ChildNavigation, ContextDefinition, ExternalContextDefinition, FieldDefinition,
        FunctionDefinition, ProjectModel,
    };
    use crate::paths::NavigationGraph;
    use crate::registry::NativeFunctionTable;
    use crate::scope::ScopeKind;
    use pretty_assertions::assert_eq;

    fn builder() -> ScopeBuilder {
        let model = ProjectModel::new("demo", "ns", "Policy")
            .context(
                ContextDefinition::new("Policy")
                    .field(FieldDefinition::single("state", "String"))
                    .child(ChildNavigation::multiple("RiskItem"))
                    .child(ChildNavigation::single("Insured")),
            )
            .context(ContextDefinition::new("RiskItem").child(ChildNavigation::multiple("Coverage")))
            .context(ContextDefinition::new("Insured"))
            .context(
                ContextDefinition::new("Coverage")
                    .field(FieldDefinition::single("limitAmount", "Decimal")),
            )
            .context(ContextDefinition::new("Orphan"))
            .external_context(
                ExternalContextDefinition::new("Request")
                    .field(FieldDefinition::single("channel", "String")),
            )
            .external_root("Request")
            .function(FunctionDefinition::new("Twice", "Number").param("amount", "Number"));
        let graph = Arc::new(NavigationGraph::from_model(&model).unwrap());
        let registry = Arc::new(
            TypeRegistry::new(Arc::new(model), graph.as_ref(), &NativeFunctionTable::new())
                .unwrap(),
        );
        ScopeBuilder::new(registry, graph)
    }

    fn bound_type(scope: &Scope, name: &str) -> String {
        scope
            .resolve_reference(name)
            .unwrap()
            .symbol
            .ty()
            .name()
            .to_string()
    }

    #[test]
    fn rule_scope_binds_references_by_cardinality() {
        let builder = builder();
        let scope = builder.build_scope("RiskItem").unwrap();

        assert_eq!(scope.kind(), ScopeKind::Local);
        assert_eq!(bound_type(&scope, "Policy"), "Policy");
        assert_eq!(bound_type(&scope, "Insured"), "Insured");
        assert_eq!(bound_type(&scope, "Coverage"), "Coverage[]");
        assert_eq!(bound_type(&scope, "context"), "Request");
        assert!(scope.resolve_reference("Orphan").is_none());
        assert!(scope.resolve_function("Twice", 1).is_some());
    }

    #[test]
    fn root_scope_sees_multiple_descendants_as_collections() {
        let builder = builder();
        let scope = builder.build_scope("Policy").unwrap();
        assert_eq!(bound_type(&scope, "RiskItem"), "RiskItem[]");
        assert_eq!(bound_type(&scope, "state"), "String");
    }

    #[test]
    fn unreachable_context_gets_approximate_scope() {
        let builder = builder();
        let scope = builder.build_scope("Orphan").unwrap();
        assert_eq!(bound_type(&scope, "Policy"), "Policy | Policy[]");
        assert_eq!(bound_type(&scope, "Orphan"), "Orphan | Orphan[]");
    }

    #[test]
    fn unknown_context_is_an_error() {
        let err = builder().build_scope("Ghost").unwrap_err();
        assert_eq!(err.code(), "TYPE:UNKNOWN_CONTEXT");
    }

    #[test]
    fn function_scope_sees_only_arguments_and_functions() {
        let builder = builder();
        let scope = builder.build_function_scope("Twice").unwrap();

        assert_eq!(scope.kind(), ScopeKind::VariablesMap);
        assert_eq!(bound_type(&scope, "amount"), "Number");
        assert!(scope.resolve_reference("Policy").is_none());
        assert!(scope.resolve_reference("context").is_none());
        assert!(scope.resolve_function("Twice", 1).is_some());
    }

    #[test]
    fn scopes_are_memoized() {
        let builder = builder();
        let first = builder.build_scope("Policy").unwrap();
        let second = builder.build_scope("Policy").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let first = builder.build_function_scope("Twice").unwrap();
        let second = builder.build_function_scope("Twice").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
