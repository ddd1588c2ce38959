//! Type registry: every type and function symbol of one project.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::debug;

use crate::error::{TypeError, TypeResult};
use crate::model::{
    Cardinality, ContextDefinition, ContextProjection, FieldDefinition, FunctionDefinition, FunctionSignature,
    GenericTypeBound, ProjectModel,
};
use crate::paths::CrossContextPathResolver;
use crate::symbol::{FunctionHeader, FunctionSymbol, VariableSymbol};
use crate::types::{Type, TypeResolver, TypeTable};

/// Functions the runtime provides natively, injected into the registry.
#[derive(Debug, Clone, Default)]
pub struct NativeFunctionTable {
    functions: IndexMap<FunctionHeader, FunctionSymbol>,
}

impl NativeFunctionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with(mut self, symbol: FunctionSymbol) -> Self {
        self.insert(symbol);
        self
    }

    /// Register a function. A later registration with the same header replaces
    /// the earlier one.
    pub fn insert(&mut self, symbol: FunctionSymbol) {
        self.functions.insert(symbol.header(), symbol);
    }

    /// Symbol by header.
    pub fn get(&self, header: &FunctionHeader) -> Option<&FunctionSymbol> {
        self.functions.get(header)
    }

    /// All symbols in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionSymbol> {
        self.functions.values()
    }

    /// Number of functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl FromIterator<FunctionSymbol> for NativeFunctionTable {
    fn from_iter<T: IntoIterator<Item = FunctionSymbol>>(iter: T) -> Self {
        let mut table = Self::new();
        for symbol in iter {
            table.insert(symbol);
        }
        table
    }
}

/// A function implemented in the rule language, with its resolved symbol.
#[derive(Debug, Clone)]
pub struct ImplementedFunction {
    /// Declaration as found in the project.
    pub definition: FunctionDefinition,
    /// Resolved symbol; parameter types may contain type parameters.
    pub symbol: FunctionSymbol,
}

/// Types and function symbols of one project, built once and shared.
#[derive(Debug)]
pub struct TypeRegistry {
    model: Arc<ProjectModel>,
    global_scope_name: String,
    types: Arc<TypeTable>,
    context_types: IndexMap<String, Arc<Type>>,
    global_types: IndexMap<String, Arc<Type>>,
    external_root: Option<Arc<Type>>,
    functions: IndexMap<FunctionHeader, FunctionSymbol>,
    implemented: IndexMap<String, ImplementedFunction>,
    projections: DashMap<String, Arc<ContextProjection>>,
}

impl TypeRegistry {
    /// Build the registry for a project.
    ///
    /// Fails when the root is missing, a type or parent cannot be resolved,
    /// or a declared function signature has no matching implementation among
    /// the project's functions and `natives`.
    pub fn new(
        model: Arc<ProjectModel>,
        paths: &dyn CrossContextPathResolver,
        natives: &NativeFunctionTable,
    ) -> TypeResult<Self> {
        if model.context_definition(&model.root).is_none() {
            return Err(TypeError::MissingRoot {
                root: model.root.clone(),
            });
        }

        let known: HashSet<&str> = model
            .contexts
            .iter()
            .map(|c| c.name.as_str())
            .chain(model.external_contexts.iter().map(|c| c.name.as_str()))
            .collect();
        let parser = TypeNameParser { known: &known };

        let mut types = TypeTable::new();
        let mut context_types = IndexMap::new();
        for definition in &model.contexts {
            if let Some(parent) = definition
                .parents
                .iter()
                .find(|parent| model.context_definition(parent).is_none())
            {
                return Err(TypeError::UnknownParent {
                    context: definition.name.clone(),
                    parent: parent.clone(),
                });
            }
            let ty = if definition.strict {
                context_type(definition, &parser)?
            } else {
                Type::any()
            };
            types.insert_as(definition.name.clone(), Arc::clone(&ty));
            context_types.insert(definition.name.clone(), ty);
        }

        for external in &model.external_contexts {
            let properties = field_symbols(&external.name, &external.fields, &parser)?;
            types.insert(Type::entity(
                &external.name,
                properties,
                std::iter::empty::<&str>(),
            ));
        }

        let external_root = match &model.external_root {
            Some(name) => Some(
                types
                    .get(name)
                    .cloned()
                    .ok_or_else(|| TypeError::unknown_type(name, "context"))?,
            ),
            None => None,
        };

        let global_types: IndexMap<String, Arc<Type>> = context_types
            .iter()
            .filter(|(name, _)| paths.has_path_to(name))
            .map(|(name, ty)| (name.clone(), Arc::clone(ty)))
            .collect();

        // Precedence: declared signatures, then implemented functions, then natives.
        let mut functions: IndexMap<FunctionHeader, FunctionSymbol> = IndexMap::new();
        let mut declared = Vec::with_capacity(model.signatures.len());
        for signature in &model.signatures {
            let symbol = signature_symbol(signature, &parser)?;
            functions
                .entry(signature.header())
                .or_insert_with(|| symbol.clone());
            declared.push(symbol);
        }

        let mut implemented = IndexMap::new();
        for definition in &model.functions {
            let symbol = definition_symbol(definition, &parser)?;
            functions
                .entry(definition.header())
                .or_insert_with(|| symbol.clone());
            implemented.insert(
                definition.name.clone(),
                ImplementedFunction {
                    definition: definition.clone(),
                    symbol,
                },
            );
        }

        for native in natives.iter() {
            functions
                .entry(native.header())
                .or_insert_with(|| native.clone());
        }

        for expected in &declared {
            let header = expected.header();
            let actual = implemented
                .values()
                .map(|function| &function.symbol)
                .find(|symbol| symbol.header() == header)
                .or_else(|| natives.get(&header))
                .ok_or_else(|| TypeError::MissingFunctionImplementation {
                    function: header.clone(),
                })?;
            if actual != expected {
                return Err(TypeError::FunctionSignatureMismatch {
                    function: header,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        debug!(
            project = %model.project,
            namespace = %model.namespace,
            contexts = context_types.len(),
            connected = global_types.len(),
            functions = functions.len(),
            "type registry built"
        );

        Ok(Self {
            global_scope_name: model.global_scope_name(),
            model,
            types: Arc::new(types),
            context_types,
            global_types,
            external_root,
            functions,
            implemented,
            projections: DashMap::new(),
        })
    }

    /// Project the registry was built from.
    pub fn model(&self) -> &Arc<ProjectModel> {
        &self.model
    }

    /// Root context definition name.
    pub fn root(&self) -> &str {
        &self.model.root
    }

    /// Unique name of the project's global scope.
    pub fn global_scope_name(&self) -> &str {
        &self.global_scope_name
    }

    /// All types, built-ins included.
    pub fn types(&self) -> &Arc<TypeTable> {
        &self.types
    }

    /// Type of a context definition.
    pub fn context_type(&self, name: &str) -> Option<&Arc<Type>> {
        self.context_types.get(name)
    }

    /// Merged (own and inherited) fields and children of a context, computed
    /// once per name.
    pub fn projection(&self, name: &str) -> Option<Arc<ContextProjection>> {
        if let Some(entry) = self.projections.get(name) {
            return Some(Arc::clone(entry.value()));
        }
        let projection = Arc::new(self.model.projection(name)?);
        Some(Arc::clone(
            self.projections
                .entry(name.to_string())
                .or_insert(projection)
                .value(),
        ))
    }

    /// Every context definition type, in declaration order.
    pub fn context_types(&self) -> impl Iterator<Item = (&str, &Arc<Type>)> {
        self.context_types.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    /// Types of contexts connected to the root; only these are addressable
    /// by cross-context reference.
    pub fn global_types(&self) -> impl Iterator<Item = (&str, &Arc<Type>)> {
        self.global_types.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    /// Whether a context is connected to the root.
    pub fn is_connected(&self, name: &str) -> bool {
        self.global_types.contains_key(name)
    }

    /// Type bound to the `context` variable.
    pub fn external_context_type(&self) -> Option<&Arc<Type>> {
        self.external_root.as_ref()
    }

    /// Every function symbol visible to rules.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionSymbol> {
        self.functions.values()
    }

    /// Function symbol by header.
    pub fn function(&self, header: &FunctionHeader) -> Option<&FunctionSymbol> {
        self.functions.get(header)
    }

    /// Function implemented in the rule language, by name.
    pub fn implemented_function(&self, name: &str) -> Option<&ImplementedFunction> {
        self.implemented.get(name)
    }

    /// Functions implemented in the rule language.
    pub fn implemented_functions(&self) -> impl Iterator<Item = &ImplementedFunction> {
        self.implemented.values()
    }

    /// Parse a type name such as `Coverage[]` or `Number | Number[]`.
    pub fn resolve_type_name(&self, name: &str) -> TypeResult<Arc<Type>> {
        let known: HashSet<&str> = self.context_types.keys().map(String::as_str).collect();
        let parser = TypeNameParser { known: &known };
        parser
            .parse(name, &HashMap::new(), "type reference")
            .or_else(|err| self.types.get(name.trim()).cloned().ok_or(err))
    }
}

impl TypeResolver for TypeRegistry {
    fn resolve_type(&self, name: &str) -> Option<Arc<Type>> {
        self.types.resolve_type(name)
    }
}

fn context_type(definition: &ContextDefinition, parser: &TypeNameParser<'_>) -> TypeResult<Arc<Type>> {
    let properties = field_symbols(&definition.name, &definition.fields, parser)?;
    Ok(Type::entity(&definition.name, properties, &definition.parents))
}

fn field_symbols(
    owner: &str,
    fields: &[FieldDefinition],
    parser: &TypeNameParser<'_>,
) -> TypeResult<Vec<VariableSymbol>> {
    fields
        .iter()
        .filter(|field| !field.forbid_reference)
        .map(|field| {
            let ty = parser.parse(
                &field.field_type,
                &HashMap::new(),
                &format!("{owner}.{}", field.name),
            )?;
            let ty = match field.cardinality {
                Cardinality::Single => ty,
                Cardinality::Multiple => Type::array(ty),
            };
            Ok(VariableSymbol::new(&field.name, ty))
        })
        .collect()
}

fn generic_types(
    owner: &str,
    bounds: &[GenericTypeBound],
    parser: &TypeNameParser<'_>,
) -> TypeResult<HashMap<String, Arc<Type>>> {
    bounds
        .iter()
        .map(|bound| {
            let upper = bound
                .bound
                .as_deref()
                .map(|name| parser.parse(name, &HashMap::new(), owner))
                .transpose()?;
            Ok((bound.generic.clone(), Type::generic(&bound.generic, upper)))
        })
        .collect()
}

fn signature_symbol(
    signature: &FunctionSignature,
    parser: &TypeNameParser<'_>,
) -> TypeResult<FunctionSymbol> {
    let generics = generic_types(&signature.name, &signature.generic_bounds, parser)?;
    let return_type = parser.parse(&signature.return_type, &generics, &signature.name)?;
    let parameters = signature
        .parameter_types
        .iter()
        .map(|ty| parser.parse(ty, &generics, &signature.name))
        .collect::<TypeResult<Vec<_>>>()?;
    Ok(FunctionSymbol::new(&signature.name, return_type, parameters))
}

fn definition_symbol(
    definition: &FunctionDefinition,
    parser: &TypeNameParser<'_>,
) -> TypeResult<FunctionSymbol> {
    let generics = generic_types(&definition.name, &definition.generic_bounds, parser)?;
    let return_type = parser.parse(&definition.return_type, &generics, &definition.name)?;
    let parameters = definition
        .parameters
        .iter()
        .map(|p| parser.parse(&p.parameter_type, &generics, &definition.name))
        .collect::<TypeResult<Vec<_>>>()?;
    Ok(FunctionSymbol::new(&definition.name, return_type, parameters))
}

/// Parses type names: built-ins, declared names, type parameters, `T[]`,
/// `A | B` and parentheses.
struct TypeNameParser<'a> {
    known: &'a HashSet<&'a str>,
}

impl TypeNameParser<'_> {
    fn parse(
        &self,
        name: &str,
        generics: &HashMap<String, Arc<Type>>,
        owner: &str,
    ) -> TypeResult<Arc<Type>> {
        let name = name.trim();
        if let Some((left, right)) = split_union(name) {
            return Ok(Type::union(
                self.parse(left, generics, owner)?,
                self.parse(right, generics, owner)?,
            ));
        }
        if let Some(element) = name.strip_suffix("[]") {
            return Ok(Type::array(self.parse(element, generics, owner)?));
        }
        if let Some(inner) = name.strip_prefix('(').and_then(|n| n.strip_suffix(')')) {
            return self.parse(inner, generics, owner);
        }
        if let Some(generic) = generics.get(name) {
            return Ok(Arc::clone(generic));
        }
        if let Some(builtin) = Type::builtin(name) {
            return Ok(builtin);
        }
        if self.known.contains(name) {
            return Ok(Type::reference(name));
        }
        Err(TypeError::unknown_type(name, owner))
    }
}

fn split_union(name: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, ch) in name.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '|' if depth == 0 => return Some((&name[..i], &name[i + 1..])),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChildNavigation, ExternalContextDefinition};
    use crate::paths::NavigationGraph;
    use pretty_assertions::assert_eq;

    fn model() -> ProjectModel {
        ProjectModel::new("demo", "ns", "Policy")
            .context(
                ContextDefinition::new("Policy")
                    .field(FieldDefinition::single("state", "String"))
                    .field(FieldDefinition::multiple("riskItems", "RiskItem"))
                    .field(FieldDefinition::single("secret", "String").forbid_reference())
                    .child(ChildNavigation::multiple("RiskItem")),
            )
            .context(
                ContextDefinition::new("RiskItem")
                    .field(FieldDefinition::multiple("coverages", "Coverage"))
                    .child(ChildNavigation::multiple("Coverage")),
            )
            .context(
                ContextDefinition::new("Coverage")
                    .field(FieldDefinition::single("limitAmount", "Decimal")),
            )
            .context(ContextDefinition::new("Scratch").non_strict())
            .external_context(
                ExternalContextDefinition::new("Request")
                    .field(FieldDefinition::single("channel", "String")),
            )
            .external_root("Request")
    }

    fn build(model: ProjectModel, natives: &NativeFunctionTable) -> TypeResult<TypeRegistry> {
        let graph = NavigationGraph::from_model(&model)?;
        TypeRegistry::new(Arc::new(model), &graph, natives)
    }

    #[test]
    fn context_types_hold_visible_fields() {
        let registry = build(model(), &NativeFunctionTable::new()).unwrap();
        let policy = registry.context_type("Policy").unwrap();

        assert_eq!(
            policy.own_property("riskItems").unwrap().ty().name(),
            "RiskItem[]"
        );
        assert!(policy.own_property("secret").is_none());
        assert!(registry.context_type("Scratch").unwrap().is_dynamic());
        assert!(registry.is_connected("Coverage"));
        assert!(!registry.is_connected("Scratch"));
        assert_eq!(registry.external_context_type().unwrap().name(), "Request");
        assert_eq!(registry.global_scope_name(), "demo::ns");
    }

    #[test]
    fn projections_are_cached() {
        let registry = build(model(), &NativeFunctionTable::new()).unwrap();
        let first = registry.projection("Policy").unwrap();
        let second = registry.projection("Policy").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.projection("Ghost").is_none());
    }

    #[test]
    fn unknown_field_type_is_fatal() {
        let model = ProjectModel::new("demo", "ns", "Policy").context(
            ContextDefinition::new("Policy").field(FieldDefinition::single("x", "Nope")),
        );
        let err = build(model, &NativeFunctionTable::new()).unwrap_err();
        assert_eq!(err.code(), "TYPE:UNKNOWN_TYPE");
        assert!(err.to_string().contains("Policy.x"));
    }

    #[test]
    fn unknown_parent_is_fatal() {
        let model = ProjectModel::new("demo", "ns", "Policy")
            .context(ContextDefinition::new("Policy").parent("Ghost"));
        let err = build(model, &NativeFunctionTable::new()).unwrap_err();
        assert_eq!(err.code(), "TYPE:UNKNOWN_PARENT");
    }

    #[test]
    fn declared_function_without_implementation_is_fatal() {
        let model = model().signature(FunctionSignature::new("GetAddress", "String").param("Policy"));
        let err = build(model, &NativeFunctionTable::new()).unwrap_err();
        assert!(matches!(
            err,
            TypeError::MissingFunctionImplementation { ref function } if function.name() == "GetAddress"
        ));
    }

    #[test]
    fn declared_function_with_different_symbol_is_fatal() {
        let model = model().signature(FunctionSignature::new("GetAddress", "String").param("Policy"));
        let natives = NativeFunctionTable::new().with(FunctionSymbol::new(
            "GetAddress",
            Type::integer(),
            [Type::reference("Policy")],
        ));
        let err = build(model, &natives).unwrap_err();
        assert_eq!(err.code(), "TYPE:SIGNATURE_MISMATCH");
    }

    #[test]
    fn declared_function_matching_native_is_accepted() {
        let model = model().signature(
            FunctionSignature::new("First", "T")
                .param("T[]")
                .generic("T", None),
        );
        let t = Type::generic("T", None);
        let natives = NativeFunctionTable::new().with(FunctionSymbol::new(
            "First",
            Arc::clone(&t),
            [Type::array(t)],
        ));
        let registry = build(model, &natives).unwrap();
        assert!(registry.function(&FunctionHeader::new("First", 1)).is_some());
    }

    #[test]
    fn implemented_function_satisfies_signature() {
        let model = model()
            .signature(FunctionSignature::new("IsBig", "Boolean").param("Coverage"))
            .function(FunctionDefinition::new("IsBig", "Boolean").param("coverage", "Coverage"));
        let registry = build(model, &NativeFunctionTable::new()).unwrap();
        assert_eq!(
            registry.implemented_function("IsBig").unwrap().symbol.to_string(),
            "IsBig(Coverage) : Boolean"
        );
    }

    #[test]
    fn type_names_parse_structurally() {
        let registry = build(model(), &NativeFunctionTable::new()).unwrap();
        assert_eq!(
            registry.resolve_type_name("Coverage | Coverage[]").unwrap().name(),
            "Coverage | Coverage[]"
        );
        assert_eq!(
            registry.resolve_type_name("(Number | String)[]").unwrap().name(),
            "(Number | String)[]"
        );
        assert!(registry.resolve_type_name("Ghost").is_err());
    }
}
