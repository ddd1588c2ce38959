//! Variable and function symbols.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{Type, TypeKind, TypeResolver};

/// A named, typed variable or property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSymbol {
    name: Arc<str>,
    ty: Arc<Type>,
}

impl VariableSymbol {
    /// Create a symbol.
    pub fn new(name: impl AsRef<str>, ty: Arc<Type>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            ty,
        }
    }

    /// Symbol name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Symbol type.
    pub fn ty(&self) -> &Arc<Type> {
        &self.ty
    }
}

/// Lookup key of a function. The language overloads by arity only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionHeader {
    name: String,
    arity: usize,
}

impl FunctionHeader {
    /// Create a header.
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Display for FunctionHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// Positional function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionParameter {
    index: usize,
    ty: Arc<Type>,
}

impl FunctionParameter {
    /// Zero-based position.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Declared type; may contain type parameters.
    pub fn ty(&self) -> &Arc<Type> {
        &self.ty
    }
}

/// A function as seen by the type checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSymbol {
    name: Arc<str>,
    return_type: Arc<Type>,
    parameters: Vec<FunctionParameter>,
}

impl FunctionSymbol {
    /// Create a symbol; parameters are indexed in the given order.
    pub fn new(
        name: impl AsRef<str>,
        return_type: Arc<Type>,
        parameters: impl IntoIterator<Item = Arc<Type>>,
    ) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            return_type,
            parameters: parameters
                .into_iter()
                .enumerate()
                .map(|(index, ty)| FunctionParameter { index, ty })
                .collect(),
        }
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared return type.
    pub fn return_type(&self) -> &Arc<Type> {
        &self.return_type
    }

    /// Parameters in positional order.
    pub fn parameters(&self) -> &[FunctionParameter] {
        &self.parameters
    }

    /// Lookup key.
    pub fn header(&self) -> FunctionHeader {
        FunctionHeader::new(self.name.as_ref(), self.parameters.len())
    }

    /// Whether any parameter or the return type mentions a type parameter.
    pub fn is_generic(&self) -> bool {
        fn mentions_generic(ty: &Type) -> bool {
            match ty.kind() {
                TypeKind::Generic { .. } => true,
                TypeKind::Array(element) => mentions_generic(element),
                TypeKind::Union(left, right) => {
                    mentions_generic(left) || mentions_generic(right)
                }
                _ => false,
            }
        }
        mentions_generic(&self.return_type) || self.parameters.iter().any(|p| mentions_generic(&p.ty))
    }

    /// Type parameter bindings implied by the actual argument types.
    pub fn bind_generics(
        &self,
        arguments: &[Arc<Type>],
        resolver: &dyn TypeResolver,
    ) -> HashMap<String, Arc<Type>> {
        let mut bindings = HashMap::new();
        for (parameter, actual) in self.parameters.iter().zip(arguments) {
            Type::unify(&parameter.ty, actual, &mut bindings, resolver);
        }
        bindings
    }

    /// Return type for a call with the given argument types.
    pub fn resolve_return_type(
        &self,
        arguments: &[Arc<Type>],
        resolver: &dyn TypeResolver,
    ) -> Arc<Type> {
        if !self.is_generic() {
            return Arc::clone(&self.return_type);
        }
        self.return_type
            .rewrite_generics(&self.bind_generics(arguments, resolver))
    }
}

impl fmt::Display for FunctionSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", parameter.ty)?;
        }
        write!(f, ") : {}", self.return_type)
    }
}

/// Variables and functions visible at one scope level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    variables: IndexMap<String, VariableSymbol>,
    functions: IndexMap<FunctionHeader, FunctionSymbol>,
}

impl SymbolTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable.
    pub fn add_variable(&mut self, symbol: VariableSymbol) {
        self.variables.insert(symbol.name().to_string(), symbol);
    }

    /// Merge functions from a lower precedence source; existing headers win.
    pub fn merge_functions<'a>(&mut self, functions: impl IntoIterator<Item = &'a FunctionSymbol>) {
        for function in functions {
            self.functions
                .entry(function.header())
                .or_insert_with(|| function.clone());
        }
    }

    /// Variables by name.
    pub fn variables(&self) -> &IndexMap<String, VariableSymbol> {
        &self.variables
    }

    /// Functions by header.
    pub fn functions(&self) -> &IndexMap<FunctionHeader, FunctionSymbol> {
        &self.functions
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        IndexMap<String, VariableSymbol>,
        IndexMap<FunctionHeader, FunctionSymbol>,
    ) {
        (self.variables, self.functions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTable;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_merged_function_wins() {
        let declared = FunctionSymbol::new("GetLimit", Type::decimal(), [Type::string()]);
        let native = FunctionSymbol::new("GetLimit", Type::integer(), [Type::string()]);
        let mut table = SymbolTable::new();
        table.merge_functions([&declared]);
        table.merge_functions([&native]);

        let header = FunctionHeader::new("GetLimit", 1);
        assert_eq!(table.functions().get(&header), Some(&declared));
    }

    #[test]
    fn generic_return_type_follows_arguments() {
        let t = Type::generic("T", None);
        let first = FunctionSymbol::new("First", Arc::clone(&t), [Type::array(t)]);
        let table = TypeTable::new();

        assert!(first.is_generic());
        assert_eq!(
            first.resolve_return_type(&[Type::array(Type::money())], &table),
            Type::money()
        );
        assert_eq!(first.to_string(), "First(T[]) : T");
    }

    #[test]
    fn header_renders_name_and_arity() {
        assert_eq!(FunctionHeader::new("Sum", 1).to_string(), "Sum/1");
    }
}
