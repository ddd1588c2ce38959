//! Project definitions consumed from the model layer.
//!
//! These arrive already merged: names are unique and no namespace includes
//! are left. The engine only reads them.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::symbol::FunctionHeader;

/// How many instances a field or navigation holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Exactly zero or one
    #[default]
    Single,
    /// Any number
    Multiple,
}

/// A declared field of a context definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name.
    pub name: String,
    /// Primitive, context or external context type name.
    pub field_type: String,
    /// Single value or collection.
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Hidden from expressions.
    #[serde(default)]
    pub forbid_reference: bool,
}

impl FieldDefinition {
    /// Single-valued field.
    pub fn single(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            cardinality: Cardinality::Single,
            forbid_reference: false,
        }
    }

    /// Collection field.
    pub fn multiple(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            cardinality: Cardinality::Multiple,
            ..Self::single(name, field_type)
        }
    }

    /// Hide the field from expressions.
    pub fn forbid_reference(mut self) -> Self {
        self.forbid_reference = true;
        self
    }
}

/// Navigation from a context definition to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildNavigation {
    /// Child context definition name.
    pub target: String,
    /// Number of child instances per parent instance.
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Child is not reachable by cross-context reference through this edge.
    #[serde(default)]
    pub forbid_reference: bool,
}

impl ChildNavigation {
    /// Navigation to at most one child.
    pub fn single(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            cardinality: Cardinality::Single,
            forbid_reference: false,
        }
    }

    /// Navigation to any number of children.
    pub fn multiple(target: impl Into<String>) -> Self {
        Self {
            cardinality: Cardinality::Multiple,
            ..Self::single(target)
        }
    }

    /// Exclude this edge from cross-context references.
    pub fn forbid_reference(mut self) -> Self {
        self.forbid_reference = true;
        self
    }
}

fn default_true() -> bool {
    true
}

/// A named domain type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDefinition {
    /// Unique name.
    pub name: String,
    /// Fields are statically declared; non-strict contexts are typed `Any`.
    #[serde(default = "default_true")]
    pub strict: bool,
    /// Inherited definitions.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Declared fields.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Child navigations.
    #[serde(default)]
    pub children: Vec<ChildNavigation>,
}

impl ContextDefinition {
    /// Strict definition without fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strict: true,
            parents: Vec::new(),
            fields: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Mark the definition as dynamically typed.
    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Add a parent definition.
    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.parents.push(name.into());
        self
    }

    /// Add a field.
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a child navigation.
    pub fn child(mut self, child: ChildNavigation) -> Self {
        self.children.push(child);
        self
    }
}

/// Fields and children of a context definition merged with everything it inherits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextProjection {
    /// Context definition name.
    pub name: String,
    /// Own fields first, then inherited ones not shadowed by name.
    pub fields: Vec<FieldDefinition>,
    /// Own and inherited child navigations, deduplicated by target.
    pub children: Vec<ChildNavigation>,
}

/// Shape of data supplied by the caller under the `context` variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalContextDefinition {
    /// Unique name.
    pub name: String,
    /// Fields; a field type may name another external context definition.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

impl ExternalContextDefinition {
    /// Definition without fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field.
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }
}

/// Upper bound of a type parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericTypeBound {
    /// Type parameter name, e.g. `T`.
    pub generic: String,
    /// Bound type name; `None` leaves the parameter unbounded.
    #[serde(default)]
    pub bound: Option<String>,
}

/// A declared function signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    /// Function name.
    pub name: String,
    /// Return type name.
    pub return_type: String,
    /// Parameter type names, positional.
    #[serde(default)]
    pub parameter_types: Vec<String>,
    /// Bounds of the type parameters used above.
    #[serde(default)]
    pub generic_bounds: Vec<GenericTypeBound>,
}

impl FunctionSignature {
    /// Signature without parameters.
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            parameter_types: Vec::new(),
            generic_bounds: Vec::new(),
        }
    }

    /// Add a parameter type.
    pub fn param(mut self, parameter_type: impl Into<String>) -> Self {
        self.parameter_types.push(parameter_type.into());
        self
    }

    /// Bound a type parameter.
    pub fn generic(mut self, generic: impl Into<String>, bound: Option<&str>) -> Self {
        self.generic_bounds.push(GenericTypeBound {
            generic: generic.into(),
            bound: bound.map(str::to_string),
        });
        self
    }

    /// Lookup key.
    pub fn header(&self) -> FunctionHeader {
        FunctionHeader::new(&self.name, self.parameter_types.len())
    }
}

/// Named parameter of an implemented function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Parameter name, visible inside the body.
    pub name: String,
    /// Parameter type name.
    pub parameter_type: String,
}

/// A function implemented in the rule language. The body is compiled by the
/// expression layer against the function's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name.
    pub name: String,
    /// Return type name.
    pub return_type: String,
    /// Parameters, positional.
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    /// Bounds of the type parameters used above.
    #[serde(default)]
    pub generic_bounds: Vec<GenericTypeBound>,
}

impl FunctionDefinition {
    /// Definition without parameters.
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            parameters: Vec::new(),
            generic_bounds: Vec::new(),
        }
    }

    /// Add a named parameter.
    pub fn param(mut self, name: impl Into<String>, parameter_type: impl Into<String>) -> Self {
        self.parameters.push(ParameterDefinition {
            name: name.into(),
            parameter_type: parameter_type.into(),
        });
        self
    }

    /// Bound a type parameter.
    pub fn generic(mut self, generic: impl Into<String>, bound: Option<&str>) -> Self {
        self.generic_bounds.push(GenericTypeBound {
            generic: generic.into(),
            bound: bound.map(str::to_string),
        });
        self
    }

    /// Lookup key.
    pub fn header(&self) -> FunctionHeader {
        FunctionHeader::new(&self.name, self.parameters.len())
    }
}

/// A finalized project: everything the registry needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectModel {
    /// Project identity.
    pub project: String,
    /// Namespace inside the project.
    pub namespace: String,
    /// Root context definition name.
    pub root: String,
    /// Context definitions.
    #[serde(default)]
    pub contexts: Vec<ContextDefinition>,
    /// External context definitions.
    #[serde(default)]
    pub external_contexts: Vec<ExternalContextDefinition>,
    /// External context bound to the `context` variable, if any.
    #[serde(default)]
    pub external_root: Option<String>,
    /// Declared function signatures.
    #[serde(default)]
    pub signatures: Vec<FunctionSignature>,
    /// Functions implemented in the rule language.
    #[serde(default)]
    pub functions: Vec<FunctionDefinition>,
}

impl ProjectModel {
    /// Empty project.
    pub fn new(
        project: impl Into<String>,
        namespace: impl Into<String>,
        root: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            namespace: namespace.into(),
            root: root.into(),
            ..Self::default()
        }
    }

    /// Add a context definition.
    pub fn context(mut self, definition: ContextDefinition) -> Self {
        self.contexts.push(definition);
        self
    }

    /// Add an external context definition.
    pub fn external_context(mut self, definition: ExternalContextDefinition) -> Self {
        self.external_contexts.push(definition);
        self
    }

    /// Bind an external context definition to the `context` variable.
    pub fn external_root(mut self, name: impl Into<String>) -> Self {
        self.external_root = Some(name.into());
        self
    }

    /// Add a function signature.
    pub fn signature(mut self, signature: FunctionSignature) -> Self {
        self.signatures.push(signature);
        self
    }

    /// Add a function implemented in the rule language.
    pub fn function(mut self, definition: FunctionDefinition) -> Self {
        self.functions.push(definition);
        self
    }

    /// Name of the project's global scope, unique per project and namespace.
    pub fn global_scope_name(&self) -> String {
        format!("{}::{}", self.project, self.namespace)
    }

    /// Context definition by name.
    pub fn context_definition(&self, name: &str) -> Option<&ContextDefinition> {
        self.contexts.iter().find(|definition| definition.name == name)
    }

    /// Merge a definition with everything it inherits, breadth first.
    /// Inheritance cycles are cut at the first repeated name.
    pub fn projection(&self, name: &str) -> Option<ContextProjection> {
        let definition = self.context_definition(name)?;
        let mut fields: IndexMap<String, FieldDefinition> = IndexMap::new();
        let mut children: IndexMap<String, ChildNavigation> = IndexMap::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([definition]);

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.name.as_str()) {
                continue;
            }
            for field in &current.fields {
                fields
                    .entry(field.name.clone())
                    .or_insert_with(|| field.clone());
            }
            for child in &current.children {
                children
                    .entry(child.target.clone())
                    .or_insert_with(|| child.clone());
            }
            queue.extend(
                current
                    .parents
                    .iter()
                    .filter_map(|parent| self.context_definition(parent)),
            );
        }

        Some(ContextProjection {
            name: name.to_string(),
            fields: fields.into_values().collect(),
            children: children.into_values().collect(),
        })
    }
}
