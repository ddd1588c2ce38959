//! Runtime environment of one evaluation.
//!
//! Binding constructs (quantifiers, `for`, value blocks, filters) never
//! change a context in place: they derive a child context whose new frame
//! points at the parent's, so sibling iterations share the parent safely.

use std::fmt;
use std::sync::Arc;

use chrono_tz::Tz;
use indexmap::IndexMap;
use verdict_value::{StaticTypeProvider, TypeProvider, Value};

use crate::invoker::FunctionInvoker;

struct VariableFrame {
    variables: IndexMap<Arc<str>, Value>,
    parent: Option<Arc<VariableFrame>>,
}

struct ThisFrame {
    value: Value,
    outer: Option<Arc<ThisFrame>>,
}

/// Evaluation context: root object, variables, type provider, function
/// invoker and time zone.
#[derive(Clone)]
pub struct EvaluationContext {
    root: Value,
    this: Arc<ThisFrame>,
    variables: Option<Arc<VariableFrame>>,
    types: Arc<dyn TypeProvider>,
    invoker: Arc<FunctionInvoker>,
    time_zone: Tz,
    depth: usize,
}

impl EvaluationContext {
    /// Context over `root` with built-in functions, a provider without
    /// inheritance and UTC.
    pub fn new(root: Value) -> Self {
        Self::builder(root).build()
    }

    /// Create a builder for constructing contexts
    pub fn builder(root: Value) -> EvaluationContextBuilder {
        EvaluationContextBuilder::new(root)
    }

    /// The evaluation root.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// The current `this` object.
    pub fn this(&self) -> &Value {
        &self.this.value
    }

    /// The `this` object `depth` levels out; `Null` past the outermost.
    pub fn this_at(&self, depth: usize) -> Value {
        let mut frame = Some(&self.this);
        for _ in 0..depth {
            frame = frame.and_then(|f| f.outer.as_ref());
        }
        frame.map_or(Value::Null, |f| f.value.clone())
    }

    /// Value of the nearest binding of `name`.
    pub fn variable(&self, name: &str) -> Option<Value> {
        let mut frame = self.variables.as_deref();
        while let Some(current) = frame {
            if let Some(value) = current.variables.get(name) {
                return Some(value.clone());
            }
            frame = current.parent.as_deref();
        }
        None
    }

    /// Runtime type information.
    pub fn types(&self) -> &dyn TypeProvider {
        self.types.as_ref()
    }

    /// Callable functions.
    pub fn invoker(&self) -> &Arc<FunctionInvoker> {
        &self.invoker
    }

    /// Time zone of `Today()` and `Now()`.
    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// Nesting depth evaluation starts at; grows with each function call.
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub(crate) fn at_depth(&self, depth: usize) -> Self {
        Self {
            depth,
            ..self.clone()
        }
    }

    /// Child context whose `this` is `value`.
    #[must_use]
    pub fn with_this(&self, value: Value) -> Self {
        Self {
            this: Arc::new(ThisFrame {
                value,
                outer: Some(Arc::clone(&self.this)),
            }),
            ..self.clone()
        }
    }

    /// Child context with an extra binding frame.
    #[must_use]
    pub fn with_variables<I, K>(&self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Arc<str>>,
    {
        Self {
            variables: Some(Arc::new(VariableFrame {
                variables: variables.into_iter().map(|(k, v)| (k.into(), v)).collect(),
                parent: self.variables.clone(),
            })),
            ..self.clone()
        }
    }

    /// Child context with one extra binding.
    #[must_use]
    pub fn with_variable(&self, name: &Arc<str>, value: Value) -> Self {
        self.with_variables([(Arc::clone(name), value)])
    }

    /// Context for a function body: only `variables` are visible, there is
    /// no root object.
    #[must_use]
    pub fn for_function_body<I, K>(&self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Arc<str>>,
    {
        let isolated = Self {
            root: Value::Null,
            this: Arc::new(ThisFrame {
                value: Value::Null,
                outer: None,
            }),
            variables: None,
            ..self.clone()
        };
        isolated.with_variables(variables)
    }
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("root", &self.root)
            .field("this", &self.this.value)
            .field("time_zone", &self.time_zone)
            .finish_non_exhaustive()
    }
}

/// Builder for creating evaluation contexts
pub struct EvaluationContextBuilder {
    root: Value,
    variables: IndexMap<Arc<str>, Value>,
    types: Option<Arc<dyn TypeProvider>>,
    invoker: Option<Arc<FunctionInvoker>>,
    time_zone: Tz,
}

impl EvaluationContextBuilder {
    /// Create a new builder
    pub fn new(root: Value) -> Self {
        Self {
            root,
            variables: IndexMap::new(),
            types: None,
            invoker: None,
            time_zone: Tz::UTC,
        }
    }

    /// Add a top-level variable, such as a cross-context reference or the
    /// external `context` object
    #[must_use]
    pub fn variable(mut self, name: &str, value: Value) -> Self {
        self.variables.insert(Arc::from(name), value);
        self
    }

    /// Set the type provider
    #[must_use]
    pub fn types(mut self, types: Arc<dyn TypeProvider>) -> Self {
        self.types = Some(types);
        self
    }

    /// Set the function invoker
    #[must_use]
    pub fn invoker(mut self, invoker: Arc<FunctionInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Set the time zone
    #[must_use]
    pub fn time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// Build the context
    pub fn build(self) -> EvaluationContext {
        EvaluationContext {
            this: Arc::new(ThisFrame {
                value: self.root.clone(),
                outer: None,
            }),
            root: self.root,
            variables: Some(Arc::new(VariableFrame {
                variables: self.variables,
                parent: None,
            })),
            types: self
                .types
                .unwrap_or_else(|| Arc::new(StaticTypeProvider::new())),
            invoker: self.invoker.unwrap_or_default(),
            time_zone: self.time_zone,
            depth: 0,
        }
    }
}
