//! Shared fixtures for the expression integration tests

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use verdict_expression::{
    AstBuilder, EvaluationConfig, EvaluationContext, Evaluator, FunctionImplementation,
    FunctionInvoker,
};
use verdict_types::{
    ChildNavigation, ContextDefinition, FieldDefinition, FunctionDefinition, NavigationGraph,
    ProjectModel, ScopeBuilder, TypeRegistry,
};
use verdict_value::{EntityRef, StaticTypeProvider, Value};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Policy with risk items and coverages, plus a side context reachable
/// from the policy.
pub fn insurance_model() -> ProjectModel {
    ProjectModel::new("insurance", "auto", "Policy")
        .context(
            ContextDefinition::new("Policy")
                .field(FieldDefinition::single("state", "String"))
                .field(FieldDefinition::single("term", "Integer"))
                .field(FieldDefinition::single("premium", "Decimal"))
                .field(FieldDefinition::multiple("riskItems", "RiskItem"))
                .child(ChildNavigation::multiple("RiskItem"))
                .child(ChildNavigation::single("SomeContext")),
        )
        .context(
            ContextDefinition::new("RiskItem")
                .field(FieldDefinition::single("name", "String"))
                .field(FieldDefinition::multiple("coverages", "Coverage"))
                .child(ChildNavigation::multiple("Coverage")),
        )
        .context(
            ContextDefinition::new("BaseCoverage")
                .field(FieldDefinition::single("limitAmount", "Decimal")),
        )
        .context(
            ContextDefinition::new("Coverage")
                .parent("BaseCoverage")
                .field(FieldDefinition::single("code", "String")),
        )
        .context(
            ContextDefinition::new("SomeContext")
                .field(FieldDefinition::single("label", "String"))
                .child(ChildNavigation::single("Address")),
        )
        .context(
            ContextDefinition::new("Address").field(FieldDefinition::single("streetNumber", "Integer")),
        )
        .function(FunctionDefinition::new("GetAddress", "Address").param("owner", "SomeContext"))
        .function(FunctionDefinition::new("Twice", "Decimal").param("x", "Decimal"))
        .function(FunctionDefinition::new("Loop", "Integer").param("n", "Integer"))
}

/// Scope builder over [`insurance_model`] with the built-in functions.
pub fn scopes() -> ScopeBuilder {
    let model = insurance_model();
    let graph = Arc::new(NavigationGraph::from_model(&model).unwrap());
    let natives = FunctionInvoker::default().native_table();
    let registry = TypeRegistry::new(Arc::new(model), graph.as_ref(), &natives).unwrap();
    ScopeBuilder::new(Arc::new(registry), graph)
}

/// Builder for rules on `context`.
pub fn rule_builder(scopes: &ScopeBuilder, context: &str) -> AstBuilder {
    AstBuilder::new(scopes.build_scope(context).unwrap())
}

/// Builder for the body of the implemented function `name`.
pub fn function_builder(scopes: &ScopeBuilder, name: &str) -> AstBuilder {
    AstBuilder::new(scopes.build_function_scope(name).unwrap())
}

/// Pair the implemented function `name` with a body built by `body`.
pub fn implement<F>(scopes: &ScopeBuilder, name: &str, body: F) -> FunctionImplementation
where
    F: FnOnce(&AstBuilder) -> verdict_expression::Expression,
{
    let function = scopes.registry().implemented_function(name).unwrap();
    FunctionImplementation::new(function, body(&function_builder(scopes, name)))
}

pub fn type_provider() -> StaticTypeProvider {
    StaticTypeProvider::new().with_type("Coverage", ["BaseCoverage"])
}

pub fn context(root: Value) -> EvaluationContext {
    EvaluationContext::builder(root)
        .types(Arc::new(type_provider()))
        .build()
}

pub fn context_with(root: Value, invoker: FunctionInvoker) -> EvaluationContext {
    EvaluationContext::builder(root)
        .types(Arc::new(type_provider()))
        .invoker(Arc::new(invoker))
        .build()
}

pub fn strict() -> Evaluator {
    Evaluator::new(EvaluationConfig::strict())
}

pub fn non_strict() -> Evaluator {
    Evaluator::new(EvaluationConfig::non_strict())
}

pub fn coverage(code: &str, limit: i64) -> Value {
    Value::entity(
        EntityRef::new("Coverage")
            .with("code", Value::text(code))
            .with("limitAmount", Value::Decimal(Decimal::from(limit))),
    )
}

pub fn risk_item(name: &str, coverages: Vec<Value>) -> Value {
    Value::entity(
        EntityRef::new("RiskItem")
            .with("name", Value::text(name))
            .with("coverages", Value::list(coverages)),
    )
}

pub fn policy(risk_items: Vec<Value>) -> EntityRef {
    EntityRef::new("Policy")
        .with("state", Value::text("CA"))
        .with("term", Value::Integer(12))
        .with("premium", Value::Decimal(Decimal::new(125_050, 2)))
        .with("riskItems", Value::list(risk_items))
}
